use crate::prompt::common::{current_date, items_block, DONT_TELL_ME, JSON_ONLY, WEALTH_CONTEXT};
use crate::types::CandidateItem;

/// Cheap headline-only triage for a batch of items.
pub fn headline_triage_prompt(items: &[(String, &CandidateItem)]) -> String {
    format!(
        r#"{context}
Today's date: {date}

HEADLINES (FOR TRIAGE):
----------
{items}
----------

TASK: Classify every headline by who is realising or moving wealth.

* **private**: a private individual, founder or family is selling, buying, inheriting or investing.
* **public**: government, regulators, public institutions, listed-market or macro news.
* **corporate**: companies acting without an identifiable private individual or family behind the event.

RETURN FORMAT (JSON):
{{
  "assessments": [
    {{"item_id": "...", "classification": "private|public|corporate", "reasoning": "one sentence"}}
  ]
}}

Include exactly one entry per item_id listed above.
{json_only}
{dont_tell_me}"#,
        context = WEALTH_CONTEXT,
        date = current_date(),
        items = items_block(items),
        json_only = JSON_ONLY,
        dont_tell_me = DONT_TELL_ME
    )
}

/// Full assessment of triaged items, with quality grading.
pub fn article_assessment_prompt(items: &[(String, &CandidateItem)]) -> String {
    format!(
        r#"{context}
Today's date: {date}

ARTICLES (FOR ASSESSMENT):
----------
{items}
----------

TASK: Assess each article as a lead for the research desk.

1. **classification**: private, public or corporate (same meaning as during triage; re-check it).
2. **quality**, one of:
   - Excellent: a named individual or family with a concrete, sizeable liquidity event
   - Good: a concrete event, but the individuals are only implied
   - Acceptable: relevant but thin or speculative
   - Marginal: tangential to private wealth
   - Poor: barely related
   - Irrelevant: not related at all
3. **confidence**: an integer from 0 to 100.
4. **reasoning**: one or two sentences citing the headline.

RETURN FORMAT (JSON):
{{
  "assessments": [
    {{"item_id": "...", "classification": "private|public|corporate",
      "quality": "Excellent|Good|Acceptable|Marginal|Poor|Irrelevant",
      "confidence": 0, "reasoning": "..."}}
  ]
}}

Include exactly one entry per item_id listed above.
{json_only}
{dont_tell_me}"#,
        context = WEALTH_CONTEXT,
        date = current_date(),
        items = items_block(items),
        json_only = JSON_ONLY,
        dont_tell_me = DONT_TELL_ME
    )
}

/// Single-item pre-assessment used for ad-hoc triage.
pub fn pre_assessment_prompt(headline: &str, source: &str) -> String {
    format!(
        r#"{context}
HEADLINE: {headline}
SOURCE: {source}

Classify the headline as private, public or corporate and give a confidence from 0 to 100.

RETURN FORMAT (JSON):
{{"classification": "private|public|corporate", "confidence": 0, "reasoning": "one sentence"}}

{json_only}
{dont_tell_me}"#,
        context = WEALTH_CONTEXT,
        headline = headline,
        source = source,
        json_only = JSON_ONLY,
        dont_tell_me = DONT_TELL_ME
    )
}
