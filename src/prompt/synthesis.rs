use crate::prompt::common::{current_date, DONT_TELL_ME, JSON_ONLY, WEALTH_CONTEXT};
use crate::types::{CandidateItem, SynthesizedEvent};

/// One article as presented to the synthesis prompt.
pub struct ClusterArticle<'a> {
    pub item: &'a CandidateItem,
    pub entities: &'a [String],
    pub reasoning: &'a str,
}

/// Builds a prompt for producing one canonical record from a cluster of articles
pub fn synthesis_prompt(event_key: &str, articles: &[ClusterArticle<'_>]) -> String {
    let mut article_summaries = String::new();
    for (i, article) in articles.iter().enumerate() {
        article_summaries.push_str(&format!(
            "Article {}: [{}] {}\nLink: {}\nEntities: {}\nAssessment: {}\n\n",
            i + 1,
            article.item.newspaper,
            article.item.headline,
            article.item.link,
            article.entities.join(", "),
            article.reasoning
        ));
    }

    format!(
        r#"{context}
Today's date: {date}

You are given related articles that all describe one event ("{event_key}").

ARTICLES:
{articles}
TASK: Write one canonical record of the event.
1. **headline**: one factual line naming who did what.
2. **summary**: two to four sentences with the amounts, stakes and parties that are reported.
3. **country**: ISO 3166 alpha-2 code of the country where the wealth sits, or "" if unknown.
4. **key_individuals**: the private individuals involved. For each:
   - name and role_in_event (seller, buyer, heir, founder, investor, ...)
   - company: the company they are tied to in this event, or null if unknown
   - email_suggestion: a plausible business email only when a company domain is
     evident, otherwise null
   Return an empty list when no individual is named.

RETURN FORMAT (JSON):
{{"headline": "...", "summary": "...", "country": "..",
  "key_individuals": [{{"name": "...", "role_in_event": "...", "company": null, "email_suggestion": null}}]}}

{json_only}
{dont_tell_me}"#,
        context = WEALTH_CONTEXT,
        date = current_date(),
        event_key = event_key,
        articles = article_summaries,
        json_only = JSON_ONLY,
        dont_tell_me = DONT_TELL_ME
    )
}

/// Asks for an accept/reject judgement of a synthesized event as a research lead.
pub fn judging_prompt(event: &SynthesizedEvent) -> String {
    format!(
        r#"{context}
EVENT:
Headline: {headline}
Summary: {summary}
Country: {country}
Individuals: {individuals}

TASK: Decide whether this event is a genuine private-wealth liquidity event worth
adding to the research pipeline. Score it from 0 (worthless) to 100 (certain and
significant) and answer "accept" or "reject".

RETURN FORMAT (JSON):
{{"verdict": "accept|reject", "score": 0, "reasoning": "one sentence"}}

{json_only}
{dont_tell_me}"#,
        context = WEALTH_CONTEXT,
        headline = event.headline,
        summary = event.summary,
        country = event.country,
        individuals = event
            .key_individuals
            .iter()
            .map(|k| format!("{} ({})", k.name, k.role_in_event))
            .collect::<Vec<_>>()
            .join(", "),
        json_only = JSON_ONLY,
        dont_tell_me = DONT_TELL_ME
    )
}

/// Asks for watchlist candidates derived from one event.
pub fn watchlist_prompt(event_ref: &str, event: &SynthesizedEvent) -> String {
    let payload = serde_json::to_string_pretty(event).unwrap_or_default();
    format!(
        r#"{context}
EVENT ({event_ref}):
{payload}

TASK: Suggest the people, families or companies the desk should monitor after this
event. For each, give:
- name, type (person|family|company), country (ISO alpha-2 or "")
- rationale: why they are worth monitoring
- source_event: "{event_ref}"
- search_terms: two to five search phrases for news monitoring

Return an empty list when nobody qualifies.

RETURN FORMAT (JSON):
{{"suggestions": [{{"name": "...", "type": "person", "country": "..", "rationale": "...",
  "source_event": "{event_ref}", "search_terms": ["..."]}}]}}

{json_only}
{dont_tell_me}"#,
        context = WEALTH_CONTEXT,
        event_ref = event_ref,
        payload = payload,
        json_only = JSON_ONLY,
        dont_tell_me = DONT_TELL_ME
    )
}

/// Translates a headline (and optional summary) into English.
pub fn translation_prompt(headline: &str, summary: Option<&str>) -> String {
    format!(
        r#"Translate the following into clear English. Keep personal and company names unchanged.
Report the ISO 639-1 code of the original language.

HEADLINE: {headline}
SUMMARY: {summary}

RETURN FORMAT (JSON):
{{"language": "..", "headline": "...", "summary": null}}

Use null for summary when none was given.
{json_only}"#,
        headline = headline,
        summary = summary.unwrap_or("(none)"),
        json_only = JSON_ONLY
    )
}
