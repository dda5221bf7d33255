use crate::prompt::common::{items_block, DONT_TELL_ME, JSON_ONLY, WEALTH_CONTEXT};
use crate::types::CandidateItem;

/// Generate a prompt for extracting the people, families and companies behind each article
pub fn entity_extraction_prompt(items: &[(String, &CandidateItem)]) -> String {
    format!(
        r#"{context}
ARTICLES (FOR ENTITY EXTRACTION):
----------
{items}
----------

TASK: For each article, list the entities that identify the underlying event.

ENTITY EXTRACTION GUIDELINES:
1. Include named people, families, private companies, investors and acquirers.
2. Use the most complete form of each name mentioned (e.g. "Hans Müller" not "Müller").
3. Leave out generic words ("investors", "the company") and places unless they name a business.
4. Add an "event_key" when you can name the event in a few lowercase words joined by
   hyphens (e.g. "mueller-family-sells-logistik-ag"). Articles about the same event must
   get the same key. Use null when unsure.

RETURN FORMAT (JSON):
{{
  "extractions": [
    {{"article_id": "...", "entities": ["..."], "reasoning": "one sentence", "event_key": "..." }}
  ]
}}

Return one entry per item_id above, using it as article_id.
{json_only}
{dont_tell_me}"#,
        context = WEALTH_CONTEXT,
        items = items_block(items),
        json_only = JSON_ONLY,
        dont_tell_me = DONT_TELL_ME
    )
}

/// Generate a prompt mapping entity spellings to one canonical name
pub fn canonicalization_prompt(entities: &[String]) -> String {
    format!(
        r#"ENTITY NAMES:
----------
{entities}
----------

TASK: Some names above refer to the same person, family or company with different
spellings, abbreviations or legal suffixes (e.g. "Müller Logistik AG" and "Mueller Logistik").
For every such group, map each variant to the single most complete spelling.
Only list names that need mapping; leave unique names out.

RETURN FORMAT (JSON):
{{"mappings": [{{"alias": "...", "canonical": "..."}}]}}

{json_only}
{dont_tell_me}"#,
        entities = entities.iter().map(|e| format!("- {}", e)).collect::<Vec<_>>().join("\n"),
        json_only = JSON_ONLY,
        dont_tell_me = DONT_TELL_ME
    )
}
