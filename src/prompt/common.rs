use chrono::Local;

use crate::types::CandidateItem;

pub const DONT_TELL_ME: &str = r#"
Important instructions for your responses:

1. Do not narrate or describe your actions.
2. Do not summarize or restate the instructions.
3. Do not wrap the JSON in prose, apologies or markdown.
4. If information is unknown, use null where the format allows it instead of guessing.
"#;

pub const JSON_ONLY: &str = "Respond with a single JSON object that matches the required format exactly. Use the item identifiers exactly as given.";

/// Domain framing shared by every pipeline prompt.
pub const WEALTH_CONTEXT: &str = r#"
You support a private-wealth research desk. The desk tracks liquidity events
that create or move private wealth: founder and family business sales, stake
sales by families, private-equity exits that pay out founders, inheritances,
and large private investments. Listed-company news, government policy and
general corporate news are out of scope unless a private individual or family
is the one realising wealth.
"#;

/// Utility function to get the current date in a human-readable format
pub fn current_date() -> String {
    let today = Local::now();
    format!(
        "{} {}, {}",
        today.format("%B"),
        today.format("%-d"),
        today.format("%Y")
    )
}

/// Renders items as an identifier-tagged list for batch prompts.
pub fn items_block(items: &[(String, &CandidateItem)]) -> String {
    items
        .iter()
        .map(|(id, item)| {
            let mut line = format!(
                "- item_id: {}\n  headline: {}\n  source: {} ({})\n  link: {}",
                id, item.headline, item.newspaper, item.source, item.link
            );
            if let Some(custom) = &item.custom_data {
                for (key, value) in custom {
                    line.push_str(&format!("\n  {}: {}", key, value));
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
