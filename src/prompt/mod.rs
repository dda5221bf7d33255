mod assessment;
mod common;
mod entity;
mod repair;
mod synthesis;

pub use assessment::{article_assessment_prompt, headline_triage_prompt, pre_assessment_prompt};
pub use common::*;
pub use entity::{canonicalization_prompt, entity_extraction_prompt};
pub use repair::repair_prompt;
pub use synthesis::{judging_prompt, synthesis_prompt, translation_prompt, watchlist_prompt, ClusterArticle};
