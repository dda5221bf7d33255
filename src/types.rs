use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Whether a source is scraped during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Inactive,
}

/// CSS selectors describing how to find candidate items on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    /// Selects one element per candidate item.
    pub item: String,
    /// Headline selector, relative to the item element.
    #[serde(default)]
    pub headline: Option<String>,
    /// Link selector, relative to the item element.
    #[serde(default)]
    pub link: Option<String>,
    /// Items carrying this class are skipped.
    #[serde(default)]
    pub exclude_class: Option<String>,
    /// Base for resolving relative links.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl SelectorSet {
    pub fn new(item: &str) -> Self {
        Self {
            item: item.to_string(),
            headline: None,
            link: None,
            exclude_class: None,
            base_url: None,
        }
    }
}

/// How a source's page is turned into candidate items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Generic selector-driven extraction.
    Selectors(SelectorSet),
    /// A registered extractor, with the selectors used to find item elements.
    Named { extractor: String, selectors: SelectorSet },
}

impl ExtractionStrategy {
    pub fn selectors(&self) -> &SelectorSet {
        match self {
            ExtractionStrategy::Selectors(selectors) => selectors,
            ExtractionStrategy::Named { selectors, .. } => selectors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub country: String,
    /// Page fetched for this source.
    pub url: String,
    pub strategy: ExtractionStrategy,
    pub status: SourceStatus,
    #[serde(default)]
    pub frequency: Option<String>,
}

impl Source {
    pub fn is_active(&self) -> bool {
        self.status == SourceStatus::Active
    }

    /// Key used to look up the extractor for this source.
    pub fn extractor_key(&self) -> &str {
        match &self.strategy {
            ExtractionStrategy::Named { extractor, .. } => extractor,
            ExtractionStrategy::Selectors(_) => "selector",
        }
    }
}

/// A raw extracted headline/link pair, before any assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub headline: String,
    pub link: String,
    pub source: String,
    pub newspaper: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<BTreeMap<String, String>>,
}

impl CandidateItem {
    /// Stable identifier derived from the normalized link.
    pub fn item_id(&self) -> String {
        item_id_for_link(&self.link)
    }
}

/// Lowercases scheme and host, drops fragments and trailing slashes.
pub fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            let mut normalized = url.to_string();
            while normalized.ends_with('/') {
                normalized.pop();
            }
            normalized
        }
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

pub fn item_id_for_link(link: &str) -> String {
    let digest = Sha256::digest(normalize_link(link).as_bytes());
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Private,
    Public,
    Corporate,
}

impl Classification {
    pub const ALL: [&'static str; 3] = ["private", "public", "corporate"];
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Private => write!(f, "private"),
            Classification::Public => write!(f, "public"),
            Classification::Corporate => write!(f, "corporate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Quality {
    Excellent,
    Good,
    Acceptable,
    Marginal,
    Poor,
    Irrelevant,
}

impl Quality {
    pub const ALL: [&'static str; 6] = [
        "Excellent",
        "Good",
        "Acceptable",
        "Marginal",
        "Poor",
        "Irrelevant",
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentVerdict {
    pub item_id: String,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    pub reasoning: String,
}

/// Terminal failure for every item of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentError {
    pub item_ids: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityExtraction {
    pub article_id: String,
    pub entities: Vec<String>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCluster {
    pub event_key: String,
    pub article_ids: Vec<String>,
}

/// A person involved in a synthesized event.
///
/// `company` and `email_suggestion` are `None` when unknown, which is not an error.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct KeyIndividual {
    pub name: String,
    pub role_in_event: String,
    pub company: Option<String>,
    pub email_suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SynthesizedEvent {
    pub headline: String,
    pub summary: String,
    pub country: String,
    pub key_individuals: Vec<KeyIndividual>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WatchlistType {
    Person,
    Family,
    Company,
}

impl WatchlistType {
    pub const ALL: [&'static str; 3] = ["person", "family", "company"];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WatchlistSuggestion {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WatchlistType,
    pub country: String,
    pub rationale: String,
    pub source_event: String,
    pub search_terms: Vec<String>,
}
