//! Extractor registry: turns page elements into candidate items.

pub mod sources;
pub mod util;

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{CandidateItem, SelectorSet, Source};
use crate::TARGET_EXTRACT;

/// Extractor used when a source identifier has no registered entry.
pub const FALLBACK_EXTRACTOR: &str = "simple";

pub type ExtractorFn = fn(ElementRef<'_>, &SiteConfig) -> Option<CandidateItem>;

/// Per-source settings handed to every extractor call.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub source: String,
    pub newspaper: String,
    pub selectors: SelectorSet,
}

impl SiteConfig {
    pub fn for_source(source: &Source) -> Self {
        Self {
            source: source.id.clone(),
            newspaper: source.name.clone(),
            selectors: source.strategy.selectors().clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid item selector {selector:?} for source {source_id}")]
    InvalidSelector { source_id: String, selector: String },
}

/// Maps source identifiers to extractor functions.
pub struct ExtractorRegistry {
    extractors: HashMap<String, ExtractorFn>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self {
            extractors: HashMap::new(),
        };
        registry.register(FALLBACK_EXTRACTOR, sources::simple);
        registry.register("selector", sources::selector);
        registry.register("cvcPortfolio", sources::cvc_portfolio);
        registry.register("pressRelease", sources::press_release);
        registry
    }
}

impl ExtractorRegistry {
    pub fn register(&mut self, key: &str, extractor: ExtractorFn) {
        self.extractors.insert(key.to_string(), extractor);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.extractors.contains_key(key)
    }

    /// Looks up `key`, falling back to the `simple` extractor.
    pub fn get(&self, key: &str) -> ExtractorFn {
        self.extractors
            .get(key)
            .copied()
            .unwrap_or(sources::simple as ExtractorFn)
    }

    pub fn extract(
        &self,
        source_id: &str,
        element: ElementRef<'_>,
        config: &SiteConfig,
    ) -> Option<CandidateItem> {
        (self.get(source_id))(element, config)
    }

    /// Runs the source's extractor over every item element of `html`.
    ///
    /// Duplicate links within the page are collapsed.
    pub fn extract_page(&self, source: &Source, html: &str) -> Result<Vec<CandidateItem>, ExtractError> {
        let config = SiteConfig::for_source(source);
        let item_selector =
            Selector::parse(&config.selectors.item).map_err(|_| ExtractError::InvalidSelector {
                source_id: source.id.clone(),
                selector: config.selectors.item.clone(),
            })?;

        let key = source.extractor_key();
        if !self.contains(key) {
            debug!(target: TARGET_EXTRACT, "No extractor registered for {}, using {}", key, FALLBACK_EXTRACTOR);
        }

        let document = Html::parse_document(html);
        let mut seen_elements = 0;
        let items: Vec<CandidateItem> = document
            .select(&item_selector)
            .inspect(|_| seen_elements += 1)
            .filter_map(|element| self.extract(key, element, &config))
            .collect();

        let items = dedup_candidates(items);
        info!(
            target: TARGET_EXTRACT,
            "{}: {} candidate items from {} elements", source.id, items.len(), seen_elements
        );
        Ok(items)
    }
}

lazy_static! {
    static ref DEFAULT_REGISTRY: ExtractorRegistry = ExtractorRegistry::default();
}

/// `extract(sourceId, element, siteConfig)` against the built-in registry.
pub fn extract(source_id: &str, element: ElementRef<'_>, config: &SiteConfig) -> Option<CandidateItem> {
    DEFAULT_REGISTRY.extract(source_id, element, config)
}

pub fn default_registry() -> &'static ExtractorRegistry {
    &DEFAULT_REGISTRY
}

/// Drops items whose identifier was already seen, keeping the first.
pub fn dedup_candidates(items: Vec<CandidateItem>) -> Vec<CandidateItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.item_id()))
        .collect()
}
