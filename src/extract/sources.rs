//! Source-specific extractors.
//!
//! Every extractor is a pure function from an item element to an optional
//! [`CandidateItem`]. `None` means "no match" and is never an error.

use lazy_static::lazy_static;
use scraper::{ElementRef, Selector};
use std::collections::BTreeMap;
use tracing::warn;

use super::util::{collapse_whitespace, element_text, has_class, nearest_anchor_href, resolve_link};
use super::SiteConfig;
use crate::types::CandidateItem;
use crate::TARGET_EXTRACT;

pub const CVC_SPOTLIGHT_CLASS: &str = "portfolio__card-holder--spotlight";

lazy_static! {
    static ref CVC_TITLE: Selector =
        Selector::parse(".portfolio__card-title, .portfolio__card-name, h3").unwrap();
    static ref DATA_KEY: Selector = Selector::parse("[data-key]").unwrap();
    static ref PRESS_HEADLINE: Selector = Selector::parse("h2, h3").unwrap();
    static ref PRESS_TIME: Selector = Selector::parse("time").unwrap();
}

fn candidate(headline: String, link: String, config: &SiteConfig) -> Option<CandidateItem> {
    let headline = collapse_whitespace(&headline);
    if headline.is_empty() {
        return None;
    }
    let link = resolve_link(&link, config.selectors.base_url.as_deref())?;
    Some(CandidateItem {
        headline,
        link,
        source: config.source.clone(),
        newspaper: config.newspaper.clone(),
        custom_data: None,
    })
}

fn excluded(element: ElementRef<'_>, config: &SiteConfig) -> bool {
    config
        .selectors
        .exclude_class
        .as_deref()
        .is_some_and(|class| has_class(element, class))
}

/// Element text as headline, nearest anchor href as link.
pub fn simple(element: ElementRef<'_>, config: &SiteConfig) -> Option<CandidateItem> {
    if excluded(element, config) {
        return None;
    }
    candidate(element_text(element), nearest_anchor_href(element)?, config)
}

/// Uses the configured headline and link selectors, relative to the item element.
pub fn selector(element: ElementRef<'_>, config: &SiteConfig) -> Option<CandidateItem> {
    if excluded(element, config) {
        return None;
    }

    let headline = match config.selectors.headline.as_deref() {
        Some(raw) => element.select(&parse_selector(raw)?).next().map(element_text)?,
        None => element_text(element),
    };

    let link = match config.selectors.link.as_deref() {
        Some(raw) => {
            let link_element = element.select(&parse_selector(raw)?).next()?;
            nearest_anchor_href(link_element)?
        }
        None => nearest_anchor_href(element)?,
    };

    candidate(headline, link, config)
}

/// Portfolio cards: spotlight cards are skipped and `data-key` is kept for
/// the secondary detail fetch.
pub fn cvc_portfolio(element: ElementRef<'_>, config: &SiteConfig) -> Option<CandidateItem> {
    if has_class(element, CVC_SPOTLIGHT_CLASS) || excluded(element, config) {
        return None;
    }

    let headline = element
        .select(&CVC_TITLE)
        .next()
        .map(element_text)
        .unwrap_or_else(|| element_text(element));
    let mut item = candidate(headline, nearest_anchor_href(element)?, config)?;

    let data_key = element
        .value()
        .attr("data-key")
        .or_else(|| element.select(&DATA_KEY).find_map(|e| e.value().attr("data-key")));
    if let Some(key) = data_key {
        let mut custom = BTreeMap::new();
        custom.insert("dataKey".to_string(), key.to_string());
        item.custom_data = Some(custom);
    }

    Some(item)
}

/// Press-release listings: `<article>` blocks with a heading and optional `<time>`.
pub fn press_release(element: ElementRef<'_>, config: &SiteConfig) -> Option<CandidateItem> {
    if excluded(element, config) {
        return None;
    }

    let heading = element.select(&PRESS_HEADLINE).next()?;
    let link = nearest_anchor_href(heading).or_else(|| nearest_anchor_href(element))?;
    let mut item = candidate(element_text(heading), link, config)?;

    if let Some(time) = element.select(&PRESS_TIME).next() {
        let published = time
            .value()
            .attr("datetime")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(time));
        if !published.is_empty() {
            let mut custom = BTreeMap::new();
            custom.insert("published".to_string(), published);
            item.custom_data = Some(custom);
        }
    }

    Some(item)
}

fn parse_selector(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!(target: TARGET_EXTRACT, "Ignoring invalid selector {:?}: {}", raw, e);
            None
        }
    }
}
