use lazy_static::lazy_static;
use scraper::{ElementRef, Selector};
use url::Url;

lazy_static! {
    pub(crate) static ref ANCHOR: Selector = Selector::parse("a[href]").unwrap();
}

/// Collapses runs of whitespace to a single space and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element, whitespace-collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

pub fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// The element itself when it is a link, else its first descendant link,
/// else its closest enclosing link.
pub fn nearest_anchor_href(element: ElementRef<'_>) -> Option<String> {
    if element.value().name() == "a" {
        if let Some(href) = element.value().attr("href") {
            return non_empty(href);
        }
    }

    if let Some(href) = element
        .select(&ANCHOR)
        .find_map(|a| a.value().attr("href").and_then(non_empty))
    {
        return Some(href);
    }

    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .filter(|ancestor| ancestor.value().name() == "a")
        .find_map(|a| a.value().attr("href").and_then(non_empty))
}

/// Resolves `href` against `base` when given; rejects non-navigable links.
pub fn resolve_link(href: &str, base: Option<&str>) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }

    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }

    match base.and_then(|b| Url::parse(b).ok()) {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Some(href.to_string()),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
