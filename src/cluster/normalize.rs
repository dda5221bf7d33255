use std::collections::HashMap;
use strsim::{jaro_winkler, levenshtein};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// Spelling variants closer than this are treated as one name.
const NEAR_DUPLICATE_SIMILARITY: f64 = 0.95;
const NEAR_DUPLICATE_EDITS: usize = 2;
// Below this length edit distance is too coarse to merge on.
const MIN_FUZZY_LEN: usize = 6;

/// Comparison form of an entity name: lowercase, no diacritics, punctuation
/// removed and whitespace collapsed.
pub fn normalize_entity(name: &str) -> String {
    let without_apostrophes = name.replace("'s ", " ").replace("'s", "").replace('\'', "");

    without_apostrophes
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && !c.is_whitespace(), " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether two normalized names are spelling variants of each other.
pub fn near_duplicate(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if a.len() < MIN_FUZZY_LEN || b.len() < MIN_FUZZY_LEN {
        return false;
    }
    let length_diff = a.len().abs_diff(b.len());
    length_diff <= NEAR_DUPLICATE_EDITS
        && levenshtein(a, b) <= NEAR_DUPLICATE_EDITS
        && jaro_winkler(a, b) >= NEAR_DUPLICATE_SIMILARITY
}

/// Maps each spelling variant to the first-seen spelling it duplicates.
///
/// Keys and values are normalized names; names without a variant are absent.
pub fn local_aliases<'a, I>(names: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut canonical: Vec<String> = Vec::new();
    let mut aliases = HashMap::new();
    for name in names {
        let normalized = normalize_entity(name);
        if normalized.is_empty() || canonical.contains(&normalized) || aliases.contains_key(&normalized) {
            continue;
        }
        match canonical.iter().find(|c| near_duplicate(c, &normalized)) {
            Some(existing) => {
                aliases.insert(normalized, existing.clone());
            }
            None => canonical.push(normalized),
        }
    }
    aliases
}
