use std::collections::HashSet;
use tracing::debug;

use super::normalize::normalize_entity;
use crate::types::{EntityExtraction, EventCluster};
use crate::TARGET_PIPELINE;

struct Working {
    key: String,
    normalized_key: String,
    article_ids: Vec<String>,
    entities: HashSet<String>,
}

/// Groups articles into event clusters by shared entities.
///
/// Extractions are processed in order. An article joins the cluster whose key
/// equals its proposed `event_key`; otherwise the cluster sharing the most
/// normalized entities, with ties going to the earliest cluster. An article
/// sharing nothing starts a new cluster. Each article lands in exactly one
/// cluster; repeated article ids after the first are ignored.
pub fn cluster(extractions: &[EntityExtraction]) -> Vec<EventCluster> {
    let mut clusters: Vec<Working> = Vec::new();
    let mut assigned: HashSet<&str> = HashSet::new();

    for extraction in extractions {
        if !assigned.insert(extraction.article_id.as_str()) {
            continue;
        }

        let entities: HashSet<String> = extraction
            .entities
            .iter()
            .map(|e| normalize_entity(e))
            .filter(|e| !e.is_empty())
            .collect();
        let proposed_key = extraction
            .event_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let normalized_key = proposed_key.map(normalize_entity).filter(|k| !k.is_empty());

        let by_key = normalized_key
            .as_ref()
            .and_then(|key| clusters.iter().position(|c| &c.normalized_key == key));

        let target = by_key.or_else(|| {
            let mut best: Option<(usize, usize)> = None;
            for (index, cluster) in clusters.iter().enumerate() {
                let overlap = cluster.entities.intersection(&entities).count();
                // Strictly greater keeps the earliest cluster on ties.
                if overlap > 0 && best.map_or(true, |(_, count)| overlap > count) {
                    best = Some((index, overlap));
                }
            }
            best.map(|(index, _)| index)
        });

        match target {
            Some(index) => {
                let cluster = &mut clusters[index];
                debug!(target: TARGET_PIPELINE, "Article {} joins cluster {}", extraction.article_id, cluster.key);
                cluster.article_ids.push(extraction.article_id.clone());
                cluster.entities.extend(entities);
            }
            None => {
                let key = new_cluster_key(&clusters, proposed_key, extraction);
                clusters.push(Working {
                    normalized_key: normalize_entity(&key),
                    key,
                    article_ids: vec![extraction.article_id.clone()],
                    entities,
                });
            }
        }
    }

    clusters
        .into_iter()
        .map(|c| EventCluster {
            event_key: c.key,
            article_ids: c.article_ids,
        })
        .collect()
}

fn new_cluster_key(clusters: &[Working], proposed: Option<&str>, extraction: &EntityExtraction) -> String {
    let base = match proposed {
        Some(key) => key.to_string(),
        None => extraction
            .entities
            .iter()
            .map(|e| normalize_entity(e))
            .find(|e| !e.is_empty())
            .map(|e| e.replace(' ', "-"))
            .unwrap_or_else(|| extraction.article_id.clone()),
    };

    let taken = |key: &str| {
        let normalized = normalize_entity(key);
        clusters.iter().any(|c| c.normalized_key == normalized)
    };
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}
