use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

use super::normalize::{local_aliases, normalize_entity};
use crate::assess::{complete_validated, coverage_violations, distinct_errors, run_batches, BatchOptions, CallFailure};
use crate::error::ProviderError;
use crate::llm::AiProvider;
use crate::prompt;
use crate::schema::contracts::{CanonicalizationResponse, EntityExtractionResponse};
use crate::schema::{validate_as, SchemaName, ValidationErrors};
use crate::types::{AssessmentError, CandidateItem, EntityExtraction};
use crate::TARGET_LLM_REQUEST;

/// Entity extractions for one set of articles.
#[derive(Debug, Clone, Default)]
pub struct EntityRun {
    /// Extractions in input order, for the articles whose batch succeeded.
    pub extractions: Vec<EntityExtraction>,
    /// One entry per failed batch.
    pub errors: Vec<AssessmentError>,
}

fn extractions_by_id(value: &Value, ids: &[String]) -> Result<HashMap<String, EntityExtraction>, ValidationErrors> {
    let parsed: EntityExtractionResponse = validate_as(SchemaName::EntityExtraction, value)?;
    let violations = coverage_violations(ids, parsed.extractions.iter().map(|e| e.article_id.as_str()), "extractions");
    if !violations.is_empty() {
        return Err(ValidationErrors(violations));
    }
    Ok(parsed
        .extractions
        .into_iter()
        .map(|e| {
            let extraction = EntityExtraction {
                article_id: e.article_id.clone(),
                entities: e.entities,
                reasoning: e.reasoning,
                event_key: e.event_key.filter(|k| !k.trim().is_empty()),
            };
            (e.article_id, extraction)
        })
        .collect())
}

/// Extracts the entities of each article, batched like assessment.
pub async fn extract_entities(
    items: &[CandidateItem],
    provider: &dyn AiProvider,
    options: BatchOptions,
) -> Result<EntityRun, ProviderError> {
    let keyed: Vec<(String, &CandidateItem)> = items.iter().map(|item| (item.item_id(), item)).collect();
    let run = run_batches(
        provider,
        &keyed,
        SchemaName::EntityExtraction,
        options,
        prompt::entity_extraction_prompt,
        extractions_by_id,
    )
    .await;

    if run.auth_escalated() {
        return Err(ProviderError::Auth(format!(
            "{} of {} entity extraction batches rejected credentials",
            run.auth_failures, run.batches
        )));
    }

    let errors = distinct_errors(run.results.iter().map(|(_, r)| r));
    let extractions: Vec<EntityExtraction> = run.results.into_iter().filter_map(|(_, r)| r.ok()).collect();
    info!(
        target: TARGET_LLM_REQUEST,
        "[entityExtraction]: {} extractions, {} failed batches",
        extractions.len(),
        errors.len()
    );
    Ok(EntityRun { extractions, errors })
}

/// Distinct entity spellings across all extractions, first-seen order.
pub fn distinct_entities(extractions: &[EntityExtraction]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    extractions
        .iter()
        .flat_map(|e| e.entities.iter())
        .filter(|name| seen.insert(normalize_entity(name)))
        .cloned()
        .collect()
}

/// Builds an alias map (normalized alias to canonical spelling) for the
/// entities in `extractions`.
///
/// Near-identical spellings are merged locally; the provider is then asked to
/// group the remaining variants. Returns an empty map when there is nothing
/// to merge.
pub async fn canonicalize(
    extractions: &[EntityExtraction],
    provider: &dyn AiProvider,
) -> Result<HashMap<String, String>, CallFailure> {
    let names = distinct_entities(extractions);
    let mut aliases = local_aliases(names.iter().map(String::as_str));

    // Only names that survived local merging are sent to the provider.
    let remaining: Vec<String> = names
        .into_iter()
        .filter(|n| !aliases.contains_key(&normalize_entity(n)))
        .collect();
    if remaining.len() < 2 {
        return Ok(aliases);
    }

    let prompt = prompt::canonicalization_prompt(&remaining);
    let response: CanonicalizationResponse = complete_validated(provider, &prompt, SchemaName::Canonicalization, |value| {
        validate_as(SchemaName::Canonicalization, value)
    })
    .await?;

    for mapping in response.mappings {
        let alias = normalize_entity(&mapping.alias);
        let canonical = normalize_entity(&mapping.canonical);
        if !alias.is_empty() && !canonical.is_empty() && alias != canonical {
            aliases.insert(alias, canonical);
        }
    }
    info!(target: TARGET_LLM_REQUEST, "[canonicalization]: {} aliases", aliases.len());
    Ok(aliases)
}

/// Rewrites entity names through `aliases`, dropping duplicates that result.
pub fn apply_aliases(extractions: &[EntityExtraction], aliases: &HashMap<String, String>) -> Vec<EntityExtraction> {
    extractions
        .iter()
        .map(|extraction| {
            let mut entities: Vec<String> = Vec::with_capacity(extraction.entities.len());
            for name in &extraction.entities {
                let mut normalized = normalize_entity(name);
                // Follow chains such as a -> b -> c, bounded against cycles.
                for _ in 0..aliases.len() {
                    match aliases.get(&normalized) {
                        Some(next) if *next != normalized => normalized = next.clone(),
                        _ => break,
                    }
                }
                if !normalized.is_empty() && !entities.contains(&normalized) {
                    entities.push(normalized);
                }
            }
            EntityExtraction {
                entities,
                ..extraction.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidate, ScriptedProvider};
    use serde_json::json;

    fn extraction(id: &str, entities: &[&str]) -> EntityExtraction {
        EntityExtraction {
            article_id: id.to_string(),
            entities: entities.iter().map(|e| e.to_string()).collect(),
            reasoning: "named in headline".to_string(),
            event_key: None,
        }
    }

    #[tokio::test]
    async fn test_extract_entities_in_input_order() {
        let items = vec![
            candidate("Kari Nordmann sells shipping arm", "https://a.no/1"),
            candidate("Nordmann family exits", "https://a.no/2"),
        ];
        let ids: Vec<String> = items.iter().map(|i| i.item_id()).collect();
        let provider = ScriptedProvider::new(vec![Ok(json!({
            "extractions": [
                {"article_id": ids[1], "entities": ["Nordmann family"], "reasoning": "family", "event_key": ""},
                {"article_id": ids[0], "entities": ["Kari Nordmann"], "reasoning": "seller", "event_key": "nordmann-exit"}
            ]
        }))]);

        let run = extract_entities(&items, &provider, BatchOptions::default()).await.unwrap();
        assert!(run.errors.is_empty());
        assert_eq!(run.extractions[0].article_id, ids[0]);
        assert_eq!(run.extractions[0].event_key.as_deref(), Some("nordmann-exit"));
        // Blank keys are treated as absent
        assert_eq!(run.extractions[1].event_key, None);
    }

    #[tokio::test]
    async fn test_missing_article_is_repaired_then_reported() {
        let items = vec![candidate("One", "https://a.no/1"), candidate("Two", "https://a.no/2")];
        let ids: Vec<String> = items.iter().map(|i| i.item_id()).collect();
        let partial = json!({"extractions": [{"article_id": ids[0], "entities": [], "reasoning": "", "event_key": null}]});
        let provider = ScriptedProvider::new(vec![Ok(partial.clone()), Ok(partial)]);

        let run = extract_entities(&items, &provider, BatchOptions::default()).await.unwrap();
        assert!(run.extractions.is_empty());
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].item_ids, ids);
    }

    #[tokio::test]
    async fn test_canonicalize_merges_local_and_provider_aliases() {
        let extractions = vec![
            extraction("a", &["Kari Nordmann", "Nordmann Shipping AS"]),
            extraction("b", &["Kari Nordman", "Nordmann Shipping"]),
        ];
        let provider = ScriptedProvider::new(vec![Ok(json!({
            "mappings": [{"alias": "Nordmann Shipping", "canonical": "Nordmann Shipping AS"}]
        }))]);

        let aliases = canonicalize(&extractions, &provider).await.unwrap();
        assert_eq!(aliases.get("kari nordman").map(String::as_str), Some("kari nordmann"));
        assert_eq!(aliases.get("nordmann shipping").map(String::as_str), Some("nordmann shipping as"));
        // The locally merged spelling is not sent to the provider
        assert!(!provider.prompts()[0].contains("- Kari Nordman\n"));

        let merged = apply_aliases(&extractions, &aliases);
        assert_eq!(merged[0].entities, merged[1].entities);
    }

    #[tokio::test]
    async fn test_canonicalize_skips_provider_for_single_name() {
        let provider = ScriptedProvider::new(vec![]);
        let aliases = canonicalize(&[extraction("a", &["Kari Nordmann"])], &provider).await.unwrap();
        assert!(aliases.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_apply_aliases_follows_chains_and_dedups() {
        let mut aliases = HashMap::new();
        aliases.insert("a".to_string(), "b".to_string());
        aliases.insert("b".to_string(), "c".to_string());
        aliases.insert("x".to_string(), "y".to_string());
        aliases.insert("y".to_string(), "x".to_string());
        let merged = apply_aliases(&[extraction("1", &["A", "C", "X"])], &aliases);
        assert_eq!(merged[0].entities.len(), 2);
        assert_eq!(merged[0].entities[0], "c");
    }
}
