use tracing::{debug, info};

use crate::assess::{complete_validated, CallFailure};
use crate::llm::AiProvider;
use crate::prompt::{self, ClusterArticle};
use crate::schema::{validate_as, SchemaName, ValidationErrors};
use crate::types::{EventCluster, SynthesizedEvent};
use crate::TARGET_LLM_REQUEST;

/// Produces one canonical record for `cluster` from its articles.
///
/// Key individuals come back sorted by name, so repeated synthesis of the
/// same cluster is structurally equal. An event without individuals is valid.
pub async fn synthesize(
    cluster: &EventCluster,
    articles: &[ClusterArticle<'_>],
    provider: &dyn AiProvider,
) -> Result<SynthesizedEvent, CallFailure> {
    if articles.is_empty() {
        return Err(CallFailure::Invalid(ValidationErrors::single(
            "$",
            format!("cluster {} has no articles", cluster.event_key),
        )));
    }

    let prompt = prompt::synthesis_prompt(&cluster.event_key, articles);
    let mut event: SynthesizedEvent = complete_validated(provider, &prompt, SchemaName::Synthesis, |value| {
        validate_as(SchemaName::Synthesis, value)
    })
    .await?;

    event.headline = event.headline.trim().to_string();
    event.country = event.country.trim().to_string();
    for individual in &mut event.key_individuals {
        individual.name = individual.name.trim().to_string();
        // Blank strings carry no more information than null.
        if individual.company.as_deref().is_some_and(|c| c.trim().is_empty()) {
            individual.company = None;
        }
        if individual.email_suggestion.as_deref().is_some_and(|e| e.trim().is_empty()) {
            individual.email_suggestion = None;
        }
    }
    event.key_individuals.sort();
    event.key_individuals.dedup();

    if event.key_individuals.is_empty() {
        debug!(target: TARGET_LLM_REQUEST, "[synthesis]: {} has no resolvable individuals", cluster.event_key);
    }
    info!(
        target: TARGET_LLM_REQUEST,
        "[synthesis]: {} ({} articles) -> {:?}",
        cluster.event_key,
        articles.len(),
        event.headline
    );
    Ok(event)
}
