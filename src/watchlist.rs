//! Watchlist suggestions derived from synthesized events.

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::assess::{complete_validated, CallFailure};
use crate::llm::AiProvider;
use crate::prompt;
use crate::schema::contracts::{JudgingResponse, WatchlistResponse};
use crate::schema::{validate_as, SchemaName};
use crate::types::{SynthesizedEvent, WatchlistSuggestion};
use crate::TARGET_LLM_REQUEST;

/// What happened to one event on its way to the watchlist.
#[derive(Debug, Clone, PartialEq)]
pub enum EventReview {
    Accepted { score: u8, suggestions: usize },
    Rejected { score: u8, reasoning: String },
    Failed(CallFailure),
}

#[derive(Debug, Clone, Default)]
pub struct WatchlistRun {
    pub suggestions: Vec<WatchlistSuggestion>,
    /// One review per input event, keyed by headline, in input order.
    pub reviews: Vec<(String, EventReview)>,
}

impl WatchlistRun {
    pub fn auth_failures(&self) -> usize {
        self.reviews
            .iter()
            .filter(|(_, review)| matches!(review, EventReview::Failed(f) if f.is_auth()))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &CallFailure)> {
        self.reviews.iter().filter_map(|(event, review)| match review {
            EventReview::Failed(failure) => Some((event.as_str(), failure)),
            _ => None,
        })
    }
}

/// Asks whether `event` is a lead worth following.
pub async fn judge_event(provider: &dyn AiProvider, event: &SynthesizedEvent) -> Result<JudgingResponse, CallFailure> {
    let prompt = prompt::judging_prompt(event);
    complete_validated(provider, &prompt, SchemaName::Judging, |value| {
        validate_as(SchemaName::Judging, value)
    })
    .await
}

/// Suggests who to monitor after `event`. Every suggestion references the
/// event by headline and inherits its country when the provider left it blank.
pub async fn suggest_for_event(
    provider: &dyn AiProvider,
    event: &SynthesizedEvent,
) -> Result<Vec<WatchlistSuggestion>, CallFailure> {
    let event_ref = event.headline.as_str();
    let prompt = prompt::watchlist_prompt(event_ref, event);
    let response: WatchlistResponse = complete_validated(provider, &prompt, SchemaName::WatchlistSuggestion, |value| {
        validate_as(SchemaName::WatchlistSuggestion, value)
    })
    .await?;

    Ok(response
        .suggestions
        .into_iter()
        .map(|mut suggestion| {
            suggestion.name = suggestion.name.trim().to_string();
            suggestion.source_event = event_ref.to_string();
            if suggestion.country.trim().is_empty() {
                suggestion.country = event.country.clone();
            }
            suggestion.search_terms.retain(|t| !t.trim().is_empty());
            suggestion
        })
        .collect())
}

async fn review_event(provider: &dyn AiProvider, event: &SynthesizedEvent) -> (EventReview, Vec<WatchlistSuggestion>) {
    let judgement = match judge_event(provider, event).await {
        Ok(judgement) => judgement,
        Err(failure) => return (EventReview::Failed(failure), Vec::new()),
    };
    if !judgement.accepted() {
        return (
            EventReview::Rejected {
                score: judgement.score,
                reasoning: judgement.reasoning,
            },
            Vec::new(),
        );
    }
    match suggest_for_event(provider, event).await {
        Ok(suggestions) => (
            EventReview::Accepted {
                score: judgement.score,
                suggestions: suggestions.len(),
            },
            suggestions,
        ),
        Err(failure) => (EventReview::Failed(failure), Vec::new()),
    }
}

/// Judges every event and collects suggestions for the accepted ones, with at
/// most `concurrency_limit` events in flight.
pub async fn derive_watchlist(
    events: &[SynthesizedEvent],
    provider: &dyn AiProvider,
    concurrency_limit: usize,
) -> WatchlistRun {
    let reviewed: Vec<(String, EventReview, Vec<WatchlistSuggestion>)> = stream::iter(events)
        .map(|event| async move {
            let (review, suggestions) = review_event(provider, event).await;
            (event.headline.clone(), review, suggestions)
        })
        .buffered(concurrency_limit.max(1))
        .collect()
        .await;

    let mut run = WatchlistRun::default();
    for (headline, review, suggestions) in reviewed {
        match &review {
            EventReview::Rejected { score, reasoning } => {
                info!(target: TARGET_LLM_REQUEST, "[judging]: rejected {:?} ({}): {}", headline, score, reasoning);
            }
            EventReview::Failed(failure) => {
                warn!(target: TARGET_LLM_REQUEST, "[watchlist]: {:?} failed: {}", headline, failure);
            }
            EventReview::Accepted { .. } => {}
        }
        run.suggestions.extend(suggestions);
        run.reviews.push((headline, review));
    }
    run
}
