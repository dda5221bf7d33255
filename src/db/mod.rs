//! Persistence seam and its SQLite implementation.

pub mod core;
mod schema;
mod store;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::types::{AssessmentVerdict, CandidateItem, Source, SynthesizedEvent, WatchlistSuggestion};

pub use self::core::{Database, DbLockErrorExt};
pub use self::store::event_id;

/// Durable storage for pipeline inputs and outputs.
///
/// Saves are upserts: re-saving the same record (duplicate) is not an error.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Cheap readiness probe.
    async fn ping(&self) -> Result<(), PersistenceError>;
    async fn load_sources(&self) -> Result<Vec<Source>, PersistenceError>;
    async fn save_candidate_items(&self, items: &[CandidateItem]) -> Result<(), PersistenceError>;
    async fn save_assessments(&self, verdicts: &[AssessmentVerdict]) -> Result<(), PersistenceError>;
    async fn save_synthesized_events(&self, events: &[SynthesizedEvent]) -> Result<(), PersistenceError>;
    async fn save_watchlist_suggestions(&self, suggestions: &[WatchlistSuggestion]) -> Result<(), PersistenceError>;
}
