//! In-process collaborators for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::db::Persistence;
use crate::error::{PersistenceError, ProviderError};
use crate::llm::{AiProvider, ModelHint};
use crate::schema::SchemaName;
use crate::types::{AssessmentVerdict, CandidateItem, Source, SynthesizedEvent, WatchlistSuggestion};

type Router = Box<dyn Fn(&str, SchemaName) -> Result<Value, ProviderError> + Send + Sync>;

pub fn candidate(headline: &str, link: &str) -> CandidateItem {
    CandidateItem {
        headline: headline.to_string(),
        link: link.to_string(),
        source: "test".to_string(),
        newspaper: "Test Daily".to_string(),
        custom_data: None,
    }
}

/// Provider answering from a fixed script or a routing function.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Value, ProviderError>>>,
    router: Option<Router>,
    delay_ms: u64,
    delay_for: Option<(String, u64)>,
    prompts: Mutex<Vec<(SchemaName, ModelHint, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    /// Answers calls in order; once the script runs out every call fails.
    pub fn new(script: Vec<Result<Value, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            router: None,
            delay_ms: 0,
            delay_for: None,
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn routed<F>(router: F) -> Self
    where
        F: Fn(&str, SchemaName) -> Result<Value, ProviderError> + Send + Sync + 'static,
    {
        let mut provider = Self::new(Vec::new());
        provider.router = Some(Box::new(router));
        provider
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Delays only calls whose prompt mentions `needle`.
    pub fn with_delay_for(mut self, needle: &str, ms: u64) -> Self {
        self.delay_for = Some((needle.to_string(), ms));
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().iter().map(|(_, _, p)| p.clone()).collect()
    }

    pub fn calls_for(&self, schema: SchemaName) -> Vec<(ModelHint, String)> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| *s == schema)
            .map(|(_, hint, p)| (*hint, p.clone()))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str, schema: SchemaName, model_hint: ModelHint) -> Result<Value, ProviderError> {
        self.prompts.lock().unwrap().push((schema, model_hint, prompt.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let mut delay = self.delay_ms;
        if let Some((needle, ms)) = &self.delay_for {
            if prompt.contains(needle.as_str()) {
                delay = *ms;
            }
        }
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let response = match &self.router {
            Some(router) => router(prompt, schema),
            None => self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::Transport("script exhausted".to_string()))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

/// Persistence kept in memory, with switchable failures.
#[derive(Default)]
pub struct MemoryPersistence {
    pub sources: Mutex<Vec<Source>>,
    pub candidates: Mutex<Vec<CandidateItem>>,
    pub assessments: Mutex<Vec<AssessmentVerdict>>,
    pub events: Mutex<Vec<SynthesizedEvent>>,
    pub suggestions: Mutex<Vec<WatchlistSuggestion>>,
    pub unreachable: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl MemoryPersistence {
    fn check_write(&self) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unreachable("write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn ping(&self) -> Result<(), PersistenceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unreachable("memory store offline".to_string()));
        }
        Ok(())
    }

    async fn load_sources(&self) -> Result<Vec<Source>, PersistenceError> {
        self.ping().await?;
        Ok(self.sources.lock().unwrap().clone())
    }

    async fn save_candidate_items(&self, items: &[CandidateItem]) -> Result<(), PersistenceError> {
        self.check_write()?;
        self.candidates.lock().unwrap().extend_from_slice(items);
        Ok(())
    }

    async fn save_assessments(&self, verdicts: &[AssessmentVerdict]) -> Result<(), PersistenceError> {
        self.check_write()?;
        self.assessments.lock().unwrap().extend_from_slice(verdicts);
        Ok(())
    }

    async fn save_synthesized_events(&self, events: &[SynthesizedEvent]) -> Result<(), PersistenceError> {
        self.check_write()?;
        self.events.lock().unwrap().extend_from_slice(events);
        Ok(())
    }

    async fn save_watchlist_suggestions(&self, suggestions: &[WatchlistSuggestion]) -> Result<(), PersistenceError> {
        self.check_write()?;
        self.suggestions.lock().unwrap().extend_from_slice(suggestions);
        Ok(())
    }
}
