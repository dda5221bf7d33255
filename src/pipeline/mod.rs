//! Stage sequencing, initialization and run reporting.

mod coordinator;
pub mod fetch;
mod init;
mod report;

pub use coordinator::{passed_assessment, AbortHandle, PipelineCoordinator};
pub use fetch::{FetchError, HttpFetcher, PageFetcher, StaticPages};
pub use init::{InitContext, InitState};
pub use report::{RunReport, Stage, StageError, StageSummary, MAX_SAMPLE_IDS};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{PipelineConfig, ProviderKind};
    use crate::error::{FatalError, ProviderError};
    use crate::schema::SchemaName;
    use crate::testing::{MemoryPersistence, ScriptedProvider};
    use crate::types::{item_id_for_link, ExtractionStrategy, SelectorSet, Source, SourceStatus};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    const PAGE: &str = r#"
        <html><body>
          <article><h2>Founder Kari Nordmann sells shipping group</h2><a href="https://news.example.com/a1">Read</a></article>
          <article><h2>Nordmann family exits shipping</h2><a href="https://news.example.com/a2">Read</a></article>
          <article><h2>Ministry raises fuel tax</h2><a href="https://news.example.com/a3">Read</a></article>
        </body></html>
    "#;

    struct Story {
        id: String,
        triage: &'static str,
        entities: Vec<&'static str>,
    }

    fn stories() -> Vec<Story> {
        vec![
            Story {
                id: item_id_for_link("https://news.example.com/a1"),
                triage: "private",
                entities: vec!["Kari Nordmann", "Nordmann Shipping"],
            },
            Story {
                id: item_id_for_link("https://news.example.com/a2"),
                triage: "private",
                entities: vec!["Nordmann Shipping", "Nordmann family"],
            },
            Story {
                id: item_id_for_link("https://news.example.com/a3"),
                triage: "public",
                entities: vec!["Ministry of Finance"],
            },
        ]
    }

    fn source(id: &str, status: SourceStatus) -> Source {
        Source {
            id: id.to_string(),
            name: "Nordic Wire".to_string(),
            country: "NO".to_string(),
            url: format!("https://news.example.com/{}", id),
            strategy: ExtractionStrategy::Selectors(SelectorSet {
                item: "article".to_string(),
                headline: Some("h2".to_string()),
                link: Some("a".to_string()),
                exclude_class: None,
                base_url: None,
            }),
            status,
            frequency: Some("daily".to_string()),
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            provider: ProviderKind::Ollama,
            batch_size: 10,
            concurrency_limit: 2,
            ..PipelineConfig::default()
        }
    }

    /// Answers every schema the pipeline uses, for the stories mentioned in the prompt.
    fn respond(prompt: &str, schema: SchemaName, invalid_full_for: Option<&str>) -> Result<Value, ProviderError> {
        let mentioned: Vec<Story> = stories().into_iter().filter(|s| prompt.contains(&s.id)).collect();
        match schema {
            SchemaName::BatchHeadlineAssessment => Ok(json!({
                "assessments": mentioned.iter().map(|s| json!({
                    "item_id": s.id, "classification": s.triage, "reasoning": "headline"
                })).collect::<Vec<_>>()
            })),
            SchemaName::BatchArticleAssessment => {
                if let Some(bad) = invalid_full_for {
                    if prompt.contains(bad) {
                        return Ok(json!({"assessments": [{"item_id": bad, "classification": "private"}]}));
                    }
                }
                Ok(json!({
                    "assessments": mentioned.iter().map(|s| json!({
                        "item_id": s.id, "classification": "private", "quality": "Good",
                        "confidence": 75, "reasoning": "family exit"
                    })).collect::<Vec<_>>()
                }))
            }
            SchemaName::EntityExtraction => Ok(json!({
                "extractions": mentioned.iter().map(|s| json!({
                    "article_id": s.id, "entities": s.entities, "reasoning": "named", "event_key": null
                })).collect::<Vec<_>>()
            })),
            SchemaName::Canonicalization => Ok(json!({"mappings": []})),
            SchemaName::Synthesis => Ok(json!({
                "headline": "Nordmann family sells shipping group",
                "summary": "The family sold its shipping group.",
                "country": "NO",
                "key_individuals": [{"name": "Kari Nordmann", "role_in_event": "seller", "company": "Nordmann Shipping", "email_suggestion": null}]
            })),
            SchemaName::Judging => Ok(json!({"verdict": "accept", "score": 90, "reasoning": "clear exit"})),
            SchemaName::WatchlistSuggestion => Ok(json!({"suggestions": [{
                "name": "Kari Nordmann", "type": "person", "country": "NO", "rationale": "recent liquidity",
                "source_event": "", "search_terms": ["Kari Nordmann"]
            }]})),
            other => Err(ProviderError::Transport(format!("unexpected schema {}", other))),
        }
    }

    async fn ready_coordinator(
        provider: Arc<ScriptedProvider>,
        persistence: Arc<MemoryPersistence>,
    ) -> PipelineCoordinator {
        ready_coordinator_with(provider, persistence, config()).await
    }

    async fn ready_coordinator_with(
        provider: Arc<ScriptedProvider>,
        persistence: Arc<MemoryPersistence>,
        config: PipelineConfig,
    ) -> PipelineCoordinator {
        let pages = StaticPages::new().with_page("s1", PAGE);
        let mut coordinator = PipelineCoordinator::new(provider, persistence, Arc::new(pages));
        coordinator.initialize(config).await.unwrap();
        coordinator
    }

    #[tokio::test]
    async fn test_public_item_is_excluded_from_assessment_and_clusters() {
        let provider = Arc::new(ScriptedProvider::routed(|prompt, schema| respond(prompt, schema, None)));
        let persistence = Arc::new(MemoryPersistence::default());
        let coordinator = ready_coordinator(provider.clone(), persistence.clone()).await;

        let report = coordinator.run(&[source("s1", SourceStatus::Active)]).await.unwrap();

        let public_id = item_id_for_link("https://news.example.com/a3");
        assert!(!report.aborted);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        for schema in [SchemaName::BatchArticleAssessment, SchemaName::EntityExtraction, SchemaName::Synthesis] {
            assert!(provider.calls_for(schema).iter().all(|(_, prompt)| !prompt.contains(&public_id)));
        }
        assert_eq!(report.summary(Stage::PreAssess).unwrap().output, 2);
        assert_eq!(report.summary(Stage::Cluster).unwrap().output, 1);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.suggestions[0].source_event, "Nordmann family sells shipping group");

        assert_eq!(persistence.candidates.lock().unwrap().len(), 3);
        // Three triage verdicts, then two full verdicts
        assert_eq!(persistence.assessments.lock().unwrap().len(), 5);
        assert_eq!(persistence.events.lock().unwrap().len(), 1);
        assert_eq!(persistence.suggestions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_twice_invalid_batch_is_reported_and_run_completes() {
        let bad = item_id_for_link("https://news.example.com/a2");
        let routed_bad = bad.clone();
        let provider = Arc::new(ScriptedProvider::routed(move |prompt, schema| {
            respond(prompt, schema, Some(&routed_bad))
        }));
        let persistence = Arc::new(MemoryPersistence::default());
        let config = PipelineConfig {
            batch_size: 1,
            ..config()
        };
        let coordinator = ready_coordinator_with(provider.clone(), persistence, config).await;

        let report = coordinator.run(&[source("s1", SourceStatus::Active)]).await.unwrap();

        let errors: Vec<&StageError> = report.errors_for(Stage::Assess).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].ids, vec![bad.clone()]);
        assert_eq!(report.summary(Stage::Assess).unwrap().sample_failed_ids, vec![bad.clone()]);
        assert!(provider
            .calls_for(SchemaName::EntityExtraction)
            .iter()
            .all(|(_, prompt)| !prompt.contains(&bad)));
        assert_eq!(report.events.len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_fatal() {
        let provider = Arc::new(ScriptedProvider::routed(|prompt, schema| respond(prompt, schema, None)));
        let persistence = Arc::new(MemoryPersistence::default());
        let coordinator = ready_coordinator(provider.clone(), persistence.clone()).await;
        persistence.fail_writes.store(true, Ordering::SeqCst);

        let result = coordinator.run(&[source("s1", SourceStatus::Active)]).await;
        assert!(matches!(result, Err(FatalError::Persistence(_))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_repeated_auth_failure_is_fatal() {
        let provider = Arc::new(ScriptedProvider::routed(|_, _| {
            Err(ProviderError::Auth("Incorrect API key provided".to_string()))
        }));
        let persistence = Arc::new(MemoryPersistence::default());
        let coordinator = ready_coordinator(provider, persistence).await;

        let result = coordinator.run(&[source("s1", SourceStatus::Active)]).await;
        assert!(matches!(result, Err(FatalError::ProviderAuth(_))));
    }

    #[tokio::test]
    async fn test_run_requires_initialization() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let persistence = Arc::new(MemoryPersistence::default());
        let coordinator = PipelineCoordinator::new(provider, persistence, Arc::new(StaticPages::new()));

        let result = coordinator.run(&[]).await;
        assert!(matches!(result, Err(FatalError::NotInitialized(_))));
        assert_eq!(coordinator.init_state(), &InitState::Uninitialized);
    }

    #[tokio::test]
    async fn test_abort_discards_in_flight_stage() {
        let abort = AbortHandle::new();
        let trigger = abort.clone();
        let provider = Arc::new(ScriptedProvider::routed(move |prompt, schema| {
            // Abort while the triage call is in flight.
            if schema == SchemaName::BatchHeadlineAssessment {
                trigger.abort();
            }
            respond(prompt, schema, None)
        }));
        let persistence = Arc::new(MemoryPersistence::default());
        let coordinator = ready_coordinator(provider.clone(), persistence.clone())
            .await
            .with_abort_handle(abort);

        let report = coordinator.run(&[source("s1", SourceStatus::Active)]).await.unwrap();

        assert!(report.aborted);
        assert_eq!(report.aborted_at, Some(Stage::PreAssess));
        assert!(report.finished_at.is_some());
        assert!(persistence.assessments.lock().unwrap().is_empty());
        assert!(provider.calls_for(SchemaName::BatchArticleAssessment).is_empty());
    }

    #[tokio::test]
    async fn test_inactive_sources_skipped_and_fetch_failures_reported() {
        let provider = Arc::new(ScriptedProvider::routed(|prompt, schema| respond(prompt, schema, None)));
        let persistence = Arc::new(MemoryPersistence::default());
        let coordinator = ready_coordinator(provider, persistence.clone()).await;
        let sources = vec![
            source("s1", SourceStatus::Active),
            source("missing", SourceStatus::Active),
            source("paused", SourceStatus::Inactive),
        ];

        let report = coordinator.run(&sources).await.unwrap();

        let extract_errors: Vec<&StageError> = report.errors_for(Stage::Extract).collect();
        assert_eq!(extract_errors.len(), 1);
        assert_eq!(extract_errors[0].ids, vec!["missing".to_string()]);
        assert_eq!(report.summary(Stage::Extract).unwrap().input, 2);
        assert_eq!(persistence.candidates.lock().unwrap().len(), 3);
        assert_eq!(report.events.len(), 1);
    }

    fn shouting(element: scraper::ElementRef<'_>, config: &crate::extract::SiteConfig) -> Option<crate::types::CandidateItem> {
        crate::extract::sources::simple(element, config).map(|mut item| {
            item.headline = item.headline.to_uppercase();
            item
        })
    }

    /// Serves static pages and raises the abort flag on the first fetch.
    struct AbortingFetcher {
        pages: StaticPages,
        abort: AbortHandle,
        fetched: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PageFetcher for AbortingFetcher {
        async fn fetch(&self, source: &Source) -> Result<String, FetchError> {
            self.fetched.fetch_add(1, Ordering::SeqCst);
            self.abort.abort();
            self.pages.fetch(source).await
        }
    }

    #[tokio::test]
    async fn test_custom_registry_and_abort_during_fetch() {
        let provider = Arc::new(ScriptedProvider::routed(|prompt, schema| respond(prompt, schema, None)));
        let persistence = Arc::new(MemoryPersistence::default());
        let mut registry = crate::extract::ExtractorRegistry::default();
        registry.register("shouting", shouting);
        let abort = AbortHandle::new();
        let fetcher = Arc::new(AbortingFetcher {
            pages: StaticPages::new().with_page("s1", PAGE).with_page("s2", PAGE),
            abort: abort.clone(),
            fetched: AtomicUsize::new(0),
        });
        let mut coordinator = PipelineCoordinator::new(provider.clone(), persistence.clone(), fetcher.clone())
            .with_registry(registry)
            .with_abort_handle(abort);
        coordinator
            .initialize(PipelineConfig {
                concurrency_limit: 1,
                ..config()
            })
            .await
            .unwrap();

        let mut shouting_source = source("s1", SourceStatus::Active);
        shouting_source.strategy = ExtractionStrategy::Named {
            extractor: "shouting".to_string(),
            selectors: SelectorSet::new("article"),
        };

        let report = coordinator.run(&[shouting_source, source("s2", SourceStatus::Active)]).await.unwrap();

        assert!(report.aborted);
        assert_eq!(report.aborted_at, Some(Stage::Extract));
        // The second source is never fetched once the abort is seen.
        assert_eq!(fetcher.fetched.load(Ordering::SeqCst), 1);
        assert_eq!(report.summary(Stage::Extract).unwrap().output, 3);
        assert_eq!(provider.calls(), 0);
        assert!(persistence.candidates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_coordinator_runs_again_after_abort() {
        let abort = AbortHandle::new();
        let trigger = abort.clone();
        let fired = Arc::new(AtomicBool::new(false));
        let provider = Arc::new(ScriptedProvider::routed(move |prompt, schema| {
            if schema == SchemaName::BatchHeadlineAssessment && !fired.swap(true, Ordering::SeqCst) {
                trigger.abort();
            }
            respond(prompt, schema, None)
        }));
        let persistence = Arc::new(MemoryPersistence::default());
        let coordinator = ready_coordinator(provider, persistence.clone())
            .await
            .with_abort_handle(abort.clone());

        let first = coordinator.run(&[source("s1", SourceStatus::Active)]).await.unwrap();
        assert!(first.aborted);
        assert!(abort.is_aborted());

        let second = coordinator.run(&[source("s1", SourceStatus::Active)]).await.unwrap();
        assert!(!second.aborted);
        assert_eq!(second.events.len(), 1);
        assert_eq!(persistence.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_uses_initialized_config() {
        let provider = Arc::new(ScriptedProvider::routed(|prompt, schema| respond(prompt, schema, None)));
        let persistence = Arc::new(MemoryPersistence::default());
        let coordinator = ready_coordinator_with(
            provider.clone(),
            persistence.clone(),
            PipelineConfig {
                batch_size: 1,
                watchlist_enabled: false,
                ..config()
            },
        )
        .await;

        let report = coordinator.run(&[source("s1", SourceStatus::Active)]).await.unwrap();

        // One triage batch per candidate and no watchlist stage.
        assert_eq!(provider.calls_for(SchemaName::BatchHeadlineAssessment).len(), 3);
        assert!(provider.calls_for(SchemaName::Judging).is_empty());
        assert!(report.summary(Stage::Watchlist).is_none());
        assert!(report.suggestions.is_empty());
        assert!(persistence.suggestions.lock().unwrap().is_empty());
    }
}
