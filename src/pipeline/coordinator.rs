use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use super::fetch::PageFetcher;
use super::init::{InitContext, InitState};
use super::report::{RunReport, Stage};
use crate::assess::{assess_batch, auth_escalated, AssessmentOutcome, AssessmentStage, BatchOptions, CallFailure};
use crate::cluster::{apply_aliases, canonicalize, cluster, distinct_entities, extract_entities, local_aliases, synthesize};
use crate::db::Persistence;
use crate::environment::PipelineConfig;
use crate::error::{FatalError, ProviderError};
use crate::extract::ExtractorRegistry;
use crate::llm::AiProvider;
use crate::prompt::ClusterArticle;
use crate::types::{AssessmentVerdict, CandidateItem, Classification, EntityExtraction, Quality, Source, SynthesizedEvent};
use crate::watchlist::derive_watchlist;
use crate::TARGET_PIPELINE;

/// Requests that a running pipeline stop at the next stage boundary.
///
/// The flag stays raised until the next run starts, which clears it.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn abort(&self) {
        self.sender.send_replace(true);
    }

    fn reset(&self) {
        self.sender.send_replace(false);
    }

    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }

    /// Receiver that observes the abort flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Whether a fully assessed item moves on to entity extraction.
pub fn passed_assessment(verdict: &AssessmentVerdict) -> bool {
    verdict.classification == Classification::Private
        && !matches!(verdict.quality, Some(Quality::Poor) | Some(Quality::Irrelevant))
}

fn provider_fatal(e: ProviderError) -> FatalError {
    FatalError::ProviderAuth(e.to_string())
}

/// Sequences the pipeline stages over a set of sources.
pub struct PipelineCoordinator {
    provider: Arc<dyn AiProvider>,
    persistence: Arc<dyn Persistence>,
    fetcher: Arc<dyn PageFetcher>,
    registry: ExtractorRegistry,
    init: InitContext,
    abort: AbortHandle,
}

impl PipelineCoordinator {
    pub fn new(provider: Arc<dyn AiProvider>, persistence: Arc<dyn Persistence>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            provider,
            persistence,
            fetcher,
            registry: ExtractorRegistry::default(),
            init: InitContext::new(),
            abort: AbortHandle::new(),
        }
    }

    /// Replaces the extractor registry, e.g. to add site-specific extractors.
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Shares an abort signal created elsewhere, e.g. by a shutdown handler.
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn init_state(&self) -> &InitState {
        self.init.state()
    }

    pub async fn initialize(&mut self, config: PipelineConfig) -> Result<(), FatalError> {
        self.init.initialize(config, self.persistence.as_ref()).await
    }

    fn aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Runs every stage over `sources`.
    ///
    /// Item and batch failures are collected in the report. Persistence
    /// failures, repeated provider authentication failures and an
    /// uninitialized context end the run with an error. An abort request
    /// stops the run at the next stage boundary, discarding that stage's results.
    /// Batching, concurrency and the watchlist follow the configuration the
    /// context was initialized with.
    #[instrument(target = "pipeline", level = "info", skip_all, fields(sources = sources.len()))]
    pub async fn run(&self, sources: &[Source]) -> Result<RunReport, FatalError> {
        let config = self.init.ensure_ready()?;
        self.abort.reset();
        let mut report = RunReport::new();
        info!(target: TARGET_PIPELINE, "Run {} started with {} sources", report.run_id, sources.len());

        let options = BatchOptions {
            batch_size: config.batch_size,
            concurrency_limit: config.concurrency_limit,
        };

        // Extract
        let candidates = self.extract_sources(sources, config.concurrency_limit, &mut report).await;
        if self.aborted() {
            return Ok(report.abort(Stage::Extract));
        }
        self.persistence.save_candidate_items(&candidates).await?;

        // Pre-assess: only private items continue.
        let triage = assess_batch(&candidates, AssessmentStage::HeadlineTriage, self.provider.as_ref(), options)
            .await
            .map_err(provider_fatal)?;
        if self.aborted() {
            return Ok(report.abort(Stage::PreAssess));
        }
        for e in &triage.errors {
            report.record_error(Stage::PreAssess, e.item_ids.clone(), e.reason.clone());
        }
        let triage_verdicts: Vec<AssessmentVerdict> = triage.verdicts().cloned().collect();
        let private: Vec<CandidateItem> = candidates
            .iter()
            .zip(&triage.outcomes)
            .filter(|(_, outcome)| {
                matches!(outcome, AssessmentOutcome::Verdict(v) if v.classification == Classification::Private)
            })
            .map(|(item, _)| item.clone())
            .collect();
        report.record_stage(Stage::PreAssess, candidates.len(), private.len());
        self.persistence.save_assessments(&triage_verdicts).await?;

        // Full assessment
        let assessment = assess_batch(&private, AssessmentStage::FullAssessment, self.provider.as_ref(), options)
            .await
            .map_err(provider_fatal)?;
        if self.aborted() {
            return Ok(report.abort(Stage::Assess));
        }
        for e in &assessment.errors {
            report.record_error(Stage::Assess, e.item_ids.clone(), e.reason.clone());
        }
        let verdicts: Vec<AssessmentVerdict> = assessment.verdicts().cloned().collect();
        let passed: Vec<CandidateItem> = private
            .iter()
            .zip(&assessment.outcomes)
            .filter(|(_, outcome)| outcome.verdict().is_some_and(passed_assessment))
            .map(|(item, _)| item.clone())
            .collect();
        report.record_stage(Stage::Assess, private.len(), passed.len());
        self.persistence.save_assessments(&verdicts).await?;

        // Entity extraction
        let entity_run = extract_entities(&passed, self.provider.as_ref(), options)
            .await
            .map_err(provider_fatal)?;
        if self.aborted() {
            return Ok(report.abort(Stage::EntityExtraction));
        }
        for e in &entity_run.errors {
            report.record_error(Stage::EntityExtraction, e.item_ids.clone(), e.reason.clone());
        }
        report.record_stage(Stage::EntityExtraction, passed.len(), entity_run.extractions.len());

        // Canonicalize; on failure only local spelling merges apply.
        let aliases = match canonicalize(&entity_run.extractions, self.provider.as_ref()).await {
            Ok(aliases) => aliases,
            Err(failure) => {
                if failure.is_auth() {
                    return Err(FatalError::ProviderAuth(failure.to_string()));
                }
                warn!(target: TARGET_PIPELINE, "Entity canonicalization failed: {}", failure);
                report.record_error(
                    Stage::Canonicalize,
                    entity_run.extractions.iter().map(|e| e.article_id.clone()).collect(),
                    failure.to_string(),
                );
                let names = distinct_entities(&entity_run.extractions);
                local_aliases(names.iter().map(String::as_str))
            }
        };
        if self.aborted() {
            return Ok(report.abort(Stage::Canonicalize));
        }
        let canonical = apply_aliases(&entity_run.extractions, &aliases);
        report.record_stage(Stage::Canonicalize, entity_run.extractions.len(), aliases.len());

        // Cluster
        let clusters = cluster(&canonical);
        report.record_stage(Stage::Cluster, canonical.len(), clusters.len());
        info!(target: TARGET_PIPELINE, "{} articles formed {} clusters", canonical.len(), clusters.len());

        // Synthesize
        let items_by_id: HashMap<String, &CandidateItem> = passed.iter().map(|item| (item.item_id(), item)).collect();
        let extraction_by_id: HashMap<&str, &EntityExtraction> = entity_run
            .extractions
            .iter()
            .map(|e| (e.article_id.as_str(), e))
            .collect();
        let provider = self.provider.as_ref();
        let synthesized: Vec<(Vec<String>, Result<SynthesizedEvent, CallFailure>)> = stream::iter(&clusters)
            .map(|event_cluster| {
                let articles: Vec<ClusterArticle<'_>> = event_cluster
                    .article_ids
                    .iter()
                    .filter_map(|id| {
                        let item = *items_by_id.get(id)?;
                        let extraction = *extraction_by_id.get(id.as_str())?;
                        Some(ClusterArticle {
                            item,
                            entities: &extraction.entities,
                            reasoning: &extraction.reasoning,
                        })
                    })
                    .collect();
                async move {
                    let result = synthesize(event_cluster, &articles, provider).await;
                    (event_cluster.article_ids.clone(), result)
                }
            })
            .buffered(config.concurrency_limit.max(1))
            .collect()
            .await;
        if self.aborted() {
            return Ok(report.abort(Stage::Synthesize));
        }
        let mut events = Vec::new();
        let mut auth_failures = 0;
        for (ids, result) in synthesized {
            match result {
                Ok(event) => events.push(event),
                Err(failure) => {
                    if failure.is_auth() {
                        auth_failures += 1;
                    }
                    error!(target: TARGET_PIPELINE, "Synthesis of {} articles failed: {}", ids.len(), failure);
                    report.record_error(Stage::Synthesize, ids, failure.to_string());
                }
            }
        }
        if auth_escalated(auth_failures, clusters.len()) {
            return Err(FatalError::ProviderAuth(format!(
                "{} of {} synthesis calls rejected credentials",
                auth_failures,
                clusters.len()
            )));
        }
        report.record_stage(Stage::Synthesize, clusters.len(), events.len());
        self.persistence.save_synthesized_events(&events).await?;
        report.events = events;

        // Watchlist
        if config.watchlist_enabled && !report.events.is_empty() {
            let watchlist = derive_watchlist(&report.events, self.provider.as_ref(), config.concurrency_limit).await;
            if self.aborted() {
                return Ok(report.abort(Stage::Watchlist));
            }
            if auth_escalated(watchlist.auth_failures(), report.events.len()) {
                return Err(FatalError::ProviderAuth(format!(
                    "{} of {} watchlist reviews rejected credentials",
                    watchlist.auth_failures(),
                    report.events.len()
                )));
            }
            for (event, failure) in watchlist.failures() {
                report.record_error(Stage::Watchlist, vec![event.to_string()], failure.to_string());
            }
            report.record_stage(Stage::Watchlist, report.events.len(), watchlist.suggestions.len());
            self.persistence.save_watchlist_suggestions(&watchlist.suggestions).await?;
            report.suggestions = watchlist.suggestions;
        }

        let report = report.finish();
        info!(
            target: TARGET_PIPELINE,
            "Run {} finished: {} events, {} suggestions, {} errors",
            report.run_id,
            report.events.len(),
            report.suggestions.len(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Fetches and extracts every active source; a failing source is
    /// reported and skipped.
    async fn extract_sources(&self, sources: &[Source], limit: usize, report: &mut RunReport) -> Vec<CandidateItem> {
        let active: Vec<&Source> = sources.iter().filter(|s| s.is_active()).collect();
        if active.len() < sources.len() {
            info!(target: TARGET_PIPELINE, "Skipping {} inactive sources", sources.len() - active.len());
        }

        let fetcher = self.fetcher.as_ref();
        let abort = &self.abort;
        // Sources not yet fetched when an abort arrives are skipped.
        let pages: Vec<(&Source, Result<String, _>)> = stream::iter(active.iter().copied())
            .map(|source| async move {
                if abort.is_aborted() {
                    None
                } else {
                    Some((source, fetcher.fetch(source).await))
                }
            })
            .buffered(limit.max(1))
            .filter_map(|page| async move { page })
            .collect()
            .await;

        let mut items = Vec::new();
        let mut seen = HashSet::new();
        for (source, page) in pages {
            let html = match page {
                Ok(html) => html,
                Err(e) => {
                    warn!(target: TARGET_PIPELINE, "Failed to fetch {}: {}", source.id, e);
                    report.record_error(Stage::Extract, vec![source.id.clone()], e.to_string());
                    continue;
                }
            };
            match self.registry.extract_page(source, &html) {
                Ok(extracted) => {
                    // Duplicate links collapse across sources too.
                    items.extend(extracted.into_iter().filter(|item| seen.insert(item.item_id())));
                }
                Err(e) => report.record_error(Stage::Extract, vec![source.id.clone()], e.to_string()),
            }
        }
        report.record_stage(Stage::Extract, active.len(), items.len());
        items
    }
}
