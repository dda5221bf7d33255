use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::{SynthesizedEvent, WatchlistSuggestion};

/// Sample ids kept per stage in the summary.
pub const MAX_SAMPLE_IDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    PreAssess,
    Assess,
    EntityExtraction,
    Canonicalize,
    Cluster,
    Synthesize,
    Watchlist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::PreAssess => "pre_assess",
            Stage::Assess => "assess",
            Stage::EntityExtraction => "entity_extraction",
            Stage::Canonicalize => "canonicalize",
            Stage::Cluster => "cluster",
            Stage::Synthesize => "synthesize",
            Stage::Watchlist => "watchlist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal failure, attributed to the items it affected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    /// Item, source or event identifiers, depending on the stage.
    pub ids: Vec<String>,
    pub reason: String,
}

/// Counters for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    /// Inputs handed to the stage.
    pub input: usize,
    /// Outputs that moved on.
    pub output: usize,
    /// Identifiers affected by errors.
    pub failed: usize,
    pub sample_failed_ids: Vec<String>,
}

impl StageSummary {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            input: 0,
            output: 0,
            failed: 0,
            sample_failed_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set when the run stopped on an abort signal; results of the
    /// interrupted stage were discarded.
    pub aborted: bool,
    pub aborted_at: Option<Stage>,
    pub stages: Vec<StageSummary>,
    pub errors: Vec<StageError>,
    pub events: Vec<SynthesizedEvent>,
    pub suggestions: Vec<WatchlistSuggestion>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            aborted: false,
            aborted_at: None,
            stages: Vec::new(),
            errors: Vec::new(),
            events: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn summary_mut(&mut self, stage: Stage) -> &mut StageSummary {
        let index = match self.stages.iter().position(|s| s.stage == stage) {
            Some(index) => index,
            None => {
                self.stages.push(StageSummary::new(stage));
                self.stages.len() - 1
            }
        };
        &mut self.stages[index]
    }

    pub fn summary(&self, stage: Stage) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Records how many items entered and left `stage`.
    pub fn record_stage(&mut self, stage: Stage, input: usize, output: usize) {
        let summary = self.summary_mut(stage);
        summary.input = input;
        summary.output = output;
    }

    pub fn record_error(&mut self, stage: Stage, ids: Vec<String>, reason: impl Into<String>) {
        let summary = self.summary_mut(stage);
        summary.failed += ids.len().max(1);
        for id in &ids {
            if summary.sample_failed_ids.len() >= MAX_SAMPLE_IDS {
                break;
            }
            summary.sample_failed_ids.push(id.clone());
        }
        self.errors.push(StageError {
            stage,
            ids,
            reason: reason.into(),
        });
    }

    pub fn errors_for(&self, stage: Stage) -> impl Iterator<Item = &StageError> {
        self.errors.iter().filter(move |e| e.stage == stage)
    }

    pub(crate) fn abort(mut self, stage: Stage) -> Self {
        self.aborted = true;
        self.aborted_at = Some(stage);
        self.finish()
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}
