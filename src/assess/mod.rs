//! Batch assessment: triage and full assessment of candidate items.

pub mod batch;
pub mod call;

use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

use crate::error::ProviderError;
use crate::llm::AiProvider;
use crate::prompt;
use crate::schema::contracts::{
    BatchArticleAssessment, BatchHeadlineAssessment, PreAssessment, TranslationResponse,
};
use crate::schema::{validate_as, SchemaName, ValidationErrors};
use crate::types::{AssessmentError, AssessmentVerdict, CandidateItem};
use crate::TARGET_LLM_REQUEST;

pub use batch::{auth_escalated, coverage_violations, distinct_errors, run_batches, BatchOptions, BatchRun};
pub use call::{complete_validated, CallFailure};

/// The two batched assessment passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentStage {
    /// Headline-only classification used to discard irrelevant items early.
    HeadlineTriage,
    /// Classification plus quality grading of triaged items.
    FullAssessment,
}

impl AssessmentStage {
    pub fn schema(&self) -> SchemaName {
        match self {
            AssessmentStage::HeadlineTriage => SchemaName::BatchHeadlineAssessment,
            AssessmentStage::FullAssessment => SchemaName::BatchArticleAssessment,
        }
    }
}

impl TryFrom<SchemaName> for AssessmentStage {
    type Error = SchemaName;

    fn try_from(schema: SchemaName) -> Result<Self, Self::Error> {
        match schema {
            SchemaName::BatchHeadlineAssessment => Ok(AssessmentStage::HeadlineTriage),
            SchemaName::BatchArticleAssessment => Ok(AssessmentStage::FullAssessment),
            other => Err(other),
        }
    }
}

/// Result for one input item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssessmentOutcome {
    Verdict(AssessmentVerdict),
    /// The item's batch failed; the error lists every item of that batch.
    Error(AssessmentError),
}

impl AssessmentOutcome {
    pub fn verdict(&self) -> Option<&AssessmentVerdict> {
        match self {
            AssessmentOutcome::Verdict(v) => Some(v),
            AssessmentOutcome::Error(_) => None,
        }
    }
}

/// Outcomes of one assessment pass.
#[derive(Debug, Clone)]
pub struct Assessment {
    /// One entry per input item, in input order.
    pub outcomes: Vec<AssessmentOutcome>,
    /// One entry per failed batch.
    pub errors: Vec<AssessmentError>,
}

impl Assessment {
    pub fn verdicts(&self) -> impl Iterator<Item = &AssessmentVerdict> {
        self.outcomes.iter().filter_map(AssessmentOutcome::verdict)
    }
}

fn headline_verdicts(value: &Value, ids: &[String]) -> Result<HashMap<String, AssessmentVerdict>, ValidationErrors> {
    let parsed: BatchHeadlineAssessment = validate_as(SchemaName::BatchHeadlineAssessment, value)?;
    let violations = coverage_violations(ids, parsed.assessments.iter().map(|a| a.item_id.as_str()), "assessments");
    if !violations.is_empty() {
        return Err(ValidationErrors(violations));
    }
    Ok(parsed
        .assessments
        .into_iter()
        .map(|a| {
            let verdict = AssessmentVerdict {
                item_id: a.item_id.clone(),
                classification: a.classification,
                quality: None,
                confidence: None,
                reasoning: a.reasoning,
            };
            (a.item_id, verdict)
        })
        .collect())
}

fn article_verdicts(value: &Value, ids: &[String]) -> Result<HashMap<String, AssessmentVerdict>, ValidationErrors> {
    let parsed: BatchArticleAssessment = validate_as(SchemaName::BatchArticleAssessment, value)?;
    let violations = coverage_violations(ids, parsed.assessments.iter().map(|a| a.item_id.as_str()), "assessments");
    if !violations.is_empty() {
        return Err(ValidationErrors(violations));
    }
    Ok(parsed
        .assessments
        .into_iter()
        .map(|a| {
            let verdict = AssessmentVerdict {
                item_id: a.item_id.clone(),
                classification: a.classification,
                quality: Some(a.quality),
                confidence: Some(a.confidence),
                reasoning: a.reasoning,
            };
            (a.item_id, verdict)
        })
        .collect())
}

/// Assesses `items` in batches with at most `options.concurrency_limit` calls in flight.
///
/// A batch whose output fails validation twice marks all of its items as errors;
/// other batches are unaffected. Fails only when provider authentication is
/// rejected repeatedly.
pub async fn assess_batch(
    items: &[CandidateItem],
    stage: AssessmentStage,
    provider: &dyn AiProvider,
    options: BatchOptions,
) -> Result<Assessment, ProviderError> {
    let keyed: Vec<(String, &CandidateItem)> = items.iter().map(|item| (item.item_id(), item)).collect();

    let run = match stage {
        AssessmentStage::HeadlineTriage => {
            run_batches(provider, &keyed, stage.schema(), options, prompt::headline_triage_prompt, headline_verdicts).await
        }
        AssessmentStage::FullAssessment => {
            run_batches(provider, &keyed, stage.schema(), options, prompt::article_assessment_prompt, article_verdicts).await
        }
    };

    if run.auth_escalated() {
        return Err(ProviderError::Auth(format!(
            "{} of {} {} batches rejected credentials",
            run.auth_failures,
            run.batches,
            stage.schema()
        )));
    }

    let errors = distinct_errors(run.results.iter().map(|(_, r)| r));
    let outcomes: Vec<AssessmentOutcome> = run
        .results
        .into_iter()
        .map(|(_, result)| match result {
            Ok(verdict) => AssessmentOutcome::Verdict(verdict),
            Err(e) => AssessmentOutcome::Error(e),
        })
        .collect();

    info!(
        target: TARGET_LLM_REQUEST,
        "[{}]: {} verdicts, {} failed batches",
        stage.schema(),
        outcomes.iter().filter(|o| o.verdict().is_some()).count(),
        errors.len()
    );

    Ok(Assessment { outcomes, errors })
}

/// Triage of a single headline.
pub async fn pre_assess_item(provider: &dyn AiProvider, item: &CandidateItem) -> Result<PreAssessment, CallFailure> {
    let prompt = prompt::pre_assessment_prompt(&item.headline, &item.newspaper);
    complete_validated(provider, &prompt, SchemaName::PreAssessment, |value| {
        validate_as(SchemaName::PreAssessment, value)
    })
    .await
}

/// English translation of a headline and optional summary.
pub async fn translate_headline(
    provider: &dyn AiProvider,
    headline: &str,
    summary: Option<&str>,
) -> Result<TranslationResponse, CallFailure> {
    let prompt = prompt::translation_prompt(headline, summary);
    complete_validated(provider, &prompt, SchemaName::Translation, |value| {
        validate_as(SchemaName::Translation, value)
    })
    .await
}
