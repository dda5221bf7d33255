//! Structured-output contracts every AI response must satisfy.
//!
//! Each contract has a typed form (deserialized after validation, and the
//! source of the JSON Schema sent to the provider) and a rule function that
//! checks raw output and reports every violation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::checker::Checker;
use crate::types::{Classification, Quality, WatchlistSuggestion, WatchlistType};

pub const JUDGING_VERDICTS: [&str; 2] = ["accept", "reject"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PreAssessment {
    pub classification: Classification,
    /// 0-100
    pub confidence: u8,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HeadlineAssessment {
    pub item_id: String,
    pub classification: Classification,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchHeadlineAssessment {
    pub assessments: Vec<HeadlineAssessment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArticleAssessment {
    pub item_id: String,
    pub classification: Classification,
    pub quality: Quality,
    /// 0-100
    pub confidence: u8,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchArticleAssessment {
    pub assessments: Vec<ArticleAssessment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterProposal {
    pub event_key: String,
    pub article_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClusteringResponse {
    pub clusters: Vec<ClusterProposal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArticleEntities {
    pub article_id: String,
    pub entities: Vec<String>,
    pub reasoning: String,
    /// Short key naming the underlying event, when the model can propose one.
    pub event_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntityExtractionResponse {
    pub extractions: Vec<ArticleEntities>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalName {
    pub alias: String,
    pub canonical: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalizationResponse {
    pub mappings: Vec<CanonicalName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JudgingResponse {
    /// "accept" or "reject"
    pub verdict: String,
    /// 0-100
    pub score: u8,
    pub reasoning: String,
}

impl JudgingResponse {
    pub fn accepted(&self) -> bool {
        self.verdict == "accept"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WatchlistResponse {
    pub suggestions: Vec<WatchlistSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TranslationResponse {
    pub language: String,
    pub headline: String,
    pub summary: Option<String>,
}

pub(super) fn pre_assessment(c: &mut Checker, obj: &Map<String, Value>) {
    c.one_of(obj, "classification", "", &Classification::ALL);
    c.integer_in_range(obj, "confidence", "", 0, 100);
    c.string(obj, "reasoning", "");
}

pub(super) fn batch_headline_assessment(c: &mut Checker, obj: &Map<String, Value>) {
    c.each_object(obj, "assessments", "", |c, item, path| {
        c.non_empty_string(item, "item_id", path);
        c.one_of(item, "classification", path, &Classification::ALL);
        c.string(item, "reasoning", path);
    });
}

pub(super) fn batch_article_assessment(c: &mut Checker, obj: &Map<String, Value>) {
    c.each_object(obj, "assessments", "", |c, item, path| {
        c.non_empty_string(item, "item_id", path);
        c.one_of(item, "classification", path, &Classification::ALL);
        c.one_of(item, "quality", path, &Quality::ALL);
        c.integer_in_range(item, "confidence", path, 0, 100);
        c.string(item, "reasoning", path);
    });
}

pub(super) fn clustering(c: &mut Checker, obj: &Map<String, Value>) {
    c.each_object(obj, "clusters", "", |c, item, path| {
        c.non_empty_string(item, "event_key", path);
        c.string_array(item, "article_ids", path);
    });
}

pub(super) fn entity_extraction(c: &mut Checker, obj: &Map<String, Value>) {
    c.each_object(obj, "extractions", "", |c, item, path| {
        c.non_empty_string(item, "article_id", path);
        c.string_array(item, "entities", path);
        c.string(item, "reasoning", path);
        c.nullable_string(item, "event_key", path);
    });
}

pub(super) fn canonicalization(c: &mut Checker, obj: &Map<String, Value>) {
    c.each_object(obj, "mappings", "", |c, item, path| {
        c.non_empty_string(item, "alias", path);
        c.non_empty_string(item, "canonical", path);
    });
}

pub(super) fn synthesis(c: &mut Checker, obj: &Map<String, Value>) {
    c.non_empty_string(obj, "headline", "");
    c.string(obj, "summary", "");
    c.string(obj, "country", "");
    c.each_object(obj, "key_individuals", "", key_individual);
}

fn key_individual(c: &mut Checker, item: &Map<String, Value>, path: &str) {
    c.non_empty_string(item, "name", path);
    c.string(item, "role_in_event", path);
    c.nullable_string(item, "company", path);
    c.nullable_string(item, "email_suggestion", path);
}

pub(super) fn judging(c: &mut Checker, obj: &Map<String, Value>) {
    c.one_of(obj, "verdict", "", &JUDGING_VERDICTS);
    c.integer_in_range(obj, "score", "", 0, 100);
    c.string(obj, "reasoning", "");
}

pub(super) fn watchlist_suggestion(c: &mut Checker, obj: &Map<String, Value>) {
    c.each_object(obj, "suggestions", "", |c, item, path| {
        c.non_empty_string(item, "name", path);
        c.one_of(item, "type", path, &WatchlistType::ALL);
        c.string(item, "country", path);
        c.string(item, "rationale", path);
        c.string(item, "source_event", path);
        c.string_array(item, "search_terms", path);
    });
}

pub(super) fn translation(c: &mut Checker, obj: &Map<String, Value>) {
    c.non_empty_string(obj, "language", "");
    c.non_empty_string(obj, "headline", "");
    c.nullable_string(obj, "summary", "");
}
