//! Schema validation for AI output.

mod checker;
pub mod contracts;

use schemars::schema_for;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use checker::Checker;
use contracts::*;
use crate::types::SynthesizedEvent;

/// Names of the structured-output contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaName {
    PreAssessment,
    BatchHeadlineAssessment,
    BatchArticleAssessment,
    Clustering,
    EntityExtraction,
    Canonicalization,
    Synthesis,
    Judging,
    WatchlistSuggestion,
    Translation,
}

impl SchemaName {
    pub const ALL: [SchemaName; 10] = [
        SchemaName::PreAssessment,
        SchemaName::BatchHeadlineAssessment,
        SchemaName::BatchArticleAssessment,
        SchemaName::Clustering,
        SchemaName::EntityExtraction,
        SchemaName::Canonicalization,
        SchemaName::Synthesis,
        SchemaName::Judging,
        SchemaName::WatchlistSuggestion,
        SchemaName::Translation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaName::PreAssessment => "preAssessment",
            SchemaName::BatchHeadlineAssessment => "batchHeadlineAssessment",
            SchemaName::BatchArticleAssessment => "batchArticleAssessment",
            SchemaName::Clustering => "clustering",
            SchemaName::EntityExtraction => "entityExtraction",
            SchemaName::Canonicalization => "canonicalization",
            SchemaName::Synthesis => "synthesis",
            SchemaName::Judging => "judging",
            SchemaName::WatchlistSuggestion => "watchlistSuggestion",
            SchemaName::Translation => "translation",
        }
    }

    /// JSON Schema document handed to the provider as the output target.
    pub fn json_schema(&self) -> Value {
        let root = match self {
            SchemaName::PreAssessment => schema_for!(PreAssessment),
            SchemaName::BatchHeadlineAssessment => schema_for!(BatchHeadlineAssessment),
            SchemaName::BatchArticleAssessment => schema_for!(BatchArticleAssessment),
            SchemaName::Clustering => schema_for!(ClusteringResponse),
            SchemaName::EntityExtraction => schema_for!(EntityExtractionResponse),
            SchemaName::Canonicalization => schema_for!(CanonicalizationResponse),
            SchemaName::Synthesis => schema_for!(SynthesizedEvent),
            SchemaName::Judging => schema_for!(JudgingResponse),
            SchemaName::WatchlistSuggestion => schema_for!(WatchlistResponse),
            SchemaName::Translation => schema_for!(TranslationResponse),
        };
        serde_json::to_value(root).unwrap_or(Value::Null)
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemaName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown schema: {}", s))
    }
}

/// One contract violation, located by a JSON path such as `assessments[2].quality`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every violation found in one candidate output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} schema violation(s): {}", .0.len(), join_violations(.0))]
pub struct ValidationErrors(pub Vec<Violation>);

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn single(path: &str, message: impl Into<String>) -> Self {
        ValidationErrors(vec![Violation {
            path: path.to_string(),
            message: message.into(),
        }])
    }

    pub fn violations(&self) -> &[Violation] {
        &self.0
    }
}

/// Checks `candidate` against the named contract, returning it unchanged when valid.
pub fn validate(schema: SchemaName, candidate: &Value) -> Result<Value, ValidationErrors> {
    let mut checker = Checker::new();
    if let Some(obj) = checker.object(candidate, "") {
        match schema {
            SchemaName::PreAssessment => pre_assessment(&mut checker, obj),
            SchemaName::BatchHeadlineAssessment => batch_headline_assessment(&mut checker, obj),
            SchemaName::BatchArticleAssessment => batch_article_assessment(&mut checker, obj),
            SchemaName::Clustering => clustering(&mut checker, obj),
            SchemaName::EntityExtraction => entity_extraction(&mut checker, obj),
            SchemaName::Canonicalization => canonicalization(&mut checker, obj),
            SchemaName::Synthesis => synthesis(&mut checker, obj),
            SchemaName::Judging => judging(&mut checker, obj),
            SchemaName::WatchlistSuggestion => watchlist_suggestion(&mut checker, obj),
            SchemaName::Translation => translation(&mut checker, obj),
        }
    }

    let violations = checker.into_violations();
    if violations.is_empty() {
        Ok(candidate.clone())
    } else {
        Err(ValidationErrors(violations))
    }
}

/// Validates, then deserializes into the contract's typed form.
pub fn validate_as<T: DeserializeOwned>(schema: SchemaName, candidate: &Value) -> Result<T, ValidationErrors> {
    let data = validate(schema, candidate)?;
    serde_json::from_value(data).map_err(|e| ValidationErrors::single("$", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_article_batch() {
        let output = json!({
            "assessments": [
                {"item_id": "a1", "classification": "private", "quality": "Good", "confidence": 80, "reasoning": "founder exit"},
                {"item_id": "a2", "classification": "corporate", "quality": "Irrelevant", "confidence": 0, "reasoning": ""}
            ]
        });
        let parsed: BatchArticleAssessment = validate_as(SchemaName::BatchArticleAssessment, &output).unwrap();
        assert_eq!(parsed.assessments.len(), 2);
        assert_eq!(parsed.assessments[1].confidence, 0);
    }

    #[test]
    fn test_reports_every_violation() {
        let output = json!({
            "assessments": [
                {"item_id": "a1", "classification": "privat", "quality": "Great", "confidence": 101, "reasoning": "x"},
                {"classification": "public", "quality": "Good", "confidence": "high", "reasoning": 3}
            ]
        });
        let errors = validate(SchemaName::BatchArticleAssessment, &output).unwrap_err();
        let paths: Vec<&str> = errors.violations().iter().map(|v| v.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "assessments[0].classification",
                "assessments[0].quality",
                "assessments[0].confidence",
                "assessments[1].item_id",
                "assessments[1].confidence",
                "assessments[1].reasoning",
            ]
        );
    }

    #[test]
    fn test_confidence_is_range_checked_not_clamped() {
        for bad in [json!(-1), json!(101), json!(55.5)] {
            let output = json!({"classification": "private", "confidence": bad, "reasoning": "r"});
            assert!(validate(SchemaName::PreAssessment, &output).is_err());
        }
        for good in [0, 100] {
            let output = json!({"classification": "private", "confidence": good, "reasoning": "r"});
            assert!(validate(SchemaName::PreAssessment, &output).is_ok());
        }
    }

    #[test]
    fn test_synthesis_nullable_fields() {
        let output = json!({
            "headline": "Heirs sell stake in logistics group",
            "summary": "The Smith family sold a 30% stake.",
            "country": "DE",
            "key_individuals": [
                {"name": "Anna Smith", "role_in_event": "seller", "company": null, "email_suggestion": null},
                {"name": "Ben Smith", "role_in_event": "seller", "company": "Smith Logistik", "email_suggestion": "ben@smith.de"}
            ]
        });
        let event: SynthesizedEvent = validate_as(SchemaName::Synthesis, &output).unwrap();
        assert_eq!(event.key_individuals[0].company, None);

        // Nullable still means present
        let missing = json!({
            "headline": "h", "summary": "s", "country": "DE",
            "key_individuals": [{"name": "A", "role_in_event": "r", "company": 5}]
        });
        let errors = validate(SchemaName::Synthesis, &missing).unwrap_err();
        assert_eq!(errors.violations().len(), 2);

        let empty = json!({"headline": "h", "summary": "s", "country": "", "key_individuals": []});
        assert!(validate(SchemaName::Synthesis, &empty).is_ok());
    }

    #[test]
    fn test_non_object_output() {
        let errors = validate(SchemaName::Judging, &json!(["accept"])).unwrap_err();
        assert_eq!(errors.violations()[0].path, "$");
        assert!(errors.to_string().contains("expected object"));
    }

    #[test]
    fn test_watchlist_and_judging_enums() {
        let output = json!({"suggestions": [{
            "name": "Müller family", "type": "family", "country": "CH",
            "rationale": "sold company", "source_event": "ev-1", "search_terms": ["Müller", 4]
        }]});
        let errors = validate(SchemaName::WatchlistSuggestion, &output).unwrap_err();
        assert_eq!(errors.violations()[0].path, "suggestions[0].search_terms[1]");

        let judged = json!({"verdict": "maybe", "score": 50, "reasoning": ""});
        assert!(validate(SchemaName::Judging, &judged).is_err());
    }

    #[test]
    fn test_every_schema_has_a_json_schema_document() {
        for name in SchemaName::ALL {
            let doc = name.json_schema();
            assert!(doc.get("properties").is_some(), "{} has no properties", name);
            assert_eq!(name.as_str().parse::<SchemaName>().unwrap(), name);
        }
    }
}
