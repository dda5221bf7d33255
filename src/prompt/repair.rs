use serde_json::Value;

use crate::schema::{SchemaName, ValidationErrors};

/// Appends a schema-repair instruction to the original prompt.
///
/// The invalid output and each violation are quoted back so the model can fix
/// them in place.
pub fn repair_prompt(original_prompt: &str, schema: SchemaName, invalid_output: Option<&Value>, errors: &ValidationErrors) -> String {
    let previous = invalid_output
        .map(|v| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()))
        .unwrap_or_else(|| "(no parsable JSON)".to_string());
    let violations = errors
        .violations()
        .iter()
        .map(|v| format!("- {}", v))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"{original}

## REPAIR REQUIRED
Your previous answer did not match the required "{schema}" format.

PREVIOUS ANSWER:
----------
{previous}
----------

PROBLEMS:
{violations}

Return the corrected JSON object only. Keep every correct value unchanged and
fix only the listed problems. Enum fields must use one of the listed values
exactly."#,
        original = original_prompt,
        schema = schema,
        previous = previous,
        violations = violations
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repair_prompt_lists_problems() {
        let errors = ValidationErrors::single("assessments[2].classification", "unknown value \"privat\"");
        let prompt = repair_prompt("ORIGINAL", SchemaName::BatchHeadlineAssessment, Some(&json!({"assessments": []})), &errors);
        assert!(prompt.starts_with("ORIGINAL"));
        assert!(prompt.contains("batchHeadlineAssessment"));
        assert!(prompt.contains("- assessments[2].classification: unknown value"));
    }
}
