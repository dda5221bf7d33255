use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::llm::{AiProvider, ModelHint};
use crate::prompt::repair_prompt;
use crate::schema::{SchemaName, ValidationErrors};
use crate::TARGET_LLM_REQUEST;

/// Why a validated call produced no usable output.
#[derive(Debug, Clone, PartialEq)]
pub enum CallFailure {
    Provider(ProviderError),
    /// Output still failed validation after the repair attempt.
    Invalid(ValidationErrors),
}

impl CallFailure {
    pub fn is_auth(&self) -> bool {
        matches!(self, CallFailure::Provider(e) if e.is_auth())
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailure::Provider(e) => write!(f, "{}", e),
            CallFailure::Invalid(e) => write!(f, "validation failed after repair: {}", e),
        }
    }
}

/// Calls the provider and checks the output; on a contract violation retries
/// once with a repair instruction on the utility model.
///
/// `check` validates the raw output and converts it to the typed result; it may
/// add checks beyond the schema, such as batch coverage.
pub async fn complete_validated<T, F>(
    provider: &dyn AiProvider,
    prompt: &str,
    schema: SchemaName,
    check: F,
) -> Result<T, CallFailure>
where
    F: Fn(&Value) -> Result<T, ValidationErrors>,
{
    let (invalid_output, errors) = match provider.complete(prompt, schema, ModelHint::Primary).await {
        Ok(output) => match check(&output) {
            Ok(parsed) => return Ok(parsed),
            Err(errors) => (Some(output), errors),
        },
        Err(ProviderError::Malformed(reason)) => (None, ValidationErrors::single("$", reason)),
        Err(ProviderError::EmptyResponse) => (None, ValidationErrors::single("$", "empty response")),
        Err(e) => return Err(CallFailure::Provider(e)),
    };

    warn!(target: TARGET_LLM_REQUEST, "[{}]: output failed validation, requesting repair: {}", schema, errors);
    let repair = repair_prompt(prompt, schema, invalid_output.as_ref(), &errors);

    match provider.complete(&repair, schema, ModelHint::Utility).await {
        Ok(output) => {
            let parsed = check(&output).map_err(CallFailure::Invalid)?;
            debug!(target: TARGET_LLM_REQUEST, "[{}]: repair succeeded", schema);
            Ok(parsed)
        }
        Err(ProviderError::Malformed(reason)) => Err(CallFailure::Invalid(ValidationErrors::single("$", reason))),
        Err(ProviderError::EmptyResponse) => Err(CallFailure::Invalid(ValidationErrors::single("$", "empty response"))),
        Err(e) => Err(CallFailure::Provider(e)),
    }
}
