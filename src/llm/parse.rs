use async_openai::error::OpenAIError;
use lazy_static::lazy_static;
use ollama_rs::error::OllamaError;
use regex::Regex;
use serde_json::Value;

use crate::error::ProviderError;

lazy_static! {
    static ref THINK_BLOCK: Regex = Regex::new(r"(?s)<think>.*?</think>").unwrap();
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```$").unwrap();
    static ref AUTH_STATUS: Regex = Regex::new(r"\b401\b").unwrap();
    static ref RATE_LIMIT_STATUS: Regex = Regex::new(r"\b429\b").unwrap();
}

/// Removes `<think>...</think>` blocks emitted by reasoning models.
pub fn strip_thinking_tags(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

/// Parses a model reply as JSON, tolerating thinking blocks and markdown fences.
pub fn parse_json_reply(raw: &str) -> Result<Value, ProviderError> {
    let cleaned = strip_thinking_tags(raw);
    if cleaned.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    let body = match CODE_FENCE.captures(&cleaned) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string(),
        None => cleaned,
    };
    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        ProviderError::Malformed(format!("{} (reply starts: {:?})", e, preview))
    })
}

/// Maps an HTTP status from the provider to the error taxonomy.
pub fn classify_status(status: u16, message: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(message.to_string()),
        429 => ProviderError::RateLimited(message.to_string()),
        _ => ProviderError::Transport(message.to_string()),
    }
}

/// Maps an OpenAI error object (`code` and `type` fields) to the error taxonomy.
pub fn classify_api_error(code: Option<&str>, kind: Option<&str>, message: &str) -> ProviderError {
    match (code, kind) {
        (Some("invalid_api_key" | "invalid_organization" | "insufficient_quota"), _)
        | (_, Some("authentication_error" | "insufficient_quota")) => ProviderError::Auth(message.to_string()),
        (Some("rate_limit_exceeded"), _) | (_, Some("rate_limit_exceeded" | "requests" | "tokens")) => {
            ProviderError::RateLimited(message.to_string())
        }
        _ => classify_error(message),
    }
}

/// Maps an async-openai failure to the error taxonomy.
pub fn classify_openai_error(error: &OpenAIError) -> ProviderError {
    match error {
        OpenAIError::ApiError(api) => classify_api_error(api.code.as_deref(), api.r#type.as_deref(), &api.message),
        OpenAIError::Reqwest(e) => match e.status() {
            Some(status) => classify_status(status.as_u16(), &e.to_string()),
            None => ProviderError::Transport(e.to_string()),
        },
        OpenAIError::JSONDeserialize(e) => ProviderError::Malformed(e.to_string()),
        other => ProviderError::Transport(other.to_string()),
    }
}

/// Maps an ollama-rs failure to the error taxonomy.
pub fn classify_ollama_error(error: &OllamaError) -> ProviderError {
    match error {
        OllamaError::ReqwestError(e) => match e.status() {
            Some(status) => classify_status(status.as_u16(), &e.to_string()),
            None => ProviderError::Transport(e.to_string()),
        },
        other => classify_error(&other.to_string()),
    }
}

/// Fallback classification of a bare error message.
///
/// Status codes only count as standalone words, so token counts and ids never match.
pub fn classify_error(message: &str) -> ProviderError {
    let lower = message.to_lowercase();
    if lower.contains("invalid_api_key")
        || lower.contains("incorrect api key")
        || lower.contains("unauthorized")
        || AUTH_STATUS.is_match(&lower)
    {
        ProviderError::Auth(message.to_string())
    } else if lower.contains("rate limit") || lower.contains("rate_limit") || RATE_LIMIT_STATUS.is_match(&lower) {
        ProviderError::RateLimited(message.to_string())
    } else {
        ProviderError::Transport(message.to_string())
    }
}
