//! AI provider seam and the concrete OpenAI / Ollama clients.

pub mod parse;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    ResponseFormatJsonSchema,
};
use async_openai::Client as OpenAIClient;
use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use ollama_rs::generation::parameters::FormatType;
use ollama_rs::Ollama;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::environment::{PipelineConfig, ProviderKind};
use crate::error::{ConfigError, ProviderError};
use crate::schema::SchemaName;
use crate::TARGET_LLM_REQUEST;

use parse::{classify_ollama_error, classify_openai_error, parse_json_reply};

const MAX_RETRIES: u32 = 3;

/// Which configured model a call should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelHint {
    Primary,
    /// Repair and other utility calls.
    Utility,
}

/// Anything that can turn a prompt into structured output for a named schema.
///
/// Implementations return parsed JSON; contract validation is the caller's job.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn complete(&self, prompt: &str, schema: SchemaName, model_hint: ModelHint) -> Result<Value, ProviderError>;
}

#[derive(Clone, Debug)]
pub enum LLMClient {
    Ollama(Ollama),
    OpenAI(OpenAIClient<OpenAIConfig>),
}

/// A concrete provider with its models and retry settings.
#[derive(Clone, Debug)]
pub struct LLMProvider {
    pub llm_client: LLMClient,
    pub model: String,
    pub utility_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl LLMProvider {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let llm_client = match config.provider {
            ProviderKind::OpenAI => {
                let api_key = config.api_key.clone().ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
                LLMClient::OpenAI(OpenAIClient::with_config(OpenAIConfig::new().with_api_key(api_key)))
            }
            ProviderKind::Ollama => {
                info!(target: TARGET_LLM_REQUEST, "Connecting to Ollama at {}:{}", config.ollama_host, config.ollama_port);
                LLMClient::Ollama(Ollama::new(config.ollama_host.clone(), config.ollama_port))
            }
        };

        Ok(Self {
            llm_client,
            model: config.model.clone(),
            utility_model: config.utility_model.clone(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    fn model_for(&self, hint: ModelHint) -> &str {
        match hint {
            ModelHint::Primary => &self.model,
            ModelHint::Utility => &self.utility_model,
        }
    }

    async fn send_once(&self, prompt: &str, schema: SchemaName, model: &str) -> Result<String, ProviderError> {
        match &self.llm_client {
            LLMClient::OpenAI(client) => {
                let message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(|e| ProviderError::Malformed(e.to_string()))?
                    .into();
                let request = CreateChatCompletionRequestArgs::default()
                    .model(model)
                    .temperature(self.temperature)
                    .messages(vec![message])
                    .response_format(ResponseFormat::JsonSchema {
                        json_schema: ResponseFormatJsonSchema {
                            description: None,
                            name: schema.as_str().to_string(),
                            schema: Some(schema.json_schema()),
                            strict: Some(false),
                        },
                    })
                    .build()
                    .map_err(|e| ProviderError::Malformed(e.to_string()))?;

                let response = client
                    .chat()
                    .create(request)
                    .await
                    .map_err(|e| classify_openai_error(&e))?;

                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .ok_or(ProviderError::EmptyResponse)
            }
            LLMClient::Ollama(ollama) => {
                let mut request = GenerationRequest::new(model.to_string(), prompt.to_string());
                request.options = Some(GenerationOptions::default().temperature(self.temperature));
                request.format = Some(FormatType::Json);

                ollama
                    .generate(request)
                    .await
                    .map(|response| response.response)
                    .map_err(|e| classify_ollama_error(&e))
            }
        }
    }
}

#[async_trait]
impl AiProvider for LLMProvider {
    async fn complete(&self, prompt: &str, schema: SchemaName, model_hint: ModelHint) -> Result<Value, ProviderError> {
        let model = self.model_for(model_hint);
        let mut backoff = 2;
        let mut last_error = ProviderError::EmptyResponse;

        debug!(target: TARGET_LLM_REQUEST, "[{} {}]: sending prompt: {}", model, schema, prompt);

        for retry_count in 0..MAX_RETRIES {
            let outcome = timeout(
                Duration::from_secs(self.timeout_secs),
                self.send_once(prompt, schema, model),
            )
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.timeout_secs)));

            match outcome {
                Ok(text) => {
                    debug!(target: TARGET_LLM_REQUEST, "[{} {}]: response received: {}", model, schema, text);
                    return parse_json_reply(&text);
                }
                Err(e @ ProviderError::Auth(_)) => {
                    error!(target: TARGET_LLM_REQUEST, "[{} {}]: authentication failed: {}", model, schema, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(target: TARGET_LLM_REQUEST, "[{} {}]: request failed: {}", model, schema, e);
                    last_error = e;
                }
            }

            if retry_count < MAX_RETRIES - 1 {
                info!(target: TARGET_LLM_REQUEST, "[{} {}]: retrying in {}s ({}/{})", model, schema, backoff, retry_count + 1, MAX_RETRIES);
                sleep(Duration::from_secs(backoff)).await;
                backoff *= 2;
            }
        }

        error!(target: TARGET_LLM_REQUEST, "[{} {}]: no response after {} attempts", model, schema, MAX_RETRIES);
        Err(last_error)
    }
}
