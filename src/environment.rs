use std::env;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 2;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_UTILITY_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(ConfigError::Invalid {
                name: "LLM_PROVIDER",
                value: other.to_string(),
            }),
        }
    }
}

/// Runtime options for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Caps in-flight AI batch calls.
    pub concurrency_limit: usize,
    pub batch_size: usize,
    pub model: String,
    /// Model used for repair and other utility calls.
    pub utility_model: String,
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub ollama_host: String,
    pub ollama_port: u16,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub database_path: String,
    pub watchlist_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            model: DEFAULT_MODEL.to_string(),
            utility_model: DEFAULT_UTILITY_MODEL.to_string(),
            provider: ProviderKind::OpenAI,
            api_key: None,
            ollama_host: "http://localhost".to_string(),
            ollama_port: 11434,
            temperature: 0.0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            database_path: "prospector.db".to_string(),
            watchlist_enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let provider = match get("LLM_PROVIDER") {
            Some(value) => value.parse()?,
            None => defaults.provider,
        };

        let concurrency_limit = parse_or("CONCURRENCY_LIMIT", get("CONCURRENCY_LIMIT"), defaults.concurrency_limit)?;
        if concurrency_limit == 0 {
            return Err(ConfigError::Invalid {
                name: "CONCURRENCY_LIMIT",
                value: "0".to_string(),
            });
        }
        let batch_size = parse_or("ASSESSMENT_BATCH_SIZE", get("ASSESSMENT_BATCH_SIZE"), defaults.batch_size)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "ASSESSMENT_BATCH_SIZE",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            concurrency_limit,
            batch_size,
            model: get("LLM_MODEL").unwrap_or(defaults.model),
            utility_model: get("LLM_MODEL_UTILITY").unwrap_or(defaults.utility_model),
            provider,
            api_key: get("OPENAI_API_KEY"),
            ollama_host: get("OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            ollama_port: parse_or("OLLAMA_PORT", get("OLLAMA_PORT"), defaults.ollama_port)?,
            temperature: parse_or("LLM_TEMPERATURE", get("LLM_TEMPERATURE"), defaults.temperature)?,
            timeout_secs: parse_or("LLM_TIMEOUT_SECS", get("LLM_TIMEOUT_SECS"), defaults.timeout_secs)?,
            database_path: get("DATABASE_PATH").unwrap_or(defaults.database_path),
            watchlist_enabled: parse_or("WATCHLIST_ENABLED", get("WATCHLIST_ENABLED"), defaults.watchlist_enabled)?,
        })
    }

    /// Checks the options a run cannot start without.
    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.provider == ProviderKind::OpenAI && self.api_key.is_none() {
            return Err(ConfigError::Missing("OPENAI_API_KEY"));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.concurrency_limit, 2);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.provider, ProviderKind::OpenAI);
        assert!(config.watchlist_enabled);
    }

    #[test]
    fn test_missing_api_key_fails_verification() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.verify(), Err(ConfigError::Missing("OPENAI_API_KEY")));

        let config = PipelineConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert!(config.verify().is_ok());

        // Ollama runs without a key
        let config = PipelineConfig::from_lookup(lookup(&[("LLM_PROVIDER", "ollama")])).unwrap();
        assert!(config.verify().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            PipelineConfig::from_lookup(lookup(&[("CONCURRENCY_LIMIT", "many")])),
            Err(ConfigError::Invalid { name: "CONCURRENCY_LIMIT", .. })
        ));
        assert!(PipelineConfig::from_lookup(lookup(&[("CONCURRENCY_LIMIT", "0")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("LLM_PROVIDER", "bard")])).is_err());

        let config = PipelineConfig::from_lookup(lookup(&[
            ("CONCURRENCY_LIMIT", "4"),
            ("LLM_MODEL_UTILITY", "small-model"),
        ]))
        .unwrap();
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.utility_model, "small-model");
    }
}
