use std::fmt;
use tracing::{error, info};

use crate::db::Persistence;
use crate::environment::PipelineConfig;
use crate::error::FatalError;
use crate::TARGET_PIPELINE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Ready,
    /// Initialization was attempted and failed; a later attempt may succeed.
    Failed(String),
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitState::Uninitialized => f.write_str("uninitialized"),
            InitState::Ready => f.write_str("ready"),
            InitState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Gates pipeline runs on verified configuration and reachable persistence.
#[derive(Debug)]
pub struct InitContext {
    state: InitState,
    config: Option<PipelineConfig>,
}

impl Default for InitContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InitContext {
    pub fn new() -> Self {
        Self {
            state: InitState::Uninitialized,
            config: None,
        }
    }

    pub fn state(&self) -> &InitState {
        &self.state
    }

    /// Verifies configuration and persistence. Once `Ready`, further calls
    /// return immediately without touching persistence.
    pub async fn initialize(&mut self, config: PipelineConfig, persistence: &dyn Persistence) -> Result<(), FatalError> {
        if self.state == InitState::Ready {
            return Ok(());
        }

        if let Err(e) = config.verify() {
            error!(target: TARGET_PIPELINE, "Configuration check failed: {}", e);
            self.state = InitState::Failed(e.to_string());
            return Err(e.into());
        }
        if let Err(e) = persistence.ping().await {
            error!(target: TARGET_PIPELINE, "Persistence check failed: {}", e);
            self.state = InitState::Failed(e.to_string());
            return Err(e.into());
        }

        info!(target: TARGET_PIPELINE, "Pipeline ready (provider {:?}, model {})", config.provider, config.model);
        self.config = Some(config);
        self.state = InitState::Ready;
        Ok(())
    }

    /// The verified configuration, or `NotInitialized` unless `Ready`.
    pub fn ensure_ready(&self) -> Result<&PipelineConfig, FatalError> {
        match (&self.state, &self.config) {
            (InitState::Ready, Some(config)) => Ok(config),
            (state, _) => Err(FatalError::NotInitialized(state.to_string())),
        }
    }
}
