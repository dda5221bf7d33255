pub mod assess;
pub mod cluster;
pub mod db;
pub mod environment;
pub mod error;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod types;
pub mod watchlist;

#[cfg(test)]
pub(crate) mod testing;

pub use environment::PipelineConfig;
pub use error::{ConfigError, FatalError, PersistenceError, ProviderError};
pub use llm::{AiProvider, LLMClient};
pub use pipeline::{InitContext, InitState, PipelineCoordinator, RunReport};
pub use schema::SchemaName;
pub use types::*;

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_DB: &str = "db_query";
pub const TARGET_EXTRACT: &str = "extract";
pub const TARGET_PIPELINE: &str = "pipeline";
