use async_trait::async_trait;
use reqwest::{cookie::Jar, header};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::types::Source;
use crate::TARGET_WEB_REQUEST;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("no page available for {0}")]
    Missing(String),
}

/// Retrieves the HTML page of a source.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<String, FetchError>;
}

/// Fetches source pages over HTTP.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .cookie_provider(Arc::new(Jar::default()))
            .gzip(true)
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::default())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, source: &Source) -> Result<String, FetchError> {
        debug!(target: TARGET_WEB_REQUEST, "Fetching {} for {}", source.url, source.id);
        let response = self
            .client
            .get(&source.url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Serves pre-loaded pages keyed by source id.
#[derive(Debug, Default, Clone)]
pub struct StaticPages {
    pages: HashMap<String, String>,
}

impl StaticPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, source_id: &str, html: &str) -> Self {
        self.pages.insert(source_id.to_string(), html.to_string());
        self
    }
}

#[async_trait]
impl PageFetcher for StaticPages {
    async fn fetch(&self, source: &Source) -> Result<String, FetchError> {
        self.pages
            .get(&source.id)
            .cloned()
            .ok_or_else(|| FetchError::Missing(source.id.clone()))
    }
}
