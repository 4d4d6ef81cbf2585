use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;

/// A successfully fetched (2xx) document.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timeout fetching {0}")]
    Timeout(String),
    #[error("connection error fetching {0}")]
    Connect(String),
    #[error("HTTP error {status} fetching {url}")]
    Status { url: String, status: u16 },
    #[error("unexpected error fetching {url}: {reason}")]
    Request { url: String, reason: String },
}

/// Source of pages for the crawler. Every call is bounded by a timeout;
/// any failure comes back as a [`FetchError`] for the caller to absorb.
pub trait PageClient {
    async fn get(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed client with a fixed timeout and browser-like User-Agent.
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpClient { client })
    }
}

impl PageClient for HttpClient {
    async fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        info!("Fetching: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| classify(url, e))?;
        Ok(FetchedPage {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else if err.is_connect() {
        FetchError::Connect(url.to_string())
    } else if let Some(status) = err.status() {
        FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
