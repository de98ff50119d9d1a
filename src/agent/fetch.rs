//! Network access from the page context.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::capture::CaptureError;

pub const DEFAULT_USER_AGENT: &str = concat!("pagepack/", env!("CARGO_PKG_VERSION"));

/// Fetches page resources as text
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch `url` and return its body. Non-success statuses are errors.
    async fn fetch_text(&self, url: &Url) -> Result<String, CaptureError>;

    /// Fetch a page document, returning the URL it was finally served from.
    async fn fetch_document(&self, url: &Url) -> Result<(Url, String), CaptureError> {
        let body = self.fetch_text(url).await?;
        Ok((url.clone(), body))
    }
}

/// `reqwest`-backed fetcher with a bounded per-request timeout
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> reqwest::Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client, timeout })
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response, CaptureError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.fetch_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        Ok(response)
    }

    fn fetch_error(&self, url: &Url, err: reqwest::Error) -> CaptureError {
        let reason = if err.is_timeout() {
            format!("timed out after {}s", self.timeout.as_secs_f32())
        } else {
            err.to_string()
        };
        CaptureError::Fetch {
            url: url.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, CaptureError> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| self.fetch_error(url, e))
    }

    async fn fetch_document(&self, url: &Url) -> Result<(Url, String), CaptureError> {
        let response = self.get(url).await?;
        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| self.fetch_error(url, e))?;
        Ok((final_url, body))
    }
}
