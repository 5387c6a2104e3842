//! reqwest-backed [`JsonFetcher`].

use super::{FetchRequest, JsonFetcher};
use crate::config::HttpConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Shared HTTP client with bounded retry.
///
/// Transport errors and 5xx responses are retried up to `max_retries` times,
/// waiting `retry_backoff_ms`, then twice that, and so on. Everything else is
/// returned on the first attempt.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(config.user_agent.as_str()).build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Delay before retry number `attempt` (0-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    async fn send_once(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(&request.url)
            .query(&request.query)
            .timeout(request.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(120).collect();
            FetchError::shape(format!("invalid JSON ({e}): {preview}"))
        })
    }
}

#[async_trait]
impl JsonFetcher for HttpFetcher {
    #[instrument(skip(self, request), fields(source = request.source, url = %request.url))]
    async fn get_json(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(error = %e, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => {
                    debug!(ok = result.is_ok(), attempts = attempt + 1, "request finished");
                    return result;
                }
            }
        }
    }
}
