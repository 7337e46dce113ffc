use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use tracing::warn;

use crate::settings::Settings;

/// Source of raw page bodies. The crawl only sees "body" or "skipped".
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
    backoff_ms: u64,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
            backoff_ms: settings.backoff_ms,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Result<String, StatusCode>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(Err(status));
        }
        Ok(Ok(response.text().await?))
    }
}

const MAX_BACKOFF_MS: u64 = 60_000;

/// `base_ms * 2^attempt`, capped at one minute.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let ms = 2u64
        .checked_pow(attempt)
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        for attempt in 0..=self.max_retries {
            match self.fetch_once(url).await? {
                Ok(body) => return Ok(body),
                Err(status) if should_retry(status) && attempt < self.max_retries => {
                    let backoff = backoff_delay(self.backoff_ms, attempt);
                    warn!(
                        "HTTP {} on {} (attempt {}/{}), backing off {:.1}s",
                        status,
                        url,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(status) => return Err(anyhow!("HTTP {} for {}", status, url)),
            }
        }
        Err(anyhow!("Retries exhausted for {}", url))
    }
}
