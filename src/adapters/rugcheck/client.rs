use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::types::RawReport;
use crate::ports::reputation::{ReputationError, ReputationProvider, ReputationReport};

pub const RUGCHECK_API: &str = "https://api.rugcheck.xyz";
const DEFAULT_MAX_RETRIES: u32 = 3;
const MAX_RATE_LIMIT_WAIT_SECS: u64 = 10;

/// Wait after the `attempt`-th 429, starting at 0
pub fn rate_limit_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(MAX_RATE_LIMIT_WAIT_SECS))
}

pub struct RugCheckClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RugCheckClient {
    pub fn new(api_key: Option<String>) -> Result<Self, ReputationError> {
        Self::with_base_url(RUGCHECK_API, api_key)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ReputationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ReputationError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(1),
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    async fn fetch(&self, mint: &str) -> Result<RawReport, ReputationError> {
        let url = format!("{}/v1/tokens/{}/report", self.base_url, mint);
        let mut last_error = ReputationError::Http("no attempts made".to_string());

        for attempt in 0..self.max_retries {
            let mut request = self.http.get(&url);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let wait = rate_limit_backoff(attempt);
                        warn!("RugCheck rate limited, waiting {}s", wait.as_secs());
                        tokio::time::sleep(wait).await;
                        last_error = ReputationError::RateLimited(attempt + 1);
                        continue;
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(ReputationError::NotFound(mint.to_string()));
                    }
                    if status.is_success() {
                        return response
                            .json::<RawReport>()
                            .await
                            .map_err(|e| ReputationError::Parse(e.to_string()));
                    }
                    warn!("RugCheck HTTP error {}", status);
                    last_error = ReputationError::Status(status.as_u16());
                }
                Err(e) => {
                    warn!("RugCheck request error: {}", e);
                    last_error = ReputationError::Http(e.to_string());
                }
            }

            if attempt + 1 < self.max_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl ReputationProvider for RugCheckClient {
    async fn get_report(&self, mint: &str) -> Result<ReputationReport, ReputationError> {
        debug!("Fetching RugCheck report for {}", mint);
        let raw = self.fetch(mint).await?;
        Ok(raw.into_report(mint))
    }
}
