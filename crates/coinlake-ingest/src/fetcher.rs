//! HTTP fetcher with bounded retries
//!
//! Every request gets up to `max_attempts` tries:
//!
//! - HTTP 200: the decoded JSON body is returned at once.
//! - HTTP 429: sleep the rate-limit cooldown, then move to the next attempt
//!   without the generic retry delay.
//! - anything else (other status, timeout, connection error, bad body):
//!   sleep the retry delay unless it was the last attempt.
//!
//! Running out of attempts yields [`FetchError::Exhausted`]; it never panics.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::ApiConfig;
use crate::error::{AttemptError, FetchError};

/// Maximum number of body bytes quoted in error messages.
const ERROR_BODY_PREVIEW: usize = 200;

/// Waits between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry timing of the fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_cooldown: Duration,
    pub retry_delay: Duration,
}

impl From<&ApiConfig> for RetryPolicy {
    fn from(api: &ApiConfig) -> Self {
        Self {
            max_attempts: api.max_attempts,
            rate_limit_cooldown: api.rate_limit_cooldown(),
            retry_delay: api.retry_delay(),
        }
    }
}

/// Request parameters, sent as the query string
pub type Params<'a> = [(&'a str, String)];

pub struct Fetcher {
    client: Client,
    api: ApiConfig,
    auth: Option<(String, String)>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Fetcher {
    pub fn new(api: &ApiConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(api.timeout())
            .user_agent(api.user_agent.as_str())
            .build()?;

        // The key is only sent when a header name is configured.
        let auth = match (&api.api_key_header, &api.api_key) {
            (Some(header), Some(key)) => Some((header.clone(), key.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            api: api.clone(),
            auth,
            policy: RetryPolicy::from(api),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::clone(&self.sleeper)
    }

    /// Absolute URL of an endpoint path such as `/coins/markets`.
    pub fn url(&self, endpoint: &str) -> String {
        self.api.endpoint_url(endpoint)
    }

    /// GET an endpoint with the configured attempt budget.
    pub async fn get(&self, endpoint: &str, params: &Params<'_>) -> Result<Value, FetchError> {
        self.fetch(&self.url(endpoint), params, self.policy.max_attempts)
            .await
    }

    /// Single-attempt health check against `/ping`.
    pub async fn ping(&self) -> Result<Value, FetchError> {
        self.fetch(&self.url("/ping"), &[], 1).await
    }

    #[instrument(skip(self, params))]
    pub async fn fetch(
        &self,
        url: &str,
        params: &Params<'_>,
        max_attempts: u32,
    ) -> Result<Value, FetchError> {
        if max_attempts == 0 {
            return Err(FetchError::InvalidRequest(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let mut last = AttemptError::Other("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            let is_last = attempt == max_attempts;
            debug!(attempt, max_attempts, "Sending request");

            match self.attempt(url, params).await {
                Ok(body) => {
                    info!(attempt, "Request succeeded");
                    return Ok(body);
                },
                Err(AttemptError::RateLimited) => {
                    warn!(attempt, max_attempts, "Rate limited by upstream API");
                    last = AttemptError::RateLimited;

                    if !is_last {
                        info!(
                            cooldown_secs = self.policy.rate_limit_cooldown.as_secs(),
                            "Cooling down before next attempt"
                        );
                        self.sleeper.sleep(self.policy.rate_limit_cooldown).await;
                    }
                },
                Err(err) => {
                    warn!(attempt, max_attempts, kind = err.kind(), error = %err, "Request failed");
                    last = err;

                    if !is_last {
                        info!(
                            delay_secs = self.policy.retry_delay.as_secs(),
                            "Waiting before next attempt"
                        );
                        self.sleeper.sleep(self.policy.retry_delay).await;
                    }
                },
            }
        }

        warn!(attempts = max_attempts, "All attempts failed");

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: max_attempts,
            last,
        })
    }

    async fn attempt(&self, url: &str, params: &Params<'_>) -> Result<Value, AttemptError> {
        let mut request = self.client.get(url);

        if !params.is_empty() {
            request = request.query(params);
        }

        if let Some((header, key)) = &self.auth {
            request = request.header(header.as_str(), key.as_str());
        }

        let response = request.send().await.map_err(AttemptError::from_reqwest)?;
        let status = response.status();

        if status == StatusCode::OK {
            return response.json::<Value>().await.map_err(AttemptError::from_reqwest);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::RateLimited);
        }

        let body = response
            .text()
            .await
            .map(|text| preview(&text))
            .unwrap_or_default();

        if status.is_client_error() {
            Err(AttemptError::Rejected {
                status: status.as_u16(),
                body,
            })
        } else if status.is_server_error() {
            Err(AttemptError::Server {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(AttemptError::Other(format!("unexpected HTTP {}", status)))
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(ERROR_BODY_PREVIEW) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
