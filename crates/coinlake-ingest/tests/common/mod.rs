//! Shared helpers for coinlake-ingest integration tests
//!
//! - [`RecordingSleeper`] stands in for the timer so retry and courtesy
//!   delays are observed instead of waited out
//! - [`api_config`] points the fetcher at a wiremock server

#![allow(dead_code)]

use async_trait::async_trait;
use coinlake_ingest::config::ApiConfig;
use coinlake_ingest::fetcher::{Fetcher, Sleeper};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::MockServer;

/// Base path the mock API is mounted under.
pub const API_PREFIX: &str = "/api/v3";

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.slept().into_iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

pub fn api_config(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: format!("{}{}", server.uri(), API_PREFIX),
        timeout_secs: 2,
        ..ApiConfig::default()
    }
}

pub fn api_path(endpoint: &str) -> String {
    format!("{}{}", API_PREFIX, endpoint)
}

/// Fetcher against `server` whose sleeps are recorded.
pub fn fetcher(server: &MockServer, max_attempts: u32) -> (Fetcher, Arc<RecordingSleeper>) {
    let api = ApiConfig {
        max_attempts,
        ..api_config(server)
    };
    let sleeper = RecordingSleeper::new();
    let fetcher = Fetcher::new(&api)
        .expect("Failed to build fetcher")
        .with_sleeper(sleeper.clone());
    (fetcher, sleeper)
}
