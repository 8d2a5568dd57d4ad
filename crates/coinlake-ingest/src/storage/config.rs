use coinlake_common::{LakeError, Result};
use serde::{Deserialize, Serialize};

use crate::config::Vars;

/// Default object store endpoint (local MinIO).
pub const DEFAULT_MINIO_ENDPOINT: &str = "localhost:9000";

/// Development-only credentials matching a stock local MinIO setup.
/// Never use these against a production store.
pub const DEFAULT_MINIO_ACCESS_KEY: &str = "minioadmin";
pub const DEFAULT_MINIO_SECRET_KEY: &str = "minioadmin123";

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Full endpoint URL. `None` targets AWS S3 proper.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::for_minio(DEFAULT_MINIO_ENDPOINT, false)
    }
}

impl StorageConfig {
    /// Read `MINIO_*` variables (with `AWS_*` credential fallbacks).
    ///
    /// `MINIO_ENDPOINT` may be a bare `host:port`, in which case the scheme
    /// comes from `MINIO_SECURE`. An explicitly empty `MINIO_ENDPOINT`
    /// selects AWS S3 with virtual-hosted addressing.
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let secure = vars.parsed("MINIO_SECURE").unwrap_or(false);

        let endpoint = match lookup("MINIO_ENDPOINT") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(normalize_endpoint(&raw, secure)),
            None => Some(normalize_endpoint(DEFAULT_MINIO_ENDPOINT, secure)),
        };

        let path_style = vars.parsed("MINIO_PATH_STYLE").unwrap_or(endpoint.is_some());

        Self {
            endpoint,
            region: vars.get("MINIO_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key: vars
                .get("MINIO_ACCESS_KEY")
                .or_else(|| vars.get("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|| DEFAULT_MINIO_ACCESS_KEY.to_string()),
            secret_key: vars
                .get("MINIO_SECRET_KEY")
                .or_else(|| vars.get("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|| DEFAULT_MINIO_SECRET_KEY.to_string()),
            path_style,
        }
    }

    pub fn for_minio(endpoint: &str, secure: bool) -> Self {
        Self {
            endpoint: Some(normalize_endpoint(endpoint, secure)),
            region: DEFAULT_REGION.to_string(),
            access_key: DEFAULT_MINIO_ACCESS_KEY.to_string(),
            secret_key: DEFAULT_MINIO_SECRET_KEY.to_string(),
            path_style: true,
        }
    }

    pub fn uses_default_credentials(&self) -> bool {
        self.access_key == DEFAULT_MINIO_ACCESS_KEY && self.secret_key == DEFAULT_MINIO_SECRET_KEY
    }

    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(LakeError::config("Storage region cannot be empty"));
        }

        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(LakeError::config("Storage credentials cannot be empty"));
        }

        if self.endpoint.is_none() && self.uses_default_credentials() {
            return Err(LakeError::config(
                "Default development credentials cannot be used against AWS S3; set MINIO_ACCESS_KEY and MINIO_SECRET_KEY",
            ));
        }

        Ok(())
    }
}

fn normalize_endpoint(endpoint: &str, secure: bool) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.contains("://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{}", endpoint)
    } else {
        format!("http://{}", endpoint)
    }
}
