//! Common types used across coinlake

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{LakeError, Result};

/// File extension of every archived object.
pub const PARQUET_EXTENSION: &str = "parquet";

/// Content type set on uploaded archive objects.
pub const PARQUET_CONTENT_TYPE: &str = "application/parquet";

/// Logical dataset an archived object belongs to.
///
/// Each dataset owns one partition directory in the raw bucket and tags its
/// rows with a `_data_source` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Paginated market listing snapshots (`/coins/markets`)
    Markets,
    /// Per-coin detail snapshots (`/coins/{id}`)
    CoinDetails,
    /// Global market statistics (`/global`)
    Global,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Markets, Dataset::CoinDetails, Dataset::Global];

    /// Partition directory and file stem of the dataset.
    pub fn name(self) -> &'static str {
        match self {
            Dataset::Markets => "markets",
            Dataset::CoinDetails => "coin_details",
            Dataset::Global => "global",
        }
    }

    /// Value written into the `_data_source` metadata column.
    pub fn data_source(self) -> &'static str {
        match self {
            Dataset::Markets => "coingecko_markets",
            Dataset::CoinDetails => "coingecko_coin_details",
            Dataset::Global => "coingecko_global",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Dataset {
    type Err = LakeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "markets" | "market" => Ok(Dataset::Markets),
            "coin_details" | "details" | "coin" => Ok(Dataset::CoinDetails),
            "global" => Ok(Dataset::Global),
            other => Err(LakeError::UnknownDataset(other.to_string())),
        }
    }
}

/// Storage key of one archived object.
///
/// Rendered as `<root>/<dataset>/<YYYY-MM-DD>/<dataset>[_<id>]_<HHMMSS>.parquet`.
/// Keys are unique per dataset and id at one-second granularity: two objects
/// of the same dataset and id created within the same wall-clock second share
/// a key, and the later upload replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    root: String,
    dataset: Dataset,
    id: Option<String>,
    at: NaiveDateTime,
}

impl ObjectKey {
    /// Build the key for an object created at `at` (local wall-clock time of
    /// the given zone is used for the partition date and file time).
    pub fn new<Tz: TimeZone>(
        root: &str,
        dataset: Dataset,
        id: Option<&str>,
        at: DateTime<Tz>,
    ) -> Result<Self> {
        if let Some(id) = id {
            validate_component(id)?;
        }

        Ok(Self {
            root: root.trim_matches('/').to_string(),
            dataset,
            id: id.map(str::to_string),
            at: at.naive_local(),
        })
    }

    pub fn dataset(&self) -> Dataset {
        self.dataset
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn date(&self) -> NaiveDate {
        self.at.date()
    }

    /// Directory holding every object of this key's dataset and day.
    pub fn prefix(&self) -> String {
        day_prefix(&self.root, self.dataset, self.date())
    }

    pub fn file_name(&self) -> String {
        let time = self.at.format("%H%M%S");
        match &self.id {
            Some(id) => format!("{}_{}_{}.{}", self.dataset, id, time, PARQUET_EXTENSION),
            None => format!("{}_{}.{}", self.dataset, time, PARQUET_EXTENSION),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.prefix(), self.file_name())
    }
}

/// Listing prefix for one dataset, optionally narrowed to one day.
pub fn dataset_prefix(root: &str, dataset: Dataset, date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => day_prefix(root, dataset, date),
        None => {
            let root = root.trim_matches('/');
            if root.is_empty() {
                format!("{}/", dataset)
            } else {
                format!("{}/{}/", root, dataset)
            }
        },
    }
}

fn day_prefix(root: &str, dataset: Dataset, date: NaiveDate) -> String {
    format!(
        "{}{}/",
        dataset_prefix(root, dataset, None),
        date.format("%Y-%m-%d")
    )
}

/// Parse a `YYYY-MM-DD` partition date.
pub fn parse_partition_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| LakeError::InvalidDate(s.to_string()))
}

fn validate_component(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(LakeError::InvalidKey("identifier cannot be empty".to_string()));
    }

    if id.contains('/') || id.chars().any(char::is_whitespace) {
        return Err(LakeError::InvalidKey(format!(
            "identifier '{}' contains '/' or whitespace",
            id
        )));
    }

    Ok(())
}
