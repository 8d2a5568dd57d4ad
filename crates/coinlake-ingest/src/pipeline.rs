//! Collection orchestration
//!
//! Each `collect_*` call runs fetch, build and archive for one artifact and
//! reports failure as a value. [`Pipeline::run_dump`] walks the whole plan
//! strictly in sequence and tallies the outcome; no single failure stops it.

use chrono::Local;
use coinlake_common::types::{Dataset, ObjectKey};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::archive::{ArchiveReceipt, Archiver};
use crate::catalog::Catalog;
use crate::config::{Config, DumpConfig, LakeConfig};
use crate::error::PipelineError;
use crate::fetcher::{Fetcher, Sleeper};
use crate::storage::BlobStore;
use crate::table::{self, Metadata};

/// Outcome of one successful collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectReceipt {
    pub dataset: Dataset,
    /// Coin id for details, page label for markets
    pub id: Option<String>,
    #[serde(flatten)]
    pub archive: ArchiveReceipt,
}

/// Tally of a full dump
#[derive(Debug, Clone, Default, Serialize)]
pub struct DumpSummary {
    pub global_ok: bool,
    pub markets_ok: u32,
    pub markets_pages: u32,
    pub details_ok: usize,
    pub details_total: usize,
    pub receipts: Vec<CollectReceipt>,
}

impl DumpSummary {
    /// Number of objects the run should have left in the lake.
    pub fn expected_files(&self) -> usize {
        usize::from(self.global_ok) + self.markets_ok as usize + self.details_ok
    }

    pub fn is_complete(&self) -> bool {
        self.global_ok && self.markets_ok == self.markets_pages && self.details_ok == self.details_total
    }
}

pub struct Pipeline {
    fetcher: Fetcher,
    archiver: Archiver,
    catalog: Catalog,
    lake: LakeConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl Pipeline {
    pub fn new(config: &Config, store: Arc<dyn BlobStore>) -> Result<Self, PipelineError> {
        let fetcher = Fetcher::new(&config.api)?;
        Ok(Self::from_parts(
            fetcher,
            Archiver::new(store),
            Catalog::builtin()?,
            config.lake.clone(),
        ))
    }

    /// Courtesy delays between calls go through the fetcher's sleeper.
    pub fn from_parts(fetcher: Fetcher, archiver: Archiver, catalog: Catalog, lake: LakeConfig) -> Self {
        let sleeper = fetcher.sleeper();
        Self {
            fetcher,
            archiver,
            catalog,
            lake,
            sleeper,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn archiver(&self) -> &Archiver {
        &self.archiver
    }

    #[instrument(skip(self))]
    pub async fn collect_markets(
        &self,
        vs_currency: &str,
        per_page: u32,
        page: u32,
    ) -> Result<CollectReceipt, PipelineError> {
        let params = [
            ("vs_currency", vs_currency.to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
            ("sparkline", "false".to_string()),
            ("price_change_percentage", "1h,24h,7d,30d".to_string()),
        ];

        let body = self.fetcher.get("/coins/markets", &params).await?;
        if let Value::Array(items) = &body {
            info!(records = items.len(), "Received market listing");
        }

        let metadata = Metadata::for_markets(vs_currency, Local::now());
        self.store(Dataset::Markets, Some("raw"), body, &metadata).await
    }

    #[instrument(skip(self))]
    pub async fn collect_coin_details(&self, name: &str) -> Result<CollectReceipt, PipelineError> {
        let coin_id = self
            .catalog
            .resolve_id(name)
            .ok_or_else(|| PipelineError::UnknownCoin(name.to_string()))?
            .to_string();

        info!(coin_id = %coin_id, "Resolved coin");

        let params = [
            ("localization", "false".to_string()),
            ("tickers", "true".to_string()),
            ("market_data", "true".to_string()),
            ("community_data", "true".to_string()),
            ("developer_data", "true".to_string()),
            ("sparkline", "false".to_string()),
        ];

        let body = self.fetcher.get(&format!("/coins/{}", coin_id), &params).await?;

        let metadata = Metadata::for_coin_details(&coin_id, name, Local::now());
        self.store(Dataset::CoinDetails, Some(&coin_id), body, &metadata).await
    }

    #[instrument(skip(self))]
    pub async fn collect_global(&self) -> Result<CollectReceipt, PipelineError> {
        let body = self.fetcher.get("/global", &[]).await?;

        let metadata = Metadata::for_global(Local::now());
        self.store(Dataset::Global, None, body, &metadata).await
    }

    async fn store(
        &self,
        dataset: Dataset,
        id: Option<&str>,
        body: Value,
        metadata: &Metadata,
    ) -> Result<CollectReceipt, PipelineError> {
        let frame = table::build(body, metadata)?;
        info!(rows = frame.height(), columns = frame.width(), "Built table");

        let key = ObjectKey::new(&self.lake.root_prefix, dataset, id, metadata.ingested_at())?;
        let archive = self
            .archiver
            .archive(&frame, &self.lake.raw_bucket, &key.to_string())
            .await?;

        Ok(CollectReceipt {
            dataset,
            id: id.map(str::to_string),
            archive,
        })
    }

    /// Global stats, then every market page, then every catalog coin.
    pub async fn run_dump(&self, plan: &DumpConfig) -> DumpSummary {
        let mut summary = DumpSummary {
            markets_pages: plan.pages,
            details_total: self.catalog.len(),
            ..DumpSummary::default()
        };

        info!(
            pages = plan.pages,
            per_page = plan.per_page,
            coins = self.catalog.len(),
            "Starting full dump"
        );

        match self.collect_global().await {
            Ok(receipt) => {
                summary.global_ok = true;
                summary.receipts.push(receipt);
            },
            Err(e) => error!(error = %e, "Global stats collection failed"),
        }
        self.pause(plan.global_delay_secs).await;

        for page in 1..=plan.pages {
            match self.collect_markets(&plan.vs_currency, plan.per_page, page).await {
                Ok(receipt) => {
                    info!(page, records = receipt.archive.row_count, "Market page archived");
                    summary.markets_ok += 1;
                    summary.receipts.push(receipt);
                },
                Err(e) => error!(page, error = %e, "Market page collection failed"),
            }
            self.pause(plan.markets_delay_secs).await;
        }

        for (index, entry) in self.catalog.entries().iter().enumerate() {
            info!(
                progress = %format!("{}/{}", index + 1, summary.details_total),
                coin = %entry.label(),
                "Collecting coin details"
            );

            match self.collect_coin_details(&entry.id).await {
                Ok(receipt) => {
                    summary.details_ok += 1;
                    summary.receipts.push(receipt);
                },
                Err(e) => error!(coin_id = %entry.id, error = %e, "Coin detail collection failed"),
            }
            self.pause(plan.details_delay_secs).await;
        }

        if summary.is_complete() {
            info!(files = summary.expected_files(), "Dump finished");
        } else {
            warn!(
                global_ok = summary.global_ok,
                markets = %format!("{}/{}", summary.markets_ok, summary.markets_pages),
                details = %format!("{}/{}", summary.details_ok, summary.details_total),
                "Dump finished with failures"
            );
        }

        summary
    }

    async fn pause(&self, secs: u64) {
        if secs > 0 {
            self.sleeper.sleep(Duration::from_secs(secs)).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let summary = DumpSummary {
            global_ok: true,
            markets_ok: 4,
            markets_pages: 5,
            details_ok: 15,
            details_total: 15,
            receipts: Vec::new(),
        };
        assert_eq!(summary.expected_files(), 20);
        assert!(!summary.is_complete());

        let empty = DumpSummary::default();
        assert_eq!(empty.expected_files(), 0);
        assert!(!empty.is_complete());

        let full = DumpSummary {
            global_ok: true,
            markets_ok: 5,
            markets_pages: 5,
            details_ok: 15,
            details_total: 15,
            receipts: Vec::new(),
        };
        assert_eq!(full.expected_files(), 21);
        assert!(full.is_complete());
    }

    #[tokio::test]
    async fn test_unknown_coin_makes_no_request() {
        let config = Config::default();
        let store = Arc::new(crate::storage::MemoryBlobStore::new());
        let pipeline = Pipeline::new(&config, store).unwrap();

        let err = pipeline.collect_coin_details("zcash").await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownCoin(name) if name == "zcash"));
    }
}
