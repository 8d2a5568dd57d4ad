//! Coinlake Ingest Library
//!
//! Pulls crypto market data from a CoinGecko-compatible REST API and archives
//! it, largely unmodified, as Parquet objects in an S3-compatible raw bucket.
//!
//! # Components
//!
//! - **[`fetcher`]**: GET with bounded retries and a rate-limit cooldown
//! - **[`table`]**: JSON to a polars frame, with metadata injection and sanitizing
//! - **[`archive`]**: in-memory Parquet encoding and upload
//! - **[`catalog`]**: free-text coin name to canonical id
//! - **[`pipeline`]**: the collections and the full dump
//! - **[`storage`]**: the blob store seam (S3/MinIO, in-memory)
//!
//! # Example
//!
//! ```no_run
//! use coinlake_ingest::{config::Config, pipeline::Pipeline, storage::S3BlobStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = Arc::new(S3BlobStore::new(&config.storage).await);
//!     let pipeline = Pipeline::new(&config, store)?;
//!
//!     let summary = pipeline.run_dump(&config.dump).await;
//!     println!("{} files written", summary.expected_files());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod storage;
pub mod table;

pub use error::{ArchiveError, CatalogError, FetchError, PipelineError, StorageError, TableError};
pub use storage::{BlobStore, MemoryBlobStore, S3BlobStore};
