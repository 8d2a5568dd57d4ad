//! Parquet serialization and upload

use coinlake_common::types::PARQUET_CONTENT_TYPE;
use polars::prelude::{DataFrame, ParquetCompression, ParquetWriter};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::ArchiveError;
use crate::storage::BlobStore;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// What was persisted by one successful archive call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveReceipt {
    pub bucket: String,
    pub path: String,
    pub size_bytes: u64,
    /// Size in MiB rounded to two decimals
    pub size_mb: f64,
    pub row_count: usize,
    pub column_count: usize,
}

/// Encode a frame as a Snappy-compressed Parquet file held in memory.
pub fn encode_parquet(frame: &DataFrame) -> Result<Vec<u8>, ArchiveError> {
    let mut buffer = Vec::new();
    ParquetWriter::new(&mut buffer)
        .with_compression(ParquetCompression::Snappy)
        .finish(&mut frame.clone())?;

    Ok(buffer)
}

pub fn size_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}

#[derive(Clone)]
pub struct Archiver {
    store: Arc<dyn BlobStore>,
}

impl Archiver {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    #[instrument(skip(self, frame), fields(rows = frame.height()))]
    pub async fn archive(
        &self,
        frame: &DataFrame,
        bucket: &str,
        path: &str,
    ) -> Result<ArchiveReceipt, ArchiveError> {
        let data = encode_parquet(frame)?;

        let upload = self
            .store
            .put_object(bucket, path, data, PARQUET_CONTENT_TYPE)
            .await
            .map_err(|source| ArchiveError::Upload {
                key: path.to_string(),
                source,
            })?;

        let receipt = ArchiveReceipt {
            bucket: upload.bucket,
            path: upload.key,
            size_bytes: upload.size,
            size_mb: size_mb(upload.size),
            row_count: frame.height(),
            column_count: frame.width(),
        };

        info!(
            bucket = %receipt.bucket,
            path = %receipt.path,
            size_mb = receipt.size_mb,
            columns = receipt.column_count,
            "Archived object"
        );

        Ok(receipt)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::MemoryBlobStore;
    use polars::prelude::{df, ParquetReader, SerReader};
    use std::io::Cursor;

    fn sample_frame() -> DataFrame {
        df!(
            "id" => ["bitcoin", "ethereum"],
            "price" => [Some(104000.5), None],
        )
        .unwrap()
    }

    #[test]
    fn test_size_mb_rounding() {
        assert_eq!(size_mb(0), 0.0);
        assert_eq!(size_mb(1024 * 1024), 1.0);
        assert_eq!(size_mb(1_572_864), 1.5);
        assert_eq!(size_mb(5_000), 0.0);
        assert_eq!(size_mb(12_000), 0.01);
    }

    #[test]
    fn test_encode_reads_back() {
        let bytes = encode_parquet(&sample_frame()).unwrap();
        assert_eq!(&bytes[..4], b"PAR1");

        let frame = ParquetReader::new(Cursor::new(bytes)).finish().unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.column("price").unwrap().null_count(), 1);
    }

    #[tokio::test]
    async fn test_archive_uploads_with_content_type() {
        let store = Arc::new(MemoryBlobStore::with_buckets(["raw-data"]));
        let archiver = Archiver::new(store.clone());

        let receipt = archiver
            .archive(&sample_frame(), "raw-data", "crypto/markets/2025-01-20/markets_raw_143022.parquet")
            .await
            .unwrap();

        assert_eq!(receipt.row_count, 2);
        assert_eq!(receipt.column_count, 2);
        assert_eq!(receipt.path, "crypto/markets/2025-01-20/markets_raw_143022.parquet");

        let stored = store.get("raw-data", &receipt.path).unwrap();
        assert_eq!(stored.content_type, "application/parquet");
        assert_eq!(stored.data.len() as u64, receipt.size_bytes);
    }

    #[tokio::test]
    async fn test_upload_failure_is_an_error() {
        let archiver = Archiver::new(Arc::new(MemoryBlobStore::new()));

        let err = archiver.archive(&sample_frame(), "missing", "k.parquet").await.unwrap_err();

        assert!(matches!(
            err,
            ArchiveError::Upload { ref key, source: StorageError::NoSuchBucket(_) } if key == "k.parquet"
        ));
    }
}
