//! End-to-end collection tests
//!
//! Mock API on one side, in-memory blob store on the other. Archived objects
//! are read back as Parquet to check what actually landed in the lake.

mod common;

use coinlake_ingest::archive::Archiver;
use coinlake_ingest::catalog::Catalog;
use coinlake_ingest::config::{DumpConfig, LakeConfig};
use coinlake_ingest::error::{FetchError, PipelineError, TableError};
use coinlake_ingest::pipeline::Pipeline;
use coinlake_ingest::storage::MemoryBlobStore;
use common::{api_path, fetcher, RecordingSleeper};
use polars::prelude::{DataFrame, DataType, ParquetReader, SerReader};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const RAW_BUCKET: &str = "raw-data";

struct Harness {
    server: MockServer,
    store: Arc<MemoryBlobStore>,
    sleeper: Arc<RecordingSleeper>,
    pipeline: Pipeline,
}

async fn harness(max_attempts: u32, catalog: Catalog) -> Harness {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryBlobStore::with_buckets([RAW_BUCKET]));
    let (fetcher, sleeper) = fetcher(&server, max_attempts);

    let pipeline = Pipeline::from_parts(
        fetcher,
        Archiver::new(store.clone()),
        catalog,
        LakeConfig::default(),
    );

    Harness {
        server,
        store,
        sleeper,
        pipeline,
    }
}

fn read_back(store: &MemoryBlobStore, key: &str) -> DataFrame {
    let object = store.get(RAW_BUCKET, key).expect("object not archived");
    assert_eq!(object.content_type, "application/parquet");

    ParquetReader::new(Cursor::new(object.data))
        .finish()
        .expect("archived object is not readable Parquet")
}

fn string_value(frame: &DataFrame, column: &str, row: usize) -> String {
    frame
        .column(column)
        .unwrap_or_else(|_| panic!("missing column {}", column))
        .str()
        .unwrap()
        .get(row)
        .unwrap_or_else(|| panic!("null in {} at row {}", column, row))
        .to_string()
}

fn markets_body() -> Value {
    json!([
        {
            "id": "bitcoin",
            "symbol": "btc",
            "current_price": 104250.12,
            "market_cap_rank": 1,
            "roi": null,
            "price_change_percentage_24h_in_currency": -1.25
        },
        {
            "id": "ethereum",
            "symbol": "eth",
            "current_price": 3301,
            "market_cap_rank": 2,
            "roi": {"times": 41.2, "currency": "btc", "percentage": 4120.3}
        },
        {
            "id": "tether",
            "symbol": "usdt",
            "current_price": 1.0,
            "market_cap_rank": 3,
            "roi": null
        }
    ])
}

fn coin_body(id: &str) -> Value {
    json!({
        "id": id,
        "symbol": "eth",
        "name": "Ethereum",
        "platforms": {},
        "detail_platforms": {"ethereum": {"decimal_place": null, "contract_address": ""}},
        "image": {"thumb": "https://example.invalid/thumb.png", "small": null},
        "market_data": {
            "current_price": {"usd": 3301.5, "eur": 3150.0},
            "roi": {"times": 41.2, "currency": "btc", "percentage": 4120.3},
            "total_supply": null,
            "max_supply": null
        },
        "community_data": {"facebook_likes": null, "twitter_followers": 3100000},
        "developer_data": {"forks": 20000, "code_additions_deletions_4_weeks": {"additions": null, "deletions": null}},
        "tickers": [
            {"base": "ETH", "target": "USDT", "last": 3301.2},
            {"base": "ETH", "target": "USD", "last": 3300.9}
        ],
        "categories": ["Smart Contract Platform", "Layer 1 (L1)"]
    })
}

fn global_body() -> Value {
    json!({
        "data": {
            "active_cryptocurrencies": 17100,
            "markets": 1210,
            "total_market_cap": {"usd": 3.4e12, "eur": 3.2e12},
            "market_cap_percentage": {"btc": 57.1, "eth": 11.2},
            "ongoing_icos": 49,
            "ended_icos": 3376,
            "upcoming_icos": 0,
            "updated_at": 1737382222
        }
    })
}

// ============================================================================
// Single collections
// ============================================================================

#[tokio::test]
async fn test_markets_archives_one_row_per_record() {
    let h = harness(1, Catalog::builtin().unwrap()).await;
    Mock::given(method("GET"))
        .and(path(api_path("/coins/markets")))
        .and(query_param("vs_currency", "usd"))
        .and(query_param("order", "market_cap_desc"))
        .and(query_param("per_page", "100"))
        .and(query_param("page", "1"))
        .and(query_param("sparkline", "false"))
        .and(query_param("price_change_percentage", "1h,24h,7d,30d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(markets_body()))
        .expect(1)
        .mount(&h.server)
        .await;

    let receipt = h.pipeline.collect_markets("usd", 100, 1).await.unwrap();

    assert_eq!(receipt.archive.row_count, 3);
    assert_eq!(receipt.archive.bucket, RAW_BUCKET);
    assert_eq!(receipt.id.as_deref(), Some("raw"));

    let key = &receipt.archive.path;
    assert!(key.starts_with("crypto/markets/"), "unexpected key {}", key);
    let file = key.rsplit('/').next().unwrap();
    assert!(file.starts_with("markets_raw_") && file.ends_with(".parquet"));
    assert_eq!(file.len(), "markets_raw_HHMMSS.parquet".len());

    let frame = read_back(&h.store, key);
    assert_eq!(frame.height(), 3);
    assert_eq!(frame.width(), receipt.archive.column_count);
    for row in 0..3 {
        assert_eq!(string_value(&frame, "_vs_currency", row), "usd");
        assert_eq!(string_value(&frame, "_data_source", row), "coingecko_markets");
        assert_eq!(string_value(&frame, "_endpoint", row), "/coins/markets");
    }
    assert_eq!(string_value(&frame, "id", 1), "ethereum");
    assert_eq!(
        frame
            .column("price_change_percentage_24h_in_currency")
            .unwrap()
            .null_count(),
        2
    );
}

#[tokio::test]
async fn test_coin_details_resolves_and_archives_one_row() {
    let h = harness(1, Catalog::builtin().unwrap()).await;
    Mock::given(method("GET"))
        .and(path(api_path("/coins/ethereum")))
        .and(query_param("localization", "false"))
        .and(query_param("tickers", "true"))
        .and(query_param("market_data", "true"))
        .and(query_param("community_data", "true"))
        .and(query_param("developer_data", "true"))
        .and(query_param("sparkline", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(coin_body("ethereum")))
        .expect(1)
        .mount(&h.server)
        .await;

    let receipt = h.pipeline.collect_coin_details(" ETH ").await.unwrap();

    assert_eq!(receipt.id.as_deref(), Some("ethereum"));
    assert_eq!(receipt.archive.row_count, 1);
    assert!(receipt.archive.path.contains("/coin_details_ethereum_"));

    let frame = read_back(&h.store, &receipt.archive.path);
    assert_eq!(frame.height(), 1);
    assert_eq!(string_value(&frame, "_coin_id", 0), "ethereum");
    assert_eq!(string_value(&frame, "_requested_name", 0), " ETH ");
    assert_eq!(string_value(&frame, "_endpoint", 0), "/coins/ethereum");
    assert!(frame.column("platforms").is_err());
    assert!(matches!(frame.column("market_data").unwrap().dtype(), DataType::Struct(_)));
    assert!(matches!(frame.column("tickers").unwrap().dtype(), DataType::List(_)));
}

#[tokio::test]
async fn test_global_archives_one_row() {
    let h = harness(1, Catalog::builtin().unwrap()).await;
    Mock::given(method("GET"))
        .and(path(api_path("/global")))
        .respond_with(ResponseTemplate::new(200).set_body_json(global_body()))
        .mount(&h.server)
        .await;

    let receipt = h.pipeline.collect_global().await.unwrap();

    assert_eq!(receipt.id, None);
    assert_eq!(receipt.archive.row_count, 1);
    let file = receipt.archive.path.rsplit('/').next().unwrap();
    assert_eq!(file.len(), "global_HHMMSS.parquet".len());

    let frame = read_back(&h.store, &receipt.archive.path);
    assert_eq!(string_value(&frame, "_data_source", 0), "coingecko_global");
    assert!(frame.column("data").is_ok());
}

// ============================================================================
// Failures stay local to the call
// ============================================================================

#[tokio::test]
async fn test_unknown_coin_fails_without_request() {
    let h = harness(1, Catalog::builtin().unwrap()).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h.pipeline.collect_coin_details("zcash").await.unwrap_err();

    assert!(matches!(err, PipelineError::UnknownCoin(_)));
    assert_eq!(h.store.object_count(), 0);
}

#[tokio::test]
async fn test_fetch_failure_archives_nothing() {
    let h = harness(2, Catalog::builtin().unwrap()).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&h.server)
        .await;

    let err = h.pipeline.collect_markets("usd", 100, 1).await.unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(FetchError::Exhausted { attempts: 2, .. })));
    assert_eq!(h.store.object_count(), 0);
    assert_eq!(h.sleeper.slept(), vec![Duration::from_secs(5)]);
}

#[tokio::test]
async fn test_empty_listing_is_a_table_error() {
    let h = harness(1, Catalog::builtin().unwrap()).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&h.server)
        .await;

    let err = h.pipeline.collect_markets("usd", 100, 9999).await.unwrap_err();

    assert!(matches!(err, PipelineError::Table(TableError::Empty)));
    assert_eq!(h.store.object_count(), 0);
}

#[tokio::test]
async fn test_missing_bucket_is_an_archive_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(global_body()))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&server, 1);
    let pipeline = Pipeline::from_parts(
        fetcher,
        Archiver::new(Arc::new(MemoryBlobStore::new())),
        Catalog::builtin().unwrap(),
        LakeConfig::default(),
    );

    let err = pipeline.collect_global().await.unwrap_err();
    assert!(matches!(err, PipelineError::Archive(_)));
}

// ============================================================================
// Full dump
// ============================================================================

#[tokio::test]
async fn test_dump_tallies_and_continues_past_failures() {
    let catalog = Catalog::from_pairs([("bitcoin", "Bitcoin (BTC)"), ("ethereum", "Ethereum (ETH)")]).unwrap();
    let h = harness(1, catalog).await;

    Mock::given(method("GET"))
        .and(path(api_path("/global")))
        .respond_with(ResponseTemplate::new(200).set_body_json(global_body()))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("/coins/markets")))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(markets_body()))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("/coins/markets")))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("/coins/bitcoin")))
        .respond_with(ResponseTemplate::new(200).set_body_json(coin_body("bitcoin")))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("/coins/ethereum")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;

    let plan = DumpConfig {
        pages: 2,
        ..DumpConfig::default()
    };
    let summary = h.pipeline.run_dump(&plan).await;

    assert!(summary.global_ok);
    assert_eq!((summary.markets_ok, summary.markets_pages), (1, 2));
    assert_eq!((summary.details_ok, summary.details_total), (1, 2));
    assert_eq!(summary.expected_files(), 3);
    assert_eq!(summary.receipts.len(), 3);
    assert!(!summary.is_complete());
    assert_eq!(h.store.object_count(), 3);

    // One courtesy delay after every call, failed or not; no retry sleeps
    // with a single attempt.
    let secs: Vec<u64> = h.sleeper.slept().iter().map(Duration::as_secs).collect();
    assert_eq!(secs, vec![2, 3, 3, 2, 2]);
}

#[tokio::test]
async fn test_dump_resolves_every_builtin_id() {
    let h = harness(1, Catalog::builtin().unwrap()).await;
    Mock::given(method("GET"))
        .and(path(api_path("/global")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    for entry in Catalog::builtin().unwrap().entries() {
        Mock::given(method("GET"))
            .and(path(api_path(&format!("/coins/{}", entry.id))))
            .respond_with(ResponseTemplate::new(200).set_body_json(coin_body(&entry.id)))
            .expect(1)
            .mount(&h.server)
            .await;
    }

    let plan = DumpConfig {
        pages: 0,
        global_delay_secs: 0,
        details_delay_secs: 0,
        ..DumpConfig::default()
    };
    let summary = h.pipeline.run_dump(&plan).await;

    assert!(!summary.global_ok);
    assert_eq!(summary.details_ok, 15);
    assert_eq!(summary.details_total, 15);
    assert!(h.sleeper.slept().is_empty());

    let mut ids: Vec<_> = summary.receipts.iter().filter_map(|r| r.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 15);
}
