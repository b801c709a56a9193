//! Behavior-driven tests for the cache store as seen by callers.

mod support;

use std::time::Duration;

use findata_core::cache::WindowQuery;
use findata_core::{
    CacheKey, CacheStore, Day, JsonFileCache, Price, PriceRequest, RecordFamily, Ticker,
};
use support::{builder, client, ScriptedHttpClient};
use tokio_util::sync::CancellationToken;

fn day(value: &str) -> Day {
    Day::parse(value).expect("valid day")
}

fn bars(start: &str, count: i64) -> Vec<Price> {
    let first = day(start).into_inner();
    (0..count)
        .map(|offset| Price {
            open: 1.0,
            close: 1.0 + offset as f64,
            high: 2.0,
            low: 0.5,
            volume: 10,
            time: Day::from_date(first + time::Duration::days(offset)),
        })
        .collect()
}

fn prices_key() -> CacheKey {
    CacheKey::new(RecordFamily::Prices, &Ticker::parse("AAPL").expect("valid"))
}

fn prices_body() -> &'static str {
    r#"{"prices":[
        {"open":1.0,"close":1.0,"high":1.5,"low":0.5,"volume":100,"time":"2024-01-02"},
        {"open":2.0,"close":2.0,"high":2.5,"low":1.5,"volume":200,"time":"2024-01-03"}
    ]}"#
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_to_one_key_never_expose_a_partial_batch() {
    // Given: Two writers with overlapping batches of 50 and 80 bars
    let cache = CacheStore::new();
    let short = bars("2024-01-01", 50);
    let long = bars("2024-01-21", 80);
    let union_len = 100;

    // When: They write concurrently while a reader polls the entry
    let reader = {
        let cache = cache.clone();
        tokio::spawn(async move {
            let mut observed = Vec::new();
            for _ in 0..500 {
                if let Some(records) = cache.records::<Price>(&prices_key()).await {
                    observed.push(records.len());
                }
                tokio::task::yield_now().await;
            }
            observed
        })
    };
    let writers = [
        (short, day("2024-01-01"), day("2024-02-19")),
        (long, day("2024-01-21"), day("2024-04-09")),
    ]
    .map(|(batch, start, end)| {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .store(prices_key(), &WindowQuery::Range { start, end }, batch)
                .await;
        })
    });
    for writer in writers {
        writer.await.expect("writer finished");
    }
    let observed = reader.await.expect("reader finished");

    // Then: Every observation holds at least one full batch, and the final state is the union
    assert!(observed.iter().all(|len| *len >= 50), "torn read: {observed:?}");
    let records = cache.records::<Price>(&prices_key()).await.expect("entry");
    assert_eq!(records.len(), union_len);
}

#[tokio::test]
async fn expired_entries_are_replaced_rather_than_merged() {
    // Given: A short-lived cache holding January
    let cache = CacheStore::with_ttl(Duration::from_millis(50));
    cache
        .store(
            prices_key(),
            &WindowQuery::Range {
                start: day("2024-01-01"),
                end: day("2024-01-31"),
            },
            bars("2024-01-01", 31),
        )
        .await;

    // When: The entry expires and February is written
    tokio::time::sleep(Duration::from_millis(100)).await;
    cache
        .store(
            prices_key(),
            &WindowQuery::Range {
                start: day("2024-02-01"),
                end: day("2024-02-29"),
            },
            bars("2024-02-01", 29),
        )
        .await;

    // Then: Only February remains and January reads as a miss
    let records = cache.records::<Price>(&prices_key()).await.expect("entry");
    assert_eq!(records.len(), 29);
    let january = cache
        .lookup::<Price>(
            &prices_key(),
            &WindowQuery::Range {
                start: day("2024-01-01"),
                end: day("2024-01-31"),
            },
        )
        .await;
    assert!(january.is_none());
}

#[tokio::test]
async fn a_restored_snapshot_serves_queries_without_the_network() {
    // Given: A client that fetched prices and saved its cache to disk
    let dir = tempfile::tempdir().expect("tempdir");
    let persistence = JsonFileCache::new(dir.path().join("cache.json"));
    let request = PriceRequest::new("AAPL", "2024-01-01", "2024-01-31").expect("valid");

    let warm_http = ScriptedHttpClient::replying(prices_body());
    let warm = client(warm_http.clone());
    warm.get_prices(&request).await.expect("fetch");
    warm.cache().save_to(&persistence).await.expect("save");

    // When: A new process restores the snapshot into a fresh client
    let restored = CacheStore::new();
    assert!(restored.load_from(&persistence).await.expect("load"));
    let cold_http = ScriptedHttpClient::replying(prices_body());
    let cold = builder(cold_http.clone()).with_cache(restored).build();
    let prices = cold.get_prices(&request).await.expect("served");

    // Then: The new client answers from the restored cache
    assert_eq!(prices.len(), 2);
    assert_eq!(warm_http.request_count(), 1);
    assert_eq!(cold_http.request_count(), 0);
}

#[tokio::test]
async fn clients_sharing_a_store_share_hits() {
    // Given: Two clients built over the same cache store
    let store = CacheStore::new();
    let http = ScriptedHttpClient::replying(prices_body());
    let first = builder(http.clone()).with_cache(store.clone()).build();
    let second = builder(http.clone()).with_cache(store).build();
    let request = PriceRequest::new("AAPL", "2024-01-01", "2024-01-31").expect("valid");

    // When: Each issues the same query
    first.get_prices(&request).await.expect("first");
    second.get_prices(&request).await.expect("second");

    // Then: Only one network call is made
    assert_eq!(http.request_count(), 1);
}

#[tokio::test]
async fn a_cancellation_view_shares_the_cache_of_its_parent() {
    // Given: A client that has already cached a query
    let http = ScriptedHttpClient::replying(prices_body());
    let parent = client(http.clone());
    let request = PriceRequest::new("AAPL", "2024-01-01", "2024-01-31").expect("valid");
    parent.get_prices(&request).await.expect("seed");

    // When: A view with its own token asks for the same data
    let view = parent.with_cancellation(CancellationToken::new());
    let prices = view.get_prices(&request).await.expect("hit");

    // Then: The view reads the parent's cache
    assert_eq!(prices.len(), 2);
    assert_eq!(http.request_count(), 1);
}

#[tokio::test]
async fn finished_queries_leave_no_fetch_gates_behind() {
    // Given: A client over a slow provider and several tickers queried concurrently
    let http = ScriptedHttpClient::slow(Duration::from_millis(20), |_| {
        Ok(findata_core::HttpResponse::ok_json(prices_body()))
    });
    let client = client(http.clone());
    let tickers = ["AAPL", "MSFT", "NVDA", "AAPL"];

    // When: Every query completes
    let queries = tickers.map(|ticker| {
        let client = client.clone();
        tokio::spawn(async move {
            let request = PriceRequest::new(ticker, "2024-01-01", "2024-01-31").expect("valid");
            client.get_prices(&request).await.expect("prices")
        })
    });
    for query in queries {
        query.await.expect("query finished");
    }

    // Then: The in-flight map is empty again
    assert_eq!(client.cache().pending_fetches(), 0);
    assert_eq!(http.request_count(), 3);
}

#[tokio::test]
async fn the_client_saves_and_reloads_its_own_cache() {
    // Given: A client that fetched prices and saved through its own handle
    let dir = tempfile::tempdir().expect("tempdir");
    let persistence = JsonFileCache::new(dir.path().join("cache.json"));
    let request = PriceRequest::new("AAPL", "2024-01-01", "2024-01-31").expect("valid");
    let warm = client(ScriptedHttpClient::replying(prices_body()));
    warm.get_prices(&request).await.expect("fetch");
    warm.save_cache(&persistence).await.expect("save");

    // When: A fresh client loads it
    let cold_http = ScriptedHttpClient::replying(prices_body());
    let cold = client(cold_http.clone());
    let loaded = cold.load_cache(&persistence).await.expect("load");
    let prices = cold.get_prices(&request).await.expect("served");

    // Then: The query is answered without a request
    assert!(loaded);
    assert_eq!(prices.len(), 2);
    assert_eq!(cold_http.request_count(), 0);
}

