//! Limiter behaviour against a live Redis.
//!
//! Skipped unless `REDIS_URL` is set, e.g. `REDIS_URL=redis://127.0.0.1:6379`.

use std::{env, sync::Arc, time::Duration};

use futures::future::join_all;
use redis::AsyncCommands;

use ratewindow::{RateWindowError, RedisStore, SlidingWindowLimiter, StoreError};

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_id(label: &str) -> String {
    let n: u64 = rand::random();
    format!("ratewindow_test_{label}_{n}")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn build_limiter(url: &str, max: u64, duration: Duration) -> SlidingWindowLimiter {
    let store = RedisStore::connect(url).await.unwrap();
    SlidingWindowLimiter::builder()
        .max(max)
        .duration(duration)
        .store(Arc::new(store))
        .build()
        .unwrap()
}

async fn connection(url: &str) -> redis::aio::ConnectionManager {
    redis::Client::open(url)
        .unwrap()
        .get_connection_manager()
        .await
        .unwrap()
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

#[tokio::test]
async fn total_represents_limit() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let limiter = build_limiter(&url, 5, Duration::from_secs(3600)).await;
    let status = limiter.get(&unique_id("total")).await.unwrap();
    assert_eq!(status.total, 5);
}

#[tokio::test]
async fn remaining_decrements_within_window() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let limiter = build_limiter(&url, 5, Duration::from_millis(100_000)).await;
    let id = unique_id("remaining");

    for expected in [5, 4, 3] {
        let status = limiter.get(&id).await.unwrap();
        assert_eq!(status.remaining, expected);
        assert_eq!(status.total, 5);
    }
}

#[tokio::test]
async fn reset_is_within_window() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let limiter = build_limiter(&url, 5, Duration::from_secs(60)).await;
    let status = limiter.get(&unique_id("reset")).await.unwrap();

    let left = status.reset as f64 - now_secs();
    assert!(left < 60.0, "left = {left}");
    assert!(left > 0.0, "left = {left}");
}

#[tokio::test]
async fn remaining_stays_at_zero() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let limiter = build_limiter(&url, 2, Duration::from_secs(3600)).await;
    let id = unique_id("exceeded");

    let mut remaining = Vec::new();
    for _ in 0..4 {
        remaining.push(limiter.get(&id).await.unwrap().remaining);
    }
    assert_eq!(remaining, vec![2, 1, 0, 0]);
}

#[tokio::test]
async fn window_rolls_over_after_duration() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let limiter = build_limiter(&url, 2, Duration::from_millis(2_000)).await;
    let id = unique_id("rollover");

    assert_eq!(limiter.get(&id).await.unwrap().remaining, 2);

    tokio::time::sleep(Duration::from_millis(3_000)).await;

    let status = limiter.get(&id).await.unwrap();
    let left = status.reset as f64 - now_secs();
    assert!(left < 2.0, "left = {left}");
    assert_eq!(status.remaining, 2);
}

#[tokio::test]
async fn expiry_is_rearmed_on_every_call() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let limiter = build_limiter(&url, 2, Duration::from_secs(10)).await;
    let id = unique_id("ttl");
    let mut conn = connection(&url).await;

    limiter.get(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    limiter.get(&id).await.unwrap();

    let ttl: i64 = conn.pttl(limiter.key_for(&id).unwrap()).await.unwrap();
    assert!(ttl > 9_000 && ttl <= 10_000, "ttl = {ttl}");
}

#[tokio::test]
async fn concurrent_clients_do_not_race() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let max = 5;
    let id = unique_id("race");
    let mut clients = Vec::new();
    for _ in 0..7 {
        clients.push(build_limiter(&url, max, Duration::from_secs(10)).await);
    }

    assert_eq!(clients[0].get(&id).await.unwrap().remaining, 5);

    let mut remaining: Vec<u64> = join_all(clients.iter().map(|c| c.get(&id)))
        .await
        .into_iter()
        .map(|r| r.unwrap().remaining)
        .collect();
    remaining.sort_unstable_by(|a, b| b.cmp(a));

    assert_eq!(remaining, vec![4, 3, 2, 1, 0, 0, 0]);
}

#[tokio::test]
async fn parallel_calls_on_one_limiter() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let limiter = build_limiter(&url, 6, Duration::from_secs(10)).await;
    let id = unique_id("parallel");

    let mut remaining: Vec<u64> = join_all((0..5).map(|_| limiter.get(&id)))
        .await
        .into_iter()
        .map(|r| r.unwrap().remaining)
        .collect();
    remaining.sort_unstable_by(|a, b| b.cmp(a));

    assert_eq!(remaining, vec![6, 5, 4, 3, 2]);
}

#[tokio::test]
async fn wrong_type_key_fails_the_call() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let limiter = build_limiter(&url, 2, Duration::from_secs(10)).await;
    let id = unique_id("wrongtype");
    let mut conn = connection(&url).await;

    let _: () = conn
        .set_ex(limiter.key_for(&id).unwrap(), 1, 60)
        .await
        .unwrap();

    let err = limiter.get(&id).await.unwrap_err();
    assert!(matches!(err, RateWindowError::Store(_)), "got {err:?}");
}

#[tokio::test]
async fn bound_limiter_shares_window() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let limiter = build_limiter(&url, 2, Duration::from_secs(10)).await;
    let id = unique_id("bound");
    let bound = limiter.bind(&id).unwrap();

    assert_eq!(bound.get().await.unwrap().remaining, 2);
    assert_eq!(limiter.get(&id).await.unwrap().remaining, 1);
}

#[tokio::test]
async fn slow_store_reports_timeout() {
    let Some(url) = redis_url() else { return };
    init_tracing();

    let store = RedisStore::connect(&url)
        .await
        .unwrap()
        .with_timeout(Duration::from_millis(50));
    let limiter = SlidingWindowLimiter::builder()
        .max(2)
        .duration(Duration::from_secs(10))
        .store(Arc::new(store))
        .build()
        .unwrap();

    // Hold back write commands server-side for longer than the timeout.
    let mut conn = connection(&url).await;
    let _: () = redis::cmd("CLIENT")
        .arg("PAUSE")
        .arg(300)
        .arg("WRITE")
        .query_async(&mut conn)
        .await
        .unwrap();

    let err = limiter.get(&unique_id("timeout")).await.unwrap_err();
    assert!(
        matches!(err, RateWindowError::Store(StoreError::Timeout(t)) if t == Duration::from_millis(50)),
        "got {err:?}"
    );
}
