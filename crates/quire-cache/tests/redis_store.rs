//! Integration tests for the Redis cache backend.
//!
//! Tests use testcontainers to spin up a real Redis instance.

use std::sync::Arc;
use std::time::Duration;

use quire_cache::{CacheLock, CacheStore, LockParams, RedisOptions, RedisStore};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

/// Get or create the shared Redis container
async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

async fn redis_store(prefix: &str) -> CacheStore<RedisStore> {
    let options = RedisOptions {
        url: get_redis_url().await,
        key_prefix: prefix.to_string(),
        ..RedisOptions::default()
    };
    let backend = RedisStore::connect(&options)
        .await
        .expect("connect to redis");
    CacheStore::new(backend)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_put_get_delete() {
    let cache = redis_store("it_basic:").await;

    cache.put("k", "v", None).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

    cache.delete("k").await.unwrap();
    cache.delete("k").await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_expiration() {
    let cache = redis_store("it_ttl:").await;

    cache
        .put("code", "482913", Some(Duration::from_millis(200)))
        .await
        .unwrap();
    assert_eq!(cache.get("code").await.unwrap().as_deref(), Some("482913"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cache.get("code").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_put_if_absent_across_instances() {
    let first = Arc::new(redis_store("it_nx:").await);
    let second = Arc::new(redis_store("it_nx:").await);

    let a = {
        let cache = first.clone();
        tokio::spawn(async move {
            cache
                .put_if_absent("install-lock", "x", Some(Duration::from_secs(5)))
                .await
                .unwrap()
        })
    };
    let b = {
        let cache = second.clone();
        tokio::spawn(async move {
            cache
                .put_if_absent("install-lock", "y", Some(Duration::from_secs(5)))
                .await
                .unwrap()
        })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a ^ b, "exactly one instance must win: {a} {b}");

    let expected = if a { "x" } else { "y" };
    assert_eq!(
        second.get("install-lock").await.unwrap().as_deref(),
        Some(expected)
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_typed_values_and_prefix_isolation() {
    let tenant_a = redis_store("it_a:").await;
    let tenant_b = redis_store("it_b:").await;

    tenant_a.put_as("user", &42_i64, None).await.unwrap();
    assert_eq!(tenant_a.get_as::<i64>("user").await.unwrap(), Some(42));
    assert_eq!(tenant_b.get_as::<i64>("user").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_backed_lock() {
    let cache = redis_store("it_lock:").await;
    let lock = CacheLock::new("install").with_auto_delete(false);

    let first = lock
        .run(&cache, "install", &LockParams::new(), || async {
            Ok::<_, std::convert::Infallible>(())
        })
        .await;
    assert!(first.is_ok());

    let second = lock
        .run(&cache, "install", &LockParams::new(), || async {
            Ok::<_, std::convert::Infallible>(())
        })
        .await;
    assert!(second.unwrap_err().is_conflict());
}
