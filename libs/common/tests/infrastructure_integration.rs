//! Checks against live PostgreSQL and Redis instances.
//!
//! Run with `cargo test -p common -- --ignored`.

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
};
use std::time::Duration;

fn redis() -> RedisPool {
    let config = RedisConfig::from_env().unwrap_or(RedisConfig {
        url: "redis://localhost:6379".to_string(),
    });
    RedisPool::new(&config).expect("redis client")
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_pool_respects_configured_bounds() {
    let config = DatabaseConfig::from_env().unwrap();
    let pool = init_pool(&config).await.unwrap();

    assert!(health_check(&pool).await.unwrap());
    assert_eq!(pool.options().get_max_connections(), config.max_connections);
    assert_eq!(pool.options().get_min_connections(), config.min_connections);

    let one: i32 = sqlx::query_scalar("SELECT 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(one, 1);
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn test_cached_snapshot_expires() {
    let pool = redis();
    assert!(pool.health_check().await.unwrap());

    let key = format!("parking:test:{}", std::process::id());
    pool.set(&key, r#"[{"level_number":0}]"#, Some(1))
        .await
        .unwrap();
    assert_eq!(
        pool.get(&key).await.unwrap().as_deref(),
        Some(r#"[{"level_number":0}]"#)
    );

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(pool.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn test_invalidation_is_idempotent() {
    let pool = redis();
    let key = format!("parking:test:delete:{}", std::process::id());

    pool.set(&key, "stale", None).await.unwrap();
    pool.delete(&key).await.unwrap();
    pool.delete(&key).await.unwrap();

    assert_eq!(pool.get(&key).await.unwrap(), None);
}
