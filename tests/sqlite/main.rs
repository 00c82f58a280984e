use std::time::Duration;

use sqlite_pool::{ConnectionManager, PoolConfig, PoolError, SqliteManager, SqlitePool};
use tempfile::TempDir;

#[test]
fn test_commit_without_transaction_is_noop() {
    let dir = TempDir::new().unwrap();
    let manager = SqliteManager::new(dir.path().join("noop.db"));

    let conn = manager.connect().unwrap();
    assert!(!conn.in_transaction());
    conn.commit().unwrap();
    conn.rollback().unwrap();
    manager.close(conn).unwrap();
}

#[test]
fn test_transaction_visible_to_other_connection_after_commit() {
    let dir = TempDir::new().unwrap();
    let manager = SqliteManager::new(dir.path().join("tx.db"));

    let writer = manager.connect().unwrap();
    let reader = manager.connect().unwrap();
    writer
        .execute_batch("CREATE TABLE items (value INTEGER NOT NULL)")
        .unwrap();

    writer.begin().unwrap();
    assert!(writer.in_transaction());
    writer.execute("INSERT INTO items (value) VALUES (?1)", [7]).unwrap();

    let count = |conn: &sqlite_pool::SqliteConnection| -> i64 {
        conn.query_rows("SELECT COUNT(*) FROM items", [], |row| row.get::<_, i64>(0))
            .unwrap()[0]
    };
    assert_eq!(count(&reader), 0);

    writer.commit().unwrap();
    assert!(!writer.in_transaction());
    assert_eq!(count(&reader), 1);
}

#[test]
fn test_connect_fails_for_missing_directory() {
    let dir = TempDir::new().unwrap();
    let manager = SqliteManager::new(dir.path().join("missing").join("x.db"));
    assert!(manager.connect().is_err());
}

#[tokio::test]
async fn test_pool_open_and_shutdown() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pool.db");
    let pool = SqlitePool::open(2, &path);
    assert_eq!(pool.manager().descriptor(), path.display().to_string());

    pool.initialize().await.unwrap();
    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.path(), path.as_path());
    conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
    pool.release(conn).await.unwrap();

    pool.shutdown().await.unwrap();
    pool.shutdown().await.unwrap();
    assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));
}

#[tokio::test]
async fn test_initialize_failure_surfaces_sqlite_error() {
    let dir = TempDir::new().unwrap();
    let pool = SqlitePool::open(3, dir.path().join("nope").join("pool.db"));

    let err = pool.initialize().await.unwrap_err();
    assert!(matches!(err, PoolError::Initialization { index: 0, .. }));
}

#[tokio::test]
async fn test_pool_from_config() {
    let dir = TempDir::new().unwrap();
    let config = PoolConfig {
        capacity: 2,
        database: dir.path().join("config.db"),
        release_delay_ms: Some(10),
        busy_timeout_ms: Some(100),
    };

    let pool = SqlitePool::from_config(&config).unwrap();
    assert_eq!(pool.capacity(), 2);
    pool.initialize().await.unwrap();

    let started = std::time::Instant::now();
    let conn = pool.acquire().await.unwrap();
    pool.release(conn).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(10));

    pool.shutdown().await.unwrap();
}

#[test]
fn test_zero_capacity_config_rejected() {
    let config = PoolConfig {
        capacity: 0,
        ..PoolConfig::default()
    };
    assert!(SqlitePool::from_config(&config).is_err());
}
