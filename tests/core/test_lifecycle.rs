use std::time::Duration;

use sqlite_pool::{ConnectionPool, Lifecycle, PoolError};

use crate::mock::MockManager;

#[tokio::test]
async fn test_initialize_fills_idle() {
    let pool = ConnectionPool::new(3, MockManager::new());
    assert_eq!(pool.state(), Lifecycle::Uninitialized);

    pool.initialize().await.unwrap();

    let status = pool.status();
    assert_eq!(status.state, Lifecycle::Ready);
    assert_eq!(status.capacity, 3);
    assert_eq!(status.idle, 3);
    assert_eq!(status.in_use, 0);
    assert_eq!(status.waiting, 0);
    assert_eq!(pool.manager().created(), 3);
}

#[tokio::test]
async fn test_initialize_twice_fails() {
    let pool = ConnectionPool::new(2, MockManager::new());
    pool.initialize().await.unwrap();

    let err = pool.initialize().await.unwrap_err();
    assert!(matches!(
        err,
        PoolError::InvalidState {
            operation: "initialize",
            state: Lifecycle::Ready
        }
    ));
    assert_eq!(pool.manager().created(), 2);
    assert_eq!(pool.status().idle, 2);
}

#[tokio::test]
async fn test_acquire_before_initialize() {
    let pool = ConnectionPool::new(1, MockManager::new());

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(
        err,
        PoolError::InvalidState {
            state: Lifecycle::Uninitialized,
            ..
        }
    ));
    assert!(matches!(
        pool.try_acquire(),
        Err(PoolError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_initialize_failure_closes_created() {
    let pool = ConnectionPool::new(4, MockManager::failing_at(2));

    let err = pool.initialize().await.unwrap_err();
    match err {
        PoolError::Initialization {
            index, capacity, ..
        } => {
            assert_eq!(index, 2);
            assert_eq!(capacity, 4);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(pool.manager().created(), 2);
    assert_eq!(pool.manager().closed(), 2);
    assert_eq!(pool.state(), Lifecycle::Closed);
    assert_eq!(pool.status().idle, 0);
    assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));
}

#[tokio::test]
async fn test_acquire_after_shutdown() {
    let pool = ConnectionPool::new(2, MockManager::new());
    pool.initialize().await.unwrap();
    pool.shutdown().await.unwrap();

    assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));
    assert!(matches!(pool.try_acquire(), Err(PoolError::PoolClosed)));
    assert!(matches!(
        pool.initialize().await,
        Err(PoolError::InvalidState {
            state: Lifecycle::Closed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let pool = ConnectionPool::new(3, MockManager::new());
    pool.initialize().await.unwrap();

    pool.shutdown().await.unwrap();
    pool.shutdown().await.unwrap();

    assert_eq!(pool.manager().closed(), 3);
    assert_eq!(pool.status().idle, 0);
    assert_eq!(pool.state(), Lifecycle::Closed);
}

#[tokio::test]
async fn test_shutdown_before_initialize() {
    let pool = ConnectionPool::new(2, MockManager::new());
    pool.shutdown().await.unwrap();

    assert_eq!(pool.state(), Lifecycle::Closed);
    assert_eq!(pool.manager().created(), 0);
    assert!(pool.initialize().await.is_err());
}

#[tokio::test]
async fn test_shutdown_leaves_loaned_handles_to_caller() {
    let pool = ConnectionPool::new(2, MockManager::new());
    pool.initialize().await.unwrap();

    let handle = pool.acquire().await.unwrap();
    pool.shutdown().await.unwrap();

    // only the idle connection is closed by shutdown
    assert_eq!(pool.manager().closed(), 1);
    assert_eq!(pool.status().in_use, 1);

    let err = pool.release(handle).await.unwrap_err();
    assert!(matches!(
        err,
        PoolError::InvalidState {
            operation: "release",
            state: Lifecycle::Closed
        }
    ));
    assert_eq!(pool.manager().closed(), 2);
    assert_eq!(pool.status().in_use, 0);
    assert_eq!(pool.status().idle, 0);
}

#[tokio::test]
async fn test_shutdown_wakes_blocked_acquire() {
    let pool = ConnectionPool::new(1, MockManager::new());
    pool.initialize().await.unwrap();
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(pool.status().waiting, 1);

    pool.shutdown().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should wake on shutdown")
        .unwrap();
    assert!(matches!(result, Err(PoolError::PoolClosed)));
    assert_eq!(pool.status().waiting, 0);

    drop(held);
    assert_eq!(pool.manager().closed(), 1);
}

#[tokio::test]
async fn test_shutdown_reports_close_failures() {
    let pool = ConnectionPool::new(2, MockManager::failing_close());
    pool.initialize().await.unwrap();

    let err = pool.shutdown().await.unwrap_err();
    assert!(matches!(err, PoolError::Close { failed: 2, .. }));
    assert_eq!(pool.state(), Lifecycle::Closed);

    // second call has nothing left to close
    pool.shutdown().await.unwrap();
    assert_eq!(pool.manager().closed(), 2);
}
