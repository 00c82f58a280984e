use std::time::Duration;

use thiserror::Error;

use crate::core::{HandleId, Lifecycle};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create connection {index} of {capacity}: {source}")]
    Initialization {
        index: usize,
        capacity: usize,
        #[source]
        source: BoxError,
    },

    #[error("cannot {operation} while the pool is {state}")]
    InvalidState {
        operation: &'static str,
        state: Lifecycle,
    },

    #[error("handle {0} is not on loan from this pool")]
    InvalidHandle(HandleId),

    #[error("pool is closed")]
    PoolClosed,

    #[error("no connection became available within {0:?}")]
    Timeout(Duration),

    #[error("failed to close {failed} connection(s): {source}")]
    Close {
        failed: usize,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("pool capacity must be at least 1")]
    ZeroCapacity,
}

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
