mod connection;

use std::path::PathBuf;
use std::time::Duration;

use crate::config::PoolConfig;
use crate::core::{ConnectionManager, ConnectionPool};
use crate::error::ConfigError;

pub use connection::SqliteConnection;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub type SqlitePool = ConnectionPool<SqliteManager>;

#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SqliteManager {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// How long a connection waits on a locked database before failing.
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

impl ConnectionManager for SqliteManager {
    type Connection = SqliteConnection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<SqliteConnection, rusqlite::Error> {
        SqliteConnection::open(&self.path, self.busy_timeout)
    }

    fn close(&self, conn: SqliteConnection) -> Result<(), rusqlite::Error> {
        conn.close()
    }

    fn descriptor(&self) -> String {
        self.path.display().to_string()
    }
}

impl ConnectionPool<SqliteManager> {
    pub fn open(capacity: usize, path: impl Into<PathBuf>) -> Self {
        ConnectionPool::new(capacity, SqliteManager::new(path))
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let manager = SqliteManager::new(config.database.clone()).with_busy_timeout(config.busy_timeout());
        Ok(ConnectionPool::with_release_delay(
            config.capacity,
            manager,
            config.release_delay(),
        ))
    }
}
