pub mod config;
pub mod core;
pub mod error;
pub mod sqlite;
pub mod utils;
pub mod workload;

pub use config::PoolConfig;
pub use core::{ConnectionManager, ConnectionPool, Handle, HandleId, Lifecycle, PoolStatus};
pub use error::{ConfigError, PoolError, WorkloadError};
pub use sqlite::{SqliteConnection, SqliteManager, SqlitePool};
pub use utils::{LogLevel, Metrics};
pub use workload::{Entity, EntityRepository};
