mod connection_pool;
mod manager;

pub use connection_pool::{ConnectionPool, Handle, HandleId, Lifecycle, PoolStatus};
pub use manager::ConnectionManager;
