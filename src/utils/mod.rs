pub mod logger;
pub mod metrics;

pub use self::logger::LogLevel;
pub use self::metrics::Metrics;
