pub mod app;
pub mod oracle;

pub use app::{AppConfig, MetricsConfig};
pub use oracle::OracleConfig;
