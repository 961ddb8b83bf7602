//! Observability: prometheus metric families and the scrape endpoint.

pub mod metrics;
pub mod server;

pub use metrics::EngineMetrics;
pub use server::{MetricsServer, MetricsServerConfig};
