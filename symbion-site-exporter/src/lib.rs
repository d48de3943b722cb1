//! Symbion Site Exporter - Prometheus metrics for ISPConfig hosting servers
//!
//! Periodically inspects the hosting server and exposes:
//! - Disk usage per hosted site (`du` over each `web*` directory)
//! - HTTP reachability and latency per site with a known domain
//! - Liveness of the web server and database services
//!
//! Sites are discovered fresh every cycle from
//! `<root>/<client>/web*/ssl/<domain>-le.crt`.

pub mod collector;
pub mod config;
pub mod discovery;
pub mod execution;
pub mod health;
pub mod http;
pub mod metrics;
pub mod probes;

pub use collector::{Collector, CycleError, CycleReport};
pub use config::{ConfigError, ExporterConfig};
pub use metrics::SiteMetrics;
