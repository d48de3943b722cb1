//! Prometheus gauges for hosted sites and core services
//!
//! All metric families are registered once in [`SiteMetrics::new`], before
//! the HTTP endpoint starts. Collection cycles only set values, plus
//! adding and expiring `site` label values as sites come and go.
//!
//! This is also where probe outcomes are flattened to exported values:
//! failed disk probe -> 0, failed or non-200 site -> down, failed site
//! request -> `+Inf` latency, failed service probe -> down.

use crate::discovery::SiteMap;
use crate::health::CollectorHealth;
use crate::probes::{ProbeOutcome, ServiceState, SiteResponse};
use parking_lot::Mutex;
use prometheus::{Encoder, GaugeVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashSet;
use tracing::debug;

pub const DISK_USAGE: &str = "ispconfig_disk_usage_bytes";
pub const SITE_LATENCY: &str = "ispconfig_site_latency_seconds";
pub const SITE_UP: &str = "ispconfig_site_up";
pub const APACHE_UP: &str = "ispconfig_apache_up";
pub const MYSQL_UP: &str = "ispconfig_mysql_up";

const SITE_LABEL: &str = "site";

/// Latency exported when a site could not be measured
pub const UNBOUNDED_LATENCY: f64 = f64::INFINITY;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),
    #[error("failed to encode metrics: {0}")]
    Encoding(#[source] prometheus::Error),
    #[error("encoded metrics are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Site label values currently present in each family
#[derive(Debug, Default)]
struct PublishedSites {
    disk: HashSet<String>,
    reachability: HashSet<String>,
}

pub struct SiteMetrics {
    registry: Registry,
    disk_usage: IntGaugeVec,
    site_latency: GaugeVec,
    site_up: IntGaugeVec,
    apache_up: IntGauge,
    mysql_up: IntGauge,
    health: CollectorHealth,
    published: Mutex<PublishedSites>,
}

impl SiteMetrics {
    /// Build a registry with every family registered
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let disk_usage = IntGaugeVec::new(Opts::new(DISK_USAGE, "Disk usage by site"), &[SITE_LABEL])?;
        let site_latency = GaugeVec::new(
            Opts::new(SITE_LATENCY, "Latency of site in seconds"),
            &[SITE_LABEL],
        )?;
        let site_up = IntGaugeVec::new(
            Opts::new(SITE_UP, "Site status (1=up, 0=down)"),
            &[SITE_LABEL],
        )?;
        let apache_up = IntGauge::new(APACHE_UP, "Apache service status (1=up, 0=down)")?;
        let mysql_up = IntGauge::new(MYSQL_UP, "MySQL service status (1=up, 0=down)")?;

        registry.register(Box::new(disk_usage.clone()))?;
        registry.register(Box::new(site_latency.clone()))?;
        registry.register(Box::new(site_up.clone()))?;
        registry.register(Box::new(apache_up.clone()))?;
        registry.register(Box::new(mysql_up.clone()))?;

        let health = CollectorHealth::register(&registry)?;

        Ok(Self {
            registry,
            disk_usage,
            site_latency,
            site_up,
            apache_up,
            mysql_up,
            health,
            published: Mutex::new(PublishedSites::default()),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn health(&self) -> &CollectorHealth {
        &self.health
    }

    pub fn publish_disk_usage(&self, site: &str, outcome: ProbeOutcome<u64>) {
        let bytes = outcome.unwrap_or(0);
        self.disk_usage
            .with_label_values(&[site])
            .set(i64::try_from(bytes).unwrap_or(i64::MAX));
        self.published.lock().disk.insert(site.to_string());
    }

    pub fn publish_site_status(&self, site: &str, outcome: &ProbeOutcome<SiteResponse>) {
        let (up, latency) = match outcome.measured() {
            Some(response) => (response.is_up(), response.latency.as_secs_f64()),
            None => (false, UNBOUNDED_LATENCY),
        };

        self.site_up.with_label_values(&[site]).set(i64::from(up));
        self.site_latency.with_label_values(&[site]).set(latency);
        self.published.lock().reachability.insert(site.to_string());
    }

    /// Failed probes arrive here as [`ServiceState::Unknown`]
    pub fn publish_services(&self, web: ServiceState, db: ServiceState) {
        self.apache_up.set(i64::from(web.is_active()));
        self.mysql_up.set(i64::from(db.is_active()));
    }

    /// Drop label values of sites missing from the latest discovery.
    /// Sites without a resolved name also lose their reachability series.
    pub fn expire_stale_sites(&self, current: &SiteMap) {
        let mut published = self.published.lock();

        published.disk.retain(|name| {
            let keep = current.contains(name);
            if !keep {
                debug!("Expiring disk usage series for site {}", name);
                let _ = self.disk_usage.remove_label_values(&[name.as_str()]);
            }
            keep
        });

        published.reachability.retain(|name| {
            let keep = current.iter().any(|site| site.name == *name && !site.is_unknown());
            if !keep {
                debug!("Expiring reachability series for site {}", name);
                let _ = self.site_up.remove_label_values(&[name.as_str()]);
                let _ = self.site_latency.remove_label_values(&[name.as_str()]);
            }
            keep
        });
    }

    /// Render every family in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(MetricsError::Encoding)?;
        Ok(String::from_utf8(buffer)?)
    }
}
