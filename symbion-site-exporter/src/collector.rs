//! Collection loop
//!
//! One cycle = discover sites, probe each one in order, probe the two core
//! services, publish. Cycles run back to back with a fixed pause between
//! the end of one and the start of the next.

use crate::config::ExporterConfig;
use crate::discovery::{DiscoveryError, SiteDiscovery, SiteMap};
use crate::execution::CommandExecutor;
use crate::health::CollectorHealth;
use crate::metrics::SiteMetrics;
use crate::probes::{DiskUsageProbe, ServiceProbe, ServiceState, SiteProbe};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("site discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("site discovery task panicked: {0}")]
    DiscoveryTask(#[from] tokio::task::JoinError),
}

/// Summary of one completed cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub sites: usize,
    /// Named sites that answered HTTP 200
    pub sites_up: usize,
    /// Named sites whose reachability was checked
    pub sites_checked: usize,
    pub web_service: ServiceState,
    pub db_service: ServiceState,
    pub duration: Duration,
}

pub struct Collector {
    discovery: SiteDiscovery,
    disk: DiskUsageProbe,
    services: ServiceProbe,
    sites: SiteProbe,
    web_service: String,
    db_service: String,
    interval: Duration,
    metrics: Arc<SiteMetrics>,
}

impl Collector {
    pub fn new(config: &ExporterConfig, metrics: Arc<SiteMetrics>) -> Result<Self> {
        let executor = CommandExecutor::new(config.command_timeout);
        let sites = SiteProbe::new(config.http_timeout)
            .context("Failed to build HTTP client for site probes")?;

        Ok(Self {
            discovery: SiteDiscovery::new(&config.sites_root),
            disk: DiskUsageProbe::new(executor.clone(), config.du_command.clone()),
            services: ServiceProbe::new(executor, config.service_command.clone()),
            sites,
            web_service: config.web_service.clone(),
            db_service: config.db_service.clone(),
            interval: config.interval,
            metrics,
        })
    }

    /// Run cycles forever. A failed cycle is logged and retried after the
    /// usual pause.
    pub async fn run(&self) {
        info!(
            "Starting collection loop (root: {}, interval: {:?})",
            self.discovery.root().display(),
            self.interval
        );

        loop {
            if let Err(e) = self.collect_once().await {
                error!("Collection cycle aborted: {}", e);
            }
            sleep(self.interval).await;
        }
    }

    /// Run a single collection cycle and publish its results
    pub async fn collect_once(&self) -> Result<CycleReport, CycleError> {
        let health = self.metrics.health();
        health.cycle_started();
        let start_time = Instant::now();

        let discovery = self.discovery.clone();
        let sites = discover_blocking(health, move || discovery.discover()).await?;

        let mut sites_checked = 0;
        let mut sites_up = 0;
        for site in &sites {
            let usage = self.disk.measure(&site.path).await;
            self.metrics.publish_disk_usage(&site.name, usage);

            if site.is_unknown() {
                continue;
            }

            let response = self.sites.check(&site.name).await;
            sites_checked += 1;
            if response.measured().is_some_and(|r| r.is_up()) {
                sites_up += 1;
            }
            self.metrics.publish_site_status(&site.name, &response);
        }

        let web_service = self
            .services
            .check(&self.web_service)
            .await
            .unwrap_or(ServiceState::Unknown);
        let db_service = self
            .services
            .check(&self.db_service)
            .await
            .unwrap_or(ServiceState::Unknown);
        self.metrics.publish_services(web_service, db_service);

        self.metrics.expire_stale_sites(&sites);

        let duration = start_time.elapsed();
        health.record_cycle(duration, sites.len());

        let report = CycleReport {
            sites: sites.len(),
            sites_up,
            sites_checked,
            web_service,
            db_service,
            duration,
        };
        info!(
            "Cycle {} complete in {:?} - sites: {} ({}/{} up), {}: {:?}, {}: {:?}",
            health.cycles(),
            report.duration,
            report.sites,
            report.sites_up,
            report.sites_checked,
            self.web_service,
            report.web_service,
            self.db_service,
            report.db_service
        );
        debug!("Exporter uptime: {:?}", health.uptime());

        Ok(report)
    }
}

/// Run discovery on the blocking pool. Every failure, task panic included,
/// is counted before it aborts the cycle.
async fn discover_blocking<F>(health: &CollectorHealth, discover: F) -> Result<SiteMap, CycleError>
where
    F: FnOnce() -> Result<SiteMap, DiscoveryError> + Send + 'static,
{
    tokio::task::spawn_blocking(discover)
        .await
        .map_err(CycleError::from)
        .and_then(|result| result.map_err(CycleError::from))
        .inspect_err(|_| health.record_discovery_failure())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::UNKNOWN_SITE;
    use crate::execution::CommandLine;
    use crate::metrics::{DISK_USAGE, SITE_UP};
    use symbion_devkit::{Scrape, SiteTree};

    fn test_config(tree: &SiteTree) -> ExporterConfig {
        ExporterConfig {
            sites_root: tree.root().to_path_buf(),
            http_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(10),
            service_command: CommandLine::new("sh", ["-c", "echo inactive; exit 3"]),
            ..ExporterConfig::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_site_gets_no_reachability_probe() {
        let tree = SiteTree::new().unwrap();
        tree.site("client1", "web1").payload("index.html", 1024).create().unwrap();

        let metrics = Arc::new(SiteMetrics::new().unwrap());
        let collector = Collector::new(&test_config(&tree), metrics.clone()).unwrap();
        let report = collector.collect_once().await.unwrap();

        assert_eq!(report.sites, 1);
        assert_eq!(report.sites_checked, 0);
        assert_eq!(report.web_service, ServiceState::Inactive);

        let scrape = Scrape::parse(&metrics.encode().unwrap()).unwrap();
        let usage = scrape.value(DISK_USAGE, &[("site", UNKNOWN_SITE)]).unwrap();
        assert!(usage >= 1024.0);
        assert!(scrape.samples(SITE_UP).is_empty());
    }

    #[tokio::test]
    async fn test_discovery_failure_aborts_cycle() {
        let tree = SiteTree::new().unwrap();
        let mut config = test_config(&tree);
        config.sites_root = tree.root().join("missing");

        let metrics = Arc::new(SiteMetrics::new().unwrap());
        let collector = Collector::new(&config, metrics.clone()).unwrap();

        let err = collector.collect_once().await.unwrap_err();
        assert!(matches!(err, CycleError::Discovery(_)));
        assert_eq!(metrics.health().cycles(), 1);
        assert_eq!(metrics.health().discovery_failures(), 1);
    }

    #[tokio::test]
    async fn test_discovery_panic_is_counted() {
        let metrics = SiteMetrics::new().unwrap();

        let err = discover_blocking(metrics.health(), || -> Result<SiteMap, DiscoveryError> {
            panic!("discovery blew up")
        })
        .await
        .unwrap_err();

        assert!(matches!(err, CycleError::DiscoveryTask(_)));
        assert_eq!(metrics.health().discovery_failures(), 1);
    }
}
