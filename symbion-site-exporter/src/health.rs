use chrono::Utc;
use prometheus::{Gauge, IntCounter, IntGauge, Registry};
use std::time::{Duration, Instant};

/// Collector self-observability, exported next to the site gauges
#[derive(Clone)]
pub struct CollectorHealth {
    start_time: Instant,
    cycle_duration: Gauge,
    last_cycle_timestamp: Gauge,
    sites_discovered: IntGauge,
    cycles_total: IntCounter,
    discovery_failures_total: IntCounter,
}

impl CollectorHealth {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let health = Self {
            start_time: Instant::now(),
            cycle_duration: Gauge::new(
                "ispconfig_exporter_cycle_duration_seconds",
                "Duration of the last completed collection cycle",
            )?,
            last_cycle_timestamp: Gauge::new(
                "ispconfig_exporter_last_cycle_timestamp_seconds",
                "Unix time at which the last collection cycle completed",
            )?,
            sites_discovered: IntGauge::new(
                "ispconfig_exporter_sites_discovered",
                "Sites found by the last successful discovery",
            )?,
            cycles_total: IntCounter::new(
                "ispconfig_exporter_cycles_total",
                "Collection cycles started",
            )?,
            discovery_failures_total: IntCounter::new(
                "ispconfig_exporter_discovery_failures_total",
                "Collection cycles aborted because site discovery failed",
            )?,
        };

        registry.register(Box::new(health.cycle_duration.clone()))?;
        registry.register(Box::new(health.last_cycle_timestamp.clone()))?;
        registry.register(Box::new(health.sites_discovered.clone()))?;
        registry.register(Box::new(health.cycles_total.clone()))?;
        registry.register(Box::new(health.discovery_failures_total.clone()))?;

        Ok(health)
    }

    pub fn cycle_started(&self) {
        self.cycles_total.inc();
    }

    pub fn record_discovery_failure(&self) {
        self.discovery_failures_total.inc();
    }

    pub fn record_cycle(&self, duration: Duration, sites: usize) {
        self.cycle_duration.set(duration.as_secs_f64());
        self.last_cycle_timestamp
            .set(Utc::now().timestamp_millis() as f64 / 1000.0);
        self.sites_discovered
            .set(i64::try_from(sites).unwrap_or(i64::MAX));
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles_total.get()
    }

    pub fn discovery_failures(&self) -> u64 {
        self.discovery_failures_total.get()
    }
}
