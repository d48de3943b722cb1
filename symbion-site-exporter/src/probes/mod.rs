//! Site and service probes
//!
//! Provides the three measurements taken each collection cycle:
//! - Recursive disk usage of a site directory (external `du`)
//! - Liveness of a system service (external `systemctl is-active`)
//! - HTTP reachability and latency of a site domain
//!
//! Probes never fail the cycle. Each returns a [`ProbeOutcome`] that keeps
//! the failure reason; `metrics` flattens it to the exported default.

use crate::execution::{CommandExecutor, CommandLine, ExecutionError, ExecutionResult};
use reqwest::StatusCode;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of one probe: a measurement or the reason there is none
#[derive(Debug)]
pub enum ProbeOutcome<T> {
    Measured(T),
    Failed(ProbeFailure),
}

impl<T> ProbeOutcome<T> {
    pub fn measured(&self) -> Option<&T> {
        match self {
            ProbeOutcome::Measured(value) => Some(value),
            ProbeOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ProbeFailure> {
        match self {
            ProbeOutcome::Measured(_) => None,
            ProbeOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, ProbeOutcome::Measured(_))
    }

    pub fn unwrap_or(self, default: T) -> T {
        match self {
            ProbeOutcome::Measured(value) => value,
            ProbeOutcome::Failed(_) => default,
        }
    }
}

impl<T> From<Result<T, ProbeFailure>> for ProbeOutcome<T> {
    fn from(result: Result<T, ProbeFailure>) -> Self {
        match result {
            Ok(value) => ProbeOutcome::Measured(value),
            Err(failure) => ProbeOutcome::Failed(failure),
        }
    }
}

/// Why a probe has no measurement
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("`{command}` exited with status {code:?}: {stderr}")]
    ExitStatus {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ProbeFailure {
    pub fn is_timeout(&self) -> bool {
        match self {
            ProbeFailure::Execution(ExecutionError::Timeout { .. }) => true,
            ProbeFailure::Http { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    fn exit_status(command: &CommandLine, result: &ExecutionResult) -> Self {
        ProbeFailure::ExitStatus {
            command: command.to_string(),
            code: result.exit_code,
            stderr: result.stderr.trim().to_string(),
        }
    }
}

/// Recursive size of a directory via the configured `du`-like command
#[derive(Debug, Clone)]
pub struct DiskUsageProbe {
    executor: CommandExecutor,
    command: CommandLine,
}

impl DiskUsageProbe {
    pub fn new(executor: CommandExecutor, command: CommandLine) -> Self {
        Self { executor, command }
    }

    /// Size of `path` in bytes. Non-zero exit (missing path, permission
    /// denied on any subtree) counts as a failure.
    pub async fn measure(&self, path: &Path) -> ProbeOutcome<u64> {
        let command = self.command.with_arg(path);
        let outcome: ProbeOutcome<u64> = self.run(&command).await.into();
        if let Some(failure) = outcome.failure() {
            debug!("Disk usage probe failed for {}: {}", path.display(), failure);
        }
        outcome
    }

    async fn run(&self, command: &CommandLine) -> Result<u64, ProbeFailure> {
        let result = self.executor.run(command).await?;
        if !result.success {
            return Err(ProbeFailure::exit_status(command, &result));
        }

        parse_du_output(&result.stdout).ok_or_else(|| ProbeFailure::UnexpectedOutput {
            command: command.to_string(),
            output: result.stdout.clone(),
        })
    }
}

/// `du -sb` prints `<bytes>\t<path>`; only the leading count matters
fn parse_du_output(stdout: &str) -> Option<u64> {
    stdout.split_whitespace().next()?.parse().ok()
}

/// Service state as reported by `systemctl is-active`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Active,
    Inactive,
    Failed,
    Unknown,
}

impl ServiceState {
    /// Map an `is-active` answer; transitional states count as unknown
    pub fn parse(output: &str) -> Self {
        match output.trim() {
            "active" => ServiceState::Active,
            "inactive" | "deactivating" => ServiceState::Inactive,
            "failed" => ServiceState::Failed,
            _ => ServiceState::Unknown,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ServiceState::Active)
    }
}

/// Service liveness via the configured service manager query
#[derive(Debug, Clone)]
pub struct ServiceProbe {
    executor: CommandExecutor,
    command: CommandLine,
}

impl ServiceProbe {
    pub fn new(executor: CommandExecutor, command: CommandLine) -> Self {
        Self { executor, command }
    }

    pub async fn check(&self, service: &str) -> ProbeOutcome<ServiceState> {
        let command = self.command.with_arg(service);
        let outcome: ProbeOutcome<ServiceState> = self.run(&command).await.into();
        match &outcome {
            ProbeOutcome::Measured(state) => debug!("Service {}: {:?}", service, state),
            ProbeOutcome::Failed(failure) => {
                debug!("Service probe failed for {}: {}", service, failure)
            }
        }
        outcome
    }

    async fn run(&self, command: &CommandLine) -> Result<ServiceState, ProbeFailure> {
        let result = self.executor.run(command).await?;

        // `systemctl is-active` exits non-zero for every state but active,
        // so a recognised answer is a measurement whatever the exit code.
        match ServiceState::parse(&result.stdout) {
            ServiceState::Active if result.success => Ok(ServiceState::Active),
            ServiceState::Active | ServiceState::Unknown if !result.success => {
                Err(ProbeFailure::exit_status(command, &result))
            }
            ServiceState::Unknown => Err(ProbeFailure::UnexpectedOutput {
                command: command.to_string(),
                output: result.stdout.trim().to_string(),
            }),
            state => Ok(state),
        }
    }
}

/// Response of a reachability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteResponse {
    pub status: StatusCode,
    /// Time until response headers were received
    pub latency: Duration,
}

impl SiteResponse {
    /// Only an exact 200 counts as up
    pub fn is_up(&self) -> bool {
        self.status == StatusCode::OK
    }
}

/// Plain HTTP `GET http://<domain>` with a hard timeout
#[derive(Debug, Clone)]
pub struct SiteProbe {
    client: reqwest::Client,
}

impl SiteProbe {
    /// Every check opens a fresh connection and ignores proxy settings,
    /// so latency reflects the site itself.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }

    pub async fn check(&self, domain: &str) -> ProbeOutcome<SiteResponse> {
        let url = format!("http://{domain}");
        let start_time = Instant::now();

        match self.client.get(&url).send().await {
            Ok(response) => {
                let site = SiteResponse {
                    status: response.status(),
                    latency: start_time.elapsed(),
                };
                debug!("Site {} answered {} in {:?}", domain, site.status, site.latency);
                ProbeOutcome::Measured(site)
            }
            Err(source) => {
                let failure = ProbeFailure::Http { url, source };
                debug!("Site probe failed for {}: {}", domain, failure);
                ProbeOutcome::Failed(failure)
            }
        }
    }
}
