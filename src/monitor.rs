//! Watching a remote campaign run until it ends or reports a finding

use std::fmt;
use std::future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::api::{ApiError, CampaignApi, Finding, RunState};

/// How often the run is polled when no shorter duration is requested
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Severity of a well-known error ID. Unknown IDs are `Low`.
    pub fn for_error_id(error_id: &str) -> Self {
        match error_id.trim().to_ascii_lowercase().as_str() {
            "heap-buffer-overflow"
            | "stack-buffer-overflow"
            | "heap-use-after-free"
            | "stack-use-after-return"
            | "double-free"
            | "remote-code-execution"
            | "os-command-injection"
            | "sql-injection"
            | "unsafe-deserialization" => Severity::Critical,
            "global-buffer-overflow"
            | "container-overflow"
            | "use-after-poison"
            | "wild-free"
            | "path-traversal"
            | "ldap-injection"
            | "xpath-injection"
            | "server-side-request-forgery"
            | "script-engine-injection"
            | "naming-context-lookup" => Severity::High,
            "segmentation-fault"
            | "null-dereference"
            | "stack-exhaustion"
            | "undefined-behavior"
            | "regex-injection"
            | "integer-overflow" => Severity::Medium,
            _ => Severity::Low,
        }
    }

    /// The level the service assigned, or the error ID table entry
    pub fn of(finding: &Finding) -> Self {
        finding
            .severity
            .as_ref()
            .and_then(|s| s.level.as_deref())
            .and_then(Severity::parse)
            .unwrap_or_else(|| Severity::for_error_id(&finding.error_id))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Why monitoring ended
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    /// The run finished or succeeded
    Finished,
    /// Findings at or above the threshold, from the first tick that saw any
    FindingsReported(Vec<Finding>),
    Cancelled,
    Stopped,
    /// The monitoring duration elapsed first
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Zero or `None` monitors until the run ends
    pub duration: Option<Duration>,
    pub min_severity: Option<Severity>,
    pub poll_interval: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            duration: None,
            min_severity: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl MonitorOptions {
    fn deadline(&self) -> Option<Duration> {
        self.duration.filter(|d| !d.is_zero())
    }

    /// A requested duration shorter than the poll interval shortens the tick
    fn tick_period(&self) -> Duration {
        match self.deadline() {
            Some(duration) => duration.min(self.poll_interval),
            None => self.poll_interval,
        }
    }
}

pub struct RemoteMonitor<'a> {
    api: &'a dyn CampaignApi,
    options: MonitorOptions,
}

impl<'a> RemoteMonitor<'a> {
    pub fn new(api: &'a dyn CampaignApi, options: MonitorOptions) -> Self {
        Self { api, options }
    }

    pub async fn monitor(&self, run_nid: &str) -> Result<MonitorOutcome, MonitorError> {
        if let Some(duration) = self.options.deadline() {
            tracing::info!("Max monitor duration is {} seconds", duration.as_secs());
        }
        if let Some(severity) = self.options.min_severity {
            tracing::info!("Monitoring for findings of severity {severity} or higher");
        }
        tracing::info!(
            "Monitoring stops when the run finishes, times out, or a finding is reported"
        );

        let run = self.api.run_status(run_nid).await?;
        if run.state().is_done() {
            tracing::info!("Run finished");
            return Ok(MonitorOutcome::Finished);
        }

        let period = self.options.tick_period();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline = self.options.deadline().map(|d| Instant::now() + d);
        let timeout = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => future::pending::<()>().await,
            }
        };
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    if let Some(outcome) = self.poll(run_nid).await? {
                        return Ok(outcome);
                    }
                }
                () = &mut timeout => {
                    tracing::info!("Monitoring duration elapsed");
                    return Ok(MonitorOutcome::TimedOut);
                }
            }
        }
    }

    async fn poll(&self, run_nid: &str) -> Result<Option<MonitorOutcome>, MonitorError> {
        let run = self.api.run_status(run_nid).await?;
        let findings = self.api.run_findings(run_nid).await?;
        tracing::debug!(status = %run.status, findings = findings.len(), "Polled run");

        let reported = filter_findings(findings, self.options.min_severity);
        if !reported.is_empty() {
            for finding in &reported {
                tracing::info!(
                    nid = %finding.nid,
                    severity = %Severity::of(finding),
                    "Finding found: {}",
                    finding.display_name
                );
            }
            return Ok(Some(MonitorOutcome::FindingsReported(reported)));
        }

        Ok(match run.state() {
            RunState::Cancelled => {
                tracing::warn!("Run cancelled");
                Some(MonitorOutcome::Cancelled)
            }
            RunState::Stopped => {
                tracing::info!("Run stopped");
                Some(MonitorOutcome::Stopped)
            }
            state if state.is_done() => {
                tracing::info!("Run finished");
                Some(MonitorOutcome::Finished)
            }
            _ => None,
        })
    }
}

/// Keep the findings at or above `min_severity`, all of them without one
pub fn filter_findings(findings: Vec<Finding>, min_severity: Option<Severity>) -> Vec<Finding> {
    match min_severity {
        Some(min) => findings
            .into_iter()
            .filter(|f| Severity::of(f) >= min)
            .collect(),
        None => findings,
    }
}
