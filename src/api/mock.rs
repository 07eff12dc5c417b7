//! Scripted campaign API for tests
//!
//! Every `run_status` call consumes the next scripted status and every
//! `run_findings` call the next scripted finding list. Once a script runs
//! out its last element repeats.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ApiError, CampaignApi, Finding, Run};

#[derive(Default)]
struct Script {
    statuses: VecDeque<String>,
    findings: VecDeque<Vec<Finding>>,
    last_status: Option<String>,
    last_findings: Vec<Finding>,
    fail_status_at: Option<usize>,
    status_calls: usize,
    findings_calls: usize,
}

#[derive(Clone, Default)]
pub struct MockCampaignApi {
    script: Arc<Mutex<Script>>,
}

impl MockCampaignApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses returned by successive `run_status` calls
    pub fn with_statuses<I, S>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script.lock().statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    /// Findings returned by successive `run_findings` calls
    pub fn with_findings(self, findings: Vec<Vec<Finding>>) -> Self {
        self.script.lock().findings = findings.into();
        self
    }

    /// Make the `n`th `run_status` call (1-based) fail
    pub fn fail_status_at(self, n: usize) -> Self {
        self.script.lock().fail_status_at = Some(n);
        self
    }

    pub fn status_calls(&self) -> usize {
        self.script.lock().status_calls
    }

    pub fn findings_calls(&self) -> usize {
        self.script.lock().findings_calls
    }
}

#[async_trait]
impl CampaignApi for MockCampaignApi {
    async fn run_status(&self, run_nid: &str) -> Result<Run, ApiError> {
        let mut script = self.script.lock();
        script.status_calls += 1;
        if script.fail_status_at == Some(script.status_calls) {
            return Err(ApiError::Status {
                method: "GET",
                url: format!("mock://v3/runs/{run_nid}/status"),
                status: 503,
                body: "unavailable".into(),
            });
        }
        if let Some(status) = script.statuses.pop_front() {
            script.last_status = Some(status);
        }
        Ok(Run {
            nid: run_nid.to_string(),
            status: script
                .last_status
                .clone()
                .unwrap_or_else(|| "RUNNING".to_string()),
        })
    }

    async fn run_findings(&self, _run_nid: &str) -> Result<Vec<Finding>, ApiError> {
        let mut script = self.script.lock();
        script.findings_calls += 1;
        if let Some(findings) = script.findings.pop_front() {
            script.last_findings = findings;
        }
        Ok(script.last_findings.clone())
    }
}
