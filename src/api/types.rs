//! Request and response bodies

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// `projects/<id>`
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectsResponse {
    #[serde(default)]
    pub projects: Vec<Project>,
}

/// An uploaded bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "display-name")]
    pub display_name: String,
    #[serde(rename = "resource-name")]
    pub resource_name: String,
}

/// Campaign run started from an uploaded bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRun {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerRunRequest {
    pub image: String,
    pub project: String,
    pub fuzz_tests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub nid: String,
    pub status: String,
}

impl Run {
    pub fn state(&self) -> RunState {
        RunState::parse(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    pub run: Run,
}

/// Remote run status. The service is not consistent about case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Running,
    Finished,
    Succeeded,
    Cancelled,
    Stopped,
    Other(String),
}

impl RunState {
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "running" | "pending" => RunState::Running,
            "finished" => RunState::Finished,
            "succeeded" => RunState::Succeeded,
            "cancelled" | "canceled" => RunState::Cancelled,
            "stopped" => RunState::Stopped,
            _ => RunState::Other(status.to_string()),
        }
    }

    /// Finished or succeeded
    pub fn is_done(&self) -> bool {
        matches!(self, RunState::Finished | RunState::Succeeded)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingSeverity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub nid: String,
    #[serde(default)]
    pub run_nid: String,
    #[serde(default)]
    pub fuzz_target: String,
    #[serde(default)]
    pub error_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<FindingSeverity>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FindingsResponse {
    #[serde(default)]
    pub findings: Vec<Finding>,
}
