//! Client for the remote fuzzing service

pub mod client;
pub mod mock;
pub mod types;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{lookup_token, ApiClient};
pub use mock::MockCampaignApi;
pub use types::{
    Artifact, CampaignRun, ContainerRunRequest, Finding, FindingSeverity, Project, Run, RunState,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} failed with status {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),

    #[error("No API access token for {server}; set FUZZKIT_API_TOKEN or add it to ~/.fuzzkit/access_tokens.json")]
    MissingToken { server: String },

    #[error("Failed to read {path}: {source}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// The server rejected the token
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status: 401 | 403, .. })
    }
}

/// The part of the service a running campaign is observed through
#[async_trait]
pub trait CampaignApi: Send + Sync {
    async fn run_status(&self, run_nid: &str) -> Result<Run, ApiError>;

    async fn run_findings(&self, run_nid: &str) -> Result<Vec<Finding>, ApiError>;
}
