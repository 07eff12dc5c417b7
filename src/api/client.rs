use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;

use super::types::{FindingsResponse, ProjectsResponse, RunResponse};
use super::{
    ApiError, Artifact, CampaignApi, CampaignRun, ContainerRunRequest, Finding, Project, Run,
};
use crate::config::normalize_project_name;
use crate::util::paths::access_tokens_path;

pub const API_TOKEN_ENV: &str = "FUZZKIT_API_TOKEN";

const LIST_PROJECTS_TIMEOUT: Duration = Duration::from_secs(5);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ARTIFACT_FIELD: &str = "fuzzing-artifact";

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: String,
    client: Client,
}

impl ApiClient {
    pub fn new(server: &str, token: impl Into<String>) -> Result<Self, ApiError> {
        let parsed =
            Url::parse(server).map_err(|_| ApiError::InvalidServerUrl(server.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ApiError::InvalidServerUrl(server.to_string()));
        }
        Ok(Self {
            base_url: server.trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        })
    }

    /// Client for `server` using the token from the environment or the
    /// token file
    pub fn from_server(server: &str) -> Result<Self, ApiError> {
        let token = lookup_token(server).ok_or_else(|| ApiError::MissingToken {
            server: server.to_string(),
        })?;
        Self::new(server, token)
    }

    pub fn server(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str, timeout: Duration) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .timeout(timeout)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        tracing::debug!(method, url, "API request");
        let response = request.send().await.map_err(|source| ApiError::Network {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|source| ApiError::Network {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            return Err(ApiError::Status {
                method,
                url: url.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|err| ApiError::Decode {
            url: url.to_string(),
            reason: format!("{err} - {text}"),
        })
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        let url = self.url("v1/projects");
        let request = self.request(Method::GET, &url, LIST_PROJECTS_TIMEOUT);
        let response: ProjectsResponse = self.send("GET", &url, request).await?;
        Ok(response.projects)
    }

    /// Upload a bundle as a fuzzing artifact of `project`
    pub async fn upload_bundle(&self, project: &str, bundle: &Path) -> Result<Artifact, ApiError> {
        let bytes = tokio::fs::read(bundle)
            .await
            .map_err(|source| ApiError::ReadArtifact {
                path: bundle.to_path_buf(),
                source,
            })?;
        let file_name = bundle
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fuzz_tests.tar.gz".to_string());
        tracing::info!(bundle = %bundle.display(), size = bytes.len(), "Uploading bundle");

        let form = Form::new().part(ARTIFACT_FIELD, Part::bytes(bytes).file_name(file_name));
        let url = self.url(&format!(
            "v2/{}/artifacts/import",
            normalize_project_name(project)
        ));
        let request = self.request(Method::POST, &url, UPLOAD_TIMEOUT).multipart(form);
        self.send("POST", &url, request).await
    }

    /// Start a campaign run for an uploaded artifact
    pub async fn start_remote_run(&self, artifact: &Artifact) -> Result<CampaignRun, ApiError> {
        let url = self.url(&format!("v1/{}:run", artifact.resource_name));
        let request = self
            .request(Method::POST, &url, DEFAULT_TIMEOUT)
            .json(&serde_json::json!({}));
        self.send("POST", &url, request).await
    }

    /// Start a run of a pushed container image
    pub async fn start_container_run(&self, run: &ContainerRunRequest) -> Result<Run, ApiError> {
        let url = self.url("v3/runs");
        let request = self.request(Method::POST, &url, DEFAULT_TIMEOUT).json(run);
        let response: RunResponse = self.send("POST", &url, request).await?;
        Ok(response.run)
    }
}

#[async_trait]
impl CampaignApi for ApiClient {
    async fn run_status(&self, run_nid: &str) -> Result<Run, ApiError> {
        let url = self.url(&format!("v3/runs/{run_nid}/status"));
        let request = self.request(Method::GET, &url, DEFAULT_TIMEOUT);
        let response: RunResponse = self.send("GET", &url, request).await?;
        Ok(response.run)
    }

    async fn run_findings(&self, run_nid: &str) -> Result<Vec<Finding>, ApiError> {
        let url = self.url(&format!("v3/runs/{run_nid}/findings"));
        let request = self.request(Method::GET, &url, DEFAULT_TIMEOUT);
        let response: FindingsResponse = self.send("GET", &url, request).await?;
        Ok(response.findings)
    }
}

/// Token for `server` from `FUZZKIT_API_TOKEN` or `~/.fuzzkit/access_tokens.json`
pub fn lookup_token(server: &str) -> Option<String> {
    token_from(
        server,
        std::env::var(API_TOKEN_ENV).ok(),
        &access_tokens_path(),
    )
}

fn token_from(server: &str, env_token: Option<String>, tokens_file: &Path) -> Option<String> {
    if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
        return Some(token.trim().to_string());
    }

    let contents = std::fs::read_to_string(tokens_file).ok()?;
    let tokens: HashMap<String, String> = match serde_json::from_str(&contents) {
        Ok(tokens) => tokens,
        Err(err) => {
            tracing::warn!(path = %tokens_file.display(), "Ignoring unreadable token file: {err}");
            return None;
        }
    };
    let wanted = server.trim_end_matches('/');
    tokens
        .into_iter()
        .find(|(key, _)| key.trim_end_matches('/') == wanted)
        .map(|(_, token)| token)
}
