use async_trait::async_trait;
use base64::engine::general_purpose;
use base64::Engine as _;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::Serialize;

use super::progress::{ProgressFailure, ProgressParser};
use super::ImageError;

pub const REGISTRY_USERNAME_ENV: &str = "FUZZKIT_REGISTRY_USERNAME";
pub const REGISTRY_PASSWORD_ENV: &str = "FUZZKIT_REGISTRY_PASSWORD";

/// Credentials sent with a push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryAuth {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(rename = "serveraddress")]
    pub server_address: String,
}

impl RegistryAuth {
    pub fn from_env(registry: &str) -> Self {
        Self::from_lookup(registry, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(registry: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            username: lookup(REGISTRY_USERNAME_ENV).unwrap_or_default(),
            password: lookup(REGISTRY_PASSWORD_ENV).unwrap_or_default(),
            server_address: registry_host(registry).to_string(),
        }
    }

    /// Value of the `X-Registry-Auth` header
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_else(|_| b"{}".to_vec());
        general_purpose::URL_SAFE.encode(json)
    }
}

/// `registry.example.com/team/images` → `registry.example.com`
fn registry_host(registry: &str) -> &str {
    let registry = registry
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    registry.split('/').next().unwrap_or(registry)
}

/// Image operations of a container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build an image from an uncompressed tar build context and tag it
    async fn build(&self, context: Vec<u8>, tag: &str) -> Result<String, ImageError>;

    async fn tag(&self, image_id: &str, repo: &str, tag: &str) -> Result<(), ImageError>;

    async fn push(&self, repo: &str, tag: &str, auth: &RegistryAuth) -> Result<(), ImageError>;
}

/// Docker Engine API over HTTP
pub struct DockerEngine {
    base_url: String,
    client: Client,
}

impl DockerEngine {
    pub fn new(docker_host: &str) -> Self {
        Self {
            base_url: docker_host.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check(response: Response, url: &str) -> Result<Response, ImageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ImageError::Engine(format!(
            "{url} failed with status {status}: {}",
            body.trim()
        )))
    }

    /// Read a progress stream to its end
    async fn read_progress(
        response: Response,
        url: &str,
    ) -> Result<Result<Option<String>, ProgressFailure>, ImageError> {
        let mut parser = ProgressParser::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| ImageError::Engine(format!("{url}: {err}")))?;
            if let Err(failure) = parser.push_bytes(&chunk) {
                return Ok(Err(failure));
            }
        }
        Ok(parser.finish())
    }

    fn connection_error(url: &str, err: reqwest::Error) -> ImageError {
        ImageError::Engine(format!(
            "Failed to connect to the container engine at {url}: {err}"
        ))
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn build(&self, context: Vec<u8>, tag: &str) -> Result<String, ImageError> {
        let url = self.url("/build");
        tracing::debug!(url = %url, size = context.len(), "Submitting build context");
        let response = self
            .client
            .post(&url)
            .query(&[
                ("t", tag),
                ("dockerfile", "Dockerfile"),
                ("platform", "linux/amd64"),
                ("rm", "1"),
                ("forcerm", "1"),
            ])
            .header("Content-Type", "application/x-tar")
            .body(context)
            .send()
            .await
            .map_err(|err| Self::connection_error(&url, err))?;
        let response = Self::check(response, &url).await?;

        match Self::read_progress(response, &url).await? {
            Ok(Some(image_id)) => Ok(image_id),
            Ok(None) => Err(ImageError::ImageBuild {
                message: "the engine did not report an image ID".into(),
                last_output: None,
            }),
            Err(failure) => Err(ImageError::ImageBuild {
                message: failure.message,
                last_output: failure.last_output,
            }),
        }
    }

    async fn tag(&self, image_id: &str, repo: &str, tag: &str) -> Result<(), ImageError> {
        let url = self.url(&format!("/images/{image_id}/tag"));
        let response = self
            .client
            .post(&url)
            .query(&[("repo", repo), ("tag", tag)])
            .send()
            .await
            .map_err(|err| Self::connection_error(&url, err))?;
        Self::check(response, &url).await?;
        Ok(())
    }

    async fn push(&self, repo: &str, tag: &str, auth: &RegistryAuth) -> Result<(), ImageError> {
        let url = self.url(&format!("/images/{repo}/push"));
        let response = self
            .client
            .post(&url)
            .query(&[("tag", tag)])
            .header("X-Registry-Auth", auth.encode())
            .send()
            .await
            .map_err(|err| Self::connection_error(&url, err))?;
        let response = Self::check(response, &url).await?;

        match Self::read_progress(response, &url).await? {
            Ok(_) => Ok(()),
            Err(failure) => Err(ImageError::ImagePush {
                message: failure.message,
                last_output: failure.last_output,
            }),
        }
    }
}
