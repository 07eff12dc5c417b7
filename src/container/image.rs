use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::engine::{ContainerEngine, RegistryAuth};
use super::ImageError;
use crate::archive::{add_dir_to_file_map, extract, write_tar, BundleMetadata, FileMap};

/// Tag given to every locally built image
pub const LOCAL_IMAGE_TAG: &str = "fuzzkit";

const DOCKERFILE_NAME: &str = "Dockerfile";
/// Name of the CLI executable inside the build context
const CLI_BINARY_NAME: &str = "fuzzkit";

pub fn render_dockerfile(base_image: &str) -> String {
    format!(
        "FROM {base_image}\n\
         WORKDIR /fuzzkit\n\
         COPY . /fuzzkit\n\
         ENTRYPOINT [\"/fuzzkit/{CLI_BINARY_NAME}\", \"execute\"]\n"
    )
}

/// Repository name for an image, lowercased and restricted to the
/// characters registries accept
pub fn image_name_for(name: &str) -> String {
    let sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' | '/' => c,
            _ => '-',
        })
        .collect();
    let trimmed = sanitized.trim_matches(|c| c == '-' || c == '.' || c == '/');
    if trimmed.is_empty() {
        "fuzz-tests".to_string()
    } else {
        trimmed.to_string()
    }
}

/// An extracted bundle ready to be sent to the engine
pub struct BuildContext {
    dir: TempDir,
    pub metadata: BundleMetadata,
}

impl BuildContext {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Uncompressed tar of the whole context
    pub fn to_tar(&self) -> Result<Vec<u8>, ImageError> {
        let mut file_map = FileMap::new();
        add_dir_to_file_map(&mut file_map, "", self.path())?;
        Ok(write_tar(Vec::new(), &file_map)?)
    }
}

pub struct ImageBuilder {
    engine: Box<dyn ContainerEngine>,
    cli_binary: Option<PathBuf>,
}

impl ImageBuilder {
    pub fn new(engine: Box<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            cli_binary: None,
        }
    }

    /// Executable copied into images, the running binary by default
    pub fn with_cli_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.cli_binary = Some(path.into());
        self
    }

    /// Extract `bundle`, then add a Dockerfile and the CLI executable
    pub fn prepare_build_context(&self, bundle: &Path) -> Result<BuildContext, ImageError> {
        let dir = tempfile::Builder::new().prefix("fuzzkit-image-").tempdir()?;
        extract(bundle, dir.path())?;

        let metadata = BundleMetadata::from_dir(dir.path())
            .map_err(|err| ImageError::InvalidBundle(format!("{}: {err}", bundle.display())))?;
        let base_image = if metadata.docker_base_image.is_empty() {
            metadata.run_environment.docker.as_str()
        } else {
            metadata.docker_base_image.as_str()
        };
        if base_image.is_empty() {
            return Err(ImageError::InvalidBundle(format!(
                "{}: no base image in metadata",
                bundle.display()
            )));
        }

        fs::write(dir.path().join(DOCKERFILE_NAME), render_dockerfile(base_image))?;

        let cli_binary = match &self.cli_binary {
            Some(path) => path.clone(),
            None => std::env::current_exe()?,
        };
        fs::copy(&cli_binary, dir.path().join(CLI_BINARY_NAME))?;

        tracing::debug!(dir = %dir.path().display(), "Prepared image build context");
        Ok(BuildContext { dir, metadata })
    }

    /// Build an image from `bundle` and return its ID
    pub async fn build_image_from_bundle(&self, bundle: &Path) -> Result<String, ImageError> {
        let context = self.prepare_build_context(bundle)?;
        let tar = context.to_tar()?;
        let image_id = self.engine.build(tar, LOCAL_IMAGE_TAG).await?;
        tracing::info!(image = %image_id, tag = LOCAL_IMAGE_TAG, "Built fuzz container image");
        Ok(image_id)
    }

    /// Tag `image_id` as `<registry>/<image_name>:<id>` and push it.
    /// Returns the pushed reference.
    pub async fn upload_image(
        &self,
        image_id: &str,
        registry: &str,
        image_name: &str,
        auth: &RegistryAuth,
    ) -> Result<String, ImageError> {
        let repo = format!(
            "{}/{}",
            registry.trim_end_matches('/'),
            image_name_for(image_name)
        );
        let tag = image_id.trim_start_matches("sha256:");
        tracing::debug!(image = image_id, repo = %repo, tag, "Uploading image");

        self.engine.tag(image_id, &repo, tag).await?;
        self.engine.push(&repo, tag, auth).await?;

        let reference = format!("{repo}:{tag}");
        tracing::info!(reference = %reference, "Pushed image");
        Ok(reference)
    }
}
