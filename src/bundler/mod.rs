//! Turning build outputs into a bundle
//!
//! [`Bundler::bundle`] runs the whole pipeline: dependency preflight, fuzz
//! test discovery, builds, artifact staging through a [`BundleAdapter`],
//! `bundle.yaml` and finally the archive itself.

mod adapter;
pub mod discovery;
mod jazzer;
pub mod manifest_jar;
mod native;

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::archive::{
    ArchiveError, ArchiveWriter, BundleMetadata, CodeRevision, GitRevision, MetadataError,
    RunEnvironment, METADATA_FILE_NAME,
};
use crate::build::{builder_for, BuildError, BuildOptions, BuildResult, Builder};
use crate::config::{BuildSystem, Config};
use crate::util::tools::DependencyError;

pub use adapter::{BundleAdapter, BundleContext, RUNTIME_DEPS_DIR};
pub use jazzer::JazzerAdapter;
pub use native::NativeAdapter;

/// Default bundle file name
pub const DEFAULT_BUNDLE_NAME: &str = "fuzz_tests.tar.gz";

/// Set to bundle native projects on platforms other than Linux
pub const UNSUPPORTED_PLATFORM_ENV: &str = "FUZZKIT_BUNDLE_ON_UNSUPPORTED_PLATFORMS";

#[derive(Error, Debug)]
pub enum BundleError {
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("No fuzz test(s) could be found in the project directory")]
    NoFuzzTestsFound,

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(
        "bundling {build_system} projects is only supported on Linux (current OS: {os}), \
         set FUZZKIT_BUNDLE_ON_UNSUPPORTED_PLATFORMS=1 to try anyway"
    )]
    UnsupportedPlatform {
        build_system: BuildSystem,
        os: &'static str,
    },

    #[error("{what} {} does not exist", .path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("failed to create manifest jar: {0}")]
    ManifestJar(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BundleError {
    /// Caused by the user's environment or input rather than a bug
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            BundleError::Dependency(_)
                | BundleError::NoFuzzTestsFound
                | BundleError::UnsupportedPlatform { .. }
                | BundleError::MissingInput { .. }
        )
    }

    /// Already logged where it was detected
    pub fn is_reported(&self) -> bool {
        matches!(
            self,
            BundleError::Dependency(_) | BundleError::NoFuzzTestsFound
        )
    }
}

/// Everything one bundle invocation needs
#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub project_dir: PathBuf,
    pub build_system: BuildSystem,
    pub build_command: Option<String>,
    /// Tests to bundle; empty means discover them (JVM only)
    pub fuzz_tests: Vec<String>,
    pub output_path: PathBuf,
    /// Extra arguments for the build tool
    pub build_args: Vec<String>,
    pub build_jobs: Option<usize>,
    pub dictionary: Option<PathBuf>,
    pub seed_corpus_dirs: Vec<PathBuf>,
    pub engine_args: Vec<String>,
    pub env: Vec<String>,
    pub timeout: Option<Duration>,
    pub docker_image: String,
    pub commit: Option<String>,
    pub branch: Option<String>,
    pub allow_unsupported_platform: bool,
}

impl BundleOptions {
    pub fn new(project_dir: impl Into<PathBuf>, build_system: BuildSystem) -> Self {
        Self {
            project_dir: project_dir.into(),
            build_system,
            build_command: None,
            fuzz_tests: Vec::new(),
            output_path: PathBuf::from(DEFAULT_BUNDLE_NAME),
            build_args: Vec::new(),
            build_jobs: None,
            dictionary: None,
            seed_corpus_dirs: Vec::new(),
            engine_args: Vec::new(),
            env: Vec::new(),
            timeout: None,
            docker_image: String::new(),
            commit: None,
            branch: None,
            allow_unsupported_platform: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            build_command: config.build_command.clone(),
            build_jobs: config.build_jobs,
            dictionary: config.dict.clone(),
            seed_corpus_dirs: config.seed_corpus_dirs.clone(),
            engine_args: config.engine_args.clone(),
            env: config.env.clone(),
            timeout: config.timeout,
            docker_image: config.docker_image.clone(),
            allow_unsupported_platform: std::env::var_os(UNSUPPORTED_PLATFORM_ENV).is_some(),
            ..Self::new(&config.project_dir, config.build_system)
        }
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            project_dir: self.project_dir.clone(),
            build_command: self.build_command.clone(),
            args: self.build_args.clone(),
            jobs: self.build_jobs,
        }
    }

    /// Concurrent builds allowed for per-test builds
    pub fn parallel_jobs(&self) -> usize {
        self.build_jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Creates bundles
pub struct Bundler {
    options: BundleOptions,
    adapter: Box<dyn BundleAdapter>,
}

impl Bundler {
    /// Bundler with the adapter and build driver matching the build system
    pub fn new(options: BundleOptions) -> Self {
        let builder = builder_for(options.build_system, options.build_options());
        let adapter: Box<dyn BundleAdapter> = if options.build_system.is_jvm() {
            Box::new(JazzerAdapter::new(builder))
        } else {
            Box::new(NativeAdapter::new(builder))
        };
        Self { options, adapter }
    }

    pub fn with_adapter(options: BundleOptions, adapter: Box<dyn BundleAdapter>) -> Self {
        Self { options, adapter }
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    /// Create the bundle and return its path.
    ///
    /// The staging directory is removed on every exit path, and no partial
    /// bundle is left behind when writing fails.
    pub fn bundle(&self) -> Result<PathBuf, BundleError> {
        self.check_platform()?;
        self.adapter.check_dependencies()?;

        let temp_dir = tempfile::Builder::new().prefix("fuzzkit-bundle-").tempdir()?;
        let mut writer = ArchiveWriter::new();

        let fuzzers = {
            let mut ctx = BundleContext::new(&self.options, &mut writer, temp_dir.path());
            self.adapter.bundle(&mut ctx)?
        };

        let metadata = BundleMetadata {
            fuzzers,
            docker_base_image: self.options.docker_image.clone(),
            run_environment: RunEnvironment {
                docker: self.options.docker_image.clone(),
            },
            code_revision: self.code_revision(),
        };
        let metadata_path = metadata.write_to_dir(temp_dir.path())?;
        writer.write_file(METADATA_FILE_NAME, &metadata_path);

        let output = &self.options.output_path;
        if let Err(e) = write_bundle(&writer, output) {
            let _ = fs::remove_file(output);
            return Err(e);
        }

        tracing::info!(
            path = %output.display(),
            fuzzers = metadata.fuzzers.len(),
            entries = writer.len(),
            sha256 = %file_digest(output)?,
            "Created fuzz test bundle"
        );
        Ok(output.clone())
    }

    fn check_platform(&self) -> Result<(), BundleError> {
        let build_system = self.options.build_system;
        if build_system.is_jvm()
            || std::env::consts::OS == "linux"
            || self.options.allow_unsupported_platform
        {
            return Ok(());
        }
        Err(BundleError::UnsupportedPlatform {
            build_system,
            os: std::env::consts::OS,
        })
    }

    fn code_revision(&self) -> Option<CodeRevision> {
        let project_dir = &self.options.project_dir;
        let commit = self
            .options
            .commit
            .clone()
            .or_else(|| git_output(project_dir, &["rev-parse", "HEAD"]));
        let branch = self
            .options
            .branch
            .clone()
            .or_else(|| git_output(project_dir, &["rev-parse", "--abbrev-ref", "HEAD"]));
        if commit.is_none() && branch.is_none() {
            return None;
        }
        Some(CodeRevision {
            git: GitRevision { commit, branch },
        })
    }
}

fn write_bundle(writer: &ArchiveWriter, output: &Path) -> Result<(), BundleError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = BufWriter::new(File::create(output)?);
    let mut file = writer.finish(file)?;
    file.flush()?;
    Ok(())
}

fn file_digest(path: &Path) -> Result<String, BundleError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Trimmed stdout of a git command, `None` if git is missing or fails
fn git_output(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Build each target separately, at most `jobs` at a time.
///
/// Results keep the order of `targets`; the first failure aborts.
pub(crate) fn build_each(
    builder: &dyn Builder,
    targets: &[String],
    jobs: usize,
) -> Result<Vec<BuildResult>, BuildError> {
    let mut results = Vec::with_capacity(targets.len());
    for chunk in targets.chunks(jobs.max(1)) {
        let chunk_results: Vec<Result<Vec<BuildResult>, BuildError>> =
            std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|target| scope.spawn(move || builder.build(std::slice::from_ref(target))))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            Err(BuildError::Unsupported("build thread panicked".into()))
                        })
                    })
                    .collect()
            });
        for result in chunk_results {
            results.extend(result?);
        }
    }
    Ok(results)
}
