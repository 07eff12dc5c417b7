//! Command implementations behind the CLI

pub mod bundle;
pub mod container;
pub mod execute;
pub mod remote_run;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tempfile::TempDir;

use crate::bundler::{BundleError, BundleOptions, Bundler, DEFAULT_BUNDLE_NAME};
use crate::cli::{Cli, Command, ContainerCommand, RevisionFlags};
use crate::config::{Config, Settings};
use crate::error;

/// Process-wide state shared by all commands
#[derive(Debug, Clone)]
pub struct Context {
    pub work_dir: PathBuf,
}

impl Context {
    /// Working directory from `-C`, resolved against the current directory
    pub fn new(directory: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
        let work_dir = match directory {
            Some(dir) => cwd.join(dir),
            None => cwd,
        };
        if !work_dir.is_dir() {
            anyhow::bail!("{} is not a directory", work_dir.display());
        }
        Ok(Self { work_dir })
    }

    pub fn load_config(&self, flags: Settings) -> Result<Config> {
        Ok(Config::load(&self.work_dir, flags)?)
    }
}

/// Run the selected command and return the process exit code
pub async fn run(cli: Cli) -> Result<i32> {
    let ctx = Context::new(cli.directory.as_deref())?;
    match cli.command {
        Command::Bundle(args) => bundle::run(&ctx, args).await,
        Command::Execute(args) => execute::run(&ctx, args).await,
        Command::RemoteRun(args) => remote_run::run(&ctx, args).await,
        Command::Container(ContainerCommand::Build(args)) => container::build(&ctx, args).await,
        Command::Container(ContainerCommand::RemoteRun(args)) => {
            container::remote_run(&ctx, args).await
        }
    }
}

pub(crate) fn bundle_options(
    config: &Config,
    fuzz_tests: Vec<String>,
    revision: RevisionFlags,
    output: PathBuf,
) -> BundleOptions {
    let mut options = BundleOptions::from_config(config);
    options.fuzz_tests = fuzz_tests;
    options.commit = revision.commit;
    options.branch = revision.branch;
    options.output_path = output;
    options
}

/// Run the bundler off the async runtime
pub(crate) async fn create_bundle(options: BundleOptions) -> Result<PathBuf> {
    let result = tokio::task::spawn_blocking(move || Bundler::new(options).bundle())
        .await
        .context("Bundling was aborted")?;
    result.map_err(bundle_error)
}

fn bundle_error(err: BundleError) -> anyhow::Error {
    if err.is_reported() {
        error::mark_reported(err)
    } else {
        anyhow::Error::new(err)
    }
}

/// An existing bundle, or a fresh one in a temporary directory that lives as
/// long as the returned guard
pub(crate) async fn existing_or_new_bundle(
    config: &Config,
    bundle: Option<PathBuf>,
    fuzz_tests: Vec<String>,
    revision: RevisionFlags,
) -> Result<(PathBuf, Option<TempDir>)> {
    if let Some(path) = bundle {
        if !path.is_file() {
            anyhow::bail!("Bundle {} does not exist", path.display());
        }
        return Ok((path, None));
    }
    let temp_dir = tempfile::Builder::new()
        .prefix("fuzzkit-remote-")
        .tempdir()
        .context("Failed to create a temporary directory")?;
    let output = temp_dir.path().join(DEFAULT_BUNDLE_NAME);
    let options = bundle_options(config, fuzz_tests, revision, output);
    let path = create_bundle(options).await?;
    Ok((path, Some(temp_dir)))
}
