//! Command line definition

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Settings;

#[derive(Debug, Parser)]
#[command(name = "fuzzkit", version, about = "Bundle, containerize and run fuzz tests")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run as if started in DIR
    #[arg(short = 'C', long = "directory", global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build fuzz tests and package them into a bundle
    Bundle(BundleArgs),

    /// Run a fuzz test from an unpacked bundle in the current directory
    Execute(ExecuteArgs),

    /// Upload a bundle and start a remote fuzzing run
    RemoteRun(RemoteRunArgs),

    /// Container image commands
    #[command(subcommand)]
    Container(ContainerCommand),
}

#[derive(Debug, Subcommand)]
pub enum ContainerCommand {
    /// Build a container image from a bundle
    Build(ContainerBuildArgs),

    /// Build and push an image, then start a remote run with it
    RemoteRun(ContainerRemoteRunArgs),
}

/// Flags that override configuration keys
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigFlags {
    /// cmake, bazel, maven, gradle or other
    #[arg(long, value_name = "SYSTEM")]
    pub build_system: Option<String>,

    /// Build command for the `other` build system
    #[arg(long, value_name = "COMMAND")]
    pub build_command: Option<String>,

    /// Project root, defaults to the directory of fuzzkit.toml
    #[arg(long, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    /// Fuzzing dictionary
    #[arg(long, value_name = "FILE")]
    pub dict: Option<PathBuf>,

    /// Seed corpus directory (repeatable)
    #[arg(short = 's', long = "seed-corpus", value_name = "DIR")]
    pub seed_corpus_dirs: Vec<PathBuf>,

    /// Argument passed to the fuzzing engine (repeatable)
    #[arg(long = "engine-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// KEY=VALUE set for the fuzzer (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Maximum run time per fuzz test, e.g. 30m
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Base image of the execution environment
    #[arg(long, value_name = "IMAGE")]
    pub docker_image: Option<String>,

    /// Maximum number of concurrent build jobs
    #[arg(short = 'j', long, value_name = "N")]
    pub build_jobs: Option<String>,
}

impl ConfigFlags {
    pub fn to_settings(&self) -> Settings {
        Settings {
            build_system: self.build_system.clone(),
            build_command: self.build_command.clone(),
            project_dir: self.project_dir.clone(),
            dict: self.dict.clone(),
            seed_corpus_dirs: non_empty(&self.seed_corpus_dirs),
            engine_args: non_empty(&self.engine_args),
            env: non_empty(&self.env),
            timeout: self.timeout.clone(),
            docker_image: self.docker_image.clone(),
            build_jobs: self.build_jobs.clone(),
            ..Settings::default()
        }
    }
}

fn non_empty<T: Clone>(values: &[T]) -> Option<Vec<T>> {
    (!values.is_empty()).then(|| values.to_vec())
}

#[derive(Debug, Clone, Default, Args)]
pub struct RevisionFlags {
    /// Commit recorded in the bundle, defaults to git HEAD
    #[arg(long)]
    pub commit: Option<String>,

    /// Branch recorded in the bundle, defaults to the current git branch
    #[arg(long)]
    pub branch: Option<String>,
}

#[derive(Debug, Args)]
pub struct BundleArgs {
    /// Fuzz tests to bundle; JVM and CMake projects bundle all their fuzz tests when empty
    #[arg(value_name = "FUZZ_TEST")]
    pub fuzz_tests: Vec<String>,

    /// Output path of the bundle
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigFlags,

    #[command(flatten)]
    pub revision: RevisionFlags,

    /// Arguments passed to the build system
    #[arg(last = true, value_name = "BUILD_ARGS")]
    pub build_args: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ExecuteArgs {
    /// Fuzz test to run
    #[arg(value_name = "FUZZ_TEST", conflicts_with = "single_fuzz_test")]
    pub fuzz_test: Option<String>,

    /// Run the only fuzz test in the bundle
    #[arg(long)]
    pub single_fuzz_test: bool,
}

/// Remote service selection
#[derive(Debug, Clone, Default, Args)]
pub struct RemoteFlags {
    /// Project on the fuzzing server
    #[arg(long, value_name = "PROJECT")]
    pub project: Option<String>,

    /// URL of the fuzzing server
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Print the server response as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl RemoteFlags {
    pub fn apply(&self, settings: &mut Settings) {
        if self.project.is_some() {
            settings.project = self.project.clone();
        }
        if self.server.is_some() {
            settings.server = self.server.clone();
        }
    }
}

#[derive(Debug, Args)]
pub struct RemoteRunArgs {
    #[arg(value_name = "FUZZ_TEST")]
    pub fuzz_tests: Vec<String>,

    /// Upload this bundle instead of creating one
    #[arg(long, value_name = "PATH")]
    pub bundle: Option<PathBuf>,

    #[command(flatten)]
    pub remote: RemoteFlags,

    #[command(flatten)]
    pub config: ConfigFlags,

    #[command(flatten)]
    pub revision: RevisionFlags,
}

#[derive(Debug, Args)]
pub struct ContainerBuildArgs {
    #[arg(value_name = "FUZZ_TEST")]
    pub fuzz_tests: Vec<String>,

    /// Build the image from this bundle instead of creating one
    #[arg(long, value_name = "PATH")]
    pub bundle: Option<PathBuf>,

    /// Docker Engine API endpoint
    #[arg(long, value_name = "URL")]
    pub docker_host: Option<String>,

    #[command(flatten)]
    pub config: ConfigFlags,

    #[command(flatten)]
    pub revision: RevisionFlags,
}

#[derive(Debug, Args)]
pub struct ContainerRemoteRunArgs {
    #[arg(value_name = "FUZZ_TEST")]
    pub fuzz_tests: Vec<String>,

    #[arg(long, value_name = "PATH")]
    pub bundle: Option<PathBuf>,

    /// Registry the image is pushed to
    #[arg(long, value_name = "REGISTRY")]
    pub registry: Option<String>,

    /// Docker Engine API endpoint
    #[arg(long, value_name = "URL")]
    pub docker_host: Option<String>,

    /// Watch the run after starting it
    #[arg(long)]
    pub monitor: bool,

    /// Stop monitoring after DURATION, e.g. 10m (implies --monitor)
    #[arg(long, value_name = "DURATION")]
    pub monitor_duration: Option<String>,

    /// Only report findings of at least this severity (implies --monitor)
    #[arg(long, value_name = "SEVERITY")]
    pub min_finding_severity: Option<String>,

    #[command(flatten)]
    pub remote: RemoteFlags,

    #[command(flatten)]
    pub config: ConfigFlags,

    #[command(flatten)]
    pub revision: RevisionFlags,
}
