//! Running a fuzz test from an unpacked bundle

pub mod runner;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::archive::{BundleMetadata, FuzzerEntry, MetadataError};
use crate::bundler::discovery::split_target;

pub use runner::{
    Invocation, JazzerRunner, LibFuzzerRunner, RunTarget, Runner, RunnerError, RunnerKind,
    RunnerOptions,
};

/// Inputs found while fuzzing
pub const GENERATED_CORPUS_DIR: &str = "corpus";
/// Seeds managed next to the bundle, used before the bundled ones
pub const MANAGED_SEED_DIR: &str = "seed";

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Bundle metadata file 'bundle.yaml' does not exist in {0}. Run this command in a directory containing an unpacked bundle.")]
    MissingMetadata(PathBuf),

    #[error("Fuzz test '{0}' not found in the bundle")]
    UnknownFuzzer(String),

    #[error("No fuzz test specified and the bundle contains {count} fuzz tests")]
    AmbiguousFuzzer { count: usize },

    #[error(transparent)]
    Metadata(MetadataError),

    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl ExecuteError {
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ExecuteError::MissingMetadata(_)
                | ExecuteError::UnknownFuzzer(_)
                | ExecuteError::AmbiguousFuzzer { .. }
                | ExecuteError::Runner(RunnerError::MissingExecutable(_))
        )
    }
}

pub struct Executor {
    bundle_dir: PathBuf,
    metadata: BundleMetadata,
}

impl Executor {
    /// Read `bundle.yaml` from `bundle_dir`
    pub fn load(bundle_dir: &Path) -> Result<Self, ExecuteError> {
        let metadata = BundleMetadata::from_dir(bundle_dir).map_err(|err| match err {
            MetadataError::Missing(dir) => ExecuteError::MissingMetadata(dir),
            other => ExecuteError::Metadata(other),
        })?;
        Ok(Self {
            bundle_dir: bundle_dir.to_path_buf(),
            metadata,
        })
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    /// One entry per name in bundle order. Native bundles list a fuzzing and
    /// a coverage entry under the same name; the first one wins.
    pub fn fuzzers(&self) -> Vec<&FuzzerEntry> {
        let mut seen: Vec<&FuzzerEntry> = Vec::new();
        for entry in &self.metadata.fuzzers {
            if !seen.iter().any(|e| e.name == entry.name) {
                seen.push(entry);
            }
        }
        seen
    }

    pub fn resolve(&self, name: Option<&str>) -> Result<&FuzzerEntry, ExecuteError> {
        let fuzzers = self.fuzzers();
        match name {
            Some(name) => fuzzers
                .into_iter()
                .find(|e| e.name == name)
                .ok_or_else(|| ExecuteError::UnknownFuzzer(name.to_string())),
            None => match fuzzers.as_slice() {
                [only] => Ok(*only),
                _ => Err(ExecuteError::AmbiguousFuzzer {
                    count: fuzzers.len(),
                }),
            },
        }
    }

    /// Build runner options for `entry`, creating the corpus directories
    pub fn runner_options(&self, entry: &FuzzerEntry) -> Result<RunnerOptions, ExecuteError> {
        let generated_corpus_dir = self.create_dir(GENERATED_CORPUS_DIR)?;
        let mut seed_corpus_dirs = vec![self.create_dir(MANAGED_SEED_DIR)?];
        if let Some(seeds) = &entry.seeds {
            let bundled = self.bundle_dir.join(seeds);
            if bundled.is_dir() {
                seed_corpus_dirs.push(bundled);
            }
        }

        let target = match RunnerKind::for_engine(&entry.engine) {
            RunnerKind::Jazzer => {
                let (class, method) = split_target(&entry.name);
                RunTarget::Jvm {
                    class: class.to_string(),
                    method: method.map(str::to_string),
                    class_paths: entry
                        .runtime_paths
                        .iter()
                        .map(|p| self.bundle_dir.join(p))
                        .collect(),
                }
            }
            RunnerKind::LibFuzzer => RunTarget::Native {
                executable: self
                    .bundle_dir
                    .join(entry.path.as_deref().unwrap_or(entry.name.as_str())),
            },
        };

        Ok(RunnerOptions {
            fuzz_test: entry.name.clone(),
            target,
            library_dirs: entry
                .library_paths
                .iter()
                .map(|p| self.bundle_dir.join(p))
                .collect(),
            generated_corpus_dir,
            seed_corpus_dirs,
            dictionary: entry.dictionary.as_ref().map(|d| self.bundle_dir.join(d)),
            engine_args: entry.engine_options.flags.clone(),
            env: parse_env(&entry.engine_options.env),
            max_run_time: (entry.max_run_time > 0)
                .then(|| Duration::from_secs(entry.max_run_time)),
            artifact_dir: self.bundle_dir.clone(),
            work_dir: self.bundle_dir.clone(),
        })
    }

    fn create_dir(&self, name: &str) -> Result<PathBuf, ExecuteError> {
        let path = self.bundle_dir.join(name);
        fs::create_dir_all(&path).map_err(|source| ExecuteError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Run the fuzz test called `name`, or the only one in the bundle.
    /// Returns the fuzzer's exit code.
    pub async fn run(&self, name: Option<&str>) -> Result<i32, ExecuteError> {
        let entry = self.resolve(name)?;
        let runner = RunnerKind::for_engine(&entry.engine).runner();
        self.run_with(entry, runner.as_ref()).await
    }

    pub async fn run_with(
        &self,
        entry: &FuzzerEntry,
        runner: &dyn Runner,
    ) -> Result<i32, ExecuteError> {
        let options = self.runner_options(entry)?;
        tracing::info!(fuzz_test = %entry.name, engine = %entry.engine, "Executing fuzz test");
        let status = runner.run(&options).await?;
        // Killed by a signal
        Ok(status.code().unwrap_or(1))
    }
}

/// `KEY=VALUE` pairs; malformed entries are skipped
fn parse_env(vars: &[String]) -> Vec<(String, String)> {
    vars.iter()
        .filter_map(|var| match var.split_once('=') {
            Some((key, value)) if !key.is_empty() => Some((key.to_string(), value.to_string())),
            _ => {
                tracing::warn!(var = %var, "Ignoring malformed environment variable");
                None
            }
        })
        .collect()
}
