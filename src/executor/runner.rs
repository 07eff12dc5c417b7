//! Fuzzing engine process launchers

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::archive::Engine;

const JAZZER_MAIN_CLASS: &str = "com.code_intelligence.jazzer.Jazzer";
const LIBRARY_PATH_ENV: &str = "LD_LIBRARY_PATH";
/// Set for every fuzzer process
const NO_FUZZKIT_ENV: (&str, &str) = ("NO_FUZZKIT", "1");

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Fuzz test executable {0} does not exist")]
    MissingExecutable(PathBuf),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    LibFuzzer,
    Jazzer,
}

impl RunnerKind {
    /// Engines other than `JAVA_LIBFUZZER` run natively
    pub fn for_engine(engine: &Engine) -> Self {
        match engine {
            Engine::JavaLibFuzzer => RunnerKind::Jazzer,
            _ => RunnerKind::LibFuzzer,
        }
    }

    pub fn runner(&self) -> Box<dyn Runner> {
        match self {
            RunnerKind::LibFuzzer => Box::new(LibFuzzerRunner),
            RunnerKind::Jazzer => Box::new(JazzerRunner::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    Native {
        executable: PathBuf,
    },
    Jvm {
        class: String,
        method: Option<String>,
        class_paths: Vec<PathBuf>,
    },
}

/// Everything a runner needs, with paths already resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    pub fuzz_test: String,
    pub target: RunTarget,
    pub library_dirs: Vec<PathBuf>,
    /// New inputs are written here
    pub generated_corpus_dir: PathBuf,
    /// Read-only inputs, after the generated corpus
    pub seed_corpus_dirs: Vec<PathBuf>,
    pub dictionary: Option<PathBuf>,
    pub engine_args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub max_run_time: Option<Duration>,
    /// Crash artifacts land here
    pub artifact_dir: PathBuf,
    pub work_dir: PathBuf,
}

/// A fully assembled process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, OsString)>,
    pub work_dir: PathBuf,
}

impl Invocation {
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn run(&self) -> Result<ExitStatus, RunnerError> {
        let program = self.program.to_string_lossy().into_owned();
        tracing::info!(command = %self.display(), "Starting fuzzer");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;
        child
            .wait()
            .await
            .map_err(|source| RunnerError::Wait { program, source })
    }
}

#[async_trait]
pub trait Runner: Send + Sync {
    fn kind(&self) -> RunnerKind;

    fn invocation(&self, options: &RunnerOptions) -> Result<Invocation, RunnerError>;

    async fn run(&self, options: &RunnerOptions) -> Result<ExitStatus, RunnerError> {
        self.invocation(options)?.run().await
    }
}

/// libFuzzer flags shared by both engines
fn libfuzzer_args(options: &RunnerOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut prefix = options.artifact_dir.clone().into_os_string();
    prefix.push("/");
    let mut artifact_prefix = OsString::from("-artifact_prefix=");
    artifact_prefix.push(prefix);
    args.push(artifact_prefix);

    if let Some(dictionary) = &options.dictionary {
        let mut dict = OsString::from("-dict=");
        dict.push(dictionary);
        args.push(dict);
    }
    if let Some(max) = options.max_run_time.filter(|d| !d.is_zero()) {
        args.push(format!("-max_total_time={}", max.as_secs()).into());
    }
    args.extend(options.engine_args.iter().map(OsString::from));

    args.push(options.generated_corpus_dir.clone().into_os_string());
    args.extend(
        options
            .seed_corpus_dirs
            .iter()
            .map(|d| d.clone().into_os_string()),
    );
    args
}

fn process_env(options: &RunnerOptions) -> Vec<(String, OsString)> {
    let mut env: Vec<(String, OsString)> = options
        .env
        .iter()
        .map(|(k, v)| (k.clone(), OsString::from(v)))
        .collect();
    env.push((NO_FUZZKIT_ENV.0.to_string(), NO_FUZZKIT_ENV.1.into()));

    if !options.library_dirs.is_empty() {
        let inherited = std::env::var_os(LIBRARY_PATH_ENV);
        let dirs = options
            .library_dirs
            .iter()
            .cloned()
            .chain(inherited.iter().flat_map(std::env::split_paths));
        if let Ok(joined) = std::env::join_paths(dirs) {
            env.push((LIBRARY_PATH_ENV.to_string(), joined));
        }
    }
    env
}

pub struct LibFuzzerRunner;

#[async_trait]
impl Runner for LibFuzzerRunner {
    fn kind(&self) -> RunnerKind {
        RunnerKind::LibFuzzer
    }

    fn invocation(&self, options: &RunnerOptions) -> Result<Invocation, RunnerError> {
        let executable = match &options.target {
            RunTarget::Native { executable } => executable.clone(),
            RunTarget::Jvm { class, .. } => PathBuf::from(class),
        };
        if !executable.is_file() {
            return Err(RunnerError::MissingExecutable(executable));
        }
        Ok(Invocation {
            program: executable,
            args: libfuzzer_args(options),
            env: process_env(options),
            work_dir: options.work_dir.clone(),
        })
    }
}

pub struct JazzerRunner {
    java: PathBuf,
}

impl Default for JazzerRunner {
    fn default() -> Self {
        Self {
            java: java_binary(std::env::var_os("JAVA_HOME").as_deref().map(Path::new)),
        }
    }
}

impl JazzerRunner {
    pub fn with_java(java: impl Into<PathBuf>) -> Self {
        Self { java: java.into() }
    }
}

fn java_binary(java_home: Option<&Path>) -> PathBuf {
    match java_home {
        Some(home) if home.join("bin").join("java").is_file() => home.join("bin").join("java"),
        _ => PathBuf::from("java"),
    }
}

#[async_trait]
impl Runner for JazzerRunner {
    fn kind(&self) -> RunnerKind {
        RunnerKind::Jazzer
    }

    fn invocation(&self, options: &RunnerOptions) -> Result<Invocation, RunnerError> {
        let mut args: Vec<OsString> = Vec::new();
        match &options.target {
            RunTarget::Jvm {
                class,
                method,
                class_paths,
            } => {
                // The class path is always `:` separated in bundles
                let class_path = class_paths
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(":");
                args.push("-cp".into());
                args.push(class_path.into());
                args.push(JAZZER_MAIN_CLASS.into());
                args.push(format!("--target_class={class}").into());
                if let Some(method) = method {
                    args.push(format!("--target_method={method}").into());
                }
            }
            RunTarget::Native { executable } => {
                return Err(RunnerError::MissingExecutable(executable.clone()));
            }
        }
        args.extend(libfuzzer_args(options));

        Ok(Invocation {
            program: self.java.clone(),
            args,
            env: process_env(options),
            work_dir: options.work_dir.clone(),
        })
    }
}
