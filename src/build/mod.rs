//! Build system drivers
//!
//! Each driver shells out to the project's build tool and reports where the
//! fuzz test artifacts ended up. The bundler treats them all through the
//! [`Builder`] trait.

mod bazel;
mod cmake;
mod command;
mod gradle;
mod maven;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;

use crate::config::BuildSystem;

pub use bazel::{label_to_binary_path, BazelBuilder};
pub use cmake::CMakeBuilder;
pub use command::CommandBuilder;
pub use gradle::GradleBuilder;
pub use maven::MavenBuilder;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("build command `{command}` failed: {status}")]
    CommandFailed { command: String, status: ExitStatus },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not find the build artifact for {name} in {}", .dir.display())]
    ArtifactNotFound { name: String, dir: PathBuf },

    #[error("{0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a build produced for one fuzz test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// Fuzz test name as it was requested
    pub name: String,
    /// Fuzz test executable (native builds)
    pub executable: Option<PathBuf>,
    /// Executable instrumented for coverage (native builds)
    pub coverage_executable: Option<PathBuf>,
    /// Files and directories needed at run time, in class path order
    pub runtime_deps: Vec<PathBuf>,
    pub project_dir: PathBuf,
}

impl BuildResult {
    pub fn new(name: impl Into<String>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: None,
            coverage_executable: None,
            runtime_deps: Vec::new(),
            project_dir: project_dir.into(),
        }
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn with_coverage_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.coverage_executable = Some(path.into());
        self
    }

    pub fn with_runtime_deps(mut self, deps: Vec<PathBuf>) -> Self {
        self.runtime_deps = deps;
        self
    }
}

/// A build system driver
pub trait Builder: Send + Sync {
    fn build_system(&self) -> BuildSystem;

    /// Build `fuzz_tests` and return one result per test, in order
    fn build(&self, fuzz_tests: &[String]) -> Result<Vec<BuildResult>, BuildError>;

    /// Fuzz tests the build defines, bundled when none are named. Drivers
    /// that cannot enumerate their targets return an empty list.
    fn list_fuzz_tests(&self) -> Result<Vec<String>, BuildError> {
        Ok(Vec::new())
    }

    /// Directories to scan for fuzz tests when none are named
    fn test_source_dirs(&self) -> Result<Vec<PathBuf>, BuildError> {
        Ok(vec![self.project_dir().join("src").join("test")])
    }

    fn project_dir(&self) -> &Path;
}

/// Options shared by all drivers
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub project_dir: PathBuf,
    pub build_command: Option<String>,
    /// Extra arguments passed to the build tool
    pub args: Vec<String>,
    pub jobs: Option<usize>,
}

/// Pick the driver for `build_system`
pub fn builder_for(build_system: BuildSystem, options: BuildOptions) -> Box<dyn Builder> {
    match build_system {
        BuildSystem::CMake => Box::new(CMakeBuilder::new(options)),
        BuildSystem::Bazel => Box::new(BazelBuilder::new(options)),
        BuildSystem::Maven => Box::new(MavenBuilder::new(options)),
        BuildSystem::Gradle => Box::new(GradleBuilder::new(options)),
        BuildSystem::Other => Box::new(CommandBuilder::new(options)),
    }
}

/// Render a command for logs and error messages
pub(crate) fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `cmd` with inherited stdio and fail on a non-zero exit
pub(crate) fn run(cmd: &mut Command) -> Result<(), BuildError> {
    let command = describe(cmd);
    tracing::info!(command = %command, "Running build command");

    let status = cmd.status().map_err(|source| BuildError::Spawn {
        command: command.clone(),
        source,
    })?;
    if !status.success() {
        return Err(BuildError::CommandFailed { command, status });
    }
    Ok(())
}

/// Run `cmd` and return its stdout; stderr is passed through
pub(crate) fn run_captured(cmd: &mut Command) -> Result<String, BuildError> {
    let command = describe(cmd);
    tracing::info!(command = %command, "Running build command");

    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|source| BuildError::Spawn {
            command: command.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(BuildError::CommandFailed {
            command,
            status: output.status,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Depth-first search below `dir` for an executable file called `name`.
///
/// Hidden directories are skipped.
pub fn find_executable(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut entries: Vec<_> = fs::read_dir(dir).ok()?.filter_map(Result::ok).collect();
    entries.sort_by_key(|entry| entry.file_name());

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            if !entry.file_name().to_string_lossy().starts_with('.') {
                subdirs.push(path);
            }
        } else if entry.file_name() == name && is_executable(&path) {
            return Some(path);
        }
    }
    subdirs
        .into_iter()
        .find_map(|subdir| find_executable(&subdir, name))
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Lines of `output` that start with `prefix`, split as a path list
pub(crate) fn parse_prefixed_paths(output: &str, prefix: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix(prefix))
        .flat_map(|value| std::env::split_paths(value).collect::<Vec<_>>())
        .filter(|path| !path.as_os_str().is_empty())
        .collect()
}
