use std::path::{Path, PathBuf};
use std::process::Command;

use super::{find_executable, run, BuildError, BuildOptions, BuildResult, Builder};
use crate::config::BuildSystem;

/// Runs a user supplied build command for projects without a supported
/// build system.
///
/// The command sees the requested tests in `FUZZ_TEST` (first one) and
/// `FUZZ_TESTS` (all, space separated). Afterwards every test is resolved
/// either as a path to the executable or by searching the project for an
/// executable with that name.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    options: BuildOptions,
}

impl CommandBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    fn locate(&self, fuzz_test: &str) -> Result<PathBuf, BuildError> {
        let project_dir = &self.options.project_dir;
        let as_path = project_dir.join(fuzz_test);
        if as_path.is_file() {
            return Ok(as_path);
        }

        let name = Path::new(fuzz_test)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| fuzz_test.to_string());
        find_executable(project_dir, &name).ok_or_else(|| BuildError::ArtifactNotFound {
            name: fuzz_test.to_string(),
            dir: project_dir.clone(),
        })
    }
}

impl Builder for CommandBuilder {
    fn build_system(&self) -> BuildSystem {
        BuildSystem::Other
    }

    fn build(&self, fuzz_tests: &[String]) -> Result<Vec<BuildResult>, BuildError> {
        match &self.options.build_command {
            Some(build_command) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c")
                    .arg(build_command)
                    .current_dir(&self.options.project_dir)
                    .env("FUZZ_TEST", fuzz_tests.first().map(String::as_str).unwrap_or(""))
                    .env("FUZZ_TESTS", fuzz_tests.join(" "));
                run(&mut cmd)?;
            }
            None => {
                tracing::debug!("No build command configured, using existing executables");
            }
        }

        fuzz_tests
            .iter()
            .map(|fuzz_test| {
                let executable = self.locate(fuzz_test)?;
                Ok(BuildResult::new(fuzz_test, &self.options.project_dir)
                    .with_executable(executable))
            })
            .collect()
    }

    fn project_dir(&self) -> &Path {
        &self.options.project_dir
    }
}
