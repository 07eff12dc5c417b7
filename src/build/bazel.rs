use std::path::{Path, PathBuf};
use std::process::Command;

use super::{run, BuildError, BuildOptions, BuildResult, Builder};
use crate::config::BuildSystem;

/// Builds `cc_fuzz_test`-style targets with `bazel build`.
#[derive(Debug, Clone)]
pub struct BazelBuilder {
    options: BuildOptions,
}

impl BazelBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    fn build_command(&self, labels: &[String]) -> Command {
        let mut cmd = Command::new("bazel");
        cmd.arg("build");
        if let Some(jobs) = self.options.jobs {
            cmd.arg(format!("--jobs={jobs}"));
        }
        cmd.args(&self.options.args)
            .args(labels)
            .current_dir(&self.options.project_dir);
        cmd
    }
}

/// Where bazel puts the binary for `label`: `//pkg/sub:name` is at
/// `bazel-bin/pkg/sub/name`, `//pkg` at `bazel-bin/pkg/pkg`.
pub fn label_to_binary_path(workspace: &Path, label: &str) -> Result<PathBuf, BuildError> {
    let label = label.trim_start_matches('@').trim_start_matches("//");
    let (package, name) = match label.split_once(':') {
        Some((package, name)) => (package, name),
        None => {
            let name = label.rsplit('/').next().unwrap_or(label);
            (label, name)
        }
    };
    if name.is_empty() {
        return Err(BuildError::Unsupported(format!("invalid bazel label: {label}")));
    }

    let mut path = workspace.join("bazel-bin");
    for part in package.split('/').filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path.push(name);
    Ok(path)
}

impl Builder for BazelBuilder {
    fn build_system(&self) -> BuildSystem {
        BuildSystem::Bazel
    }

    fn build(&self, fuzz_tests: &[String]) -> Result<Vec<BuildResult>, BuildError> {
        run(&mut self.build_command(fuzz_tests))?;

        fuzz_tests
            .iter()
            .map(|label| {
                let binary = label_to_binary_path(&self.options.project_dir, label)?;
                if !binary.is_file() {
                    return Err(BuildError::ArtifactNotFound {
                        name: label.clone(),
                        dir: self.options.project_dir.join("bazel-bin"),
                    });
                }
                Ok(BuildResult::new(label, &self.options.project_dir).with_executable(binary))
            })
            .collect()
    }

    fn project_dir(&self) -> &Path {
        &self.options.project_dir
    }
}
