use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{run, BuildError, BuildOptions, BuildResult, Builder};
use crate::config::BuildSystem;

/// Compiles the test sources with Maven and asks the dependency plugin for
/// the test class path.
#[derive(Debug, Clone)]
pub struct MavenBuilder {
    options: BuildOptions,
}

impl MavenBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    fn build_command(&self, classpath_file: &Path) -> Command {
        let mut cmd = Command::new("mvn");
        cmd.arg("-B");
        if let Some(jobs) = self.options.jobs {
            cmd.arg("-T").arg(jobs.to_string());
        }
        cmd.arg("test-compile")
            .arg("dependency:build-classpath")
            .arg("-Dmdep.includeScope=test")
            .arg(format!("-Dmdep.outputFile={}", classpath_file.display()))
            .current_dir(&self.options.project_dir);
        cmd
    }

    /// `target/classes`, `target/test-classes`, then the dependency jars
    fn runtime_deps(&self, classpath: &str) -> Vec<PathBuf> {
        let target = self.options.project_dir.join("target");
        let mut deps = vec![target.join("classes"), target.join("test-classes")];
        deps.extend(
            std::env::split_paths(classpath.trim()).filter(|p| !p.as_os_str().is_empty()),
        );
        deps
    }
}

impl Builder for MavenBuilder {
    fn build_system(&self) -> BuildSystem {
        BuildSystem::Maven
    }

    fn build(&self, fuzz_tests: &[String]) -> Result<Vec<BuildResult>, BuildError> {
        let classpath_file = tempfile::NamedTempFile::new()?;
        run(&mut self.build_command(classpath_file.path()))?;
        let classpath = fs::read_to_string(classpath_file.path())?;
        let deps = self.runtime_deps(&classpath);

        Ok(fuzz_tests
            .iter()
            .map(|name| {
                BuildResult::new(name, &self.options.project_dir).with_runtime_deps(deps.clone())
            })
            .collect())
    }

    fn project_dir(&self) -> &Path {
        &self.options.project_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::describe;

    fn builder(jobs: Option<usize>) -> MavenBuilder {
        MavenBuilder::new(BuildOptions {
            project_dir: PathBuf::from("/proj"),
            jobs,
            ..Default::default()
        })
    }

    #[test]
    fn test_build_command() {
        let cmd = builder(Some(4)).build_command(Path::new("/tmp/cp.txt"));
        assert_eq!(
            describe(&cmd),
            "mvn -B -T 4 test-compile dependency:build-classpath -Dmdep.includeScope=test -Dmdep.outputFile=/tmp/cp.txt"
        );
        let cmd = builder(None).build_command(Path::new("/tmp/cp.txt"));
        assert!(!describe(&cmd).contains("-T"));
    }

    #[cfg(unix)]
    #[test]
    fn test_runtime_deps_order() {
        let deps = builder(None).runtime_deps("/m2/junit.jar:/m2/jazzer.jar\n");
        assert_eq!(
            deps,
            vec![
                PathBuf::from("/proj/target/classes"),
                PathBuf::from("/proj/target/test-classes"),
                PathBuf::from("/m2/junit.jar"),
                PathBuf::from("/m2/jazzer.jar"),
            ]
        );
    }
}
