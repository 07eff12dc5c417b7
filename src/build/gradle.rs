use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{parse_prefixed_paths, run_captured, BuildError, BuildOptions, BuildResult, Builder};
use crate::config::BuildSystem;

const CLASSPATH_PREFIX: &str = "fuzzkit.test.classpath=";
const SOURCE_DIRS_PREFIX: &str = "fuzzkit.test.source-dirs=";

/// Registers the helper tasks in every project that applies the java plugin
const INIT_SCRIPT: &str = r#"allprojects {
    plugins.withId('java') {
        tasks.register('fuzzkitPrintTestClasspath') {
            dependsOn 'testClasses'
            doLast {
                println "fuzzkit.test.classpath=" + sourceSets.test.runtimeClasspath.files.join(File.pathSeparator)
            }
        }
        tasks.register('fuzzkitPrintTestSourceDirs') {
            doLast {
                println "fuzzkit.test.source-dirs=" + sourceSets.test.allSource.srcDirs.join(File.pathSeparator)
            }
        }
    }
}
"#;

/// Builds the test classes with Gradle, preferring the project's wrapper.
#[derive(Debug, Clone)]
pub struct GradleBuilder {
    options: BuildOptions,
}

impl GradleBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    fn program(&self) -> PathBuf {
        let wrapper = self.options.project_dir.join("gradlew");
        if wrapper.is_file() {
            wrapper
        } else {
            PathBuf::from("gradle")
        }
    }

    fn command(&self, init_script: &Path, task: &str) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.arg("--quiet")
            .arg("--init-script")
            .arg(init_script)
            .arg(task);
        if let Some(jobs) = self.options.jobs {
            cmd.arg("--parallel")
                .arg("--max-workers")
                .arg(jobs.to_string());
        }
        cmd.current_dir(&self.options.project_dir);
        cmd
    }

    fn run_task(&self, task: &str) -> Result<String, BuildError> {
        let mut init_script = tempfile::Builder::new()
            .prefix("fuzzkit-init")
            .suffix(".gradle")
            .tempfile()?;
        init_script.write_all(INIT_SCRIPT.as_bytes())?;
        init_script.flush()?;
        run_captured(&mut self.command(init_script.path(), task))
    }
}

impl Builder for GradleBuilder {
    fn build_system(&self) -> BuildSystem {
        BuildSystem::Gradle
    }

    fn build(&self, fuzz_tests: &[String]) -> Result<Vec<BuildResult>, BuildError> {
        let output = self.run_task("fuzzkitPrintTestClasspath")?;
        let deps = parse_prefixed_paths(&output, CLASSPATH_PREFIX);
        if deps.is_empty() {
            return Err(BuildError::Unsupported(
                "gradle did not report a test class path, is the java plugin applied?".into(),
            ));
        }

        Ok(fuzz_tests
            .iter()
            .map(|name| {
                BuildResult::new(name, &self.options.project_dir).with_runtime_deps(deps.clone())
            })
            .collect())
    }

    fn test_source_dirs(&self) -> Result<Vec<PathBuf>, BuildError> {
        let output = self.run_task("fuzzkitPrintTestSourceDirs")?;
        let dirs = parse_prefixed_paths(&output, SOURCE_DIRS_PREFIX);
        if dirs.is_empty() {
            return Ok(vec![self.options.project_dir.join("src").join("test")]);
        }
        Ok(dirs)
    }

    fn project_dir(&self) -> &Path {
        &self.options.project_dir
    }
}
