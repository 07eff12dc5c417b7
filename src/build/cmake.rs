use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{find_executable, run, BuildError, BuildOptions, BuildResult, Builder};
use crate::config::BuildSystem;
use crate::util::paths;

/// Configures and builds a CMake project twice: once instrumented for
/// libFuzzer and once for coverage.
#[derive(Debug, Clone)]
pub struct CMakeBuilder {
    options: BuildOptions,
}

/// Directory below a configured build tree where `add_fuzz_test` leaves one
/// empty marker file per fuzz test target
const FUZZ_TEST_MARKER_DIR: &str = ".fuzzkit/fuzz_tests";

/// Which instrumentation a build tree is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Fuzzing,
    Coverage,
}

impl Variant {
    fn engine(&self) -> &'static str {
        match self {
            Variant::Fuzzing => "libfuzzer",
            Variant::Coverage => "coverage",
        }
    }
}

impl CMakeBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    fn build_dir(&self, variant: Variant) -> PathBuf {
        let base = paths::build_dir(&self.options.project_dir);
        match variant {
            Variant::Fuzzing => base.join("libfuzzer"),
            Variant::Coverage => base.join("coverage"),
        }
    }

    fn configure_command(&self, variant: Variant) -> Command {
        let mut cmd = Command::new("cmake");
        cmd.arg("-S")
            .arg(&self.options.project_dir)
            .arg("-B")
            .arg(self.build_dir(variant))
            .arg("-DCMAKE_BUILD_TYPE=RelWithDebInfo")
            .arg(format!("-DFUZZKIT_ENGINE={}", variant.engine()))
            .arg("-DFUZZKIT_TESTING:BOOL=ON")
            .arg("-DCMAKE_BUILD_RPATH_USE_ORIGIN:BOOL=ON")
            .args(&self.options.args)
            .current_dir(&self.options.project_dir);
        cmd
    }

    fn build_command(&self, variant: Variant, fuzz_tests: &[String]) -> Command {
        let mut cmd = Command::new("cmake");
        cmd.arg("--build")
            .arg(self.build_dir(variant))
            .arg("--target")
            .args(fuzz_tests);
        if let Some(jobs) = self.options.jobs {
            cmd.arg("--parallel").arg(jobs.to_string());
        }
        cmd.current_dir(&self.options.project_dir);
        cmd
    }

    fn build_variant(&self, variant: Variant, fuzz_tests: &[String]) -> Result<Vec<PathBuf>, BuildError> {
        run(&mut self.configure_command(variant))?;
        run(&mut self.build_command(variant, fuzz_tests))?;

        let build_dir = self.build_dir(variant);
        fuzz_tests
            .iter()
            .map(|name| {
                find_executable(&build_dir, name).ok_or_else(|| BuildError::ArtifactNotFound {
                    name: name.clone(),
                    dir: build_dir.clone(),
                })
            })
            .collect()
    }
}

/// Names of the marker files in `dir`, sorted. A missing directory means the
/// project defines no fuzz tests.
fn read_fuzz_test_markers(dir: &Path) -> Result<Vec<String>, BuildError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

impl Builder for CMakeBuilder {
    fn build_system(&self) -> BuildSystem {
        BuildSystem::CMake
    }

    fn list_fuzz_tests(&self) -> Result<Vec<String>, BuildError> {
        // Configuring is enough for the markers to exist
        run(&mut self.configure_command(Variant::Fuzzing))?;
        let marker_dir = self.build_dir(Variant::Fuzzing).join(FUZZ_TEST_MARKER_DIR);
        let names = read_fuzz_test_markers(&marker_dir)?;
        tracing::debug!(count = names.len(), dir = %marker_dir.display(), "Listed CMake fuzz tests");
        Ok(names)
    }

    fn build(&self, fuzz_tests: &[String]) -> Result<Vec<BuildResult>, BuildError> {
        let executables = self.build_variant(Variant::Fuzzing, fuzz_tests)?;
        let coverage = self.build_variant(Variant::Coverage, fuzz_tests)?;

        Ok(fuzz_tests
            .iter()
            .zip(executables)
            .zip(coverage)
            .map(|((name, executable), coverage)| {
                BuildResult::new(name, &self.options.project_dir)
                    .with_executable(executable)
                    .with_coverage_executable(coverage)
            })
            .collect())
    }

    fn project_dir(&self) -> &Path {
        &self.options.project_dir
    }
}
