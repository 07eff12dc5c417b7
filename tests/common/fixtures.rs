//! Project fixtures and scripted build drivers

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fuzzkit::build::{BuildError, BuildResult, Builder};
use fuzzkit::config::BuildSystem;
use parking_lot::Mutex;
use tempfile::TempDir;

pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(path, contents).expect("Failed to write fixture file");
}

#[cfg(unix)]
pub fn write_executable(path: &Path, script: &str) {
    use std::os::unix::fs::PermissionsExt;

    write_file(path, script);
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make fixture executable");
}

const FUZZ_TEST_SOURCE: &str = r#"package com.example;

import com.code_intelligence.jazzer.junit.FuzzTest;

class FuzzTest {
    @FuzzTest
    void fuzz(byte[] data) {}
}
"#;

const ANOTHER_FUZZ_TEST_SOURCE: &str = r#"package com.example;

import com.code_intelligence.jazzer.api.FuzzedDataProvider;

public class AnotherFuzzTest {
    public static void fuzzerTestOneInput(FuzzedDataProvider data) {}
}
"#;

/// A Maven-style project with two fuzz tests and three runtime
/// dependencies: `mylib.jar`, `classes/` and `test-classes/`
pub struct JvmProject {
    pub dir: TempDir,
}

impl JvmProject {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        write_file(&root.join("pom.xml"), "<project/>");
        write_file(
            &root.join("src/test/java/com/example/FuzzTest.java"),
            FUZZ_TEST_SOURCE,
        );
        write_file(
            &root.join("src/test/java/com/example/AnotherFuzzTest.java"),
            ANOTHER_FUZZ_TEST_SOURCE,
        );
        write_file(&root.join("mylib.jar"), b"PK\x03\x04 not really a jar");
        write_file(&root.join("classes/com/example/Parser.class"), b"\xca\xfe\xba\xbe");
        write_file(
            &root.join("test-classes/com/example/FuzzTest.class"),
            b"\xca\xfe\xba\xbe",
        );
        write_file(
            &root.join("test-classes/com/example/AnotherFuzzTest.class"),
            b"\xca\xfe\xba\xbe",
        );
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn runtime_deps(&self) -> Vec<PathBuf> {
        vec![
            self.path().join("mylib.jar"),
            self.path().join("classes"),
            self.path().join("test-classes"),
        ]
    }
}

/// Build driver that returns prepared results and records what it built
#[derive(Clone)]
pub struct ScriptedBuilder {
    project_dir: PathBuf,
    build_system: BuildSystem,
    runtime_deps: Vec<PathBuf>,
    pub builds: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedBuilder {
    /// Every test gets `runtime_deps` as its class path
    pub fn jvm(project_dir: &Path, runtime_deps: Vec<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            build_system: BuildSystem::Maven,
            runtime_deps,
            builds: Arc::default(),
        }
    }

    /// Tests are executables at `build/<name>`, with an optional coverage
    /// build at `build/<name>_cov`
    pub fn native(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            build_system: BuildSystem::CMake,
            runtime_deps: Vec::new(),
            builds: Arc::default(),
        }
    }
}

impl Builder for ScriptedBuilder {
    fn build_system(&self) -> BuildSystem {
        self.build_system
    }

    /// Native projects define every non-coverage file in `build/`
    fn list_fuzz_tests(&self) -> Result<Vec<String>, BuildError> {
        if self.build_system.is_jvm() {
            return Ok(Vec::new());
        }
        let Ok(entries) = fs::read_dir(self.project_dir.join("build")) else {
            return Ok(Vec::new());
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.ends_with("_cov"))
            .collect();
        names.sort();
        Ok(names)
    }

    fn build(&self, fuzz_tests: &[String]) -> Result<Vec<BuildResult>, BuildError> {
        self.builds.lock().push(fuzz_tests.to_vec());
        fuzz_tests
            .iter()
            .map(|name| {
                let result = BuildResult::new(name, &self.project_dir)
                    .with_runtime_deps(self.runtime_deps.clone());
                if self.build_system.is_jvm() {
                    return Ok(result);
                }
                let executable = self.project_dir.join("build").join(name);
                if !executable.is_file() {
                    return Err(BuildError::ArtifactNotFound {
                        name: name.clone(),
                        dir: self.project_dir.join("build"),
                    });
                }
                let coverage = self.project_dir.join("build").join(format!("{name}_cov"));
                let result = result.with_executable(executable);
                Ok(if coverage.is_file() {
                    result.with_coverage_executable(coverage)
                } else {
                    result
                })
            })
            .collect()
    }

    fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}
