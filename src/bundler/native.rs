use std::path::Path;

use super::adapter::{archive_join, BundleAdapter, BundleContext, RUNTIME_DEPS_DIR};
use super::BundleError;
use crate::archive::{normalize_archive_path, Engine, FuzzerEntry};
use crate::build::{BuildError, BuildResult, Builder};
use crate::util::tools::{check_dependencies, required_tools, Tool};

/// Bundles libFuzzer executables built by CMake, Bazel or a custom command
pub struct NativeAdapter {
    builder: Box<dyn Builder>,
    tools: Vec<Tool>,
}

impl NativeAdapter {
    pub fn new(builder: Box<dyn Builder>) -> Self {
        let tools = required_tools(builder.build_system(), builder.project_dir());
        Self { builder, tools }
    }

    pub fn with_required_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    /// Stage executables and shared libraries for `build_results`.
    ///
    /// Every result becomes a `LIBFUZZER` entry. Results that carry a
    /// coverage build additionally get an `LLVM_COV` entry of the same name;
    /// those come after all fuzzing entries.
    pub fn assemble_artifacts(
        &self,
        ctx: &mut BundleContext<'_>,
        build_results: &[BuildResult],
    ) -> Result<Vec<FuzzerEntry>, BundleError> {
        let dictionary = ctx.stage_dictionary()?;
        let seeds = ctx.stage_seeds()?;

        let mut fuzzing = Vec::with_capacity(build_results.len());
        let mut coverage = Vec::new();
        for result in build_results {
            let target_dir = target_dir_name(&result.name);
            let library_paths = stage_libraries(ctx, &target_dir, &result.runtime_deps)?;

            let executable = result.executable.as_deref().ok_or_else(|| {
                BuildError::ArtifactNotFound {
                    name: result.name.clone(),
                    dir: result.project_dir.clone(),
                }
            })?;
            let path = stage_binary(ctx, &archive_join(&target_dir, "bin"), executable);

            let mut entry = FuzzerEntry::new(&result.name, Engine::LibFuzzer);
            entry.path = Some(path);
            entry.project_dir = result.project_dir.to_string_lossy().into_owned();
            entry.dictionary = dictionary.clone();
            entry.seeds = seeds.clone();
            entry.library_paths = library_paths;
            entry.engine_options = ctx.engine_options();
            entry.max_run_time = ctx.max_run_time();

            if let Some(coverage_executable) = &result.coverage_executable {
                let mut coverage_entry = entry.clone();
                coverage_entry.engine = Engine::LlvmCov;
                coverage_entry.path = Some(stage_binary(
                    ctx,
                    &archive_join(&target_dir, "coverage/bin"),
                    coverage_executable,
                ));
                coverage.push(coverage_entry);
            }
            fuzzing.push(entry);
        }

        fuzzing.extend(coverage);
        Ok(fuzzing)
    }
}

/// `//src/parser:fuzz` → `src/parser/fuzz`. Parent and root components
/// are dropped so targets outside the project stay inside the archive.
fn target_dir_name(name: &str) -> String {
    let dir = normalize_archive_path(&name.trim_start_matches("//").replace(':', "/"))
        .split('/')
        .filter(|part| *part != "..")
        .collect::<Vec<_>>()
        .join("/");
    if dir.is_empty() {
        "fuzz_test".to_string()
    } else {
        dir
    }
}

fn stage_binary(ctx: &mut BundleContext<'_>, archive_dir: &str, binary: &Path) -> String {
    let name = binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let archive_path = archive_join(archive_dir, &name);
    ctx.writer.write_file(&archive_path, binary);
    archive_path
}

/// Stage shared libraries below `<target>/runtime_deps` and return the
/// directories to put on the library path
fn stage_libraries(
    ctx: &mut BundleContext<'_>,
    target_dir: &str,
    deps: &[std::path::PathBuf],
) -> Result<Vec<String>, BundleError> {
    let root = archive_join(target_dir, RUNTIME_DEPS_DIR);
    let mut library_paths: Vec<String> = Vec::new();
    for dep in deps {
        if !dep.exists() {
            tracing::debug!(dep = %dep.display(), "Skipping missing runtime dependency");
            continue;
        }
        let name = dep
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = if dep.is_dir() {
            let archive_path = archive_join(&root, &name);
            ctx.writer.write_dir(&archive_path, dep)?;
            archive_path
        } else {
            ctx.writer.write_file(&archive_join(&root, &name), dep);
            root.clone()
        };
        if !library_paths.contains(&dir) {
            library_paths.push(dir);
        }
    }
    Ok(library_paths)
}

impl BundleAdapter for NativeAdapter {
    fn check_dependencies(&self) -> Result<(), BundleError> {
        check_dependencies(&self.tools).map_err(|e| {
            tracing::error!("{e}");
            BundleError::Dependency(e)
        })
    }

    fn bundle(&self, ctx: &mut BundleContext<'_>) -> Result<Vec<FuzzerEntry>, BundleError> {
        let fuzz_tests = if ctx.options.fuzz_tests.is_empty() {
            let found = self.builder.list_fuzz_tests()?;
            if found.is_empty() {
                tracing::error!(
                    "No fuzz tests found, pass the names of the fuzz tests to bundle"
                );
                return Err(BundleError::NoFuzzTestsFound);
            }
            tracing::info!(count = found.len(), "Bundling all fuzz tests defined by the build");
            found
        } else {
            ctx.options.fuzz_tests.clone()
        };

        // One build covering all tests
        let build_results = self.builder.build(&fuzz_tests)?;
        self.assemble_artifacts(ctx, &build_results)
    }
}
