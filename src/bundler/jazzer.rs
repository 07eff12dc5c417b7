use std::fs;
use std::io;
use std::path::Path;

use super::adapter::{archive_join, BundleAdapter, BundleContext, RUNTIME_DEPS_DIR};
use super::discovery::{list_jvm_fuzz_tests, split_target};
use super::manifest_jar::create_manifest_jar;
use super::{build_each, BundleError};
use crate::archive::{normalize_archive_path, to_archive_path, Engine, FuzzerEntry};
use crate::build::{BuildResult, Builder};
use crate::util::tools::{check_dependencies, required_tools, Tool};

/// Bundles Java/Kotlin fuzz tests for Jazzer
pub struct JazzerAdapter {
    builder: Box<dyn Builder>,
    tools: Vec<Tool>,
}

impl JazzerAdapter {
    pub fn new(builder: Box<dyn Builder>) -> Self {
        let tools = required_tools(builder.build_system(), builder.project_dir());
        Self { builder, tools }
    }

    /// Replace the tools checked before building
    pub fn with_required_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    fn resolve_fuzz_tests(&self, ctx: &BundleContext<'_>) -> Result<Vec<String>, BundleError> {
        if !ctx.options.fuzz_tests.is_empty() {
            return Ok(ctx.options.fuzz_tests.clone());
        }

        let test_dirs = self.builder.test_source_dirs()?;
        let fuzz_tests = list_jvm_fuzz_tests(&test_dirs)?;
        if fuzz_tests.is_empty() {
            tracing::error!("No fuzz test(s) could be found in the project directory");
            return Err(BundleError::NoFuzzTestsFound);
        }
        tracing::info!(count = fuzz_tests.len(), "Discovered fuzz tests");
        Ok(fuzz_tests)
    }

    /// Stage manifest jars and runtime dependencies for `build_results` and
    /// return one `JAVA_LIBFUZZER` entry per result.
    pub fn assemble_artifacts(
        &self,
        ctx: &mut BundleContext<'_>,
        build_results: &[BuildResult],
    ) -> Result<Vec<FuzzerEntry>, BundleError> {
        let dictionary = ctx.stage_dictionary()?;
        let seeds = ctx.stage_seeds()?;

        let mut fuzzers = Vec::with_capacity(build_results.len());
        for result in build_results {
            let (target_class, target_method) = split_target(&result.name);
            // `::` would clash with the class path separator
            let target_dir = result.name.replace("::", "_");

            let jar = create_manifest_jar(
                &ctx.temp_dir.join(&target_dir),
                target_class,
                target_method,
            )?;
            let manifest_path = archive_join(&target_dir, "manifest.jar");
            ctx.writer.write_file(&manifest_path, &jar);

            let mut runtime_paths = vec![manifest_path];
            for dep in &result.runtime_deps {
                if let Some(path) = stage_runtime_dep(ctx, &result.project_dir, dep)? {
                    runtime_paths.push(path);
                }
            }

            let mut entry = FuzzerEntry::new(&result.name, Engine::JavaLibFuzzer);
            entry.project_dir = result.project_dir.to_string_lossy().into_owned();
            entry.dictionary = dictionary.clone();
            entry.seeds = seeds.clone();
            entry.runtime_paths = runtime_paths
                .iter()
                .map(|p| normalize_archive_path(p))
                .collect();
            entry.engine_options = ctx.engine_options();
            entry.max_run_time = ctx.max_run_time();
            fuzzers.push(entry);
        }
        Ok(fuzzers)
    }
}

/// Stage one runtime dependency and return its class path entry.
///
/// Directories keep their layout relative to the project directory; files
/// are flattened into `runtime_deps/`. Dependencies that no longer exist
/// are skipped.
fn stage_runtime_dep(
    ctx: &mut BundleContext<'_>,
    project_dir: &Path,
    dep: &Path,
) -> Result<Option<String>, BundleError> {
    let metadata = match fs::metadata(dep) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(dep = %dep.display(), "Skipping missing runtime dependency");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    if metadata.is_dir() {
        let relative = match dep.strip_prefix(project_dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => to_archive_path(rel),
            _ => dep
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let archive_path = archive_join(RUNTIME_DEPS_DIR, &relative);
        if !ctx.writer.contains(&archive_path) {
            ctx.writer.write_dir(&archive_path, dep)?;
        }
        Ok(Some(archive_path))
    } else {
        let name = dep
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let archive_path = archive_join(RUNTIME_DEPS_DIR, &name);
        ctx.writer.write_file(&archive_path, dep);
        Ok(Some(archive_path))
    }
}

impl BundleAdapter for JazzerAdapter {
    fn check_dependencies(&self) -> Result<(), BundleError> {
        check_dependencies(&self.tools).map_err(|e| {
            tracing::error!("{e}");
            BundleError::Dependency(e)
        })
    }

    fn bundle(&self, ctx: &mut BundleContext<'_>) -> Result<Vec<FuzzerEntry>, BundleError> {
        let fuzz_tests = self.resolve_fuzz_tests(ctx)?;

        if !ctx.options.build_args.is_empty() {
            tracing::warn!(
                "Passing additional arguments is not supported for {}. These arguments are ignored: {}",
                self.builder.build_system(),
                ctx.options.build_args.join(" ")
            );
        }

        let build_results = build_each(
            self.builder.as_ref(),
            &fuzz_tests,
            ctx.options.parallel_jobs(),
        )?;
        self.assemble_artifacts(ctx, &build_results)
    }
}
