use std::collections::HashSet;
use std::path::Path;

use crate::archive::{normalize_archive_path, ArchiveWriter, EngineOptions, FuzzerEntry};
use crate::bundler::{BundleError, BundleOptions};

/// Archive directory for JVM runtime dependencies
pub const RUNTIME_DEPS_DIR: &str = "runtime_deps";

const DICTIONARY_PATH: &str = "dict";
const SEEDS_DIR: &str = "seeds";

/// Build-system specific half of bundling
pub trait BundleAdapter {
    /// Verify the build toolchain is installed. Failures are logged here.
    fn check_dependencies(&self) -> Result<(), BundleError>;

    /// Build the fuzz tests, stage their files in `ctx` and describe them
    fn bundle(&self, ctx: &mut BundleContext<'_>) -> Result<Vec<FuzzerEntry>, BundleError>;
}

/// State shared by the adapter and the bundler during one bundle run
pub struct BundleContext<'a> {
    pub options: &'a BundleOptions,
    pub writer: &'a mut ArchiveWriter,
    /// Private staging directory for generated files
    pub temp_dir: &'a Path,
}

impl<'a> BundleContext<'a> {
    pub fn new(
        options: &'a BundleOptions,
        writer: &'a mut ArchiveWriter,
        temp_dir: &'a Path,
    ) -> Self {
        Self {
            options,
            writer,
            temp_dir,
        }
    }

    /// Stage the dictionary once at `dict`
    pub fn stage_dictionary(&mut self) -> Result<Option<String>, BundleError> {
        let Some(dictionary) = &self.options.dictionary else {
            return Ok(None);
        };
        if !dictionary.is_file() {
            return Err(BundleError::MissingInput {
                what: "dictionary",
                path: dictionary.clone(),
            });
        }
        if !self.writer.contains(DICTIONARY_PATH) {
            self.writer.write_file(DICTIONARY_PATH, dictionary);
        }
        Ok(Some(DICTIONARY_PATH.to_string()))
    }

    /// Stage every seed corpus directory below `seeds/<dir name>`. Directories
    /// sharing a name get a numeric suffix (`corpus`, `corpus-1`, ...).
    pub fn stage_seeds(&mut self) -> Result<Option<String>, BundleError> {
        if self.options.seed_corpus_dirs.is_empty() {
            return Ok(None);
        }
        let mut taken = HashSet::new();
        for dir in &self.options.seed_corpus_dirs {
            if !dir.is_dir() {
                return Err(BundleError::MissingInput {
                    what: "seed corpus directory",
                    path: dir.clone(),
                });
            }
            let base = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "corpus".to_string());
            let mut name = base.clone();
            let mut suffix = 1;
            while !taken.insert(name.clone()) {
                name = format!("{base}-{suffix}");
                suffix += 1;
            }
            let archive_path = format!("{SEEDS_DIR}/{name}");
            if !self.writer.contains(&archive_path) {
                self.writer.write_dir(&archive_path, dir)?;
            }
        }
        Ok(Some(SEEDS_DIR.to_string()))
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            env: self.options.env.clone(),
            flags: self.options.engine_args.clone(),
        }
    }

    pub fn max_run_time(&self) -> u64 {
        self.options.timeout.map(|t| t.as_secs()).unwrap_or(0)
    }
}

/// Join archive path segments with `/`, whatever the host separator is
pub(crate) fn archive_join(base: &str, rest: &str) -> String {
    normalize_archive_path(&format!("{base}/{rest}"))
}
