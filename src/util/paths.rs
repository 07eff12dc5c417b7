//! Path utilities for fuzzkit data directories

use std::path::{Path, PathBuf};

/// Get the base fuzzkit data directory (~/.fuzzkit)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".fuzzkit"))
        .unwrap_or_else(|| PathBuf::from(".fuzzkit"))
}

/// Get the access token file (~/.fuzzkit/access_tokens.json)
pub fn access_tokens_path() -> PathBuf {
    data_dir().join("access_tokens.json")
}

/// Out-of-tree build directory used for CMake projects
pub fn build_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(".fuzzkit").join("build")
}

/// Find `file_name` in `start` or the closest ancestor that contains it
pub fn find_upwards(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}
