use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while staging, writing or reading bundle archives.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to add {source_path} at {archive_path}: {source}")]
    Io {
        archive_path: String,
        source_path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode {source_path} as {archive_path}: {reason}")]
    Encoding {
        archive_path: String,
        source_path: PathBuf,
        reason: String,
    },
    #[error("corrupt archive {path}: {source}")]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Stream(#[from] std::io::Error),
}

impl ArchiveError {
    pub(crate) fn io(archive_path: &str, source_path: &std::path::Path, source: std::io::Error) -> Self {
        ArchiveError::Io {
            archive_path: archive_path.to_string(),
            source_path: source_path.to_path_buf(),
            source,
        }
    }
}
