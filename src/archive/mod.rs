//! Bundle archive format.
//!
//! A bundle is a gzip-compressed tar stream. Its entries are described by a
//! [`FileMap`] (archive path → source path on disk) and are always written
//! in sorted archive-path order, so identical inputs produce identical
//! archives. The root of every bundle holds `bundle.yaml`, the serialized
//! [`BundleMetadata`].

pub mod error;
pub mod metadata;
pub mod reader;
pub mod writer;

pub use error::ArchiveError;
pub use metadata::{
    BundleMetadata, CodeRevision, Engine, EngineOptions, FuzzerEntry, GitRevision,
    MetadataError, RunEnvironment, METADATA_FILE_NAME,
};
pub use reader::extract;
pub use writer::{
    add_dir_to_file_map, normalize_archive_path, to_archive_path, write_archive, write_tar,
    ArchiveWriter, FileMap,
};
