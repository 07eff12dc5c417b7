//! Deterministic tar/tar.gz writer over a logical file map.

use std::collections::BTreeMap;
use std::fs::{self, File, Metadata};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{EntryType, Header};

use crate::archive::ArchiveError;

/// Files to include in an archive.
///
/// - Key: the normalized, slash-separated path inside the archive
/// - Value: the path of the file or directory on disk
///
/// A `BTreeMap` keeps keys sorted, which is what makes archives
/// reproducible.
pub type FileMap = BTreeMap<String, PathBuf>;

/// Normalize an archive path: forward slashes only, no empty or `.`
/// components, no leading or trailing slash.
pub fn normalize_archive_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Convert a relative filesystem path into an archive path.
pub fn to_archive_path(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();
    normalize_archive_path(&parts.join("/"))
}

fn join_archive_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        normalize_archive_path(name)
    } else {
        normalize_archive_path(&format!("{base}/{name}"))
    }
}

/// Recursively add the contents of `dir` to `file_map` below `archive_base`.
///
/// Every visited path gets an entry, directories included. The root
/// directory itself is stored under `archive_base`, unless the base is empty
/// (the root then is the archive root and needs no entry). Nothing is
/// written here; [`write_archive`] does that.
pub fn add_dir_to_file_map(
    file_map: &mut FileMap,
    archive_base: &str,
    dir: &Path,
) -> Result<(), ArchiveError> {
    let base = normalize_archive_path(archive_base);
    let metadata = fs::metadata(dir).map_err(|e| ArchiveError::io(&base, dir, e))?;
    if !metadata.is_dir() {
        return Err(ArchiveError::io(
            &base,
            dir,
            io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }
    if !base.is_empty() {
        file_map.insert(base.clone(), dir.to_path_buf());
    }
    walk_dir(file_map, &base, dir)
}

fn walk_dir(file_map: &mut FileMap, base: &str, dir: &Path) -> Result<(), ArchiveError> {
    let mut children = fs::read_dir(dir)
        .and_then(|entries| entries.collect::<io::Result<Vec<_>>>())
        .map_err(|e| ArchiveError::io(base, dir, e))?;
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let path = child.path();
        let archive_path = join_archive_path(base, &child.file_name().to_string_lossy());
        let file_type = child
            .file_type()
            .map_err(|e| ArchiveError::io(&archive_path, &path, e))?;

        file_map.insert(archive_path.clone(), path.clone());
        // Symlinked directories are not descended into; the writer follows
        // the link and stores a plain directory entry.
        if file_type.is_dir() {
            walk_dir(file_map, &archive_path, &path)?;
        }
    }
    Ok(())
}

/// Write a gzip-compressed tar of `file_map` to `out`.
pub fn write_archive<W: Write>(out: W, file_map: &FileMap) -> Result<W, ArchiveError> {
    let encoder = GzEncoder::new(out, Compression::default());
    let encoder = write_tar(encoder, file_map)?;
    Ok(encoder.finish()?)
}

/// Write an uncompressed tar of `file_map` to `out`.
pub fn write_tar<W: Write>(out: W, file_map: &FileMap) -> Result<W, ArchiveError> {
    let mut builder = tar::Builder::new(out);
    for (archive_path, source_path) in file_map {
        append_entry(&mut builder, archive_path, source_path)?;
    }
    Ok(builder.into_inner()?)
}

fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    archive_path: &str,
    source_path: &Path,
) -> Result<(), ArchiveError> {
    validate_archive_path(archive_path, source_path)?;

    // fs::metadata follows symlinks, so no symlink headers are ever written.
    let metadata =
        fs::metadata(source_path).map_err(|e| ArchiveError::io(archive_path, source_path, e))?;

    let mut header = Header::new_gnu();
    header.set_mtime(mtime(&metadata));
    header.set_mode(mode(&metadata));
    header.set_uid(0);
    header.set_gid(0);

    if metadata.is_file() {
        let file =
            File::open(source_path).map_err(|e| ArchiveError::io(archive_path, source_path, e))?;
        header.set_entry_type(EntryType::Regular);
        header.set_size(metadata.len());
        builder
            .append_data(&mut header, archive_path, file)
            .map_err(|e| ArchiveError::io(archive_path, source_path, e))?;
    } else if metadata.is_dir() {
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        builder
            .append_data(&mut header, archive_path, io::empty())
            .map_err(|e| ArchiveError::io(archive_path, source_path, e))?;
    } else {
        return Err(ArchiveError::Encoding {
            archive_path: archive_path.to_string(),
            source_path: source_path.to_path_buf(),
            reason: "unsupported file type".to_string(),
        });
    }
    Ok(())
}

fn validate_archive_path(archive_path: &str, source_path: &Path) -> Result<(), ArchiveError> {
    let reason = if archive_path.is_empty() {
        Some("empty archive path")
    } else if archive_path.starts_with('/') {
        Some("absolute archive path")
    } else if archive_path.split('/').any(|part| part == "..") {
        Some("archive path escapes the archive root")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ArchiveError::Encoding {
            archive_path: archive_path.to_string(),
            source_path: source_path.to_path_buf(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn mtime(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

#[cfg(unix)]
fn mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode(metadata: &Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else {
        0o644
    }
}

/// Collects the files of one bundle and writes them in a single pass.
#[derive(Debug, Default)]
pub struct ArchiveWriter {
    file_map: FileMap,
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a single file (or an empty directory entry).
    pub fn write_file(&mut self, archive_path: &str, source_path: &Path) {
        let archive_path = normalize_archive_path(archive_path);
        tracing::debug!(archive_path = %archive_path, source = %source_path.display(), "Staged file");
        self.file_map.insert(archive_path, source_path.to_path_buf());
    }

    /// Stage a directory tree below `archive_base`.
    pub fn write_dir(&mut self, archive_base: &str, dir: &Path) -> Result<(), ArchiveError> {
        tracing::debug!(archive_base, dir = %dir.display(), "Staged directory");
        add_dir_to_file_map(&mut self.file_map, archive_base, dir)
    }

    pub fn file_map(&self) -> &FileMap {
        &self.file_map
    }

    pub fn contains(&self, archive_path: &str) -> bool {
        self.file_map.contains_key(archive_path)
    }

    pub fn len(&self) -> usize {
        self.file_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_map.is_empty()
    }

    /// Write all staged entries as a tar.gz stream.
    pub fn finish<W: Write>(&self, out: W) -> Result<W, ArchiveError> {
        write_archive(out, &self.file_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::tempdir;

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn normalize_converts_backslashes() {
        assert_eq!(
            normalize_archive_path("runtime_deps\\classes\\com"),
            "runtime_deps/classes/com"
        );
        assert_eq!(normalize_archive_path("./seeds//a/"), "seeds/a");
        assert_eq!(normalize_archive_path(""), "");
    }

    #[test]
    fn to_archive_path_joins_components_with_slashes() {
        let path = Path::new("runtime_deps").join("classes").join("Foo.class");
        assert_eq!(to_archive_path(&path), "runtime_deps/classes/Foo.class");
    }

    #[test]
    fn entries_are_written_sorted() {
        let dir = tempdir().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        let mut writer = ArchiveWriter::new();
        writer.write_file("zeta", &dir.path().join("zeta"));
        writer.write_file("alpha", &dir.path().join("alpha"));
        writer.write_file("mid", &dir.path().join("mid"));

        let bytes = writer.finish(Vec::new()).unwrap();
        assert_eq!(entry_names(&bytes), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn repeated_writes_are_byte_identical() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"first").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.txt"), b"second").unwrap();

        let mut file_map = FileMap::new();
        add_dir_to_file_map(&mut file_map, "tree", dir.path()).unwrap();

        let first = write_archive(Vec::new(), &file_map).unwrap();
        let second = write_archive(Vec::new(), &file_map).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn add_dir_counts_files_and_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a").join("b")).unwrap();
        std::fs::write(dir.path().join("root.txt"), b"r").unwrap();
        std::fs::write(dir.path().join("a").join("one.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("a").join("b").join("two.txt"), b"2").unwrap();

        let mut file_map = FileMap::new();
        add_dir_to_file_map(&mut file_map, "base", dir.path()).unwrap();

        // 3 files + 3 directories (root, a, a/b)
        assert_eq!(file_map.len(), 6);
        assert!(file_map.contains_key("base"));
        assert!(file_map.contains_key("base/a/b/two.txt"));
    }

    #[test]
    fn add_dir_with_empty_base_skips_root() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), b"FROM scratch").unwrap();

        let mut file_map = FileMap::new();
        add_dir_to_file_map(&mut file_map, "", dir.path()).unwrap();

        assert_eq!(file_map.keys().collect::<Vec<_>>(), vec!["Dockerfile"]);
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let mut file_map = FileMap::new();
        file_map.insert("ghost".into(), PathBuf::from("/definitely/not/here"));

        let err = write_archive(Vec::new(), &file_map).unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
    }

    #[test]
    fn escaping_archive_path_is_an_encoding_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        let mut file_map = FileMap::new();
        file_map.insert("../f".into(), file);

        let err = write_archive(Vec::new(), &file_map).unwrap_err();
        assert!(matches!(err, ArchiveError::Encoding { .. }));
    }

    #[test]
    fn directories_are_header_only() {
        let dir = tempdir().unwrap();
        let mut file_map = FileMap::new();
        file_map.insert("empty".into(), dir.path().to_path_buf());

        let bytes = write_tar(Vec::new(), &file_map).unwrap();
        let mut archive = tar::Archive::new(bytes.as_slice());
        let entry = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(entry.header().entry_type(), EntryType::Directory);
        assert_eq!(entry.header().size().unwrap(), 0);
    }
}
