use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use flate2::read::GzDecoder;

use crate::archive::ArchiveError;

/// Unpack the tar.gz bundle at `bundle_path` into `dest`.
///
/// Relative entry paths are preserved. Entries that would land outside
/// `dest` are rejected by the tar reader.
pub fn extract(bundle_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::open(bundle_path).map_err(|e| ArchiveError::io("", bundle_path, e))?;
    fs::create_dir_all(dest)?;

    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive
        .unpack(dest)
        .map_err(|source| ArchiveError::CorruptArchive {
            path: bundle_path.to_path_buf(),
            source,
        })?;

    tracing::debug!(bundle = %bundle_path.display(), dest = %dest.display(), "Extracted bundle");
    Ok(())
}
