//! Jazzer is configured through the manifest of a jar on the class path.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::DateTime;

use super::BundleError;

pub const TARGET_CLASS_KEY: &str = "Jazzer-Target-Class";
/// Read by Jazzer releases before the key was renamed
pub const LEGACY_TARGET_CLASS_KEY: &str = "Jazzer-Fuzz-Target-Class";
pub const TARGET_METHOD_KEY: &str = "Jazzer-Target-Method";

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const MAX_LINE_BYTES: usize = 72;

/// Render `MANIFEST.MF` for a fuzz target.
pub fn manifest_contents(target_class: &str, target_method: Option<&str>) -> String {
    let mut attributes = vec![
        ("Manifest-Version", "1.0"),
        (TARGET_CLASS_KEY, target_class),
        (LEGACY_TARGET_CLASS_KEY, target_class),
    ];
    if let Some(method) = target_method {
        attributes.push((TARGET_METHOD_KEY, method));
    }

    let mut contents = String::new();
    for (key, value) in attributes {
        push_wrapped(&mut contents, &format!("{key}: {value}"));
    }
    contents.push('\n');
    contents
}

/// Manifest lines are limited to 72 bytes; longer ones continue on the next
/// line after a single space.
fn push_wrapped(out: &mut String, line: &str) {
    let mut rest = line;
    let mut limit = MAX_LINE_BYTES;
    loop {
        if rest.len() <= limit {
            out.push_str(rest);
            out.push('\n');
            return;
        }
        let mut split = limit;
        while !rest.is_char_boundary(split) {
            split -= 1;
        }
        out.push_str(&rest[..split]);
        out.push_str("\n ");
        rest = &rest[split..];
        limit = MAX_LINE_BYTES - 1;
    }
}

/// Write `manifest.jar` into `dir` and return its path.
///
/// Entry timestamps are pinned so identical targets give identical jars.
pub fn create_manifest_jar(
    dir: &Path,
    target_class: &str,
    target_method: Option<&str>,
) -> Result<PathBuf, BundleError> {
    fs::create_dir_all(dir)?;
    let jar_path = dir.join("manifest.jar");

    let mut zip = zip::ZipWriter::new(File::create(&jar_path)?);
    let options = FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    zip.start_file(MANIFEST_PATH, options)?;
    zip.write_all(manifest_contents(target_class, target_method).as_bytes())?;
    zip.finish()?;

    Ok(jar_path)
}
