//! Finding JVM fuzz tests in test source trees

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

const FUZZ_TEST_ANNOTATION: &str = "@FuzzTest";
const FUZZER_ENTRY_POINT: &str = "fuzzerTestOneInput";

/// List the fuzz tests below `test_dirs`, sorted.
///
/// A test is `<package>.<Class>`, or `<package>.<Class>::<method>` for each
/// method when a class carries more than one `@FuzzTest`. Directories that
/// don't exist are ignored.
pub fn list_jvm_fuzz_tests(test_dirs: &[PathBuf]) -> io::Result<Vec<String>> {
    let mut tests = BTreeSet::new();
    for dir in test_dirs {
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "Test source directory does not exist");
            continue;
        }
        let mut sources = Vec::new();
        collect_sources(dir, &mut sources)?;
        for source in sources {
            let contents = fs::read_to_string(&source)?;
            tests.extend(fuzz_tests_in_source(&source, &contents));
        }
    }
    Ok(tests.into_iter().collect())
}

fn collect_sources(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_sources(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("java") | Some("kt")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

fn package_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?m)^\s*package\s+([\w.]+)").ok())
        .as_ref()
}

fn method_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b(?:void|fun)\s+(\w+)\s*\(").ok())
        .as_ref()
}

/// Fuzz tests declared in one source file
pub fn fuzz_tests_in_source(path: &Path, contents: &str) -> Vec<String> {
    let Some(class) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return Vec::new();
    };
    let qualified = match package_pattern().and_then(|re| re.captures(contents)) {
        Some(caps) => format!("{}.{class}", &caps[1]),
        None => class,
    };

    let annotated: Vec<usize> = contents
        .match_indices(FUZZ_TEST_ANNOTATION)
        .filter(|(idx, _)| {
            // `@FuzzTests` or `@FuzzTestSuite` are different annotations
            !contents[idx + FUZZ_TEST_ANNOTATION.len()..]
                .starts_with(|c: char| c.is_alphanumeric() || c == '_')
        })
        .map(|(idx, _)| idx)
        .collect();

    if annotated.len() > 1 {
        let Some(method_re) = method_pattern() else {
            return vec![qualified];
        };
        return annotated
            .iter()
            .filter_map(|&idx| method_re.captures(&contents[idx..]))
            .map(|caps| format!("{qualified}::{}", &caps[1]))
            .collect();
    }
    if annotated.len() == 1 || contents.contains(FUZZER_ENTRY_POINT) {
        return vec![qualified];
    }
    Vec::new()
}

/// Split `pkg.Class::method` into class and optional method
pub fn split_target(name: &str) -> (&str, Option<&str>) {
    match name.split_once("::") {
        Some((class, method)) if !method.is_empty() => (class, Some(method)),
        Some((class, _)) => (class, None),
        None => (name, None),
    }
}
