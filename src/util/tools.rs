//! External tool detection and version preflight
//!
//! Before anything is built, the bundler checks that the build system and
//! language toolchain for the project are installed in a usable version.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::config::BuildSystem;

/// External tools that fuzzkit may shell out to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    CMake,
    Clang,
    LlvmSymbolizer,
    Bazel,
    Java,
    Maven,
    Gradle,
}

impl Tool {
    /// Get the binary name for this tool
    pub fn binary_name(&self) -> &'static str {
        match self {
            Tool::CMake => "cmake",
            Tool::Clang => "clang",
            Tool::LlvmSymbolizer => "llvm-symbolizer",
            Tool::Bazel => "bazel",
            Tool::Java => "java",
            Tool::Maven => "mvn",
            Tool::Gradle => "gradle",
        }
    }

    /// Get the display name for this tool
    pub fn display_name(&self) -> &'static str {
        match self {
            Tool::CMake => "CMake",
            Tool::Clang => "Clang",
            Tool::LlvmSymbolizer => "llvm-symbolizer",
            Tool::Bazel => "Bazel",
            Tool::Java => "Java",
            Tool::Maven => "Maven",
            Tool::Gradle => "Gradle",
        }
    }

    /// Oldest supported version
    pub fn min_version(&self) -> Version {
        match self {
            Tool::CMake => Version::new(3, 16, 0),
            Tool::Clang | Tool::LlvmSymbolizer => Version::new(11, 0, 0),
            Tool::Bazel => Version::new(5, 0, 0),
            Tool::Java => Version::new(8, 0, 0),
            Tool::Maven => Version::new(3, 2, 0),
            Tool::Gradle => Version::new(6, 1, 0),
        }
    }

    fn version_args(&self) -> &'static [&'static str] {
        match self {
            Tool::Java => &["-version"],
            _ => &["--version"],
        }
    }

    /// Extract the version from the tool's version output
    pub fn parse_version(&self, output: &str) -> Option<Version> {
        match self {
            Tool::Java => Version::parse_java(output),
            _ => Version::parse(output),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// First `major.minor[.patch]` found in `text`
    pub fn parse(text: &str) -> Option<Self> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").ok())
            .as_ref()?;
        let caps = pattern.captures(text)?;
        Some(Self::from_parts(
            caps.get(1)?.as_str(),
            caps.get(2).map(|m| m.as_str()),
            caps.get(3).map(|m| m.as_str()),
        ))
    }

    /// `java -version` prints `version "17.0.2"`, `version "21"` or the
    /// legacy `version "1.8.0_292"` form.
    fn parse_java(text: &str) -> Option<Self> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| Regex::new(r#"version "(\d+)(?:\.(\d+))?(?:\.(\d+))?"#).ok())
            .as_ref()?;
        let caps = pattern.captures(text)?;
        let version = Self::from_parts(
            caps.get(1)?.as_str(),
            caps.get(2).map(|m| m.as_str()),
            caps.get(3).map(|m| m.as_str()),
        );
        if version.major == 1 {
            return Some(Version::new(version.minor, version.patch, 0));
        }
        Some(version)
    }

    fn from_parts(major: &str, minor: Option<&str>, patch: Option<&str>) -> Self {
        let num = |s: Option<&str>| s.and_then(|s| s.parse().ok()).unwrap_or(0);
        Self::new(num(Some(major)), num(minor), num(patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("{} ({}) is required but was not found in PATH", .0.display_name(), .0.binary_name())]
    Missing(Tool),

    #[error("{} {found} is too old, version {required} or newer is required", .tool.display_name())]
    WrongVersion {
        tool: Tool,
        found: Version,
        required: Version,
    },
}

/// Locates tools and reads their version output
pub trait ToolProbe {
    fn locate(&self, tool: Tool) -> Option<PathBuf>;

    /// Combined stdout and stderr of the version command
    fn version_output(&self, tool: Tool, path: &Path) -> Option<String>;
}

/// Probe backed by `PATH` lookup and the real binaries
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ToolProbe for SystemProbe {
    fn locate(&self, tool: Tool) -> Option<PathBuf> {
        which::which(tool.binary_name()).ok()
    }

    fn version_output(&self, tool: Tool, path: &Path) -> Option<String> {
        let output = Command::new(path).args(tool.version_args()).output().ok()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Some(text)
    }
}

/// Tools a project of the given build system needs
pub fn required_tools(build_system: BuildSystem, project_dir: &Path) -> Vec<Tool> {
    match build_system {
        BuildSystem::CMake => vec![Tool::CMake, Tool::Clang, Tool::LlvmSymbolizer],
        BuildSystem::Bazel => vec![Tool::Bazel, Tool::Clang],
        BuildSystem::Other => vec![Tool::Clang],
        BuildSystem::Maven => vec![Tool::Java, Tool::Maven],
        BuildSystem::Gradle => {
            if project_dir.join("gradlew").is_file() {
                vec![Tool::Java]
            } else {
                vec![Tool::Java, Tool::Gradle]
            }
        }
    }
}

/// Check all `tools` with the system probe
pub fn check_dependencies(tools: &[Tool]) -> Result<(), DependencyError> {
    check_dependencies_with(&SystemProbe, tools)
}

/// Check all `tools`, stopping at the first failure
///
/// A tool whose version cannot be determined is accepted with a warning.
pub fn check_dependencies_with(
    probe: &dyn ToolProbe,
    tools: &[Tool],
) -> Result<(), DependencyError> {
    for &tool in tools {
        let Some(path) = probe.locate(tool) else {
            return Err(DependencyError::Missing(tool));
        };

        let found = probe
            .version_output(tool, &path)
            .and_then(|output| tool.parse_version(&output));
        match found {
            Some(found) if found < tool.min_version() => {
                return Err(DependencyError::WrongVersion {
                    tool,
                    found,
                    required: tool.min_version(),
                });
            }
            Some(found) => {
                tracing::debug!(tool = %tool, version = %found, path = %path.display(), "Found tool");
            }
            None => {
                tracing::warn!(tool = %tool, "Could not determine version, assuming it is compatible");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeProbe {
        outputs: HashMap<Tool, &'static str>,
    }

    impl ToolProbe for FakeProbe {
        fn locate(&self, tool: Tool) -> Option<PathBuf> {
            self.outputs
                .contains_key(&tool)
                .then(|| PathBuf::from("/usr/bin").join(tool.binary_name()))
        }

        fn version_output(&self, tool: Tool, _path: &Path) -> Option<String> {
            self.outputs.get(&tool).map(|s| s.to_string())
        }
    }

    #[test]
    fn test_parse_common_version_outputs() {
        assert_eq!(
            Tool::CMake.parse_version("cmake version 3.27.1\n\nCMake suite maintained"),
            Some(Version::new(3, 27, 1))
        );
        assert_eq!(
            Tool::Clang.parse_version("Ubuntu clang version 15.0.7\nTarget: x86_64"),
            Some(Version::new(15, 0, 7))
        );
        assert_eq!(
            Tool::Gradle.parse_version("------\nGradle 8.3\n------\n"),
            Some(Version::new(8, 3, 0))
        );
    }

    #[test]
    fn test_parse_java_versions() {
        assert_eq!(
            Tool::Java.parse_version("openjdk version \"17.0.2\" 2022-01-18"),
            Some(Version::new(17, 0, 2))
        );
        assert_eq!(
            Tool::Java.parse_version("openjdk version \"21\" 2023-09-19"),
            Some(Version::new(21, 0, 0))
        );
        assert_eq!(
            Tool::Java.parse_version("java version \"1.8.0_292\""),
            Some(Version::new(8, 0, 0))
        );
    }

    #[test]
    fn test_missing_tool() {
        let probe = FakeProbe {
            outputs: HashMap::from([(Tool::Java, "openjdk version \"17\"")]),
        };
        let err = check_dependencies_with(&probe, &[Tool::Java, Tool::Maven]).unwrap_err();
        assert!(matches!(err, DependencyError::Missing(Tool::Maven)));
    }

    #[test]
    fn test_wrong_version() {
        let probe = FakeProbe {
            outputs: HashMap::from([(Tool::CMake, "cmake version 3.10.2")]),
        };
        let err = check_dependencies_with(&probe, &[Tool::CMake]).unwrap_err();
        match err {
            DependencyError::WrongVersion {
                tool,
                found,
                required,
            } => {
                assert_eq!(tool, Tool::CMake);
                assert_eq!(found, Version::new(3, 10, 2));
                assert_eq!(required, Version::new(3, 16, 0));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unparseable_version_is_accepted() {
        let probe = FakeProbe {
            outputs: HashMap::from([(Tool::Bazel, "bazel no_version")]),
        };
        assert!(check_dependencies_with(&probe, &[Tool::Bazel]).is_ok());
    }

    #[test]
    fn test_gradle_wrapper_skips_gradle() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            required_tools(BuildSystem::Gradle, dir.path()),
            vec![Tool::Java, Tool::Gradle]
        );
        std::fs::write(dir.path().join("gradlew"), "#!/bin/sh").unwrap();
        assert_eq!(required_tools(BuildSystem::Gradle, dir.path()), vec![Tool::Java]);
    }
}
