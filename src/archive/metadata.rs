//! `bundle.yaml`: the manifest stored at the root of every bundle.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the metadata file at the bundle root.
pub const METADATA_FILE_NAME: &str = "bundle.yaml";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("invalid bundle metadata: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no {} found in {}", METADATA_FILE_NAME, .0.display())]
    Missing(PathBuf),
}

/// Fuzzing engine a [`FuzzerEntry`] runs under.
///
/// Unknown engine names are kept verbatim so newer bundles still parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Engine {
    LibFuzzer,
    JavaLibFuzzer,
    JazzerJs,
    LlvmCov,
    Other(String),
}

impl Engine {
    pub fn as_str(&self) -> &str {
        match self {
            Engine::LibFuzzer => "LIBFUZZER",
            Engine::JavaLibFuzzer => "JAVA_LIBFUZZER",
            Engine::JazzerJs => "JAZZER_JS",
            Engine::LlvmCov => "LLVM_COV",
            Engine::Other(name) => name,
        }
    }

    /// Whether entries of this engine are meant for fuzzing (as opposed to
    /// coverage collection).
    pub fn is_fuzzing(&self) -> bool {
        !matches!(self, Engine::LlvmCov)
    }
}

impl From<String> for Engine {
    fn from(value: String) -> Self {
        match value.as_str() {
            "LIBFUZZER" => Engine::LibFuzzer,
            "JAVA_LIBFUZZER" => Engine::JavaLibFuzzer,
            "JAZZER_JS" => Engine::JazzerJs,
            "LLVM_COV" => Engine::LlvmCov,
            _ => Engine::Other(value),
        }
    }
}

impl From<Engine> for String {
    fn from(engine: Engine) -> Self {
        engine.as_str().to_string()
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

/// One fuzz target packaged into a bundle.
///
/// All paths except `project_dir` are relative to the bundle root and use
/// forward slashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzerEntry {
    /// Qualified test name; JVM targets may carry a `::method` suffix.
    pub name: String,
    pub engine: Engine,
    /// Fuzz test executable, for native engines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Project directory on the machine the bundle was created on.
    #[serde(default)]
    pub project_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeds: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub library_paths: Vec<String>,
    /// Class path (JVM) in resolution order. The manifest jar comes first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtime_paths: Vec<String>,
    #[serde(default)]
    pub engine_options: EngineOptions,
    /// Maximum run time in seconds, 0 for unlimited.
    #[serde(default)]
    pub max_run_time: u64,
}

impl FuzzerEntry {
    pub fn new(name: impl Into<String>, engine: Engine) -> Self {
        Self {
            name: name.into(),
            engine,
            path: None,
            project_dir: String::new(),
            dictionary: None,
            seeds: None,
            library_paths: Vec::new(),
            runtime_paths: Vec::new(),
            engine_options: EngineOptions::default(),
            max_run_time: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEnvironment {
    /// Docker image the fuzzers run in.
    pub docker: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRevision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRevision {
    pub git: GitRevision,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    #[serde(default)]
    pub fuzzers: Vec<FuzzerEntry>,
    #[serde(default)]
    pub docker_base_image: String,
    #[serde(default)]
    pub run_environment: RunEnvironment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_revision: Option<CodeRevision>,
}

impl BundleMetadata {
    pub fn to_yaml(&self) -> Result<String, MetadataError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, MetadataError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load `bundle.yaml` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, MetadataError> {
        let path = dir.join(METADATA_FILE_NAME);
        if !path.is_file() {
            return Err(MetadataError::Missing(dir.to_path_buf()));
        }
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, MetadataError> {
        let contents = fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Write the metadata as `bundle.yaml` into `dir` and return its path.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, MetadataError> {
        let path = dir.join(METADATA_FILE_NAME);
        fs::write(&path, self.to_yaml()?).map_err(|source| MetadataError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
