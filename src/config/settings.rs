use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitor::Severity;
use crate::util::paths::find_upwards;

/// Project configuration file, looked up from the working directory upwards
pub const CONFIG_FILE_NAME: &str = "fuzzkit.toml";

/// Prefix of the environment variables that override config keys
pub const ENV_PREFIX: &str = "FUZZKIT_";

const DEFAULT_DOCKER_HOST: &str = "http://localhost:2375";
const JVM_DOCKER_IMAGE: &str = "eclipse-temurin:20";
const NATIVE_DOCKER_IMAGE: &str = "ubuntu:rolling";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("no server configured, set `server` in fuzzkit.toml, FUZZKIT_SERVER or --server")]
    MissingServer,

    #[error("no {0} configured")]
    MissingValue(&'static str),
}

/// Build system of the project being bundled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    CMake,
    Bazel,
    Maven,
    Gradle,
    /// Arbitrary user build command
    Other,
}

impl BuildSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildSystem::CMake => "cmake",
            BuildSystem::Bazel => "bazel",
            BuildSystem::Maven => "maven",
            BuildSystem::Gradle => "gradle",
            BuildSystem::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cmake" => Some(BuildSystem::CMake),
            "bazel" => Some(BuildSystem::Bazel),
            "maven" => Some(BuildSystem::Maven),
            "gradle" => Some(BuildSystem::Gradle),
            "other" => Some(BuildSystem::Other),
            _ => None,
        }
    }

    /// Java/Kotlin build systems, bundled for Jazzer
    pub fn is_jvm(&self) -> bool {
        matches!(self, BuildSystem::Maven | BuildSystem::Gradle)
    }

    /// Detect the build system from marker files in `project_dir`
    pub fn detect(project_dir: &Path) -> Self {
        let has = |name: &str| project_dir.join(name).exists();
        if has("CMakeLists.txt") {
            BuildSystem::CMake
        } else if has("MODULE.bazel") || has("WORKSPACE") || has("WORKSPACE.bazel") {
            BuildSystem::Bazel
        } else if has("pom.xml") {
            BuildSystem::Maven
        } else if has("build.gradle") || has("build.gradle.kts") {
            BuildSystem::Gradle
        } else {
            BuildSystem::Other
        }
    }
}

impl std::fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durations in TOML may be written as a number of seconds or as a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TomlDuration {
    Seconds(u64),
    Text(String),
}

impl TomlDuration {
    fn into_text(self) -> String {
        match self {
            TomlDuration::Seconds(secs) => secs.to_string(),
            TomlDuration::Text(text) => text,
        }
    }
}

/// TOML representation of `fuzzkit.toml`
#[derive(Debug, Clone, Default, Deserialize)]
struct TomlConfig {
    build_system: Option<String>,
    build_command: Option<String>,
    project_dir: Option<PathBuf>,
    dict: Option<PathBuf>,
    seed_corpus_dirs: Option<Vec<PathBuf>>,
    engine_args: Option<Vec<String>>,
    env: Option<Vec<String>>,
    timeout: Option<TomlDuration>,
    docker_image: Option<String>,
    build_jobs: Option<usize>,
    server: Option<String>,
    project: Option<String>,
    registry: Option<String>,
    monitor_duration: Option<TomlDuration>,
    min_finding_severity: Option<String>,
    docker_host: Option<String>,
}

/// One configuration layer; unset keys fall through to lower layers.
///
/// Values are kept as written and validated once in [`Config::finalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub build_system: Option<String>,
    pub build_command: Option<String>,
    pub project_dir: Option<PathBuf>,
    pub dict: Option<PathBuf>,
    pub seed_corpus_dirs: Option<Vec<PathBuf>>,
    pub engine_args: Option<Vec<String>>,
    pub env: Option<Vec<String>>,
    pub timeout: Option<String>,
    pub docker_image: Option<String>,
    pub build_jobs: Option<String>,
    pub server: Option<String>,
    pub project: Option<String>,
    pub registry: Option<String>,
    pub monitor_duration: Option<String>,
    pub min_finding_severity: Option<String>,
    pub docker_host: Option<String>,
}

impl From<TomlConfig> for Settings {
    fn from(toml: TomlConfig) -> Self {
        Self {
            build_system: toml.build_system,
            build_command: toml.build_command,
            project_dir: toml.project_dir,
            dict: toml.dict,
            seed_corpus_dirs: toml.seed_corpus_dirs,
            engine_args: toml.engine_args,
            env: toml.env,
            timeout: toml.timeout.map(TomlDuration::into_text),
            docker_image: toml.docker_image,
            build_jobs: toml.build_jobs.map(|jobs| jobs.to_string()),
            server: toml.server,
            project: toml.project,
            registry: toml.registry,
            monitor_duration: toml.monitor_duration.map(TomlDuration::into_text),
            min_finding_severity: toml.min_finding_severity,
            docker_host: toml.docker_host,
        }
    }
}

impl Settings {
    /// Parse a `fuzzkit.toml` file. Relative paths are resolved against the
    /// directory containing the file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let toml: TomlConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut settings = Settings::from(toml);
        if let Some(base) = path.parent() {
            settings.resolve_paths(base);
        }
        Ok(settings)
    }

    /// Read `FUZZKIT_<KEY>` variables through `lookup`.
    ///
    /// List values are split on whitespace, except `seed_corpus_dirs` which
    /// uses the platform path separator. A `tcp://` or `http(s)://`
    /// `DOCKER_HOST` is honoured when `FUZZKIT_DOCKER_HOST` is unset.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(&format!("{ENV_PREFIX}{}", key.to_ascii_uppercase()))
                .filter(|value| !value.is_empty())
        };
        let words = |value: String| -> Vec<String> {
            value.split_whitespace().map(String::from).collect()
        };

        let docker_host = get("docker_host").or_else(|| {
            lookup("DOCKER_HOST").filter(|host| {
                ["tcp://", "http://", "https://"]
                    .iter()
                    .any(|scheme| host.starts_with(scheme))
            })
        });

        Self {
            build_system: get("build_system"),
            build_command: get("build_command"),
            project_dir: get("project_dir").map(PathBuf::from),
            dict: get("dict").map(PathBuf::from),
            seed_corpus_dirs: get("seed_corpus_dirs")
                .map(|value| std::env::split_paths(&value).collect()),
            engine_args: get("engine_args").map(words),
            env: get("env").map(words),
            timeout: get("timeout"),
            docker_image: get("docker_image"),
            build_jobs: get("build_jobs"),
            server: get("server"),
            project: get("project"),
            registry: get("registry"),
            monitor_duration: get("monitor_duration"),
            min_finding_severity: get("min_finding_severity"),
            docker_host,
        }
    }

    /// Overlay `higher` on top of `self`; keys set in `higher` win.
    pub fn merge(self, higher: Settings) -> Settings {
        Settings {
            build_system: higher.build_system.or(self.build_system),
            build_command: higher.build_command.or(self.build_command),
            project_dir: higher.project_dir.or(self.project_dir),
            dict: higher.dict.or(self.dict),
            seed_corpus_dirs: higher.seed_corpus_dirs.or(self.seed_corpus_dirs),
            engine_args: higher.engine_args.or(self.engine_args),
            env: higher.env.or(self.env),
            timeout: higher.timeout.or(self.timeout),
            docker_image: higher.docker_image.or(self.docker_image),
            build_jobs: higher.build_jobs.or(self.build_jobs),
            server: higher.server.or(self.server),
            project: higher.project.or(self.project),
            registry: higher.registry.or(self.registry),
            monitor_duration: higher.monitor_duration.or(self.monitor_duration),
            min_finding_severity: higher.min_finding_severity.or(self.min_finding_severity),
            docker_host: higher.docker_host.or(self.docker_host),
        }
    }

    /// Make relative paths absolute against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let absolute = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.project_dir.as_mut() {
            absolute(p);
        }
        if let Some(p) = self.dict.as_mut() {
            absolute(p);
        }
        if let Some(dirs) = self.seed_corpus_dirs.as_mut() {
            dirs.iter_mut().for_each(absolute);
        }
    }
}

/// Resolved, immutable configuration handed to every component
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub project_dir: PathBuf,
    /// `fuzzkit.toml` the values were read from, if any
    pub config_file: Option<PathBuf>,
    pub build_system: BuildSystem,
    pub build_command: Option<String>,
    pub dict: Option<PathBuf>,
    pub seed_corpus_dirs: Vec<PathBuf>,
    pub engine_args: Vec<String>,
    /// `KEY=VALUE` pairs set for the fuzzer
    pub env: Vec<String>,
    pub timeout: Option<Duration>,
    pub docker_image: String,
    /// Maximum concurrent builds; `None` lets the bundler pick
    pub build_jobs: Option<usize>,
    pub server: Option<String>,
    /// Always in `projects/<name>` form
    pub project: Option<String>,
    pub registry: Option<String>,
    pub monitor_duration: Option<Duration>,
    pub min_finding_severity: Option<Severity>,
    pub docker_host: String,
}

impl Config {
    /// Load configuration for `working_dir`: `fuzzkit.toml`, then the process
    /// environment, then `flags`.
    pub fn load(working_dir: &Path, flags: Settings) -> Result<Self, ConfigError> {
        Self::load_with_env(working_dir, flags, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(
        working_dir: &Path,
        flags: Settings,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let config_file = find_upwards(working_dir, CONFIG_FILE_NAME);
        let file_settings = match &config_file {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Settings::from_file(path)?
            }
            None => Settings::default(),
        };

        let mut env_settings = Settings::from_env(lookup);
        env_settings.resolve_paths(working_dir);

        let settings = file_settings.merge(env_settings).merge(flags);
        let default_project_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(working_dir);
        let mut config = Self::finalize(settings, default_project_dir)?;
        config.config_file = config_file;
        Ok(config)
    }

    /// Validate `settings` and fill in defaults.
    pub fn finalize(settings: Settings, default_project_dir: &Path) -> Result<Self, ConfigError> {
        let project_dir = settings
            .project_dir
            .unwrap_or_else(|| default_project_dir.to_path_buf());

        let build_system = match settings.build_system {
            Some(value) => {
                BuildSystem::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                    key: "build_system",
                    value,
                    reason: "expected one of cmake, bazel, maven, gradle, other".into(),
                })?
            }
            None => BuildSystem::detect(&project_dir),
        };

        let docker_image = settings.docker_image.unwrap_or_else(|| {
            if build_system.is_jvm() {
                JVM_DOCKER_IMAGE.to_string()
            } else {
                NATIVE_DOCKER_IMAGE.to_string()
            }
        });

        let build_jobs = settings
            .build_jobs
            .map(|value| match value.parse::<usize>() {
                Ok(jobs) if jobs > 0 => Ok(jobs),
                _ => Err(ConfigError::InvalidValue {
                    key: "build_jobs",
                    value,
                    reason: "expected a positive integer".into(),
                }),
            })
            .transpose()?;

        let min_finding_severity = settings
            .min_finding_severity
            .map(|value| {
                Severity::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                    key: "min_finding_severity",
                    value,
                    reason: "expected one of LOW, MEDIUM, HIGH, CRITICAL".into(),
                })
            })
            .transpose()?;

        Ok(Self {
            project_dir,
            config_file: None,
            build_system,
            build_command: settings.build_command,
            dict: settings.dict,
            seed_corpus_dirs: settings.seed_corpus_dirs.unwrap_or_default(),
            engine_args: settings.engine_args.unwrap_or_default(),
            env: settings.env.unwrap_or_default(),
            timeout: settings
                .timeout
                .map(|v| parse_duration("timeout", &v))
                .transpose()?,
            docker_image,
            build_jobs,
            server: settings
                .server
                .map(|s| s.trim_end_matches('/').to_string()),
            project: settings.project.map(|p| normalize_project_name(&p)),
            registry: settings.registry,
            monitor_duration: settings
                .monitor_duration
                .map(|v| parse_duration("monitor_duration", &v))
                .transpose()?,
            min_finding_severity,
            docker_host: normalize_docker_host(settings.docker_host)?,
        })
    }

    pub fn require_server(&self) -> Result<&str, ConfigError> {
        self.server.as_deref().ok_or(ConfigError::MissingServer)
    }

    pub fn require_project(&self) -> Result<&str, ConfigError> {
        self.project
            .as_deref()
            .ok_or(ConfigError::MissingValue("project"))
    }

    pub fn require_registry(&self) -> Result<&str, ConfigError> {
        self.registry
            .as_deref()
            .ok_or(ConfigError::MissingValue("registry"))
    }
}

/// Parse `<n>s`, `<n>m`, `<n>h` or a bare number of seconds
pub fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: "expected a duration such as 30s, 10m or 2h".into(),
    };
    let trimmed = value.trim();
    let (number, unit) = match trimmed.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, "s"),
    };
    let amount: u64 = number.parse().map_err(|_| invalid())?;
    let secs = match unit {
        "s" => amount,
        "m" => amount.saturating_mul(60),
        "h" => amount.saturating_mul(60 * 60),
        _ => return Err(invalid()),
    };
    Ok(Duration::from_secs(secs))
}

/// `my-project` → `projects/my-project`
pub fn normalize_project_name(project: &str) -> String {
    let name = project.trim().trim_start_matches('/');
    if name.starts_with("projects/") {
        name.to_string()
    } else {
        format!("projects/{name}")
    }
}

fn normalize_docker_host(host: Option<String>) -> Result<String, ConfigError> {
    let Some(host) = host else {
        return Ok(DEFAULT_DOCKER_HOST.to_string());
    };
    let host = host.trim_end_matches('/');
    if let Some(rest) = host.strip_prefix("tcp://") {
        Ok(format!("http://{rest}"))
    } else if host.starts_with("http://") || host.starts_with("https://") {
        Ok(host.to_string())
    } else {
        Err(ConfigError::InvalidValue {
            key: "docker_host",
            value: host.to_string(),
            reason: "only tcp://, http:// and https:// hosts are supported".into(),
        })
    }
}
