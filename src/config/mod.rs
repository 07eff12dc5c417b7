//! Layered project configuration

mod settings;

pub use settings::{
    normalize_project_name, parse_duration, BuildSystem, Config, ConfigError, Settings,
    CONFIG_FILE_NAME, ENV_PREFIX,
};
