//! Utility modules

pub mod paths;
pub mod tools;

pub use paths::{access_tokens_path, build_dir, data_dir, find_upwards};
pub use tools::{check_dependencies, required_tools, DependencyError, Tool, Version};
