pub mod api;
pub mod archive;
pub mod build;
pub mod bundler;
pub mod cli;
pub mod commands;
pub mod config;
pub mod container;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod util;

pub use archive::{BundleMetadata, Engine, FuzzerEntry};
pub use bundler::{BundleError, BundleOptions, Bundler};
pub use config::{BuildSystem, Config};
pub use container::ImageBuilder;
pub use executor::Executor;
pub use monitor::{RemoteMonitor, Severity};
