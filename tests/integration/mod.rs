//! Integration tests for fuzzkit
//!
//! These tests drive several components together: bundling with scripted
//! build drivers, reading bundles back, executing fuzzers, monitoring
//! remote runs and driving the binary.

#[path = "../common/mod.rs"]
pub mod common;

pub mod archive_properties;
pub mod bundle_flow;
pub mod cli_flow;
pub mod execute_flow;
pub mod monitor_flow;
