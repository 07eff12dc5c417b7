//! Shared test utilities
//!
//! - Scripted build drivers that return prepared build results
//! - Project and bundle fixtures on disk

pub mod fixtures;
