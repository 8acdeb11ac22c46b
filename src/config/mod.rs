//! Configuration loading and layering.
//!
//! Handles `.glfixture.toml` loading, environment variable resolution,
//! and validation of the merged result. CLI flags are applied last by the
//! binary.

pub mod loader;

pub use loader::{Config, ConfigError, LicenseConfig};
