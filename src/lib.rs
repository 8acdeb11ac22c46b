//! glfixture: GitLab test-instance provisioning (library crate).
//!
//! Re-exports public modules for integration tests and external use.

pub mod config;
pub mod constants;
pub mod env;
pub mod issuer;
pub mod keys;
pub mod license;
pub mod token;
