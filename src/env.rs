//! Environment variable abstraction for testability.
//!
//! Production code uses [`Env::real()`] which delegates to [`std::env::var`].
//! Tests use [`Env::mock()`] (or [`Env::from_vars()`] outside the crate)
//! backed by a `HashMap`, so config layering can be exercised without
//! mutating or reading the process environment.

use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable reader.
#[derive(Clone, Debug)]
pub struct Env {
    overrides: Option<HashMap<String, String>>,
}

impl Env {
    /// Create an `Env` that reads from the real process environment.
    pub fn real() -> Self {
        Self { overrides: None }
    }

    /// Create an `Env` backed by explicit key-value pairs, ignoring the
    /// process environment.
    pub fn from_vars(
        vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self {
            overrides: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// An `Env` with no variables set.
    pub fn empty() -> Self {
        Self {
            overrides: Some(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn mock(vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        Self::from_vars(vars)
    }

    /// Look up an environment variable by name.
    pub fn var(&self, name: &str) -> Result<String, std::env::VarError> {
        match &self.overrides {
            Some(map) => map.get(name).cloned().ok_or(std::env::VarError::NotPresent),
            None => std::env::var(name),
        }
    }

    /// Look up a variable, treating an empty value as unset.
    pub fn non_empty(&self, name: &str) -> Option<String> {
        self.var(name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Read a single filesystem path.
    pub fn path(&self, name: &str) -> Option<PathBuf> {
        self.non_empty(name).map(PathBuf::from)
    }

    /// Read a `:`-separated list of paths, skipping empty segments.
    pub fn path_list(&self, name: &str) -> Option<Vec<PathBuf>> {
        let raw = self.non_empty(name)?;
        let paths: Vec<PathBuf> = raw
            .split(':')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        if paths.is_empty() { None } else { Some(paths) }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::real()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_env_reads_cargo_manifest_dir() {
        let env = Env::real();
        assert!(env.var("CARGO_MANIFEST_DIR").is_ok());
    }

    #[test]
    fn mock_env_returns_set_values() {
        let env = Env::mock([("FOO", "bar")]);
        assert_eq!(env.var("FOO").unwrap(), "bar");
        assert!(env.var("MISSING").is_err());
    }

    #[test]
    fn empty_env_hides_process_vars() {
        let env = Env::empty();
        assert!(env.var("CARGO_MANIFEST_DIR").is_err());
        assert!(env.var("PATH").is_err());
    }

    #[test]
    fn non_empty_ignores_blank_values() {
        let env = Env::mock([("BLANK", "  "), ("SET", "x")]);
        assert_eq!(env.non_empty("BLANK"), None);
        assert_eq!(env.non_empty("SET").as_deref(), Some("x"));
    }

    #[test]
    fn path_list_splits_on_colon() {
        let env = Env::mock([("KEYS", "/a.pub::/b.pub ")]);
        assert_eq!(
            env.path_list("KEYS").unwrap(),
            vec![PathBuf::from("/a.pub"), PathBuf::from("/b.pub")]
        );
    }

    #[test]
    fn path_list_of_separators_only_is_none() {
        let env = Env::mock([("KEYS", ":::")]);
        assert!(env.path_list("KEYS").is_none());
    }
}
