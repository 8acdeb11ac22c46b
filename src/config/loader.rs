//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `--config <file>`, or `.glfixture.toml` in the working directory
//! 4. `~/.config/glfixture/config.toml` (global defaults)
//! 5. Built-in defaults (the canonical GitLab Omnibus paths)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::{
    ENV_LICENSE_PATH, ENV_PLAN, ENV_PRIVATE_KEY_PATH, ENV_PUBLIC_KEY_PATHS, ENV_TOKEN,
    VALIDITY_DAYS,
};
use crate::env::Env;
use crate::issuer::OutputPaths;
use crate::license::{LicenseTemplate, Licensee, Plan};
use crate::token::TokenFixture;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: OutputPaths,
    pub licensee: Licensee,
    pub license: LicenseConfig,
    pub token: TokenFixture,
}

/// License shape configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    pub plan: Plan,
    /// Days from issuance to expiry.
    pub validity_days: u32,
    pub active_user_count: Option<u32>,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            plan: Plan::Ultimate,
            validity_days: VALIDITY_DAYS,
            active_user_count: None,
        }
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// `explicit` is a `--config` path and must exist; otherwise the
    /// optional `.glfixture.toml` in `working_dir` is used.
    pub fn load(
        explicit: Option<&Path>,
        working_dir: Option<&Path>,
        env: &Env,
    ) -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        Self::load_layers(global.as_deref(), explicit, working_dir, env)
    }

    /// Like [`Config::load`], with the global config file named by the
    /// caller. `None` skips the global layer.
    pub fn load_layers(
        global: Option<&Path>,
        explicit: Option<&Path>,
        working_dir: Option<&Path>,
        env: &Env,
    ) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        // Layer 4: global config
        if let Some(global_path) = global {
            if global_path.exists() {
                merge_tables(&mut merged, Self::load_file(global_path)?);
            }
        }

        // Layer 3: explicit or working-directory config
        if let Some(path) = explicit {
            merge_tables(&mut merged, Self::load_file(path)?);
        } else if let Some(dir) = working_dir {
            let local_path = dir.join(crate::constants::CONFIG_FILENAME);
            if local_path.exists() {
                merge_tables(&mut merged, Self::load_file(&local_path)?);
            }
        }

        let mut config: Config = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid(e.to_string()))?;

        // Layer 2: environment variables
        config.apply_env_vars(env);

        Ok(config)
    }

    /// Read a config file as a raw table, checking it against the schema.
    fn load_file(path: &Path) -> Result<toml::Table, ConfigError> {
        let parse_err = |source: toml::de::Error| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        };
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let table: toml::Table = toml::from_str(&content).map_err(parse_err)?;
        toml::Value::Table(table.clone())
            .try_into::<Config>()
            .map_err(parse_err)?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(table)
    }

    /// Get the global config file path.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::constants::CONFIG_DIR).join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        if let Some(path) = env.path(ENV_PRIVATE_KEY_PATH) {
            self.paths.private_key = path;
        }
        if let Some(paths) = env.path_list(ENV_PUBLIC_KEY_PATHS) {
            self.paths.public_keys = paths;
        }
        if let Some(path) = env.path(ENV_LICENSE_PATH) {
            self.paths.license = path;
        }

        if let Some(val) = env.non_empty(ENV_PLAN) {
            match val.parse::<Plan>() {
                Ok(plan) => self.license.plan = plan,
                Err(e) => tracing::warn!("ignoring invalid {ENV_PLAN} value: {e}"),
            }
        }

        if let Some(val) = env.non_empty(ENV_TOKEN) {
            self.token.token = val;
        }
    }

    /// Reject settings that would produce a license GitLab refuses or
    /// one that could expire within minutes of being issued.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.license.validity_days < VALIDITY_DAYS {
            return Err(ConfigError::Invalid(format!(
                "license.validity_days must be at least {VALIDITY_DAYS}, got {}",
                self.license.validity_days
            )));
        }
        if self.paths.public_keys.is_empty() {
            return Err(ConfigError::Invalid(
                "paths.public_keys must name at least one file".to_string(),
            ));
        }
        if self.licensee.name.trim().is_empty() {
            return Err(ConfigError::Invalid("licensee.name must not be empty".to_string()));
        }
        Ok(())
    }

    /// The record template described by `[licensee]` and `[license]`.
    pub fn license_template(&self) -> LicenseTemplate {
        LicenseTemplate {
            licensee: self.licensee.clone(),
            plan: self.license.plan,
            validity_days: self.license.validity_days,
            active_user_count: self.license.active_user_count,
        }
    }
}

/// Overlay `other` onto `base`. Keys present in `other` win, nested
/// tables merge key by key.
fn merge_tables(base: &mut toml::Table, other: toml::Table) {
    for (key, value) in other {
        if let toml::Value::Table(table) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, table);
                continue;
            }
            base.insert(key, toml::Value::Table(table));
        } else {
            base.insert(key, value);
        }
    }
}
