//! Clap argument types and their application onto the loaded config.

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use glfixture::config::Config;
use glfixture::issuer::{KeySource, OutputPaths};
use glfixture::license::Plan;

/// Provision a GitLab test instance: license key material and access tokens.
#[derive(Parser, Debug)]
#[command(name = "glfixture", version = glfixture::constants::VERSION)]
pub struct Cli {
    /// Config file to load instead of ./.glfixture.toml.
    #[arg(long, global = true, env = "GLFIXTURE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v for info, -vv for debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, default_value_t = false, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Generate a signing key pair and issue a license.
    Issue(IssueArgs),

    /// Check a license artifact against a public key.
    Verify(VerifyArgs),

    /// Print the rails-runner script that provisions the admin access token.
    Token(TokenArgs),

    /// Print version and build information.
    Version,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

/// Arguments for the `issue` subcommand.
#[derive(Parser, Debug, Default)]
pub struct IssueArgs {
    /// Issuance date (YYYY-MM-DD). Defaults to today in local time.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Sign with the existing private key instead of generating a new pair.
    #[arg(long, default_value_t = false)]
    pub reuse_key: bool,

    /// Write the canonical file layout under this directory instead of `/`.
    #[arg(long, value_name = "DIR", conflicts_with_all = ["private_key", "public_key", "license"])]
    pub root: Option<PathBuf>,

    /// Private key destination.
    #[arg(long)]
    pub private_key: Option<PathBuf>,

    /// Public key destination (repeatable; replaces the configured list).
    #[arg(long)]
    pub public_key: Vec<PathBuf>,

    /// License artifact destination.
    #[arg(long)]
    pub license: Option<PathBuf>,

    /// Subscription plan to grant.
    #[arg(long)]
    pub plan: Option<Plan>,

    /// Output format for the run summary.
    #[arg(long, value_enum, default_value_t = OutputFormat::Terminal)]
    pub format: OutputFormat,
}

impl IssueArgs {
    /// Apply CLI overrides on top of the layered config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref root) = self.root {
            config.paths = OutputPaths::under(root);
        }
        if let Some(ref path) = self.private_key {
            config.paths.private_key = path.clone();
        }
        if !self.public_key.is_empty() {
            config.paths.public_keys = self.public_key.clone();
        }
        if let Some(ref path) = self.license {
            config.paths.license = path.clone();
        }
        if let Some(plan) = self.plan {
            config.license.plan = plan;
        }
    }

    pub fn key_source(&self) -> KeySource {
        if self.reuse_key {
            KeySource::Reuse
        } else {
            KeySource::Generate
        }
    }
}

/// Arguments for the `verify` subcommand.
#[derive(Parser, Debug, Default)]
pub struct VerifyArgs {
    /// License artifact to check (default: the configured license path).
    #[arg(long)]
    pub license: Option<PathBuf>,

    /// Public key to check with (default: the first configured public key).
    #[arg(long)]
    pub public_key: Option<PathBuf>,

    /// Evaluate expiry as of this date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Terminal)]
    pub format: OutputFormat,
}

impl VerifyArgs {
    /// Resolve the license and public key paths to read.
    pub fn resolve(&self, config: &Config) -> Option<(PathBuf, PathBuf)> {
        let license = self
            .license
            .clone()
            .unwrap_or_else(|| config.paths.license.clone());
        let public_key = self
            .public_key
            .clone()
            .or_else(|| config.paths.public_keys.first().cloned())?;
        Some((license, public_key))
    }
}

/// Arguments for the `token` subcommand.
#[derive(Parser, Debug, Default)]
pub struct TokenArgs {
    /// User that owns the token.
    #[arg(long)]
    pub username: Option<String>,

    /// Token name shown in the GitLab UI.
    #[arg(long)]
    pub name: Option<String>,

    /// Comma-separated token scopes (replaces the configured list).
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,

    /// Secret value to force onto the token.
    #[arg(long)]
    pub token: Option<String>,

    /// Days until the token expires.
    #[arg(long)]
    pub expires_in_days: Option<u32>,

    /// Create the token without an expiry date.
    #[arg(long, default_value_t = false, conflicts_with = "expires_in_days")]
    pub no_expiry: bool,

    /// Write the script here instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

impl TokenArgs {
    pub fn apply(&self, config: &mut Config) {
        let token = &mut config.token;
        if let Some(ref username) = self.username {
            token.username = username.clone();
        }
        if let Some(ref name) = self.name {
            token.name = name.clone();
        }
        if !self.scope.is_empty() {
            token.scopes = self.scope.clone();
        }
        if let Some(ref value) = self.token {
            token.token = value.clone();
        }
        if let Some(days) = self.expires_in_days {
            token.expires_in_days = Some(days);
        }
        if self.no_expiry {
            token.expires_in_days = None;
        }
    }
}
