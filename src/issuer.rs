//! The license issuance pipeline.
//!
//! A single linear run: obtain a key pair, persist it, build a license
//! record, seal it with the private key and write the artifact. Every step
//! either succeeds or aborts the run; nothing is cleaned up on failure.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{LICENSE_PATH, PRIVATE_KEY_PATH, PUBLIC_KEY_PATH, SERVICE_PUBLIC_KEY_PATH};
use crate::keys::{self, KeyError, KeyPair};
use crate::license::{self, LicenseError, LicenseRecord, LicenseTemplate};

/// Errors that abort an issuance or verification run.
#[derive(Error, Debug)]
pub enum IssueError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    License(#[from] LicenseError),

    #[error("failed to write license to {path}: {source}")]
    WriteArtifact {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read license from {path}: {source}")]
    ReadArtifact {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no public key destination configured")]
    NoPublicKeyPaths,
}

/// Files written by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub private_key: PathBuf,
    /// Every location that receives the (identical) public key.
    pub public_keys: Vec<PathBuf>,
    pub license: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            private_key: PathBuf::from(PRIVATE_KEY_PATH),
            public_keys: vec![
                PathBuf::from(PUBLIC_KEY_PATH),
                PathBuf::from(SERVICE_PUBLIC_KEY_PATH),
            ],
            license: PathBuf::from(LICENSE_PATH),
        }
    }
}

impl OutputPaths {
    /// All four canonical paths rooted under `dir` instead of `/`.
    pub fn under(dir: &Path) -> Self {
        let rebase = |p: &str| dir.join(p.trim_start_matches('/'));
        Self {
            private_key: rebase(PRIVATE_KEY_PATH),
            public_keys: vec![rebase(PUBLIC_KEY_PATH), rebase(SERVICE_PUBLIC_KEY_PATH)],
            license: rebase(LICENSE_PATH),
        }
    }
}

/// Where the signing key comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeySource {
    /// Fresh 2048-bit pair, private half written to `private_key`.
    #[default]
    Generate,
    /// Load the existing private key from `private_key` and leave it in place.
    Reuse,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct IssueReport {
    pub paths: OutputPaths,
    pub key_reused: bool,
    /// SHA-256 of the public key DER, lowercase hex.
    pub fingerprint: String,
    pub license: LicenseRecord,
}

/// Runs the issuance pipeline.
#[derive(Debug, Clone, Default)]
pub struct Issuer {
    pub paths: OutputPaths,
    pub template: LicenseTemplate,
    pub key_source: KeySource,
}

impl Issuer {
    pub fn new(paths: OutputPaths, template: LicenseTemplate, key_source: KeySource) -> Self {
        Self {
            paths,
            template,
            key_source,
        }
    }

    /// Issue a license starting on `today`.
    pub fn run(&self, today: NaiveDate) -> Result<IssueReport, IssueError> {
        if self.paths.public_keys.is_empty() {
            return Err(IssueError::NoPublicKeyPaths);
        }

        let pair = match self.key_source {
            KeySource::Generate => {
                let pair = KeyPair::generate()?;
                keys::persist_private_pem(&pair.private_pem()?, &self.paths.private_key)?;
                pair
            }
            KeySource::Reuse => {
                let private = keys::load_private_key(&self.paths.private_key)?;
                tracing::info!(path = %self.paths.private_key.display(), "reusing private key");
                KeyPair::from_private(private)
            }
        };

        // Encode once so every destination gets byte-identical text.
        let public_pem = pair.public_pem()?;
        for path in &self.paths.public_keys {
            keys::persist_pem(&public_pem, path)?;
        }

        let record = self.template.build(today, &mut rand::thread_rng());
        tracing::debug!(
            id = record.restrictions.id,
            plan = %record.restrictions.plan,
            starts_at = %record.starts_at,
            expires_at = %record.expires_at,
            "built license record"
        );

        let artifact = license::export(&record, pair.private_key())?;
        write_artifact(&artifact, &self.paths.license)?;

        Ok(IssueReport {
            paths: self.paths.clone(),
            key_reused: self.key_source == KeySource::Reuse,
            fingerprint: pair.fingerprint()?,
            license: record,
        })
    }
}

/// Write the sealed artifact, replacing any existing file.
pub fn write_artifact(artifact: &str, path: &Path) -> Result<(), IssueError> {
    std::fs::write(path, artifact).map_err(|source| IssueError::WriteArtifact {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), bytes = artifact.len(), "wrote license");
    Ok(())
}

/// Open the artifact at `license_path` with the public key at `public_key_path`.
pub fn verify_files(license_path: &Path, public_key_path: &Path) -> Result<LicenseRecord, IssueError> {
    let artifact =
        std::fs::read_to_string(license_path).map_err(|source| IssueError::ReadArtifact {
            path: license_path.to_path_buf(),
            source,
        })?;
    let public = keys::load_public_key(public_key_path)?;
    Ok(license::import(&artifact, &public)?)
}
