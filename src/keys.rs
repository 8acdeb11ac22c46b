//! RSA key material used to seal license artifacts.
//!
//! Keys are written in the same PEM flavours OpenSSL's `to_pem` produces,
//! which is what GitLab reads back: PKCS#1 (`RSA PRIVATE KEY`) for the
//! private half and SubjectPublicKeyInfo (`PUBLIC KEY`) for the public half.
//! Loading accepts either PKCS#1 or PKCS#8/SPKI so keys produced by other
//! tooling can be reused.

use std::io::Write;
use std::path::{Path, PathBuf};

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::constants::{KEY_BITS, PRIVATE_KEY_MODE};

/// Errors while generating, encoding, or persisting keys.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("failed to generate {bits}-bit RSA key: {source}")]
    Generation { bits: usize, source: rsa::Error },

    #[error("failed to encode {kind} key: {message}")]
    Encode { kind: &'static str, message: String },

    #[error("failed to write key to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read key from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} does not contain a PEM-encoded RSA {kind} key")]
    Parse { path: PathBuf, kind: &'static str },
}

/// An RSA key pair owned by a single issuance run.
#[derive(Debug, Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh 2048-bit pair from the OS entropy source.
    pub fn generate() -> Result<Self, KeyError> {
        Self::generate_with_bits(KEY_BITS)
    }

    /// Generate a pair with an explicit modulus size.
    pub fn generate_with_bits(bits: usize) -> Result<Self, KeyError> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|source| KeyError::Generation { bits, source })?;
        tracing::debug!(bits, "generated RSA key pair");
        Ok(Self::from_private(private))
    }

    /// Wrap an existing private key, deriving its public half.
    pub fn from_private(private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self { private, public }
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// PKCS#1 PEM text of the private key.
    pub fn private_pem(&self) -> Result<String, KeyError> {
        let pem = self
            .private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| KeyError::Encode {
                kind: "private",
                message: e.to_string(),
            })?;
        Ok(pem.as_str().to_owned())
    }

    /// SPKI PEM text of the public key.
    pub fn public_pem(&self) -> Result<String, KeyError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Encode {
                kind: "public",
                message: e.to_string(),
            })
    }

    /// Lowercase hex SHA-256 of the public key's DER encoding.
    pub fn fingerprint(&self) -> Result<String, KeyError> {
        fingerprint(&self.public)
    }
}

/// Lowercase hex SHA-256 of a public key's DER encoding.
pub fn fingerprint(key: &RsaPublicKey) -> Result<String, KeyError> {
    let der = key.to_public_key_der().map_err(|e| KeyError::Encode {
        kind: "public",
        message: e.to_string(),
    })?;
    Ok(hex::encode(Sha256::digest(der.as_bytes())))
}

/// Write PEM text to `path`, replacing any existing file.
///
/// Parent directories are not created: a missing directory means the
/// target instance is not laid out the way we expect, and that is fatal.
pub fn persist_pem(pem: &str, path: &Path) -> Result<(), KeyError> {
    std::fs::write(path, pem).map_err(|source| KeyError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "wrote key");
    Ok(())
}

/// Write the private half, readable by the owner only.
///
/// On Unix the file is created with mode 0600, and an existing file is
/// narrowed to 0600 before the new key is written into it.
pub fn persist_private_pem(pem: &str, path: &Path) -> Result<(), KeyError> {
    let write_err = |source: std::io::Error| KeyError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_KEY_MODE);
    }
    let mut file = options.open(path).map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(PRIVATE_KEY_MODE))
            .map_err(write_err)?;
    }
    file.write_all(pem.as_bytes()).map_err(write_err)?;

    tracing::info!(path = %path.display(), "wrote private key");
    Ok(())
}

/// Load a private key from PKCS#1 or PKCS#8 PEM.
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey, KeyError> {
    let pem = read_pem(path)?;
    RsaPrivateKey::from_pkcs1_pem(&pem)
        .ok()
        .or_else(|| RsaPrivateKey::from_pkcs8_pem(&pem).ok())
        .ok_or_else(|| KeyError::Parse {
            path: path.to_path_buf(),
            kind: "private",
        })
}

/// Load a public key from SPKI or PKCS#1 PEM.
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey, KeyError> {
    let pem = read_pem(path)?;
    RsaPublicKey::from_public_key_pem(&pem)
        .ok()
        .or_else(|| RsaPublicKey::from_pkcs1_pem(&pem).ok())
        .ok_or_else(|| KeyError::Parse {
            path: path.to_path_buf(),
            kind: "public",
        })
}

fn read_pem(path: &Path) -> Result<String, KeyError> {
    std::fs::read_to_string(path).map_err(|source| KeyError::Read {
        path: path.to_path_buf(),
        source,
    })
}
