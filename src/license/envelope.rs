//! GitLab license envelope: hybrid AES/RSA sealing.
//!
//! Layout, as read by GitLab's `Gitlab::License::Encryptor`:
//!
//! ```text
//! base64( json({ "data": base64(aes_128_cbc(payload)),
//!                "key":  base64(rsa_private_encrypt(aes_key)),
//!                "iv":   base64(iv) }) )
//! ```
//!
//! "Private encrypt" is RSA with PKCS#1 v1.5 type-1 padding over the raw
//! AES key, i.e. an unprefixed PKCS#1 v1.5 signature. Anyone holding the
//! public key can recover the AES key, so the envelope proves origin; it
//! does not keep the payload secret. Every base64 layer uses the MIME
//! layout Ruby's `Base64.encode64` emits (60-column lines, each ending in
//! `\n`).

use aes::Aes128;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use super::LicenseError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const AES_KEY_LEN: usize = 16;
const IV_LEN: usize = 16;
const LINE_WIDTH: usize = 60;

/// Minimum PKCS#1 v1.5 padding string length (bytes of `0xff`).
const MIN_PADDING: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    data: String,
    key: String,
    iv: String,
}

/// Seal `payload` with `key`, returning the transport-safe artifact text.
pub fn seal(payload: &[u8], key: &RsaPrivateKey) -> Result<String, LicenseError> {
    let mut rng = rand::rngs::OsRng;

    let mut aes_key = [0u8; AES_KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut aes_key);
    rng.fill_bytes(&mut iv);

    let data = Aes128CbcEnc::new(&aes_key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(payload);

    let sealed_key = key
        .sign_with_rng(&mut rng, Pkcs1v15Sign::new_unprefixed(), &aes_key)
        .map_err(LicenseError::Seal)?;

    let envelope = Envelope {
        data: encode64(&data),
        key: encode64(&sealed_key),
        iv: encode64(&iv),
    };
    let json = serde_json::to_vec(&envelope).map_err(LicenseError::Serialize)?;

    tracing::debug!(
        payload_bytes = payload.len(),
        ciphertext_bytes = data.len(),
        "sealed license payload"
    );
    Ok(encode64(&json))
}

/// Open an artifact produced by [`seal`] (or by GitLab's own tooling).
pub fn open(artifact: &str, key: &RsaPublicKey) -> Result<Vec<u8>, LicenseError> {
    let json = decode64(artifact, "artifact")?;
    let envelope: Envelope = serde_json::from_slice(&json)
        .map_err(|e| LicenseError::Decode(format!("envelope is not valid JSON: {e}")))?;

    let data = decode64(&envelope.data, "data")?;
    let sealed_key = decode64(&envelope.key, "key")?;
    let iv = decode64(&envelope.iv, "iv")?;

    let aes_key = recover_key(&sealed_key, key)?;

    Aes128CbcDec::new_from_slices(&aes_key, &iv)
        .map_err(|_| LicenseError::Decode("AES key or IV has the wrong length".to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(&data)
        .map_err(|_| LicenseError::Unseal)
}

/// Undo RSA "private encrypt": `m = c^e mod n`, then strip type-1 padding.
fn recover_key(sealed: &[u8], key: &RsaPublicKey) -> Result<Vec<u8>, LicenseError> {
    let k = key.size();
    if sealed.len() != k {
        return Err(LicenseError::Unseal);
    }

    let c = BigUint::from_bytes_be(sealed);
    if c >= *key.n() {
        return Err(LicenseError::Unseal);
    }
    let m = c.modpow(key.e(), key.n()).to_bytes_be();

    // Left-pad back to the modulus length; to_bytes_be drops leading zeros.
    let mut em = vec![0u8; k.saturating_sub(m.len())];
    em.extend_from_slice(&m);

    if em.len() < 2 + MIN_PADDING + 1 || em[0] != 0x00 || em[1] != 0x01 {
        return Err(LicenseError::Unseal);
    }
    let separator = em[2..]
        .iter()
        .position(|&b| b != 0xff)
        .map(|i| i + 2)
        .ok_or(LicenseError::Unseal)?;
    if em[separator] != 0x00 || separator < 2 + MIN_PADDING {
        return Err(LicenseError::Unseal);
    }

    Ok(em[separator + 1..].to_vec())
}

/// Base64 in Ruby's `encode64` layout.
pub(crate) fn encode64(bytes: &[u8]) -> String {
    let flat = STANDARD.encode(bytes);
    let mut out = String::with_capacity(flat.len() + flat.len() / LINE_WIDTH + 1);
    for (i, c) in flat.chars().enumerate() {
        if i > 0 && i % LINE_WIDTH == 0 {
            out.push('\n');
        }
        out.push(c);
    }
    if !flat.is_empty() {
        out.push('\n');
    }
    out
}

/// Base64 decode, ignoring any whitespace (line breaks included).
pub(crate) fn decode64(text: &str, field: &str) -> Result<Vec<u8>, LicenseError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| LicenseError::Decode(format!("{field} is not valid base64: {e}")))
}
