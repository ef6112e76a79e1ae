//! Offline key handling for the signed resume.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;

pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

pub fn verifying_key_b64(key: &SigningKey) -> String {
    B64.encode(key.verifying_key().to_bytes())
}

/// Parse a base64 raw 32-byte Ed25519 public key.
pub fn parse_verifying_key(b64: &str) -> Result<VerifyingKey> {
    let raw = B64
        .decode(b64.trim())
        .context("public key is not valid base64")?;
    let bytes: [u8; 32] = raw
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("public key must be 32 bytes, got {}", raw.len()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| anyhow!("invalid Ed25519 public key: {e}"))
}

/// Base64 of the 32-byte secret seed. This is the key file format.
pub fn signing_key_b64(key: &SigningKey) -> String {
    B64.encode(key.to_bytes())
}

pub fn parse_signing_key(b64: &str) -> Result<SigningKey> {
    let raw = B64
        .decode(b64.trim())
        .context("signing key is not valid base64")?;
    let bytes: [u8; 32] = raw
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("signing key must be 32 bytes, got {}", raw.len()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Base64 signature over the nonce bytes.
pub fn sign_day_nonce(key: &SigningKey, nonce: &str) -> String {
    B64.encode(key.sign(nonce.as_bytes()).to_bytes())
}
