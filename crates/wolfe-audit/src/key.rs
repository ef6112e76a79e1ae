use aes_gcm::aead::{KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use std::fmt;

/// 256-bit AES-GCM key for the audit log.
///
/// Accepts base64 or hex. Never printed: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuditKey([u8; 32]);

impl AuditKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow!("audit key must be 32 bytes, got {}", bytes.len()))?;
        Ok(Self(arr))
    }

    /// Parse a key from base64 first, then hex.
    pub fn parse(encoded: &str) -> Result<Self> {
        let s = encoded.trim();
        if let Ok(raw) = B64.decode(s) {
            if raw.len() == 32 {
                return Self::from_bytes(&raw);
            }
        }
        if let Ok(raw) = hex::decode(s) {
            return Self::from_bytes(&raw);
        }
        Err(anyhow!("audit key is neither 32-byte base64 nor 32-byte hex"))
    }

    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        let mut out = [0u8; 32];
        out.copy_from_slice(&key);
        Self(out)
    }

    pub fn to_base64(&self) -> String {
        B64.encode(self.0)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for AuditKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuditKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base64_and_hex() {
        let k = AuditKey::generate();
        let from_b64 = AuditKey::parse(&k.to_base64()).unwrap();
        let from_hex = AuditKey::parse(&hex::encode(k.as_bytes())).unwrap();
        assert_eq!(k, from_b64);
        assert_eq!(k, from_hex);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(AuditKey::parse(&B64.encode([0u8; 16])).is_err());
        assert!(AuditKey::parse("not a key").is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let k = AuditKey::generate();
        let dbg = format!("{k:?}");
        assert!(!dbg.contains(&k.to_base64()));
        assert!(dbg.contains("redacted"));
    }
}
