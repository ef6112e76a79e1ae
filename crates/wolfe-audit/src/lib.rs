//! wolfe-audit
//!
//! Append-only, hash-chained, encrypted audit trail for every safety decision
//! (leader changes, split-brain lockdown, flatten, nuclear stop/resume).
//!
//! # File layout
//! One file per UTC day: `audit-YYYY-MM-DD.jsonl.enc`. Each line is
//! `base64(nonce(12B) || AES-256-GCM ciphertext)` of one canonical JSON record.
//! A plaintext sidecar `audit-YYYY-MM-DD.jsonl.enc.tail` holds the last
//! `hash_curr` written, so appends never have to decrypt the file and a
//! verifier can detect truncation.
//!
//! # Chain
//! `hash_curr = sha256(canonical_json({timestamp, event_type, payload, hash_prev}))`.
//! Each day starts a fresh chain (`hash_prev = null` on the first record).

pub mod events;
mod key;
mod recorder;

pub use key::AuditKey;
pub use recorder::AuditRecorder;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const NONCE_LEN: usize = 12;

/// One audit record as stored (after decryption) in the day file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_curr: String,
}

/// The hashed portion of a record (everything except `hash_curr`).
#[derive(Serialize)]
struct RecordBody<'a> {
    timestamp: &'a DateTime<Utc>,
    event_type: &'a str,
    payload: &'a Value,
    hash_prev: &'a Option<String>,
}

/// Day-bucketed encrypted audit log.
///
/// Appends are serialized inside the process. The log is not meant to be
/// shared between processes; every node keeps its own directory.
pub struct AuditLog {
    dir: PathBuf,
    cipher: Aes256Gcm,
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Opens (and creates if needed) the audit directory.
    pub fn open(dir: impl AsRef<Path>, key: &AuditKey) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("create_dir_all {:?}", dir))?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        Ok(Self {
            dir,
            cipher,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the encrypted day file.
    pub fn day_path(&self, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("audit-{}.jsonl.enc", day.format("%Y-%m-%d")))
    }

    /// Path of the plaintext tail sidecar for `day`.
    pub fn tail_path(&self, day: NaiveDate) -> PathBuf {
        let mut p = self.day_path(day).into_os_string();
        p.push(".tail");
        PathBuf::from(p)
    }

    /// Last `hash_curr` written for `day`, read from the sidecar.
    pub fn last_hash(&self, day: NaiveDate) -> Result<Option<String>> {
        let path = self.tail_path(day);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).with_context(|| format!("read tail {:?}", path))?;
        let trimmed = raw.trim();
        Ok(if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        })
    }

    /// Append one event stamped with the current time.
    pub fn append(&self, event_type: &str, payload: Value) -> Result<AuditRecord> {
        self.append_at(Utc::now(), event_type, payload)
    }

    /// Append one event with an explicit timestamp. The day bucket is the
    /// timestamp's UTC date.
    pub fn append_at(
        &self,
        timestamp: DateTime<Utc>,
        event_type: &str,
        payload: Value,
    ) -> Result<AuditRecord> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("audit write lock poisoned"))?;

        let day = timestamp.date_naive();
        let hash_prev = self.last_hash(day)?;

        let hash_curr = compute_record_hash(&timestamp, event_type, &payload, &hash_prev)?;
        let record = AuditRecord {
            timestamp,
            event_type: event_type.to_string(),
            payload,
            hash_prev,
            hash_curr,
        };

        let line = canonical_json_line(&record)?;
        let sealed = self.seal(line.as_bytes())?;
        append_line(&self.day_path(day), &sealed)?;
        store_tail(&self.tail_path(day), &record.hash_curr)?;

        Ok(record)
    }

    /// Decrypt every record of `day` in file order.
    pub fn read_day(&self, day: NaiveDate) -> Result<Vec<AuditRecord>> {
        let path = self.day_path(day);
        let content =
            fs::read_to_string(&path).with_context(|| format!("read audit log {:?}", path))?;

        let mut out = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let plain = self
                .open_line(trimmed)
                .with_context(|| format!("decrypt audit line {}", i + 1))?;
            let rec: AuditRecord = serde_json::from_slice(&plain)
                .with_context(|| format!("parse audit record at line {}", i + 1))?;
            out.push(rec);
        }
        Ok(out)
    }

    /// Verify the chain of `day` against its sidecar tail.
    pub fn validate_day(&self, day: NaiveDate) -> Result<VerifyResult> {
        let path = self.day_path(day);
        if !path.exists() {
            return Ok(VerifyResult::Missing);
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("read audit log {:?}", path))?;

        let tail_path = self.tail_path(day);
        let tail = if tail_path.exists() {
            Some(
                fs::read_to_string(&tail_path)
                    .with_context(|| format!("read tail {:?}", tail_path))?,
            )
        } else {
            None
        };

        Ok(self.verify_sealed_str(&content, tail.as_deref()))
    }

    /// Verify encrypted JSONL content plus an optional tail value.
    ///
    /// Same logic as [`AuditLog::validate_day`] without touching the filesystem.
    pub fn verify_sealed_str(&self, content: &str, tail: Option<&str>) -> VerifyResult {
        let mut prev_hash: Option<String> = None;
        let mut line_count = 0usize;

        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            line_count += 1;

            let plain = match self.open_line(trimmed) {
                Ok(p) => p,
                Err(e) => {
                    return VerifyResult::Broken {
                        line: i + 1,
                        reason: format!("undecryptable record: {e}"),
                    }
                }
            };

            let rec: AuditRecord = match serde_json::from_slice(&plain) {
                Ok(r) => r,
                Err(e) => {
                    return VerifyResult::Broken {
                        line: i + 1,
                        reason: format!("unparseable record: {e}"),
                    }
                }
            };

            if rec.hash_prev != prev_hash {
                return VerifyResult::Broken {
                    line: i + 1,
                    reason: format!(
                        "hash_prev mismatch: expected {:?}, got {:?}",
                        prev_hash, rec.hash_prev
                    ),
                };
            }

            let recomputed = match compute_record_hash(
                &rec.timestamp,
                &rec.event_type,
                &rec.payload,
                &rec.hash_prev,
            ) {
                Ok(h) => h,
                Err(e) => {
                    return VerifyResult::Broken {
                        line: i + 1,
                        reason: format!("hash failed: {e}"),
                    }
                }
            };
            if recomputed != rec.hash_curr {
                return VerifyResult::Broken {
                    line: i + 1,
                    reason: format!(
                        "hash_curr mismatch: claimed {}, recomputed {}",
                        rec.hash_curr, recomputed
                    ),
                };
            }

            prev_hash = Some(rec.hash_curr);
        }

        let expected_tail = prev_hash.unwrap_or_default();
        match tail.map(str::trim) {
            Some(t) if t == expected_tail => VerifyResult::Valid { lines: line_count },
            Some(t) => VerifyResult::Broken {
                line: line_count,
                reason: format!("tail mismatch: sidecar {t:?}, chain ends at {expected_tail:?}"),
            },
            None if line_count == 0 => VerifyResult::Valid { lines: 0 },
            None => VerifyResult::Broken {
                line: line_count,
                reason: "tail sidecar missing".to_string(),
            },
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ct = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| anyhow!("audit encrypt failed"))?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ct.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ct);
        Ok(B64.encode(raw))
    }

    fn open_line(&self, line: &str) -> Result<Vec<u8>> {
        let raw = B64.decode(line).context("base64 decode failed")?;
        if raw.len() <= NONCE_LEN {
            return Err(anyhow!("record shorter than nonce"));
        }
        let (nonce, ct) = raw.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ct)
            .map_err(|_| anyhow!("authentication failed"))
    }
}

/// Result of day-chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// The whole chain is intact and ends at the sidecar tail.
    Valid { lines: usize },
    /// The chain is broken at the given (1-based) line.
    Broken { line: usize, reason: String },
    /// No audit file exists for the day.
    Missing,
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid { .. })
    }
}

/// sha256 over the canonical JSON of the record body.
pub fn compute_record_hash(
    timestamp: &DateTime<Utc>,
    event_type: &str,
    payload: &Value,
    hash_prev: &Option<String>,
) -> Result<String> {
    let body = RecordBody {
        timestamp,
        event_type,
        payload,
        hash_prev,
    };
    let canonical = canonical_json_line(&body)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit record failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    f.sync_data().context("fsync audit log failed")?;
    Ok(())
}

/// Replace the tail sidecar via write-then-rename.
fn store_tail(path: &Path, hash: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, hash).with_context(|| format!("write tail {:?}", tmp))?;
    fs::rename(&tmp, path).with_context(|| format!("rename tail into {:?}", path))?;
    Ok(())
}
