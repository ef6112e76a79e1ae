//! Layered configuration for the HA control plane.
//!
//! YAML documents are deep-merged in order (later overrides earlier), then
//! `WOLFE__SECTION__KEY` environment variables are applied on top. The merged
//! document must not contain secret literals: secrets are referenced by env
//! var NAME and resolved once at startup (see [`secrets`]).

pub mod secrets;
mod settings;

pub use secrets::{resolve_secrets, ResolvedSecrets};
pub use settings::{
    AuditSettings, DaemonSettings, HaSettings, LockBackend, LockSettings, NuclearSettings,
    Settings, MAX_TTL_MS,
};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Environment override prefix. `WOLFE__HA__TTL_MS=5000` sets `/ha/ttl_ms`.
pub const ENV_OVERRIDE_PREFIX: &str = "WOLFE__";

/// Known secret-like prefixes. A leaf string starting with one of these
/// aborts loading with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document, with defaults for absent keys.
    pub fn settings(&self) -> Result<Settings> {
        serde_json::from_value(self.config_json.clone()).context("config does not match Settings")
    }
}

/// Load YAML files in order and apply overrides from the process environment.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_with_env(&doc_refs, std::env::vars())
}

/// Merge YAML documents only; no environment overrides.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    load_layered_yaml_with_env(yaml_docs, std::iter::empty())
}

/// Merge YAML documents, then apply `WOLFE__*` overrides from `env`.
pub fn load_layered_yaml_with_env<I>(yaml_docs: &[&str], env: I) -> Result<LoadedConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty document parses as null; it contributes nothing.
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    let mut overrides: Vec<(String, String)> = env
        .into_iter()
        .filter(|(k, _)| k.starts_with(ENV_OVERRIDE_PREFIX))
        .collect();
    // Deterministic application order regardless of environment iteration order.
    overrides.sort();
    for (k, v) in overrides {
        apply_env_override(&mut merged, &k, &v)?;
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn apply_env_override(root: &mut Value, key: &str, raw: &str) -> Result<()> {
    let path: Vec<String> = key[ENV_OVERRIDE_PREFIX.len()..]
        .split("__")
        .map(|s| s.to_ascii_lowercase())
        .collect();
    if path.iter().any(|s| s.is_empty()) {
        bail!("CONFIG_ENV_OVERRIDE_INVALID key={key}");
    }

    // Scalars are parsed as YAML so `true`, `5000` and `"x"` keep their types.
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(raw).unwrap_or_else(|_| serde_yaml::Value::String(raw.to_string()));
    let value = serde_json::to_value(parsed).context("env override conversion failed")?;

    let mut cur = root;
    for (i, seg) in path.iter().enumerate() {
        if !cur.is_object() {
            *cur = Value::Object(serde_json::Map::new());
        }
        let map = cur
            .as_object_mut()
            .context("env override target is not a mapping")?;
        if i == path.len() - 1 {
            map.insert(seg.clone(), value);
            return Ok(());
        }
        cur = map
            .entry(seg.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    Ok(())
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_string_leaves(v, "", &mut leaves);
    for (ptr, s) in leaves {
        if looks_like_secret(s) {
            bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
        }
    }
    Ok(())
}

fn collect_string_leaves<'a>(v: &'a Value, prefix: &str, out: &mut Vec<(String, &'a str)>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                collect_string_leaves(vv, &format!("{prefix}/{k}"), out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                collect_string_leaves(vv, &format!("{prefix}/{i}"), out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.as_str())),
        _ => {}
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_overrides_leaves_and_keeps_siblings() {
        let a = serde_json::json!({"ha": {"ttl_ms": 3000, "heartbeat_ms": 1000}});
        let b = serde_json::json!({"ha": {"ttl_ms": 6000}});
        let m = deep_merge(a, b);
        assert_eq!(m["ha"]["ttl_ms"], 6000);
        assert_eq!(m["ha"]["heartbeat_ms"], 1000);
    }

    #[test]
    fn env_override_keeps_scalar_types() {
        let mut root = serde_json::json!({});
        apply_env_override(&mut root, "WOLFE__HA__AUTO_FLAT_ON_LOCK_LOSS", "false").unwrap();
        apply_env_override(&mut root, "WOLFE__HA__TTL_MS", "4500").unwrap();
        apply_env_override(&mut root, "WOLFE__NODE_ID", "node-b").unwrap();
        assert_eq!(root["ha"]["auto_flat_on_lock_loss"], false);
        assert_eq!(root["ha"]["ttl_ms"], 4500);
        assert_eq!(root["node_id"], "node-b");
    }

    #[test]
    fn env_override_rejects_empty_segment() {
        let mut root = serde_json::json!({});
        assert!(apply_env_override(&mut root, "WOLFE__HA____TTL", "1").is_err());
    }
}
