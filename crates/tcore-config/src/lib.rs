use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub mod consumption;
pub mod secrets;

pub use consumption::{consumed_pointers, ConfigMode, RunMode};
pub use secrets::{resolve_secrets_for_mode, resolve_secrets_for_tenant, ResolvedAlertWebhooks, ResolvedSecrets};

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
/// Later files override earlier files via deep-merge.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    finish_loading(merged)
}

fn finish_loading(merged: Value) -> Result<LoadedConfig> {
    reject_embedded_secrets(&merged)?;

    // Canonicalize (stable key order) by round-tripping through serde_json::to_string,
    // which orders keys deterministically for maps (BTreeMap) only if we ensure sorting.
    // So we implement a manual canonicalization step that sorts object keys.
    let canonical = canonicalize_json(&merged);

    // Hash canonical bytes
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

/// Config files are only allowed to hold env var NAMES (spec §9: secrets
/// never live in persisted/config state). Reject any string value that
/// looks like a literal credential so a secret never gets hashed into
/// `config_hash` or served back over `/trading-intents` debug surfaces.
fn reject_embedded_secrets(v: &Value) -> Result<()> {
    match v {
        Value::String(s) => {
            if looks_like_secret(s) {
                anyhow::bail!("CONFIG_SECRET_DETECTED: literal secret-shaped value found in config (use an env var NAME instead)");
            }
        }
        Value::Object(map) => {
            for val in map.values() {
                reject_embedded_secrets(val)?;
            }
        }
        Value::Array(arr) => {
            for val in arr {
                reject_embedded_secrets(val)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    s.starts_with("sk-")
        || s.starts_with("AKIA")
        || s.contains("-----BEGIN")
        || s.contains("PRIVATE KEY")
}

/// Test/programmatic variant of [`load_layered_yaml`] that merges YAML
/// already held in memory instead of reading files from disk.
pub fn load_layered_yaml_from_strings(yamls: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for (i, s) in yamls.iter().enumerate() {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(s).with_context(|| format!("parse yaml layer {i}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    finish_loading(merged)
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

/// What to do when [`report_unused_keys`] finds config keys that the given
/// [`ConfigMode`] never reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    /// Record unused keys in the report but return `Ok`.
    Warn,
    /// Return `Err` if any unused key is found.
    Fail,
}

/// Result of scanning a loaded config against [`consumed_pointers`] for a mode.
#[derive(Debug, Clone)]
pub struct UnusedKeysReport {
    /// JSON-pointer path of every leaf value not read by the given mode,
    /// sorted for deterministic output.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeysReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Flag config keys present in `config_json` that `mode` never reads, per
/// the [`consumed_pointers`] registry. Catches stale/typo'd config before it
/// silently does nothing.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeysReport> {
    let consumed = consumed_pointers(mode);

    let mut leaves = Vec::new();
    collect_leaf_pointers(config_json, String::new(), &mut leaves);
    leaves.sort();

    let unused: Vec<String> = leaves
        .into_iter()
        .filter(|p| !pointer_is_consumed(p, consumed))
        .collect();

    if policy == UnusedKeyPolicy::Fail && !unused.is_empty() {
        anyhow::bail!(
            "CONFIG_UNUSED_KEYS: {} unused config key(s): {}",
            unused.len(),
            unused.join(", ")
        );
    }

    Ok(UnusedKeysReport {
        unused_leaf_pointers: unused,
    })
}

/// `pointer` is consumed if it names a registered pointer exactly, or sits
/// underneath one (a registered pointer may name a subtree, e.g.
/// `/exchange/keys_env` covers both `api_key` and `api_secret`).
fn pointer_is_consumed(pointer: &str, consumed: &[&str]) -> bool {
    consumed
        .iter()
        .any(|c| pointer == *c || pointer.starts_with(&format!("{c}/")))
}

fn collect_leaf_pointers(v: &Value, prefix: String, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, val) in map {
                collect_leaf_pointers(val, format!("{prefix}/{k}"), out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, val) in arr.iter().enumerate() {
                collect_leaf_pointers(val, format!("{prefix}/{i}"), out);
            }
        }
        _ => out.push(prefix),
    }
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting compact JSON.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
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
