mod bus;

pub use bus::{EventBus, Handler};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tcore_schemas::TenantId;
use uuid::Uuid;

/// Append-only audit writer, keyed by tenant (C15, second half). Writes
/// JSON Lines (one event per line) with a SHA-256 hash chain so tampering
/// with a past record is detectable.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Monotonically increasing sequence counter for deterministic
    /// `event_id` derivation. Restore with `set_seq` alongside
    /// `set_last_hash` when resuming an existing log after a restart.
    seq: u64,
}

impl AuditWriter {
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    pub fn set_last_hash(&mut self, last_hash: Option<String>) {
        self.last_hash = last_hash;
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    pub fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event for `tenant_id`. The audit table has no uniqueness
    /// beyond its own primary key (spec §6) — every call appends a new row.
    pub fn append(
        &mut self,
        tenant_id: TenantId,
        run_id: Uuid,
        topic: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<AuditEvent> {
        let ts_utc = Utc::now();
        let event_id = derive_event_id(self.last_hash.as_deref(), &payload, self.seq);
        self.seq += 1;

        let mut ev = AuditEvent {
            event_id,
            run_id,
            tenant_id,
            ts_utc,
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            let self_hash = compute_event_hash(&ev)?;
            ev.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        let line = canonical_json_line(&ev)?;
        append_line(&self.path, &line)?;

        Ok(ev)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub tenant_id: TenantId,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Derive a UUID deterministically from the chain position, so replaying
/// the same sequence of appends (e.g. in a test, or recovering from a
/// crash with the same pending payloads) produces identical event ids with
/// no RNG involved. Namespaced UUIDv5 over `(prev_hash, seq, payload)`.
fn derive_event_id(prev_hash: Option<&str>, payload: &Value, seq: u64) -> Uuid {
    const NAMESPACE: Uuid = Uuid::from_bytes([
        0x6b, 0xa7, 0xb8, 0x14, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
        0xc8,
    ]);
    let name = format!("{}:{seq}:{payload}", prev_hash.unwrap_or("genesis"));
    Uuid::new_v5(&NAMESPACE, name.as_bytes())
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
    Ok(())
}

fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit event failed")?;
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

/// Hash chain is computed from canonical JSON of event WITHOUT hash_self (to avoid self-reference).
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ev: AuditEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit event at line {}", i + 1))?;

        line_count += 1;

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        if let Some(ref claimed_hash) = ev.hash_self {
            let recomputed = compute_event_hash(&ev)?;
            if *claimed_hash != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!(
                        "hash_self mismatch: claimed {}, recomputed {}",
                        claimed_hash, recomputed
                    ),
                });
            }
        }

        prev_hash = ev.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile_shim::TempPath;

    #[test]
    fn append_then_verify_is_valid() {
        let tmp = TempPath::new("tcore_audit_test_1.jsonl");
        let mut w = AuditWriter::new(&tmp.path, true).unwrap();
        let run_id = Uuid::new_v4();
        w.append(7, run_id, "intent.created", "IntentCreated", json!({"a": 1}))
            .unwrap();
        w.append(7, run_id, "intent.validated", "IntentValidated", json!({"a": 2}))
            .unwrap();

        let result = verify_hash_chain(&tmp.path).unwrap();
        assert_eq!(result, VerifyResult::Valid { lines: 2 });
    }

    #[test]
    fn tampering_breaks_the_chain() {
        let tmp = TempPath::new("tcore_audit_test_2.jsonl");
        let mut w = AuditWriter::new(&tmp.path, true).unwrap();
        let run_id = Uuid::new_v4();
        w.append(7, run_id, "t", "T", json!({"a": 1})).unwrap();
        w.append(7, run_id, "t", "T", json!({"a": 2})).unwrap();

        let mut content = fs::read_to_string(&tmp.path).unwrap();
        content = content.replace("\"a\":1", "\"a\":999");
        fs::write(&tmp.path, content).unwrap();

        let result = verify_hash_chain(&tmp.path).unwrap();
        assert!(matches!(result, VerifyResult::Broken { .. }));
    }

    #[test]
    fn event_id_derivation_is_deterministic_given_same_inputs() {
        let a = derive_event_id(None, &json!({"x": 1}), 0);
        let b = derive_event_id(None, &json!({"x": 1}), 0);
        assert_eq!(a, b);
        let c = derive_event_id(None, &json!({"x": 1}), 1);
        assert_ne!(a, c);
    }

    mod tempfile_shim {
        use std::path::PathBuf;

        pub struct TempPath {
            pub path: PathBuf,
        }

        impl TempPath {
            pub fn new(name: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("{}-{}", std::process::id(), name));
                TempPath { path }
            }
        }

        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}
