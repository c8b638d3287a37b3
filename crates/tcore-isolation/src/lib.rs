//! tcore-isolation
//!
//! Multi-tenant isolation layer. Every entity in the system is scoped by a
//! `tenant_id`; this crate supplies the primitives that make cross-tenant
//! state bleed structurally hard: tenant-scoped credential lookup, a
//! tenant-keyed in-memory store, and the tenant-id validation rule shared
//! by the Validation Framework (C8).

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;

pub use tcore_schemas::TenantId;

/// Per-tenant credential + exchange selection policy, loaded from the
/// merged config document (`tcore-config`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantIsolation {
    pub tenant_id: TenantId,
    pub broker_api_key_env: String,
    pub broker_api_secret_env: String,
    pub use_testnet: bool,
}

impl TenantIsolation {
    /// Build from canonical config JSON.
    ///
    /// Required fields: `tenant.tenant_id`, `broker.keys_env.api_key`,
    /// `broker.keys_env.api_secret`. Optional: `broker.use_testnet`
    /// (defaults true, mirroring `BINANCE_USE_TESTNET` default in §6).
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let tenant_id = cfg
            .pointer("/tenant/tenant_id")
            .and_then(Value::as_i64)
            .context("config missing tenant.tenant_id")?;
        validate_tenant_id(Some(tenant_id)).map_err(|e| anyhow!(e))?;

        let api_key_env = cfg
            .pointer("/broker/keys_env/api_key")
            .and_then(Value::as_str)
            .context("config missing broker.keys_env.api_key")?;
        let api_secret_env = cfg
            .pointer("/broker/keys_env/api_secret")
            .and_then(Value::as_str)
            .context("config missing broker.keys_env.api_secret")?;

        // Credentials must be scoped per tenant: the env var name must embed
        // the tenant id so two tenants can never accidentally share a key.
        let token = format!("TENANT{tenant_id}");
        if !api_key_env.to_ascii_uppercase().contains(&token) {
            return Err(anyhow!(
                "broker.keys_env.api_key must include tenant token '{token}' (got '{api_key_env}')"
            ));
        }
        if !api_secret_env.to_ascii_uppercase().contains(&token) {
            return Err(anyhow!(
                "broker.keys_env.api_secret must include tenant token '{token}' (got '{api_secret_env}')"
            ));
        }

        let use_testnet = cfg
            .pointer("/broker/use_testnet")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        Ok(TenantIsolation {
            tenant_id,
            broker_api_key_env: api_key_env.to_string(),
            broker_api_secret_env: api_secret_env.to_string(),
            use_testnet,
        })
    }

    pub fn load_broker_keys_from_env(&self) -> Result<(String, String)> {
        let key = std::env::var(&self.broker_api_key_env)
            .with_context(|| format!("missing env {}", self.broker_api_key_env))?;
        let secret = std::env::var(&self.broker_api_secret_env)
            .with_context(|| format!("missing env {}", self.broker_api_secret_env))?;
        Ok((key, secret))
    }
}

/// Tenant-isolation validator used by `ValidatePlanUseCase` (C8): FAIL if
/// `tenant_id` is missing, non-positive, or (at the JSON boundary) not an
/// integer.
pub fn validate_tenant_id(tenant_id: Option<TenantId>) -> Result<(), String> {
    match tenant_id {
        None => Err("tenant_id is required".to_string()),
        Some(t) if t <= 0 => Err(format!("tenant_id must be positive, got {t}")),
        Some(_) => Ok(()),
    }
}

/// Validates a tenant_id carried as a raw JSON value, so the non-integer
/// case (e.g. a string or float) is caught at the wire boundary rather than
/// silently truncated.
pub fn validate_tenant_id_json(value: Option<&Value>) -> Result<TenantId, String> {
    match value {
        None => Err("tenant_id is required".to_string()),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(t) if t > 0 => Ok(t),
            Some(t) => Err(format!("tenant_id must be positive, got {t}")),
            None => Err("tenant_id must be an integer".to_string()),
        },
        Some(_) => Err("tenant_id must be an integer".to_string()),
    }
}

/// Minimal tenant-keyed store to avoid cross-tenant state bleed in-memory
/// (used by components that cache per-tenant state outside the database,
/// e.g. the market data cache's rate-limit counters).
#[derive(Clone, Debug, Default)]
pub struct TenantStore<T> {
    inner: BTreeMap<TenantId, T>,
}

impl<T> TenantStore<T> {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, tenant: TenantId, value: T) {
        self.inner.insert(tenant, value);
    }

    pub fn get(&self, tenant: TenantId) -> Option<&T> {
        self.inner.get(&tenant)
    }

    pub fn get_mut(&mut self, tenant: TenantId) -> Option<&mut T> {
        self.inner.get_mut(&tenant)
    }

    pub fn entry_or_insert_with(&mut self, tenant: TenantId, f: impl FnOnce() -> T) -> &mut T {
        self.inner.entry(tenant).or_insert_with(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tenant_id_missing_fails() {
        assert!(validate_tenant_id(None).is_err());
    }

    #[test]
    fn tenant_id_non_positive_fails() {
        assert!(validate_tenant_id(Some(0)).is_err());
        assert!(validate_tenant_id(Some(-1)).is_err());
    }

    #[test]
    fn tenant_id_positive_passes() {
        assert!(validate_tenant_id(Some(7)).is_ok());
    }

    #[test]
    fn tenant_id_json_non_integer_fails() {
        let v = json!("not-a-number");
        assert!(validate_tenant_id_json(Some(&v)).is_err());
    }

    #[test]
    fn cross_tenant_store_does_not_bleed() {
        let mut store: TenantStore<i64> = TenantStore::new();
        store.insert(1, 100);
        store.insert(2, 200);
        assert_eq!(store.get(1), Some(&100));
        assert_eq!(store.get(2), Some(&200));
    }

    #[test]
    fn from_config_json_rejects_key_without_tenant_token() {
        let cfg = json!({
            "tenant": {"tenant_id": 7},
            "broker": {"keys_env": {"api_key": "BINANCE_API_KEY", "api_secret": "BINANCE_SECRET_TENANT7"}}
        });
        assert!(TenantIsolation::from_config_json(&cfg).is_err());
    }

    #[test]
    fn from_config_json_accepts_scoped_keys() {
        let cfg = json!({
            "tenant": {"tenant_id": 7},
            "broker": {"keys_env": {"api_key": "BINANCE_API_KEY_TENANT7", "api_secret": "BINANCE_SECRET_TENANT7"}}
        });
        let iso = TenantIsolation::from_config_json(&cfg).expect("should parse");
        assert_eq!(iso.tenant_id, 7);
        assert!(iso.use_testnet);
    }
}
