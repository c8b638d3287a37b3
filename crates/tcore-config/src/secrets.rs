//! Secret & alert-webhook resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"BINANCE_API_KEY"`),
//!   never values.
//! - At startup, callers invoke [`resolve_secrets_for_mode`] once per
//!   tenant. The returned [`ResolvedSecrets`] is passed into the exchange
//!   adapter constructor; never scatter `std::env::var` calls elsewhere.
//! - `Debug` impls on all secret-containing structs redact values.
//! - Error messages reference the env var NAME, never the value.
//!
//! # Per-tenant override (spec §4.2: "per-tenant credentials override")
//! [`resolve_secrets_for_tenant`] first looks for a tenant-suffixed env var
//! (`"{base_name}_TENANT_{tenant_id}"`); if absent it falls back to the
//! shared name. This lets most tenants share one exchange account while a
//! handful with their own keys override per-tenant.

use anyhow::{bail, Result};
use serde_json::Value;
use tcore_schemas::TenantId;

/// Alert webhook URLs resolved from the environment. Every channel is
/// optional — a missing channel silently produces `None`. Values are
/// redacted in `Debug` output.
#[derive(Clone)]
pub struct ResolvedAlertWebhooks {
    /// Routine dry-run execution notifications.
    pub dry_run: Option<String>,
    /// Live-trading notifications.
    pub live: Option<String>,
    /// Hard operational alerts: stop-loss-after-market failure, monthly
    /// drawdown pause, margin-level liquidation (spec §4.11/§4.9/§4.14).
    pub alerts: Option<String>,
    /// Periodic heartbeat pings.
    pub heartbeat: Option<String>,
}

impl std::fmt::Debug for ResolvedAlertWebhooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |o: &Option<String>| o.as_ref().map(|_| "<REDACTED>");
        f.debug_struct("ResolvedAlertWebhooks")
            .field("dry_run", &redacted(&self.dry_run))
            .field("live", &redacted(&self.live))
            .field("alerts", &redacted(&self.alerts))
            .field("heartbeat", &redacted(&self.heartbeat))
            .finish()
    }
}

/// All runtime-resolved secrets for one tenant's exchange adapter. Built
/// once via [`resolve_secrets_for_mode`] / [`resolve_secrets_for_tenant`].
/// Values are redacted in `Debug` output.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Binance API key. `None` if the named env var was absent or empty.
    pub exchange_api_key: Option<String>,
    /// Binance API secret. `None` if the named env var was absent or empty.
    pub exchange_api_secret: Option<String>,
    pub alerts: ResolvedAlertWebhooks,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |o: &Option<String>| o.as_ref().map(|_| "<REDACTED>");
        f.debug_struct("ResolvedSecrets")
            .field("exchange_api_key", &redacted(&self.exchange_api_key))
            .field("exchange_api_secret", &redacted(&self.exchange_api_secret))
            .field("alerts", &self.alerts)
            .finish()
    }
}

struct SecretEnvNames {
    exchange_api_key_var: String,
    exchange_api_secret_var: String,
    alerts_dry_run_var: Option<String>,
    alerts_live_var: Option<String>,
    alerts_alerts_var: Option<String>,
    alerts_heartbeat_var: Option<String>,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolve a named environment variable. Never returns the value in an
/// error path — callers report the NAME only.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve `var_name`, preferring a tenant-suffixed override
/// (`"{var_name}_TENANT_{tenant_id}"`) before falling back to the shared
/// name.
fn resolve_env_for_tenant(var_name: &str, tenant_id: TenantId) -> Option<String> {
    let tenant_var = format!("{var_name}_TENANT_{tenant_id}");
    resolve_env(&tenant_var).or_else(|| resolve_env(var_name))
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        exchange_api_key_var: read_str_at(config_json, "/exchange/keys_env/api_key")
            .unwrap_or_else(|| "BINANCE_API_KEY".to_string()),
        exchange_api_secret_var: read_str_at(config_json, "/exchange/keys_env/api_secret")
            .unwrap_or_else(|| "BINANCE_API_SECRET".to_string()),
        alerts_dry_run_var: read_str_at(config_json, "/alerts/channels/dry_run"),
        alerts_live_var: read_str_at(config_json, "/alerts/channels/live"),
        alerts_alerts_var: read_str_at(config_json, "/alerts/channels/alerts"),
        alerts_heartbeat_var: read_str_at(config_json, "/alerts/channels/heartbeat"),
    }
}

/// Resolve all secrets from the environment for the given `mode` string
/// (`"DRY_RUN"` or `"LIVE"`, case-insensitive), shared across tenants.
///
/// | Mode    | Required                              |
/// |---------|----------------------------------------|
/// | LIVE    | exchange api_key, exchange api_secret   |
/// | DRY_RUN | nothing (all optional)                  |
///
/// Returns `Err` naming the first missing required env var; the value is
/// never mentioned.
pub fn resolve_secrets_for_mode(config_json: &Value, mode: &str) -> Result<ResolvedSecrets> {
    resolve_secrets_for_tenant(config_json, mode, None)
}

/// Tenant-aware variant of [`resolve_secrets_for_mode`]: when `tenant_id`
/// is `Some`, a `"{var}_TENANT_{id}"` override takes precedence over the
/// shared env var name for both exchange keys.
pub fn resolve_secrets_for_tenant(
    config_json: &Value,
    mode: &str,
    tenant_id: Option<TenantId>,
) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);
    let mode_upper = mode.trim().to_ascii_uppercase();

    let resolve = |var: &str| match tenant_id {
        Some(id) => resolve_env_for_tenant(var, id),
        None => resolve_env(var),
    };

    let exchange_api_key = resolve(&names.exchange_api_key_var);
    let exchange_api_secret = resolve(&names.exchange_api_secret_var);

    match mode_upper.as_str() {
        "LIVE" => {
            if exchange_api_key.is_none() {
                bail!(
                    "SECRETS_MISSING mode=LIVE: required env var '{}' (exchange api_key) is not set or empty",
                    names.exchange_api_key_var,
                );
            }
            if exchange_api_secret.is_none() {
                bail!(
                    "SECRETS_MISSING mode=LIVE: required env var '{}' (exchange api_secret) is not set or empty",
                    names.exchange_api_secret_var,
                );
            }
        }
        "DRY_RUN" => {
            // DRY_RUN never touches the exchange (spec glossary); keys optional.
        }
        other => {
            bail!("SECRETS_UNKNOWN_MODE: unrecognised mode '{other}'; expected one of: LIVE | DRY_RUN");
        }
    }

    let alerts = ResolvedAlertWebhooks {
        dry_run: names.alerts_dry_run_var.as_deref().and_then(resolve_env),
        live: names.alerts_live_var.as_deref().and_then(resolve_env),
        alerts: names.alerts_alerts_var.as_deref().and_then(resolve_env),
        heartbeat: names.alerts_heartbeat_var.as_deref().and_then(resolve_env),
    };

    Ok(ResolvedSecrets {
        exchange_api_key,
        exchange_api_secret,
        alerts,
    })
}
