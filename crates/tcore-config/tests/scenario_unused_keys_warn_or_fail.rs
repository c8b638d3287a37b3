use tcore_config::{load_layered_yaml_from_strings, report_unused_keys, ConfigMode, UnusedKeyPolicy};

/// Validates:
/// 1) Unused keys are detected in WARN mode but do not error.
/// 2) Unused keys cause failure in FAIL mode.
/// 3) Keys that are known to be consumed in a mode are not flagged.
/// 4) Exact-leaf consumption does NOT accidentally consume sibling keys.
/// 5) Deterministic ordering of unused pointers.
///
/// The consumed-pointer registry must reflect what code ACTUALLY reads
/// today — see `consumption::consumed_pointers`.

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = r#"
exchange:
  keys_env:
    api_key: "BINANCE_API_KEY_MAIN"
    api_secret: "BINANCE_API_SECRET_MAIN"

risk:
  max_risk_percent: 0.01
  max_drawdown_percent: 0.04

unused_section:
  foo: 123
  bar: 456
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let report = report_unused_keys(ConfigMode::DryRun, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert!(!report.is_clean(), "report should detect unused keys");

    assert!(
        report
            .unused_leaf_pointers
            .contains(&"/unused_section/foo".to_string()),
        "missing unused pointer for foo"
    );

    assert!(
        report
            .unused_leaf_pointers
            .contains(&"/unused_section/bar".to_string()),
        "missing unused pointer for bar"
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = r#"
exchange:
  keys_env:
    api_key: "BINANCE_API_KEY_MAIN"
    api_secret: "BINANCE_API_SECRET_MAIN"

risk:
  max_risk_percent: 0.01
  max_drawdown_percent: 0.04

unused_section:
  foo: 1
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let result = report_unused_keys(ConfigMode::Live, &loaded.config_json, UnusedKeyPolicy::Fail);

    assert!(
        result.is_err(),
        "fail policy must error when unused keys exist"
    );

    let msg = format!("{:?}", result.err().unwrap());
    assert!(
        msg.contains("CONFIG_UNUSED_KEYS"),
        "error message should contain CONFIG_UNUSED_KEYS"
    );
}

#[test]
fn only_consumed_keys_are_clean_in_dry_run_mode() {
    // A config containing ONLY keys that are currently consumed in DRY_RUN mode.
    // This should produce a clean report.
    let yaml = r#"
exchange:
  use_testnet: true
  request_timeout_ms: 5000

risk:
  max_risk_percent: 0.01
  max_drawdown_percent: 0.04
  entry_gate:
    min_score: 0.5
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let report = report_unused_keys(ConfigMode::DryRun, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert!(
        report.is_clean(),
        "config should be clean when it only uses consumed keys: {:?}",
        report.unused_leaf_pointers
    );
}

#[test]
fn exact_leaf_consumption_does_not_consume_sibling_keys() {
    // DRY_RUN consumes /risk/max_risk_percent.
    // It must NOT treat /risk/max_risk_percent_extra as consumed.
    let yaml = r#"
exchange:
  use_testnet: true

risk:
  max_risk_percent: 0.01
  max_risk_percent_extra: 999
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let report = report_unused_keys(ConfigMode::DryRun, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert!(
        report
            .unused_leaf_pointers
            .contains(&"/risk/max_risk_percent_extra".to_string()),
        "sibling key must remain unused"
    );
}

#[test]
fn deterministic_unused_pointer_ordering() {
    let yaml = r#"
exchange:
  use_testnet: true

unused:
  b: 2
  a: 1
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");

    let report = report_unused_keys(ConfigMode::DryRun, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/unused/a".to_string(), "/unused/b".to_string()],
        "unused pointers must be sorted deterministically"
    );
}
