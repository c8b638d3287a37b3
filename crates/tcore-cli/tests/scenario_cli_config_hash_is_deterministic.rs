//! `tcore config-hash` must be a pure function of its inputs: same files,
//! same merge order -> same hash, every time (operators diff deployed
//! config by comparing this value across environments).

use assert_cmd::Command;
use std::io::Write;

fn write_yaml(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).expect("create yaml");
    f.write_all(contents.as_bytes()).expect("write yaml");
    path
}

#[test]
fn config_hash_is_stable_across_repeated_runs() {
    let dir = tempdir();
    let base = write_yaml(&dir, "base.yaml", "risk:\n  max_risk_percent: 1.0\n");
    let overrides = write_yaml(&dir, "overrides.yaml", "risk:\n  max_risk_percent: 0.5\n");

    let run = || {
        let mut cmd = Command::cargo_bin("tcore").expect("binary builds");
        cmd.args(["config-hash", base.to_str().unwrap(), overrides.to_str().unwrap()]);
        let out = cmd.output().expect("run cli");
        assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
        String::from_utf8(out.stdout).expect("utf8 stdout")
    };

    let first = run();
    let second = run();
    assert_eq!(first, second, "config_hash must be deterministic for identical inputs");
    assert!(first.starts_with("config_hash="));
}

fn tempdir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("tcore-cli-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create tempdir");
    dir
}
