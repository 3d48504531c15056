use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn base_path() -> String {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../config/freightline.yaml")
        .to_string_lossy()
        .to_string()
}

fn hash_line(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout)
        .lines()
        .find(|l| l.starts_with("config_hash="))
        .unwrap_or_default()
        .to_string()
}

#[test]
fn shipped_config_hashes_stably_and_cleanly() -> anyhow::Result<()> {
    let base = base_path();
    let first = Command::cargo_bin("fl")?
        .args(["config-hash", &base, "--strict"])
        .output()?;
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    let second = Command::cargo_bin("fl")?
        .args(["config-hash", &base])
        .output()?;

    let h = hash_line(&first.stdout);
    assert_eq!(h.len(), "config_hash=".len() + 64);
    assert_eq!(h, hash_line(&second.stdout));
    Ok(())
}

#[test]
fn secret_literal_aborts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("leak.yaml");
    fs::write(&path, "database:\n  url_env: \"postgres://fl:pw@db/freightline\"\n")?;

    Command::cargo_bin("fl")?
        .args(["config-hash", &path.to_string_lossy()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("pw@").not());
    Ok(())
}

#[test]
fn unknown_key_warns_and_fails_when_strict() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("typo.yaml");
    fs::write(&path, "offroute:\n  yelow_after_secs: 120\n")?;
    let p = path.to_string_lossy().to_string();

    Command::cargo_bin("fl")?
        .args(["config-hash", &p])
        .assert()
        .success()
        .stderr(predicate::str::contains("CONFIG_UNUSED_KEYS").not());

    // The daemon reads all of /offroute, so a typo under it is not "unused";
    // the CLI reads none of it.
    Command::cargo_bin("fl")?
        .args(["config-hash", &p, "--consumer", "cli", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_UNUSED_KEYS"));
    Ok(())
}

#[test]
fn invalid_thresholds_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "offroute:\n  yellow_after_secs: 600\n  red_after_secs: 300\n")?;

    Command::cargo_bin("fl")?
        .args(["config-hash", &path.to_string_lossy()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_INVALID"));
    Ok(())
}
