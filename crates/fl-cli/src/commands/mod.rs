//! Command handler modules for the `fl` CLI.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod assess;
pub mod transitions;

use anyhow::{Context, Result};
use fl_config::{
    load_layered_yaml, load_layered_yaml_from_strings, report_unused_keys, Consumer, LoadedConfig,
    UnusedKeyPolicy,
};
use serde_json::Value;
use std::fs;
use tracing::warn;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Merge `paths` in order; no paths means every setting takes its default.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        return load_layered_yaml_from_strings(&[]);
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    load_layered_yaml(&path_refs)
}

/// [`load_config`] plus a warning for every key the CLI never reads.
pub fn load_cli_config(paths: &[String]) -> Result<LoadedConfig> {
    let loaded = load_config(paths)?;
    let report = report_unused_keys(Consumer::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "CONFIG_UNUSED_KEYS");
    }
    Ok(loaded)
}

/// Parse a CLI `--consumer` string into a [`Consumer`].
pub fn parse_consumer(raw: &str) -> Result<Consumer> {
    match raw.trim().to_uppercase().as_str() {
        "DAEMON" => Ok(Consumer::Daemon),
        "CLI" => Ok(Consumer::Cli),
        other => anyhow::bail!(
            "invalid --consumer '{}'. expected one of: daemon | cli",
            other
        ),
    }
}

/// Read a JSON file, tolerating a UTF-8 byte-order mark.
pub fn read_json_file(path: &str) -> Result<Value> {
    let bytes = fs::read(path).with_context(|| format!("read input failed: {}", path))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    let raw = String::from_utf8(bytes.to_vec()).context("input must be UTF-8 text")?;
    let v: Value = serde_json::from_str(raw.trim()).context("input must contain valid JSON")?;
    Ok(v)
}
