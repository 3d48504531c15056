//! fl-config
//!
//! Layered YAML configuration for the freightline binaries.
//!
//! - Documents merge in order: earlier docs are base, later docs override.
//! - Secret-looking string literals abort the load (`CONFIG_SECRET_DETECTED`);
//!   config stores env var NAMES, never values.
//! - The merged document is canonicalised to JSON and hashed (SHA-256 hex) so
//!   a running daemon can report exactly which configuration it started with.
//! - Leaves nobody reads are reported per consumer (`CONFIG_UNUSED_KEYS`).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

mod consumption;
pub mod secrets;
mod settings;

pub use consumption::{consumed_pointers, Consumer};
pub use secrets::{resolve_secrets, ResolvedSecrets};
pub use settings::{
    CompensationSection, DaemonSection, DatabaseSection, FreightlineConfig, OffRouteSection,
    ReservationSection,
};

/// If any leaf string value starts with one of these, the load aborts.
const SECRET_PREFIXES: &[&str] = &[
    "postgres://",
    "postgresql://",
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub consumer: String,
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Report config leaves that `consumer` never reads.
///
/// With `UnusedKeyPolicy::Fail` a non-clean report is an error.
pub fn report_unused_keys(
    consumer: Consumer,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed_prefixes: Vec<String> = consumed_pointers(consumer)
        .iter()
        .map(|p| normalize_pointer(p))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let unused_leaf_pointers: Vec<String> = leaf_pointers(config_json)
        .into_iter()
        .filter(|leaf| !consumed_prefixes.iter().any(|cp| covers(cp, leaf)))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let report = UnusedKeyReport {
        consumer: consumer.as_str().to_string(),
        consumed_prefixes,
        unused_leaf_pointers,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&String> = report.unused_leaf_pointers.iter().take(12).collect();
        bail!(
            "CONFIG_UNUSED_KEYS (consumer={}): {} leaf key(s) are not read by this binary; \
            remove them or register the pointer in consumption.rs. First few: {:?}",
            report.consumer,
            report.unused_leaf_pointers.len(),
            shown
        );
    }

    Ok(report)
}

/// `"offroute/"` and `" /offroute"` both become `"/offroute"`; blank is the root.
fn normalize_pointer(p: &str) -> String {
    let trimmed = p.trim().trim_end_matches('/');
    match trimmed {
        "" => "/".to_string(),
        t if t.starts_with('/') => t.to_string(),
        t => format!("/{t}"),
    }
}

/// Segment-aware prefix test: `/offroute` covers `/offroute/red_after_secs`
/// but not `/offroute_v2`. The root pointer covers everything.
fn covers(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match leaf.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// JSON pointers of every scalar (non-object, non-array) value in `root`.
fn leaf_pointers(root: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), root)];
    while let Some((ptr, v)) = stack.pop() {
        match v {
            Value::Object(map) => {
                for (k, child) in map {
                    let token = k.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{ptr}/{token}"), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    stack.push((format!("{ptr}/{i}"), child));
                }
            }
            _ if ptr.is_empty() => out.push("/".to_string()),
            _ => out.push(ptr),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed settings, defaults filled in and validated.
    pub fn settings(&self) -> Result<FreightlineConfig> {
        FreightlineConfig::from_json(&self.config_json)
    }
}

/// Read each path and merge them in order.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read config layer {p}")))
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());
    for (idx, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {idx} is not valid yaml"))?;
        // An empty document parses as null; it overrides nothing.
        if layer.is_null() {
            continue;
        }
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("config layer {idx} has no json form"))?;
        overlay(&mut merged, layer);
    }

    reject_secret_literals(&merged)?;

    // serde_json's default map is key-ordered, so compact output is canonical.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other value in `top` replaces `base` wholesale.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (k, v) in top_map {
                match base_map.get_mut(&k) {
                    Some(slot) => overlay(slot, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

fn reject_secret_literals(root: &Value) -> Result<()> {
    for ptr in leaf_pointers(root) {
        let hit = root
            .pointer(&ptr)
            .and_then(Value::as_str)
            .is_some_and(looks_like_secret);
        if hit {
            bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_prefix_respects_segment_boundary() {
        assert!(covers("/offroute", "/offroute/yellow_after_secs"));
        assert!(covers("/offroute", "/offroute"));
        assert!(!covers("/offroute", "/offroutes/x"));
        assert!(covers("/", "/anything"));
        assert_eq!(normalize_pointer("offroute/"), "/offroute");
        assert_eq!(normalize_pointer("  "), "/");
    }

    #[test]
    fn later_layer_overrides_leaf_and_keeps_siblings() {
        let base = "offroute:\n  yellow_after_secs: 300\n  red_after_secs: 600\n";
        let site = "offroute:\n  red_after_secs: 900\n";
        let loaded = load_layered_yaml_from_strings(&[base, site]).expect("load");
        assert_eq!(loaded.config_json["offroute"]["yellow_after_secs"], 300);
        assert_eq!(loaded.config_json["offroute"]["red_after_secs"], 900);
    }

    #[test]
    fn empty_layer_is_ignored() {
        let a = load_layered_yaml_from_strings(&["daemon:\n  heartbeat_secs: 5\n"]).expect("a");
        let b = load_layered_yaml_from_strings(&["daemon:\n  heartbeat_secs: 5\n", ""]).expect("b");
        assert_eq!(a.config_hash, b.config_hash);
    }

    #[test]
    fn short_strings_are_never_secrets() {
        assert!(!looks_like_secret("sk-1"));
        assert!(looks_like_secret("postgres://fl:pw@db/freightline"));
    }
}
