//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (`database.url_env`). Binaries call
//! [`resolve_secrets`] once at startup and pass the result to constructors.
//! Error messages and `Debug` output name the variable, never its value.

use anyhow::{bail, Result};
use serde_json::Value;

/// Env var read when the config names none.
pub const DEFAULT_DATABASE_URL_ENV: &str = "FL_DATABASE_URL";

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Name of the variable the URL came from.
    pub database_url_env: String,
    /// `None` if the named variable was unset or blank.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url_env", &self.database_url_env)
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
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

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve secrets named in `config_json` from the environment.
///
/// With `require_database`, a missing database URL is an error naming the
/// variable (`SECRETS_MISSING`).
pub fn resolve_secrets(config_json: &Value, require_database: bool) -> Result<ResolvedSecrets> {
    let database_url_env = read_str_at(config_json, "/database/url_env")
        .unwrap_or_else(|| DEFAULT_DATABASE_URL_ENV.to_string());
    let database_url = resolve_env(&database_url_env);

    if require_database && database_url.is_none() {
        bail!(
            "SECRETS_MISSING: required env var '{}' (database url) is not set or empty",
            database_url_env
        );
    }

    Ok(ResolvedSecrets {
        database_url_env,
        database_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_url_names_the_variable() {
        let cfg = json!({ "database": { "url_env": "FL_TEST_UNSET_DB_URL_9F2C" } });
        let err = resolve_secrets(&cfg, true).unwrap_err().to_string();
        assert!(err.contains("SECRETS_MISSING"), "{err}");
        assert!(err.contains("FL_TEST_UNSET_DB_URL_9F2C"), "{err}");
    }

    #[test]
    fn optional_url_resolves_to_none_and_defaults_the_name() {
        let cfg = json!({});
        let s = resolve_secrets(&cfg, false).expect("optional");
        assert_eq!(s.database_url_env, DEFAULT_DATABASE_URL_ENV);
    }

    #[test]
    fn debug_redacts_the_url() {
        let s = ResolvedSecrets {
            database_url_env: "FL_DATABASE_URL".into(),
            database_url: Some("postgres://fl:hunter2@db/freightline".into()),
        };
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("hunter2"), "{dbg}");
        assert!(dbg.contains("<REDACTED>"), "{dbg}");
    }
}
