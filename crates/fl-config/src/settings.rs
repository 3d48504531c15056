use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed view of the merged configuration. Every key has a default, so an
/// empty document is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreightlineConfig {
    #[serde(default)]
    pub offroute: OffRouteSection,
    #[serde(default)]
    pub reservation: ReservationSection,
    #[serde(default)]
    pub compensation: CompensationSection,
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default)]
    pub database: DatabaseSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffRouteSection {
    pub yellow_after_secs: i64,
    pub red_after_secs: i64,
    pub grace_period_secs: i64,
    pub extension_secs: i64,
    pub max_extensions: u32,
    /// How often the daemon re-evaluates open deviations.
    pub tick_interval_secs: u64,
}

impl Default for OffRouteSection {
    fn default() -> Self {
        Self {
            yellow_after_secs: 300,
            red_after_secs: 600,
            grace_period_secs: 1200,
            extension_secs: 900,
            max_extensions: 3,
            tick_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationSection {
    pub sweep_interval_secs: u64,
    /// Full payment is due this long before the trip date.
    pub payment_lead_secs: i64,
}

impl Default for ReservationSection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            payment_lead_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompensationSection {
    pub legal_cap_multiplier: i64,
}

impl Default for CompensationSection {
    fn default() -> Self {
        Self {
            legal_cap_multiplier: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub heartbeat_secs: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self { heartbeat_secs: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Name of the env var holding the Postgres URL.
    pub url_env: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url_env: crate::secrets::DEFAULT_DATABASE_URL_ENV.to_string(),
        }
    }
}

impl FreightlineConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: FreightlineConfig =
            serde_json::from_value(config_json.clone()).context("CONFIG_INVALID: bad shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let o = &self.offroute;
        for (key, v) in [
            ("offroute.yellow_after_secs", o.yellow_after_secs),
            ("offroute.red_after_secs", o.red_after_secs),
            ("offroute.grace_period_secs", o.grace_period_secs),
            ("offroute.extension_secs", o.extension_secs),
            ("reservation.payment_lead_secs", self.reservation.payment_lead_secs),
            ("compensation.legal_cap_multiplier", self.compensation.legal_cap_multiplier),
        ] {
            if v <= 0 {
                bail!("CONFIG_INVALID: {key} must be positive (got {v})");
            }
        }
        for (key, v) in [
            ("offroute.tick_interval_secs", o.tick_interval_secs),
            ("reservation.sweep_interval_secs", self.reservation.sweep_interval_secs),
            ("daemon.heartbeat_secs", self.daemon.heartbeat_secs),
        ] {
            if v == 0 {
                bail!("CONFIG_INVALID: {key} must be positive");
            }
        }
        if o.red_after_secs <= o.yellow_after_secs {
            bail!(
                "CONFIG_INVALID: offroute.red_after_secs ({}) must exceed yellow_after_secs ({})",
                o.red_after_secs,
                o.yellow_after_secs
            );
        }
        // A tick slower than the first threshold would skip warnings.
        let tick = i64::try_from(o.tick_interval_secs).unwrap_or(i64::MAX);
        if tick >= o.yellow_after_secs {
            bail!(
                "CONFIG_INVALID: offroute.tick_interval_secs ({}) must be smaller than yellow_after_secs ({})",
                o.tick_interval_secs,
                o.yellow_after_secs
            );
        }
        if self.database.url_env.trim().is_empty() {
            bail!("CONFIG_INVALID: database.url_env must name an env var");
        }
        Ok(())
    }
}
