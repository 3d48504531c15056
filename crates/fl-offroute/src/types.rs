use chrono::{DateTime, Duration, Utc};
use fl_schemas::OffRouteStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Escalation thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffRouteConfig {
    /// Deviation age at which the YELLOW warning goes out.
    pub yellow_after: Duration,
    /// Deviation age at which the RED warning goes out.
    pub red_after: Duration,
    /// Window for the driver to return after RED (no contact) or after staff contact.
    pub grace_period: Duration,
    pub extension: Duration,
    pub max_extensions: u32,
}

impl Default for OffRouteConfig {
    fn default() -> Self {
        Self {
            yellow_after: Duration::minutes(5),
            red_after: Duration::minutes(10),
            grace_period: Duration::minutes(20),
            extension: Duration::minutes(15),
            max_extensions: 3,
        }
    }
}

impl OffRouteConfig {
    pub fn from_secs(
        yellow_after: i64,
        red_after: i64,
        grace_period: i64,
        extension: i64,
        max_extensions: u32,
    ) -> Self {
        Self {
            yellow_after: Duration::seconds(yellow_after),
            red_after: Duration::seconds(red_after),
            grace_period: Duration::seconds(grace_period),
            extension: Duration::seconds(extension),
            max_extensions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningLevel {
    Yellow,
    Red,
}

impl WarningLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningLevel::Yellow => "YELLOW",
            WarningLevel::Red => "RED",
        }
    }
}

/// Side effects the caller must carry out after persisting the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum OffRouteEffect {
    /// Warn staff at the given severity.
    Warn { level: WarningLevel },
    /// Deadline passed with the vehicle still off route. Internal signal;
    /// always followed by `OpenRunawayIssue` in the same evaluation.
    EscalationTimeout { deadline: DateTime<Utc> },
    /// Staff declared the driver unreachable.
    ContactFailed { reported_by: String },
    /// Open an OFF_ROUTE_RUNAWAY issue and freeze the trip's packages.
    OpenRunawayIssue,
    /// The event closed without escalation.
    Resolved { status: OffRouteStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OffRouteError {
    #[error("cannot {action} while off-route event is {status}")]
    InvalidState {
        action: &'static str,
        status: &'static str,
    },

    #[error("grace period elapsed at {deadline}")]
    GracePeriodElapsed { deadline: DateTime<Utc> },

    #[error("grace period already extended {max} times")]
    ExtensionLimit { max: u32 },
}
