use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::TripId;

canonical_enum! {
    /// Audience a notification is addressed to.
    pub enum Role ("role") {
        Staff => "STAFF",
        Customer => "CUSTOMER",
        Driver => "DRIVER",
    }
}

canonical_enum! {
    pub enum NotificationKind ("notification") {
        OffRouteWarning => "OFF_ROUTE_WARNING",
        OffRouteEscalation => "OFF_ROUTE_ESCALATION",
        OffRouteResolved => "OFF_ROUTE_RESOLVED",
        NewIssue => "NEW_ISSUE",
        IssueResolved => "ISSUE_RESOLVED",
        CompensationProposed => "COMPENSATION_PROPOSED",
        OrderStatusChanged => "ORDER_STATUS_CHANGED",
        ReservationExpired => "RESERVATION_EXPIRED",
    }
}

/// One message handed to the notification dispatcher after a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub role: Role,
    pub kind: NotificationKind,
    pub payload: Value,
}

impl Notification {
    pub fn staff(kind: NotificationKind, payload: Value) -> Self {
        Self {
            role: Role::Staff,
            kind,
            payload,
        }
    }

    pub fn customer(kind: NotificationKind, payload: Value) -> Self {
        Self {
            role: Role::Customer,
            kind,
            payload,
        }
    }
}

/// Position report from the vehicle telemetry feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub trip_id: TripId,
    pub lat: f64,
    pub lng: f64,
    pub on_route: bool,
    /// Distance to the planned route, when the feed computes it.
    #[serde(default)]
    pub distance_from_route_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}
