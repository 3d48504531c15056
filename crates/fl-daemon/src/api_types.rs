//! Request and response types for the fl-daemon HTTP endpoints.
//!
//! Domain records (snapshots, trips, issues, assessments) are returned as-is
//! from `fl-schemas` / `fl-lifecycle`. This module only holds the envelopes
//! that have no domain counterpart. No business logic lives here.

use chrono::NaiveDate;
use fl_lifecycle::{IssueResolution, TripEvent, VehicleSlot};
use fl_schemas::{AssessmentInput, ShipmentId, VehicleId};
use fl_status::{OrderEvent, PackageEvent};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable code: "NOT_FOUND" | "RESERVATION_CONFLICT" | "INVALID_TRANSITION" |
    /// "STALE_WRITE" | "COMPENSATION" | "ISSUE_REQUIRED" | "ESCALATION" |
    /// "VALIDATION" | "INTERNAL"
    pub error: String,
    pub message: String,
    /// Set on RESERVATION_CONFLICT so the caller can offer another vehicle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_shipment_id: Option<ShipmentId>,
}

// ---------------------------------------------------------------------------
// Shipments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateShipmentRequest {
    pub package_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEventRequest {
    pub event: OrderEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    #[serde(default)]
    pub slots: Vec<VehicleSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageEventRequest {
    pub event: PackageEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripEventRequest {
    pub event: TripEvent,
}

// ---------------------------------------------------------------------------
// Off-route staff actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffActionRequest {
    pub staff: String,
    #[serde(default)]
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeRequest {
    pub input: AssessmentInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustRequest {
    pub payout: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub resolution: IssueResolution,
    #[serde(default)]
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Vehicles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    /// Treat holds of this shipment as free.
    #[serde(default)]
    pub exclude: Option<ShipmentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub vehicle_id: VehicleId,
    pub trip_date: NaiveDate,
    pub available: bool,
}
