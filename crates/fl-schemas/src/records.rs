use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AssessmentId, AssessmentStatus, CompensationCase, DriverId, IssueCategory, IssueId,
    IssueReporter, IssueStatus, OffRouteEventId, OffRouteStatus, OrderStatus, PackageId,
    PackageStatus, ReservationId, ReservationStatus, ShipmentId, TripId, TripStatus, VehicleId,
    Versioned,
};

macro_rules! versioned {
    ($ty:ty, $entity:literal) => {
        impl Versioned for $ty {
            const ENTITY: &'static str = $entity;

            fn key(&self) -> Uuid {
                self.id.as_uuid()
            }

            fn version(&self) -> i64 {
                self.version
            }

            fn set_version(&mut self, version: i64) {
                self.version = version;
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Shipment / package
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub status: OrderStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub shipment_id: ShipmentId,
    /// Set once the package is loaded onto a trip.
    pub trip_id: Option<TripId>,
    pub status: PackageStatus,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// A shipment together with every package it owns, as loaded for one change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentSnapshot {
    pub shipment: Shipment,
    pub packages: Vec<Package>,
}

impl ShipmentSnapshot {
    pub fn package(&self, id: PackageId) -> Option<&Package> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn package_statuses(&self) -> Vec<PackageStatus> {
        self.packages.iter().map(|p| p.status).collect()
    }
}

versioned!(Shipment, "shipment");
versioned!(Package, "package");

// ---------------------------------------------------------------------------
// Trip / reservation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub shipment_id: ShipmentId,
    pub vehicle_id: VehicleId,
    pub driver_ids: Vec<DriverId>,
    pub trip_date: NaiveDate,
    pub status: TripStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

versioned!(Trip, "trip");

/// Claim on one vehicle for one trip date.
///
/// At most one RESERVED or CONSUMED reservation exists per (vehicle, trip date).
/// A RESERVED row with `expires_at` in the past no longer holds the slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleReservation {
    pub id: ReservationId,
    pub vehicle_id: VehicleId,
    pub trip_date: NaiveDate,
    pub shipment_id: ShipmentId,
    pub status: ReservationStatus,
    /// Full-payment deadline. `None` once the shipment is fully paid.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleReservation {
    /// Whether this row occupies its slot at `now`.
    pub fn holds_slot_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ReservationStatus::Consumed => true,
            ReservationStatus::Reserved => self.expires_at.map_or(true, |t| t > now),
            ReservationStatus::Cancelled => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Off-route
// ---------------------------------------------------------------------------

/// Route deviation tracked for one trip. At most one active event per trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffRouteEvent {
    pub id: OffRouteEventId,
    pub trip_id: TripId,
    pub status: OffRouteStatus,
    /// First telemetry sample observed off route.
    pub started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_lat: f64,
    pub last_lng: f64,
    pub distance_m: Option<f64>,
    pub previous_distance_m: Option<f64>,
    pub yellow_sent_at: Option<DateTime<Utc>>,
    pub red_sent_at: Option<DateTime<Utc>>,
    pub contacted_at: Option<DateTime<Utc>>,
    pub contacted_by: Option<String>,
    pub contact_notes: Option<String>,
    /// `Some(false)` once staff reported the driver unreachable.
    pub can_contact_driver: Option<bool>,
    pub grace_expires_at: Option<DateTime<Utc>>,
    pub extension_count: u32,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    pub issue_id: Option<IssueId>,
    pub version: i64,
}

versioned!(OffRouteEvent, "off_route_event");

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// A package frozen into IN_TROUBLES by an issue, with the status it left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldPackage {
    pub package_id: PackageId,
    pub prior_status: PackageStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub shipment_id: ShipmentId,
    pub trip_id: Option<TripId>,
    pub category: IssueCategory,
    pub status: IssueStatus,
    pub reporter: IssueReporter,
    pub description: String,
    pub held_packages: Vec<HeldPackage>,
    pub off_route_event_id: Option<OffRouteEventId>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub version: i64,
}

versioned!(Issue, "issue");

// ---------------------------------------------------------------------------
// Compensation
// ---------------------------------------------------------------------------

/// How the loss was quantified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DamageEvidence {
    /// Fraction of the declared value lost, expected in [0, 1].
    Ratio(f64),
    /// Documented or market-estimated loss, in minor currency units.
    Amount(i64),
}

/// Raw facts a compensation decision is computed from. Money is in minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentInput {
    pub has_insurance: bool,
    pub has_documents: bool,
    pub declared_value: Option<i64>,
    pub evidence: DamageEvidence,
    pub freight_fee: i64,
    /// Damaged package weight over the shipment's total weight, in [0, 1].
    /// Absent means the package carried the whole load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_share: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationDecision {
    pub case: CompensationCase,
    /// Loss estimate before any cap.
    pub raw_estimate: i64,
    /// Legal limit applied, when the case is capped.
    pub legal_limit: Option<i64>,
    /// Goods compensation after the case's bound.
    pub payout: i64,
    /// Share of the freight fee returned for the damaged part of the load.
    pub freight_refund: i64,
    /// Goods compensation plus freight refund. This is what gets paid.
    pub total: i64,
    pub capped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationAssessment {
    pub id: AssessmentId,
    pub issue_id: IssueId,
    pub status: AssessmentStatus,
    pub input: Option<AssessmentInput>,
    pub decision: Option<CompensationDecision>,
    /// Staff override of the computed payout.
    pub adjusted_payout: Option<i64>,
    pub adjust_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl CompensationAssessment {
    /// Amount that will be paid if approved.
    pub fn final_payout(&self) -> Option<i64> {
        self.adjusted_payout
            .or_else(|| self.decision.map(|d| d.total))
    }
}

versioned!(CompensationAssessment, "compensation_assessment");

/// An issue with its compensation assessment (DAMAGE issues only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub issue: Issue,
    pub assessment: Option<CompensationAssessment>,
}
