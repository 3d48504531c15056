use chrono::{Duration, NaiveDate};
use fl_compensation::CompensationPolicy;
use fl_offroute::{OffRouteConfig, OffRouteEffect};
use fl_schemas::{
    AssessmentInput, CompensationAssessment, DriverId, Issue, IssueCategory, IssueId,
    IssueReporter, OffRouteEvent, OrderStatus,
    PackageId, PackageStatus, ReservationId, ShipmentId, TripId, VehicleId,
};
use fl_status::PackageEvent;
use serde::{Deserialize, Serialize};

/// Tunables the coordinator runs with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleSettings {
    pub offroute: OffRouteConfig,
    pub compensation: CompensationPolicy,
    /// Full payment is due this long before the trip date.
    pub payment_lead: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            offroute: OffRouteConfig::default(),
            compensation: CompensationPolicy::default(),
            payment_lead: Duration::days(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange<S> {
    pub from: S,
    pub to: S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageChange {
    pub package_id: PackageId,
    pub from: PackageStatus,
    pub to: PackageStatus,
}

/// Package left untouched by a trip-wide update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPackage {
    pub package_id: PackageId,
    pub status: PackageStatus,
}

/// What one coordinator call did to a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub shipment_id: ShipmentId,
    pub order_status: OrderStatus,
    pub order_changed: Option<StatusChange<OrderStatus>>,
    pub package_changes: Vec<PackageChange>,
    pub skipped: Vec<SkippedPackage>,
}

/// Outcome of feeding one telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryOutcome {
    /// The trip's off-route event after the sample, if one was open or opened.
    pub event: Option<OffRouteEvent>,
    pub effects: Vec<OffRouteEffect>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub evaluated: usize,
    pub advanced: usize,
    pub issues_opened: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired: Vec<ReservationId>,
    pub cancelled_shipments: Vec<ShipmentId>,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One (vehicle, trip date) slot a deposit holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSlot {
    pub vehicle_id: VehicleId,
    pub trip_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripAssignment {
    pub shipment_id: ShipmentId,
    pub vehicle_id: VehicleId,
    pub driver_ids: Vec<DriverId>,
    pub trip_date: NaiveDate,
    pub package_ids: Vec<PackageId>,
}

/// Events reported for a whole trip; fanned out to its packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripEvent {
    PickupStarted,
    PickedUp,
    NearingDestination,
    Delivered,
    ReturnStarted,
    Returned,
    /// Trip finished; closes the trip.
    Completed,
}

impl TripEvent {
    pub fn package_event(self) -> Option<PackageEvent> {
        match self {
            TripEvent::PickupStarted => Some(PackageEvent::PickupStarted),
            TripEvent::PickedUp => Some(PackageEvent::PickedUp),
            TripEvent::NearingDestination => Some(PackageEvent::NearingDestination),
            TripEvent::Delivered => Some(PackageEvent::Delivered),
            TripEvent::ReturnStarted => Some(PackageEvent::ReturnStarted),
            TripEvent::Returned => Some(PackageEvent::Returned),
            TripEvent::Completed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueReport {
    pub shipment_id: ShipmentId,
    #[serde(default)]
    pub trip_id: Option<TripId>,
    pub category: IssueCategory,
    pub reporter: IssueReporter,
    pub description: String,
    #[serde(default)]
    pub package_ids: Vec<PackageId>,
}

/// How staff close an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IssueResolution {
    /// DAMAGE: pay out. With `input`, the assessment is (re)computed first.
    ApproveCompensation {
        #[serde(default)]
        input: Option<AssessmentInput>,
    },
    /// DAMAGE: no payout; held packages resume.
    RejectCompensation,
    /// DAMAGE: claim found fraudulent; closed CLOSED_FRAUD, packages resume.
    Fraud,
    /// Held packages resume the leg they were on. Not for DAMAGE or runaway
    /// issues, which close through their own outcomes.
    Resume,
    /// Held packages go back to the sender. Same restriction as `Resume`.
    Return,
    /// OFF_ROUTE_RUNAWAY: driver and cargo confirmed safe; packages resume.
    DriverSafe,
    /// OFF_ROUTE_RUNAWAY: cargo lost; packages stay held under a new DAMAGE issue.
    RunawayConfirmed,
}

impl IssueResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueResolution::ApproveCompensation { .. } => "approve_compensation",
            IssueResolution::RejectCompensation => "reject_compensation",
            IssueResolution::Fraud => "fraud",
            IssueResolution::Resume => "resume",
            IssueResolution::Return => "return",
            IssueResolution::DriverSafe => "driver_safe",
            IssueResolution::RunawayConfirmed => "runaway_confirmed",
        }
    }

    /// Categories this resolution may close.
    pub fn applies_to(&self, category: IssueCategory) -> bool {
        match self {
            IssueResolution::ApproveCompensation { .. }
            | IssueResolution::RejectCompensation
            | IssueResolution::Fraud => category == IssueCategory::Damage,
            IssueResolution::DriverSafe | IssueResolution::RunawayConfirmed => {
                category == IssueCategory::OffRouteRunaway
            }
            IssueResolution::Resume | IssueResolution::Return => !matches!(
                category,
                IssueCategory::Damage | IssueCategory::OffRouteRunaway
            ),
        }
    }
}

/// What closing an issue did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub issue: Issue,
    pub assessment: Option<CompensationAssessment>,
    /// Amount approved for payment, DAMAGE approvals only.
    pub payout: Option<i64>,
    /// DAMAGE issue that took over the packages of a confirmed runaway.
    pub follow_up: Option<IssueId>,
    pub result: ApplyResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_closes_only_through_an_assessment_outcome() {
        let approve = IssueResolution::ApproveCompensation { input: None };
        for r in [
            approve,
            IssueResolution::RejectCompensation,
            IssueResolution::Fraud,
        ] {
            assert!(r.applies_to(IssueCategory::Damage), "{}", r.as_str());
        }
        for r in [
            IssueResolution::Resume,
            IssueResolution::Return,
            IssueResolution::DriverSafe,
            IssueResolution::RunawayConfirmed,
        ] {
            assert!(!r.applies_to(IssueCategory::Damage), "{}", r.as_str());
        }
    }

    #[test]
    fn resume_and_return_close_operational_issues() {
        for category in [
            IssueCategory::OrderRejection,
            IssueCategory::Reroute,
            IssueCategory::Penalty,
            IssueCategory::SealReplacement,
        ] {
            assert!(IssueResolution::Resume.applies_to(category));
            assert!(IssueResolution::Return.applies_to(category));
        }
        assert!(!IssueResolution::Resume.applies_to(IssueCategory::OffRouteRunaway));
    }
}
