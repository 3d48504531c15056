use fl_schemas::PackageStatus;
use serde::{Deserialize, Serialize};

use crate::table::{StatusEvent, TransitionTable};

/// Events on a single package (order detail).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageEvent {
    /// Deposit received; the shipment enters planning.
    Planned,
    /// Loaded onto a trip with a vehicle and driver.
    DriverAssigned,
    PickupStarted,
    /// Picked up and sealed; in transit.
    PickedUp,
    /// Final leg towards the receiver.
    NearingDestination,
    Delivered,
    TroubleReported,
    ResumePickup,
    ResumeDelivery,
    ResumeFinalLeg,
    ReturnStarted,
    Returned,
    Compensated,
    Cancelled,
}

impl StatusEvent for PackageEvent {
    type Status = PackageStatus;

    fn target(self) -> PackageStatus {
        use PackageEvent::*;
        match self {
            Planned => PackageStatus::OnPlanning,
            DriverAssigned => PackageStatus::AssignedToDriver,
            PickupStarted | ResumePickup => PackageStatus::PickingUp,
            PickedUp | ResumeDelivery => PackageStatus::OnDelivered,
            NearingDestination | ResumeFinalLeg => PackageStatus::OngoingDelivered,
            Delivered => PackageStatus::Delivered,
            TroubleReported => PackageStatus::InTroubles,
            ReturnStarted => PackageStatus::Returning,
            Returned => PackageStatus::Returned,
            Compensated => PackageStatus::Compensation,
            Cancelled => PackageStatus::Cancelled,
        }
    }

    fn name(self) -> &'static str {
        use PackageEvent::*;
        match self {
            Planned => "PLANNED",
            DriverAssigned => "DRIVER_ASSIGNED",
            PickupStarted => "PICKUP_STARTED",
            PickedUp => "PICKED_UP",
            NearingDestination => "NEARING_DESTINATION",
            Delivered => "DELIVERED",
            TroubleReported => "TROUBLE_REPORTED",
            ResumePickup => "RESUME_PICKUP",
            ResumeDelivery => "RESUME_DELIVERY",
            ResumeFinalLeg => "RESUME_FINAL_LEG",
            ReturnStarted => "RETURN_STARTED",
            Returned => "RETURNED",
            Compensated => "COMPENSATED",
            Cancelled => "CANCELLED",
        }
    }
}

impl PackageEvent {
    /// Event that puts a package back on the leg it left when it was frozen.
    pub fn resume_to(prior: PackageStatus) -> Option<PackageEvent> {
        match prior {
            PackageStatus::PickingUp => Some(PackageEvent::ResumePickup),
            PackageStatus::OnDelivered => Some(PackageEvent::ResumeDelivery),
            PackageStatus::OngoingDelivered => Some(PackageEvent::ResumeFinalLeg),
            PackageStatus::Returning => Some(PackageEvent::ReturnStarted),
            _ => None,
        }
    }
}

/// IN_TROUBLES and COMPENSATION are entered and left only through an issue.
pub fn requires_issue(from: PackageStatus, event: PackageEvent) -> bool {
    from == PackageStatus::InTroubles
        || matches!(
            event.target(),
            PackageStatus::InTroubles | PackageStatus::Compensation
        )
}

use PackageEvent as E;
use PackageStatus as S;

const PACKAGE_EDGES: &[(PackageStatus, PackageEvent)] = &[
    (S::Pending, E::Planned),
    (S::OnPlanning, E::DriverAssigned),
    (S::AssignedToDriver, E::PickupStarted),
    (S::PickingUp, E::PickedUp),
    (S::OnDelivered, E::NearingDestination),
    (S::OngoingDelivered, E::Delivered),
    // incidents
    (S::PickingUp, E::TroubleReported),
    (S::OnDelivered, E::TroubleReported),
    (S::OngoingDelivered, E::TroubleReported),
    (S::Returning, E::TroubleReported),
    (S::InTroubles, E::ResumePickup),
    (S::InTroubles, E::ResumeDelivery),
    (S::InTroubles, E::ResumeFinalLeg),
    (S::InTroubles, E::Compensated),
    // returns
    (S::OngoingDelivered, E::ReturnStarted),
    (S::InTroubles, E::ReturnStarted),
    (S::Returning, E::Returned),
    // cancellation before pickup
    (S::Pending, E::Cancelled),
    (S::OnPlanning, E::Cancelled),
    (S::AssignedToDriver, E::Cancelled),
];

pub static PACKAGE_TRANSITIONS: TransitionTable<PackageEvent> =
    TransitionTable::new(PACKAGE_EDGES);
