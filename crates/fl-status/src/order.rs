use fl_schemas::OrderStatus;
use serde::{Deserialize, Serialize};

use crate::table::{StatusEvent, TransitionTable};

/// Events on a shipment (order).
///
/// Commercial events are applied directly by callers. Delivery-phase events
/// are only ever produced by [`crate::derive_order_event`] from the package
/// statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEvent {
    Process,
    DraftContract,
    SignContract,
    DepositPaid,
    FullyPaid,
    Cancelled,
    /// Trip closed after full delivery (DELIVERED -> SUCCESSFUL).
    ClosedOut,
    // derived from packages
    DriverAssigned,
    PickupStarted,
    InTransit,
    PartiallyDelivered,
    Delivered,
    TroubleReported,
    Compensated,
    ReturnStarted,
    Returned,
}

impl StatusEvent for OrderEvent {
    type Status = OrderStatus;

    fn target(self) -> OrderStatus {
        use OrderEvent::*;
        match self {
            Process => OrderStatus::Processing,
            DraftContract => OrderStatus::ContractDraft,
            SignContract => OrderStatus::ContractSigned,
            DepositPaid => OrderStatus::OnPlanning,
            FullyPaid => OrderStatus::FullyPaid,
            Cancelled => OrderStatus::Cancelled,
            ClosedOut => OrderStatus::Successful,
            DriverAssigned => OrderStatus::AssignedToDriver,
            PickupStarted => OrderStatus::PickingUp,
            InTransit => OrderStatus::OnDelivered,
            PartiallyDelivered => OrderStatus::OngoingDelivered,
            Delivered => OrderStatus::Delivered,
            TroubleReported => OrderStatus::InTroubles,
            Compensated => OrderStatus::Compensation,
            ReturnStarted => OrderStatus::Returning,
            Returned => OrderStatus::Returned,
        }
    }

    fn name(self) -> &'static str {
        use OrderEvent::*;
        match self {
            Process => "PROCESS",
            DraftContract => "DRAFT_CONTRACT",
            SignContract => "SIGN_CONTRACT",
            DepositPaid => "DEPOSIT_PAID",
            FullyPaid => "FULLY_PAID",
            Cancelled => "CANCELLED",
            ClosedOut => "CLOSED_OUT",
            DriverAssigned => "DRIVER_ASSIGNED",
            PickupStarted => "PICKUP_STARTED",
            InTransit => "IN_TRANSIT",
            PartiallyDelivered => "PARTIALLY_DELIVERED",
            Delivered => "DELIVERED",
            TroubleReported => "TROUBLE_REPORTED",
            Compensated => "COMPENSATED",
            ReturnStarted => "RETURN_STARTED",
            Returned => "RETURNED",
        }
    }
}

impl OrderEvent {
    /// Events a caller may apply directly to a shipment.
    pub fn is_commercial(&self) -> bool {
        matches!(
            self,
            OrderEvent::Process
                | OrderEvent::DraftContract
                | OrderEvent::SignContract
                | OrderEvent::DepositPaid
                | OrderEvent::FullyPaid
                | OrderEvent::Cancelled
                | OrderEvent::ClosedOut
        )
    }
}

use OrderEvent as E;
use OrderStatus as S;

const ORDER_EDGES: &[(OrderStatus, OrderEvent)] = &[
    // commercial flow
    (S::Pending, E::Process),
    (S::Processing, E::DraftContract),
    (S::ContractDraft, E::SignContract),
    (S::ContractSigned, E::DepositPaid),
    (S::OnPlanning, E::FullyPaid),
    (S::Pending, E::Cancelled),
    (S::Processing, E::Cancelled),
    (S::ContractDraft, E::Cancelled),
    (S::ContractSigned, E::Cancelled),
    (S::OnPlanning, E::Cancelled),
    (S::FullyPaid, E::Cancelled),
    (S::AssignedToDriver, E::Cancelled),
    (S::Delivered, E::ClosedOut),
    // delivery phase, derived from packages
    (S::FullyPaid, E::DriverAssigned),
    (S::InTroubles, E::DriverAssigned),
    (S::FullyPaid, E::PickupStarted),
    (S::AssignedToDriver, E::PickupStarted),
    (S::InTroubles, E::PickupStarted),
    (S::AssignedToDriver, E::InTransit),
    (S::PickingUp, E::InTransit),
    (S::InTroubles, E::InTransit),
    (S::AssignedToDriver, E::PartiallyDelivered),
    (S::PickingUp, E::PartiallyDelivered),
    (S::OnDelivered, E::PartiallyDelivered),
    (S::InTroubles, E::PartiallyDelivered),
    (S::Returning, E::PartiallyDelivered),
    (S::OngoingDelivered, E::Delivered),
    (S::InTroubles, E::Delivered),
    (S::Returning, E::Delivered),
    (S::AssignedToDriver, E::TroubleReported),
    (S::PickingUp, E::TroubleReported),
    (S::OnDelivered, E::TroubleReported),
    (S::OngoingDelivered, E::TroubleReported),
    (S::Returning, E::TroubleReported),
    (S::InTroubles, E::Compensated),
    (S::AssignedToDriver, E::ReturnStarted),
    (S::PickingUp, E::ReturnStarted),
    (S::OnDelivered, E::ReturnStarted),
    (S::OngoingDelivered, E::ReturnStarted),
    (S::InTroubles, E::ReturnStarted),
    (S::AssignedToDriver, E::Returned),
    (S::PickingUp, E::Returned),
    (S::OnDelivered, E::Returned),
    (S::OngoingDelivered, E::Returned),
    (S::InTroubles, E::Returned),
    (S::Returning, E::Returned),
];

pub static ORDER_TRANSITIONS: TransitionTable<OrderEvent> = TransitionTable::new(ORDER_EDGES);
