use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order / package
// ---------------------------------------------------------------------------

canonical_enum! {
    /// Shipment (order) status.
    ///
    /// PENDING through FULLY_PAID are commercial states driven by order events.
    /// ASSIGNED_TO_DRIVER onwards is derived from the package statuses.
    pub enum OrderStatus ("order") {
        Pending => "PENDING",
        Processing => "PROCESSING",
        ContractDraft => "CONTRACT_DRAFT",
        ContractSigned => "CONTRACT_SIGNED",
        OnPlanning => "ON_PLANNING",
        FullyPaid => "FULLY_PAID",
        AssignedToDriver => "ASSIGNED_TO_DRIVER",
        PickingUp => "PICKING_UP",
        OnDelivered => "ON_DELIVERED",
        OngoingDelivered => "ONGOING_DELIVERED",
        Delivered => "DELIVERED",
        Successful => "SUCCESSFUL",
        InTroubles => "IN_TROUBLES",
        Compensation => "COMPENSATION",
        Returning => "RETURNING",
        Returned => "RETURNED",
        Cancelled => "CANCELLED",
    }
}

impl OrderStatus {
    /// No package change can move a shipment out of these statuses.
    /// DELIVERED still admits the administrative close-out to SUCCESSFUL.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered
                | Self::Successful
                | Self::Returned
                | Self::Cancelled
                | Self::Compensation
        )
    }

    /// Position along the forward delivery chain, if this is a progressive status.
    pub fn progress_rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::OnPlanning => Some(1),
            Self::FullyPaid => Some(2),
            Self::AssignedToDriver => Some(3),
            Self::PickingUp => Some(4),
            Self::OnDelivered => Some(5),
            Self::OngoingDelivered => Some(6),
            _ => None,
        }
    }

    /// Statuses owned by the commercial flow rather than by package progress.
    pub fn is_commercial(&self) -> bool {
        matches!(
            self,
            Self::Pending
                | Self::Processing
                | Self::ContractDraft
                | Self::ContractSigned
                | Self::OnPlanning
                | Self::FullyPaid
        )
    }
}

canonical_enum! {
    /// Package (order detail) status.
    pub enum PackageStatus ("package") {
        Pending => "PENDING",
        OnPlanning => "ON_PLANNING",
        AssignedToDriver => "ASSIGNED_TO_DRIVER",
        PickingUp => "PICKING_UP",
        OnDelivered => "ON_DELIVERED",
        OngoingDelivered => "ONGOING_DELIVERED",
        Delivered => "DELIVERED",
        InTroubles => "IN_TROUBLES",
        Compensation => "COMPENSATION",
        Returning => "RETURNING",
        Returned => "RETURNED",
        Cancelled => "CANCELLED",
    }
}

impl PackageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Returned | Self::Compensation | Self::Cancelled
        )
    }

    /// Forward-progress ordinal (PENDING = 0 .. ONGOING_DELIVERED = 5).
    pub fn progress_rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::OnPlanning => Some(1),
            Self::AssignedToDriver => Some(2),
            Self::PickingUp => Some(3),
            Self::OnDelivered => Some(4),
            Self::OngoingDelivered => Some(5),
            _ => None,
        }
    }

    /// One-to-one image of a package status in the order vocabulary.
    pub fn as_order_status(&self) -> OrderStatus {
        match self {
            Self::Pending => OrderStatus::Pending,
            Self::OnPlanning => OrderStatus::OnPlanning,
            Self::AssignedToDriver => OrderStatus::AssignedToDriver,
            Self::PickingUp => OrderStatus::PickingUp,
            Self::OnDelivered => OrderStatus::OnDelivered,
            Self::OngoingDelivered => OrderStatus::OngoingDelivered,
            Self::Delivered => OrderStatus::Delivered,
            Self::InTroubles => OrderStatus::InTroubles,
            Self::Compensation => OrderStatus::Compensation,
            Self::Returning => OrderStatus::Returning,
            Self::Returned => OrderStatus::Returned,
            Self::Cancelled => OrderStatus::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Trip / reservation
// ---------------------------------------------------------------------------

canonical_enum! {
    pub enum TripStatus ("trip") {
        Active => "ACTIVE",
        Closed => "CLOSED",
    }
}

canonical_enum! {
    pub enum ReservationStatus ("reservation") {
        Reserved => "RESERVED",
        Consumed => "CONSUMED",
        Cancelled => "CANCELLED",
    }
}

impl ReservationStatus {
    /// RESERVED and CONSUMED rows both occupy the (vehicle, trip date) slot.
    pub fn holds_slot(&self) -> bool {
        matches!(self, Self::Reserved | Self::Consumed)
    }
}

// ---------------------------------------------------------------------------
// Off-route
// ---------------------------------------------------------------------------

canonical_enum! {
    pub enum OffRouteStatus ("off_route") {
        /// Deviation detected; no warning sent yet.
        Detected => "NONE",
        YellowSent => "YELLOW_SENT",
        RedSent => "RED_SENT",
        ContactedWaitingReturn => "CONTACTED_WAITING_RETURN",
        ResolvedSafe => "RESOLVED_SAFE",
        ContactFailed => "CONTACT_FAILED",
        IssueCreated => "ISSUE_CREATED",
        BackOnRoute => "BACK_ON_ROUTE",
    }
}

impl OffRouteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResolvedSafe | Self::IssueCreated | Self::BackOnRoute
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Issues / compensation
// ---------------------------------------------------------------------------

canonical_enum! {
    pub enum IssueCategory ("issue_category") {
        Damage => "DAMAGE",
        OrderRejection => "ORDER_REJECTION",
        OffRouteRunaway => "OFF_ROUTE_RUNAWAY",
        Reroute => "REROUTE",
        Penalty => "PENALTY",
        SealReplacement => "SEAL_REPLACEMENT",
    }
}

canonical_enum! {
    pub enum IssueStatus ("issue") {
        Open => "OPEN",
        InProgress => "IN_PROGRESS",
        Resolved => "RESOLVED",
        ResolvedSafe => "RESOLVED_SAFE",
        RunawayConfirmed => "RUNAWAY_CONFIRMED",
        ClosedFraud => "CLOSED_FRAUD",
        Expired => "EXPIRED",
    }
}

impl IssueStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open | Self::InProgress)
    }
}

canonical_enum! {
    pub enum IssueReporter ("issue_reporter") {
        Staff => "STAFF",
        Customer => "CUSTOMER",
        Driver => "DRIVER",
        System => "SYSTEM",
    }
}

canonical_enum! {
    pub enum AssessmentStatus ("assessment") {
        PendingAssessment => "PENDING_ASSESSMENT",
        Proposed => "PROPOSED",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}

canonical_enum! {
    /// Compensation case selected from the (insurance, documents) flags.
    pub enum CompensationCase ("compensation_case") {
        HasInsuranceHasDocuments => "CASE1_HAS_INS_HAS_DOC",
        HasInsuranceNoDocuments => "CASE2_HAS_INS_NO_DOC",
        NoInsuranceHasDocuments => "CASE3_NO_INS_HAS_DOC",
        NoInsuranceNoDocuments => "CASE4_NO_INS_NO_DOC",
    }
}

impl CompensationCase {
    pub fn from_flags(has_insurance: bool, has_documents: bool) -> Self {
        match (has_insurance, has_documents) {
            (true, true) => Self::HasInsuranceHasDocuments,
            (true, false) => Self::HasInsuranceNoDocuments,
            (false, true) => Self::NoInsuranceHasDocuments,
            (false, false) => Self::NoInsuranceNoDocuments,
        }
    }

    /// Case number as printed on assessments (1..=4).
    pub fn number(&self) -> u8 {
        match self {
            Self::HasInsuranceHasDocuments => 1,
            Self::HasInsuranceNoDocuments => 2,
            Self::NoInsuranceHasDocuments => 3,
            Self::NoInsuranceNoDocuments => 4,
        }
    }

    /// Every case except a fully insured and documented claim is capped by the legal limit.
    pub fn applies_legal_limit(&self) -> bool {
        !matches!(self, Self::HasInsuranceHasDocuments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_strings_round_trip() {
        for s in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(s.as_str()).unwrap(), *s);
        }
        for s in PackageStatus::ALL {
            assert_eq!(s.as_str().parse::<PackageStatus>().unwrap(), *s);
        }
    }

    #[test]
    fn unknown_status_is_reported_with_kind() {
        let err = PackageStatus::parse("LOST").unwrap_err();
        assert_eq!(err.kind, "package");
        assert_eq!(err.value, "LOST");
    }

    #[test]
    fn serde_uses_canonical_spelling() {
        let json = serde_json::to_string(&OffRouteStatus::ContactedWaitingReturn).unwrap();
        assert_eq!(json, "\"CONTACTED_WAITING_RETURN\"");
        let back: CompensationCase = serde_json::from_str("\"CASE3_NO_INS_HAS_DOC\"").unwrap();
        assert_eq!(back, CompensationCase::NoInsuranceHasDocuments);
    }

    #[test]
    fn package_status_maps_one_to_one_onto_order() {
        for s in PackageStatus::ALL {
            assert_eq!(s.as_order_status().as_str(), s.as_str());
        }
    }

    #[test]
    fn only_case_one_escapes_the_legal_limit() {
        assert!(!CompensationCase::from_flags(true, true).applies_legal_limit());
        assert!(CompensationCase::from_flags(true, false).applies_legal_limit());
        assert!(CompensationCase::from_flags(false, true).applies_legal_limit());
        assert!(CompensationCase::from_flags(false, false).applies_legal_limit());
    }
}
