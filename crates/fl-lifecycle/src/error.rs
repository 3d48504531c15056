use chrono::NaiveDate;
use fl_compensation::CompensationError;
use fl_offroute::OffRouteError;
use fl_reservation::ReservationError;
use fl_schemas::{PackageId, ShipmentId, StoreError, VehicleId};
use fl_status::TransitionError;
use thiserror::Error;

/// Every failure the coordinator surfaces to its callers.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Illegal status edge. Nothing was persisted.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// Another shipment holds the vehicle. Offer an alternative; do not retry.
    #[error("vehicle {vehicle_id} already reserved on {trip_date} by shipment {holder}")]
    ReservationConflict {
        vehicle_id: VehicleId,
        trip_date: NaiveDate,
        holder: ShipmentId,
    },

    /// Malformed request or input rejected before any calculation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Assessment lifecycle violation (already approved, rejected, ...).
    #[error(transparent)]
    Compensation(CompensationError),

    /// Optimistic concurrency violation. Reload and retry.
    #[error("stale write on {entity} {id}: reload and retry")]
    StaleWrite { entity: &'static str, id: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// IN_TROUBLES and COMPENSATION are reachable only through an issue.
    #[error("{event} on package {package_id} must go through an issue")]
    IssueRequired {
        package_id: PackageId,
        event: &'static str,
    },

    #[error(transparent)]
    Escalation(#[from] OffRouteError),

    #[error(transparent)]
    Store(anyhow::Error),
}

impl LifecycleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LifecycleError::Validation(msg.into())
    }

    /// Expected business outcome rather than a fault.
    pub fn is_business_outcome(&self) -> bool {
        matches!(self, LifecycleError::ReservationConflict { .. })
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StaleWrite { entity, id, .. } => LifecycleError::StaleWrite { entity, id },
            StoreError::NotFound { entity, id } => LifecycleError::NotFound { entity, id },
            StoreError::Backend(e) => LifecycleError::Store(e),
        }
    }
}

impl From<ReservationError> for LifecycleError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Conflict {
                vehicle_id,
                trip_date,
                holder,
            } => LifecycleError::ReservationConflict {
                vehicle_id,
                trip_date,
                holder,
            },
            err @ ReservationError::DeadlinePassed { .. } => {
                LifecycleError::Validation(err.to_string())
            }
            ReservationError::Store(e) => e.into(),
        }
    }
}

impl From<CompensationError> for LifecycleError {
    fn from(err: CompensationError) -> Self {
        match err {
            CompensationError::Immutable { .. } | CompensationError::InvalidState { .. } => {
                LifecycleError::Compensation(err)
            }
            other => LifecycleError::Validation(other.to_string()),
        }
    }
}
