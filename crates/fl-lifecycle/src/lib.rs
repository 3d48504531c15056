//! fl-lifecycle
//!
//! ShipmentLifecycleCoordinator: applies order, package and trip events,
//! drives off-route escalation from telemetry and the scheduler tick, handles
//! issues and their compensation, and guards vehicle reservations.
//!
//! Architectural decisions:
//! - Each operation computes its whole change in memory and commits one
//!   `UnitOfWork`; the shipment's derived status is written with the package
//!   change that produced it
//! - Optimistic versions on every status-bearing record; a lost race surfaces
//!   as `StaleWrite` and nothing is written
//! - IN_TROUBLES and COMPENSATION are entered and left only through issues
//! - A reservation conflict aborts assignment before any write
//! - Notifications go out after the commit; a failed delivery is logged and
//!   never rolls back the change
//! - Time comes from an injected `Clock`

mod change;
mod coordinator;
mod error;
mod issues;
mod offroute;
mod ports;
mod reservations;
mod types;

pub use coordinator::ShipmentLifecycleCoordinator;
pub use error::LifecycleError;
pub use ports::{
    Clock, LifecycleStore, NotificationDispatcher, ReservationOp, SystemClock, UnitOfWork, Write,
};
pub use types::{
    ApplyResult, IssueReport, IssueResolution, LifecycleSettings, PackageChange,
    ResolutionOutcome, SkippedPackage, StatusChange, SweepReport, TelemetryOutcome, TickReport,
    TripAssignment, TripEvent, VehicleSlot,
};
