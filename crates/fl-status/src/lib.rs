//! fl-status
//!
//! Status transition tables for shipments (orders) and packages.
//!
//! Architectural decisions:
//! - One static edge list per entity; no status logic scattered in callers
//! - Every event names exactly one target status
//! - An event whose target is the current status is a no-op (safe replay)
//! - Illegal `(status, event)` pairs return `TransitionError` naming from/to/event
//! - Shipment status in the delivery phase is derived from package statuses
//!
//! Pure deterministic logic. No IO.

mod aggregate;
mod order;
mod package;
mod table;

pub use aggregate::{aggregate_package_statuses, derive_order_event, DERIVED_EVENT};
pub use order::{OrderEvent, ORDER_TRANSITIONS};
pub use package::{requires_issue, PackageEvent, PACKAGE_TRANSITIONS};
pub use table::{Applied, StatusEvent, TransitionError, TransitionTable};
