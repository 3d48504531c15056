//! fl-offroute
//!
//! Off-route escalation for a single trip deviation.
//!
//! Architectural decisions:
//! - Escalation is driven by elapsed time since the deviation started, never by
//!   the number of samples received
//! - `tick` cascades every due edge in one call so a late evaluation cannot
//!   leave an event behind its deadline
//! - Back on route closes the event from any active status without an issue
//! - Staff actions are refused once the contact deadline has passed
//! - Effects are returned to the caller; persisting the event and carrying
//!   them out happens outside this crate
//!
//! Pure deterministic logic. No IO, no wall-clock. Callers supply `now`.

mod machine;
mod types;

pub use machine::{
    confirm_safe, contact_deadline, extend_grace, observe, open, record_contact,
    report_contact_failure, tick,
};
pub use types::{OffRouteConfig, OffRouteEffect, OffRouteError, WarningLevel};
