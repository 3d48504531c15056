//! fl-schemas
//!
//! Shared vocabulary for every freightline crate:
//! - strongly typed entity ids
//! - status enums with a canonical upper-snake string form (what the DB stores)
//! - persisted records (shipment, package, trip, reservation, off-route event,
//!   issue, compensation assessment)
//! - notification and telemetry payloads
//!
//! No behaviour lives here beyond parsing and small classification helpers.

#[macro_use]
mod macros;

mod error;
mod ids;
mod notify;
mod records;
mod status;

pub use error::{StoreError, UnknownStatus};
pub use ids::*;
pub use notify::{Notification, NotificationKind, Role, TelemetrySample};
pub use records::*;
pub use status::*;

/// A status enum with a stable canonical string form.
pub trait CanonicalStatus: Copy + Eq + std::fmt::Debug + Send + Sync + 'static {
    /// Entity label used in error messages ("order", "package", ...).
    const KIND: &'static str;

    fn as_str(&self) -> &'static str;
}

/// A persisted record guarded by optimistic versioning.
///
/// Writers load a record, mutate it, and commit with the version they loaded.
/// The store rejects the write with [`StoreError::StaleWrite`] if the stored
/// version moved in the meantime.
pub trait Versioned {
    const ENTITY: &'static str;

    fn key(&self) -> uuid::Uuid;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
}
