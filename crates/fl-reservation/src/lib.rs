//! fl-reservation
//!
//! Vehicle reservation guard: at most one RESERVED or CONSUMED hold per
//! (vehicle, trip date).
//!
//! Architectural decisions:
//! - Check-and-insert is a single store operation; atomicity is the store's
//!   job (DB unique index in production, one mutex in-process)
//! - A lapsed RESERVED hold never blocks a new one, even before the sweep runs
//! - `Conflict` is a business outcome carried in a typed error, not a fault
//! - Re-reserving a slot the shipment already holds returns the existing hold

mod book;
mod guard;
mod memory;
mod store;

pub use book::ReservationBook;
pub use guard::{Hold, ReservationError, VehicleReservationGuard};
pub use memory::MemoryReservationStore;
pub use store::{NewReservation, ReservationStore, ReserveOutcome};
