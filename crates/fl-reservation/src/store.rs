use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fl_schemas::{
    ReservationId, ShipmentId, StoreError, VehicleId, VehicleReservation,
};

/// Request for a new hold on one (vehicle, trip date) slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub vehicle_id: VehicleId,
    pub trip_date: NaiveDate,
    pub shipment_id: ShipmentId,
    /// Payment deadline. `None` holds the slot until consumed or released.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of an atomic check-and-insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// A new RESERVED row was inserted. `displaced` lists lapsed holds on the
    /// same slot that were cancelled to make room; their shipments still owe
    /// the payment-deadline handling the sweep would have given them.
    Reserved {
        reservation: VehicleReservation,
        displaced: Vec<VehicleReservation>,
    },
    /// The requesting shipment already holds the slot.
    AlreadyHeld(VehicleReservation),
    /// Another shipment holds the slot.
    Conflict { holder: VehicleReservation },
}

/// Persistence seam for vehicle reservations.
///
/// # Contract
/// `try_reserve` must be atomic with respect to every other `try_reserve` on
/// the same (vehicle, trip date): two concurrent callers for different
/// shipments get exactly one `Reserved` and one `Conflict`. Backends enforce
/// this in storage (unique index, serialized section), never by a read in one
/// call followed by a write in another.
///
/// RESERVED rows whose `expires_at` has passed do not hold their slot, whether
/// or not a sweep has cancelled them yet. A `try_reserve` that cancels such a
/// row reports it in `ReserveOutcome::Reserved::displaced`.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn try_reserve(
        &self,
        req: NewReservation,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, StoreError>;

    /// RESERVED -> CONSUMED for the shipment. Returns rows changed.
    async fn consume(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// RESERVED / CONSUMED -> CANCELLED for the shipment. Returns rows changed.
    async fn release(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn release_one(&self, id: ReservationId, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Remove the payment deadline from the shipment's RESERVED rows.
    async fn clear_deadline(
        &self,
        shipment: ShipmentId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn active_holder(
        &self,
        vehicle: VehicleId,
        trip_date: NaiveDate,
        exclude: Option<ShipmentId>,
        now: DateTime<Utc>,
    ) -> Result<Option<VehicleReservation>, StoreError>;

    /// Cancel RESERVED rows whose deadline passed; returns them.
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<VehicleReservation>, StoreError>;

    async fn list_for_shipment(
        &self,
        shipment: ShipmentId,
    ) -> Result<Vec<VehicleReservation>, StoreError>;
}
