use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fl_schemas::{ReservationId, ShipmentId, StoreError, VehicleId, VehicleReservation};
use parking_lot::Mutex;

use crate::{NewReservation, ReservationBook, ReservationStore, ReserveOutcome};

/// Single-process reservation store. The mutex is the serialized section that
/// makes check-and-insert atomic.
#[derive(Debug, Default)]
pub struct MemoryReservationStore {
    book: Mutex<ReservationBook>,
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<VehicleReservation> {
        self.book.lock().rows().to_vec()
    }
}

#[async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn try_reserve(
        &self,
        req: NewReservation,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, StoreError> {
        Ok(self.book.lock().try_reserve(req, now))
    }

    async fn consume(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.book.lock().consume(shipment, now))
    }

    async fn release(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.book.lock().release(shipment, now))
    }

    async fn release_one(&self, id: ReservationId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.book.lock().release_one(id, now))
    }

    async fn clear_deadline(
        &self,
        shipment: ShipmentId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self.book.lock().clear_deadline(shipment, now))
    }

    async fn active_holder(
        &self,
        vehicle: VehicleId,
        trip_date: NaiveDate,
        exclude: Option<ShipmentId>,
        now: DateTime<Utc>,
    ) -> Result<Option<VehicleReservation>, StoreError> {
        Ok(self.book.lock().active_holder(vehicle, trip_date, exclude, now))
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<VehicleReservation>, StoreError> {
        Ok(self.book.lock().expire_due(now))
    }

    async fn list_for_shipment(
        &self,
        shipment: ShipmentId,
    ) -> Result<Vec<VehicleReservation>, StoreError> {
        Ok(self.book.lock().for_shipment(shipment))
    }
}
