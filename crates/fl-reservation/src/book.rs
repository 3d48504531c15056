//! In-process reservation table.
//!
//! `ReservationBook` is plain data with no locking. Callers serialize access
//! (the memory store wraps it in a mutex, the lifecycle test store keeps it
//! under the same lock as the rest of its state so reservation ops commit
//! atomically with entity writes).

use chrono::{DateTime, NaiveDate, Utc};
use fl_schemas::{
    ReservationId, ReservationStatus, ShipmentId, VehicleId, VehicleReservation,
};

use crate::{NewReservation, ReserveOutcome};

#[derive(Debug, Default, Clone)]
pub struct ReservationBook {
    rows: Vec<VehicleReservation>,
}

impl ReservationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[VehicleReservation] {
        &self.rows
    }

    /// Check-and-insert for one (vehicle, trip date) slot.
    ///
    /// RESERVED rows whose deadline passed are cancelled first so they never
    /// block a new hold; they come back as `displaced`.
    pub fn try_reserve(&mut self, req: NewReservation, now: DateTime<Utc>) -> ReserveOutcome {
        let displaced = self.cancel_lapsed_in_slot(req.vehicle_id, req.trip_date, now);

        if let Some(holder) = self.active_holder(req.vehicle_id, req.trip_date, None, now) {
            return if holder.shipment_id == req.shipment_id {
                ReserveOutcome::AlreadyHeld(holder)
            } else {
                ReserveOutcome::Conflict { holder }
            };
        }

        let row = VehicleReservation {
            id: ReservationId::new(),
            vehicle_id: req.vehicle_id,
            trip_date: req.trip_date,
            shipment_id: req.shipment_id,
            status: ReservationStatus::Reserved,
            expires_at: req.expires_at,
            created_at: now,
            updated_at: now,
        };
        self.rows.push(row.clone());
        ReserveOutcome::Reserved {
            reservation: row,
            displaced,
        }
    }

    /// RESERVED -> CONSUMED for every live hold of `shipment`.
    pub fn consume(&mut self, shipment: ShipmentId, now: DateTime<Utc>) -> u64 {
        self.update_where(
            |r| {
                r.shipment_id == shipment
                    && r.status == ReservationStatus::Reserved
                    && r.holds_slot_at(now)
            },
            |r| {
                r.status = ReservationStatus::Consumed;
                r.expires_at = None;
                r.updated_at = now;
            },
        )
    }

    /// RESERVED / CONSUMED -> CANCELLED for every hold of `shipment`.
    pub fn release(&mut self, shipment: ShipmentId, now: DateTime<Utc>) -> u64 {
        self.update_where(
            |r| r.shipment_id == shipment && r.status.holds_slot(),
            |r| cancel(r, now),
        )
    }

    pub fn release_one(&mut self, id: ReservationId, now: DateTime<Utc>) -> bool {
        self.update_where(|r| r.id == id && r.status.holds_slot(), |r| cancel(r, now)) > 0
    }

    /// Drop the payment deadline on the shipment's RESERVED rows (fully paid).
    pub fn clear_deadline(&mut self, shipment: ShipmentId, now: DateTime<Utc>) -> u64 {
        self.update_where(
            |r| {
                r.shipment_id == shipment
                    && r.status == ReservationStatus::Reserved
                    && r.expires_at.is_some()
                    && r.holds_slot_at(now)
            },
            |r| {
                r.expires_at = None;
                r.updated_at = now;
            },
        )
    }

    pub fn active_holder(
        &self,
        vehicle: VehicleId,
        trip_date: NaiveDate,
        exclude: Option<ShipmentId>,
        now: DateTime<Utc>,
    ) -> Option<VehicleReservation> {
        self.rows
            .iter()
            .find(|r| {
                r.vehicle_id == vehicle
                    && r.trip_date == trip_date
                    && Some(r.shipment_id) != exclude
                    && r.holds_slot_at(now)
            })
            .cloned()
    }

    /// Cancel every RESERVED row whose deadline is at or before `now`.
    /// Returns the rows as they are after cancellation.
    pub fn expire_due(&mut self, now: DateTime<Utc>) -> Vec<VehicleReservation> {
        let mut expired = Vec::new();
        for r in self.rows.iter_mut().filter(|r| is_lapsed(r, now)) {
            cancel(r, now);
            expired.push(r.clone());
        }
        expired
    }

    pub fn for_shipment(&self, shipment: ShipmentId) -> Vec<VehicleReservation> {
        self.rows
            .iter()
            .filter(|r| r.shipment_id == shipment)
            .cloned()
            .collect()
    }

    fn cancel_lapsed_in_slot(
        &mut self,
        vehicle: VehicleId,
        trip_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Vec<VehicleReservation> {
        let mut cancelled = Vec::new();
        for r in self
            .rows
            .iter_mut()
            .filter(|r| r.vehicle_id == vehicle && r.trip_date == trip_date && is_lapsed(r, now))
        {
            cancel(r, now);
            cancelled.push(r.clone());
        }
        cancelled
    }

    fn update_where(
        &mut self,
        pred: impl Fn(&VehicleReservation) -> bool,
        mut apply: impl FnMut(&mut VehicleReservation),
    ) -> u64 {
        let mut n = 0;
        for r in self.rows.iter_mut().filter(|r| pred(r)) {
            apply(r);
            n += 1;
        }
        n
    }
}

fn is_lapsed(r: &VehicleReservation, now: DateTime<Utc>) -> bool {
    r.status == ReservationStatus::Reserved && !r.holds_slot_at(now)
}

fn cancel(r: &mut VehicleReservation, now: DateTime<Utc>) {
    r.status = ReservationStatus::Cancelled;
    r.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn req(vehicle: VehicleId, shipment: ShipmentId, expires_at: Option<DateTime<Utc>>) -> NewReservation {
        NewReservation {
            vehicle_id: vehicle,
            trip_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            shipment_id: shipment,
            expires_at,
        }
    }

    #[test]
    fn second_shipment_conflicts_on_same_slot() {
        let now = Utc::now();
        let mut book = ReservationBook::new();
        let v = VehicleId::new();
        let (a, b) = (ShipmentId::new(), ShipmentId::new());

        assert!(matches!(book.try_reserve(req(v, a, None), now), ReserveOutcome::Reserved { .. }));
        match book.try_reserve(req(v, b, None), now) {
            ReserveOutcome::Conflict { holder } => assert_eq!(holder.shipment_id, a),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(matches!(book.try_reserve(req(v, a, None), now), ReserveOutcome::AlreadyHeld(_)));
        assert_eq!(book.rows().len(), 1);
    }

    #[test]
    fn lapsed_hold_gives_way() {
        let now = Utc::now();
        let mut book = ReservationBook::new();
        let v = VehicleId::new();
        let (a, b) = (ShipmentId::new(), ShipmentId::new());

        book.try_reserve(req(v, a, Some(now + Duration::hours(1))), now);
        let later = now + Duration::hours(2);
        match book.try_reserve(req(v, b, None), later) {
            ReserveOutcome::Reserved { reservation, displaced } => {
                assert_eq!(reservation.shipment_id, b);
                assert_eq!(displaced.len(), 1);
                assert_eq!(displaced[0].shipment_id, a);
                assert_eq!(displaced[0].status, ReservationStatus::Cancelled);
            }
            other => panic!("expected a fresh hold, got {other:?}"),
        }
        assert_eq!(book.for_shipment(a)[0].status, ReservationStatus::Cancelled);
        // Already cancelled, so the sweep does not report it a second time.
        assert!(book.expire_due(later).is_empty());
    }

    #[test]
    fn consume_is_idempotent_and_release_cancels_consumed() {
        let now = Utc::now();
        let mut book = ReservationBook::new();
        let s = ShipmentId::new();
        book.try_reserve(req(VehicleId::new(), s, Some(now + Duration::hours(1))), now);

        assert_eq!(book.consume(s, now), 1);
        assert_eq!(book.consume(s, now), 0);
        assert_eq!(book.for_shipment(s)[0].expires_at, None);
        assert_eq!(book.release(s, now), 1);
        assert_eq!(book.release(s, now), 0);
    }

    #[test]
    fn sweep_only_touches_lapsed_reserved_rows() {
        let now = Utc::now();
        let mut book = ReservationBook::new();
        let (a, b, c) = (ShipmentId::new(), ShipmentId::new(), ShipmentId::new());
        book.try_reserve(req(VehicleId::new(), a, Some(now - Duration::seconds(1))), now - Duration::hours(1));
        book.try_reserve(req(VehicleId::new(), b, Some(now + Duration::hours(1))), now);
        book.try_reserve(req(VehicleId::new(), c, None), now);

        let expired = book.expire_due(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].shipment_id, a);
        assert!(book.expire_due(now).is_empty());
    }
}
