use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use fl_schemas::{ReservationId, ShipmentId, StoreError, VehicleId, VehicleReservation};
use thiserror::Error;
use tracing::{info, warn};

use crate::{NewReservation, ReservationStore, ReserveOutcome};

#[derive(Debug, Error)]
pub enum ReservationError {
    /// Another shipment holds the slot. Expected contention: offer the caller
    /// another vehicle instead of retrying.
    #[error("vehicle {vehicle_id} already reserved on {trip_date} by shipment {holder}")]
    Conflict {
        vehicle_id: VehicleId,
        trip_date: NaiveDate,
        holder: ShipmentId,
    },

    /// The hold would lapse before it is taken: no time left for full payment.
    #[error("trip date {trip_date} leaves no time for full payment (deadline {deadline})")]
    DeadlinePassed {
        trip_date: NaiveDate,
        deadline: DateTime<Utc>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A slot held by the requesting shipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hold {
    pub reservation: VehicleReservation,
    /// False when the shipment already held the slot before this call.
    pub fresh: bool,
    /// Lapsed holds of other shipments cancelled to free the slot.
    pub displaced: Vec<VehicleReservation>,
}

/// Anti-overbooking guard for (vehicle, trip date) slots.
///
/// All atomicity lives in the [`ReservationStore`]; the guard adds payment
/// deadlines, logging and the conflict error.
#[derive(Clone)]
pub struct VehicleReservationGuard {
    store: Arc<dyn ReservationStore>,
    payment_lead: Duration,
}

impl VehicleReservationGuard {
    /// `payment_lead`: how long before the trip date full payment is due.
    pub fn new(store: Arc<dyn ReservationStore>, payment_lead: Duration) -> Self {
        Self {
            store,
            payment_lead,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }

    /// Full-payment deadline for a trip on `trip_date`: the start of that day
    /// (UTC) minus the payment lead.
    pub fn payment_deadline(&self, trip_date: NaiveDate) -> DateTime<Utc> {
        trip_date.and_time(NaiveTime::MIN).and_utc() - self.payment_lead
    }

    /// Hold the slot for `shipment` until the payment deadline.
    pub async fn reserve(
        &self,
        vehicle_id: VehicleId,
        trip_date: NaiveDate,
        shipment: ShipmentId,
        now: DateTime<Utc>,
    ) -> Result<Hold, ReservationError> {
        let expires_at = Some(self.payment_deadline(trip_date));
        self.reserve_until(vehicle_id, trip_date, shipment, expires_at, now)
            .await
    }

    /// Hold the slot with an explicit deadline (`None`: no deadline).
    ///
    /// A deadline at or before `now` is refused: such a row would never hold
    /// the slot and the next caller would silently take it over.
    pub async fn reserve_until(
        &self,
        vehicle_id: VehicleId,
        trip_date: NaiveDate,
        shipment: ShipmentId,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Hold, ReservationError> {
        if let Some(deadline) = expires_at.filter(|d| *d <= now) {
            return Err(ReservationError::DeadlinePassed {
                trip_date,
                deadline,
            });
        }
        let req = NewReservation {
            vehicle_id,
            trip_date,
            shipment_id: shipment,
            expires_at,
        };
        match self.store.try_reserve(req, now).await? {
            ReserveOutcome::Reserved {
                reservation,
                displaced,
            } => {
                for r in &displaced {
                    warn!(
                        reservation_id = %r.id,
                        %vehicle_id,
                        %trip_date,
                        shipment_id = %r.shipment_id,
                        "lapsed reservation displaced before full payment"
                    );
                }
                info!(
                    reservation_id = %reservation.id,
                    %vehicle_id,
                    %trip_date,
                    shipment_id = %shipment,
                    "vehicle reserved"
                );
                let displaced = displaced
                    .into_iter()
                    .filter(|r| r.shipment_id != shipment)
                    .collect();
                Ok(Hold {
                    reservation,
                    fresh: true,
                    displaced,
                })
            }
            ReserveOutcome::AlreadyHeld(reservation) => Ok(Hold {
                reservation,
                fresh: false,
                displaced: Vec::new(),
            }),
            ReserveOutcome::Conflict { holder } => {
                warn!(
                    %vehicle_id,
                    %trip_date,
                    shipment_id = %shipment,
                    holder = %holder.shipment_id,
                    "vehicle reservation conflict"
                );
                Err(ReservationError::Conflict {
                    vehicle_id,
                    trip_date,
                    holder: holder.shipment_id,
                })
            }
        }
    }

    pub async fn consume(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let n = self.store.consume(shipment, now).await?;
        if n > 0 {
            info!(shipment_id = %shipment, count = n, "reservations consumed");
        }
        Ok(n)
    }

    pub async fn release(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let n = self.store.release(shipment, now).await?;
        if n > 0 {
            info!(shipment_id = %shipment, count = n, "reservations released");
        }
        Ok(n)
    }

    pub async fn release_one(&self, id: ReservationId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.store.release_one(id, now).await
    }

    pub async fn clear_deadline(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.store.clear_deadline(shipment, now).await
    }

    /// Read-only: is the slot free for `exclude` (or for anyone, if `None`)?
    pub async fn is_available(
        &self,
        vehicle_id: VehicleId,
        trip_date: NaiveDate,
        exclude: Option<ShipmentId>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .store
            .active_holder(vehicle_id, trip_date, exclude, now)
            .await?
            .is_none())
    }

    /// Cancel every hold whose payment deadline passed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<VehicleReservation>, StoreError> {
        let expired = self.store.expire_due(now).await?;
        for r in &expired {
            warn!(
                reservation_id = %r.id,
                vehicle_id = %r.vehicle_id,
                shipment_id = %r.shipment_id,
                "reservation expired before full payment"
            );
        }
        Ok(expired)
    }

    pub async fn list_for_shipment(&self, shipment: ShipmentId) -> Result<Vec<VehicleReservation>, StoreError> {
        self.store.list_for_shipment(shipment).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryReservationStore;

    fn guard() -> VehicleReservationGuard {
        VehicleReservationGuard::new(Arc::new(MemoryReservationStore::new()), Duration::days(1))
    }

    #[test]
    fn deadline_is_one_lead_before_trip_day() {
        let g = guard();
        let d = NaiveDate::from_ymd_opt(2026, 7, 10).unwrap();
        assert_eq!(
            g.payment_deadline(d).to_rfc3339(),
            "2026-07-09T00:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn availability_excludes_own_hold() {
        let g = guard();
        let now = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap().and_time(NaiveTime::MIN).and_utc();
        let d = NaiveDate::from_ymd_opt(2026, 7, 10).unwrap();
        let v = VehicleId::new();
        let s = ShipmentId::new();

        let hold = g.reserve(v, d, s, now).await.unwrap();
        assert!(hold.fresh);
        assert!(g.is_available(v, d, Some(s), now).await.unwrap());
        assert!(!g.is_available(v, d, None, now).await.unwrap());
        assert!(!g.is_available(v, d, Some(ShipmentId::new()), now).await.unwrap());

        let again = g.reserve(v, d, s, now).await.unwrap();
        assert!(!again.fresh);
        assert_eq!(again.reservation.id, hold.reservation.id);
    }

    #[tokio::test]
    async fn conflict_names_the_holder() {
        let g = guard();
        let now = Utc::now();
        let d = (now + Duration::days(10)).date_naive();
        let v = VehicleId::new();
        let (a, b) = (ShipmentId::new(), ShipmentId::new());

        g.reserve(v, d, a, now).await.unwrap();
        match g.reserve(v, d, b, now).await {
            Err(ReservationError::Conflict { holder, .. }) => assert_eq!(holder, a),
            other => panic!("expected conflict, got {other:?}"),
        }

        assert_eq!(g.release(a, now).await.unwrap(), 1);
        assert!(g.reserve(v, d, b, now).await.unwrap().fresh);
    }

    #[tokio::test]
    async fn trip_inside_payment_lead_cannot_be_held() {
        let g = guard();
        let now = Utc::now();
        let d = (now + Duration::days(1)).date_naive();
        let v = VehicleId::new();
        let (a, b) = (ShipmentId::new(), ShipmentId::new());

        for s in [a, b] {
            match g.reserve(v, d, s, now).await {
                Err(ReservationError::DeadlinePassed { trip_date, deadline }) => {
                    assert_eq!(trip_date, d);
                    assert!(deadline <= now);
                }
                other => panic!("expected deadline refusal, got {other:?}"),
            }
        }
        assert!(g.list_for_shipment(a).await.unwrap().is_empty());
        assert!(g.is_available(v, d, None, now).await.unwrap());

        // Without a deadline the slot is held as usual and excludes others.
        assert!(g.reserve_until(v, d, a, None, now).await.unwrap().fresh);
        assert!(matches!(
            g.reserve_until(v, d, b, None, now).await,
            Err(ReservationError::Conflict { holder, .. }) if holder == a
        ));
    }

    #[tokio::test]
    async fn takeover_reports_the_lapsed_hold() {
        let g = guard();
        let now = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap().and_time(NaiveTime::MIN).and_utc();
        let d = NaiveDate::from_ymd_opt(2026, 7, 10).unwrap();
        let v = VehicleId::new();
        let (a, b) = (ShipmentId::new(), ShipmentId::new());

        let first = g.reserve(v, d, a, now).await.unwrap();
        assert!(first.displaced.is_empty());

        let later = g.payment_deadline(d) + Duration::minutes(1);
        let hold = g.reserve_until(v, d, b, None, later).await.unwrap();
        assert_eq!(hold.displaced.len(), 1);
        assert_eq!(hold.displaced[0].id, first.reservation.id);
        assert_eq!(hold.displaced[0].shipment_id, a);
    }
}
