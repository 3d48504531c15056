use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use fl_schemas::{
    Notification, NotificationKind, OrderStatus, PackageStatus, ReservationId, ShipmentId, Trip,
    TripId, TripStatus, VehicleReservation,
};
use fl_status::{OrderEvent, PackageEvent};
use serde_json::json;
use tracing::{info, warn};

use crate::change::{ShipmentChange, Via};
use crate::coordinator::Staged;
use crate::{
    ApplyResult, LifecycleError, ReservationOp, ShipmentLifecycleCoordinator, SweepReport,
    TripAssignment, VehicleSlot, Write,
};

impl ShipmentLifecycleCoordinator {
    /// Deposit received: CONTRACT_SIGNED -> ON_PLANNING, packages to planning,
    /// and one vehicle hold per slot until the full-payment deadline.
    ///
    /// Any conflicting slot aborts the whole call; holds taken earlier in the
    /// same call are released again.
    pub async fn confirm_deposit(
        &self,
        shipment_id: ShipmentId,
        slots: &[VehicleSlot],
    ) -> Result<ApplyResult, LifecycleError> {
        let now = self.clock.now();
        let snap = self.store.load_shipment(shipment_id).await?;
        let pending: Vec<_> = snap
            .packages
            .iter()
            .filter(|p| p.status == PackageStatus::Pending)
            .map(|p| p.id)
            .collect();

        let mut change = ShipmentChange::new(snap);
        change.apply_order(OrderEvent::DepositPaid, now)?;
        for id in pending {
            change.apply_package(id, PackageEvent::Planned, Via::Direct, now)?;
        }
        change.rederive(now)?;

        for slot in slots {
            let deadline = self.guard.payment_deadline(slot.trip_date);
            if deadline <= now {
                return Err(LifecycleError::validation(format!(
                    "trip date {} leaves no time for full payment (deadline {deadline})",
                    slot.trip_date
                )));
            }
        }

        let mut fresh = Vec::new();
        let mut displaced = Vec::new();
        for slot in slots {
            match self
                .guard
                .reserve(slot.vehicle_id, slot.trip_date, shipment_id, now)
                .await
            {
                Ok(hold) => {
                    if hold.fresh {
                        fresh.push(hold.reservation.id);
                    }
                    displaced.extend(hold.displaced);
                }
                Err(err) => {
                    self.undo_holds(&fresh, now).await;
                    self.expire_displaced(&displaced, now).await;
                    return Err(err.into());
                }
            }
        }

        let mut staged = Staged::new(now);
        let res = staged.shipment(change);
        let committed = self.commit(staged).await;
        if committed.is_err() {
            self.undo_holds(&fresh, now).await;
        }
        self.expire_displaced(&displaced, now).await;
        committed?;
        info!(%shipment_id, holds = slots.len(), "deposit confirmed");
        Ok(res)
    }

    /// Create a trip for some of a shipment's packages.
    ///
    /// The vehicle slot must be free or already held by this shipment. On
    /// `ReservationConflict` nothing is written: no trip, no package change.
    pub async fn assign_trip(
        &self,
        req: TripAssignment,
    ) -> Result<(Trip, ApplyResult), LifecycleError> {
        if req.package_ids.is_empty() {
            return Err(LifecycleError::validation("a trip needs at least one package"));
        }
        if req.driver_ids.is_empty() {
            return Err(LifecycleError::validation("a trip needs at least one driver"));
        }

        let now = self.clock.now();
        let snap = self.store.load_shipment(req.shipment_id).await?;
        let trip = Trip {
            id: TripId::new(),
            shipment_id: req.shipment_id,
            vehicle_id: req.vehicle_id,
            driver_ids: req.driver_ids.clone(),
            trip_date: req.trip_date,
            status: TripStatus::Active,
            version: 0,
            created_at: now,
            closed_at: None,
        };

        let mut change = ShipmentChange::new(snap);
        for id in &req.package_ids {
            change.apply_package(*id, PackageEvent::DriverAssigned, Via::Direct, now)?;
            change.set_trip(*id, trip.id);
        }
        change.rederive(now)?;

        let hold = self
            .guard
            .reserve_until(req.vehicle_id, req.trip_date, req.shipment_id, None, now)
            .await?;

        let mut staged = Staged::new(now);
        staged.uow.trips.push(Write::Insert(trip.clone()));
        staged
            .uow
            .reservations
            .push(ReservationOp::Consume(req.shipment_id));
        let res = staged.shipment(change);

        let committed = self.commit(staged).await;
        if committed.is_err() && hold.fresh {
            self.undo_holds(&[hold.reservation.id], now).await;
        }
        self.expire_displaced(&hold.displaced, now).await;
        committed?;
        info!(
            trip_id = %trip.id,
            shipment_id = %req.shipment_id,
            vehicle_id = %req.vehicle_id,
            trip_date = %req.trip_date,
            packages = req.package_ids.len(),
            "trip assigned"
        );
        Ok((trip, res))
    }

    /// Release lapsed holds and cancel the shipments that never paid in full.
    pub async fn sweep_reservations(&self) -> Result<SweepReport, LifecycleError> {
        let now = self.clock.now();
        let expired = self.guard.sweep_expired(now).await?;
        let mut report = SweepReport {
            expired: expired.iter().map(|r| r.id).collect(),
            ..SweepReport::default()
        };

        let shipments: BTreeSet<ShipmentId> = expired.iter().map(|r| r.shipment_id).collect();
        for shipment_id in shipments {
            match self.expire_unpaid(shipment_id, now).await {
                Ok(true) => report.cancelled_shipments.push(shipment_id),
                Ok(false) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(%shipment_id, error = %err, "payment-deadline cancellation failed");
                }
            }
        }
        Ok(report)
    }

    async fn expire_unpaid(
        &self,
        shipment_id: ShipmentId,
        now: DateTime<Utc>,
    ) -> Result<bool, LifecycleError> {
        let snap = self.store.load_shipment(shipment_id).await?;
        if snap.shipment.status != OrderStatus::OnPlanning {
            return Ok(false);
        }

        let mut staged = Staged::new(now);
        self.stage_cancel(&mut staged, shipment_id, now).await?;
        let payload = json!({
            "shipment_id": shipment_id,
            "reason": "full payment deadline passed",
        });
        staged.notices.push(Notification::customer(
            NotificationKind::ReservationExpired,
            payload.clone(),
        ));
        staged
            .notices
            .push(Notification::staff(NotificationKind::ReservationExpired, payload));
        self.commit(staged).await?;

        warn!(%shipment_id, "shipment cancelled: full payment deadline passed");
        Ok(true)
    }

    /// Lapsed holds cancelled by a takeover get the same treatment the sweep
    /// would have given them.
    async fn expire_displaced(&self, displaced: &[VehicleReservation], now: DateTime<Utc>) {
        let shipments: BTreeSet<ShipmentId> = displaced.iter().map(|r| r.shipment_id).collect();
        for shipment_id in shipments {
            if let Err(err) = self.expire_unpaid(shipment_id, now).await {
                warn!(%shipment_id, error = %err, "payment-deadline cancellation failed");
            }
        }
    }

    async fn undo_holds(&self, ids: &[ReservationId], now: DateTime<Utc>) {
        for id in ids {
            if let Err(err) = self.guard.release_one(*id, now).await {
                warn!(reservation_id = %id, error = %err, "failed to release hold after abort");
            }
        }
    }
}
