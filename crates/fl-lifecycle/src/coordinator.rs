use std::sync::Arc;

use chrono::{DateTime, Utc};
use fl_reservation::VehicleReservationGuard;
use fl_schemas::{
    Notification, OrderStatus, Package, PackageId, PackageStatus, Shipment, ShipmentId,
    ShipmentSnapshot, TripId, TripStatus,
};
use fl_status::{OrderEvent, PackageEvent, StatusEvent};
use tracing::{info, warn};

use crate::change::{ShipmentChange, Via};
use crate::{
    ApplyResult, Clock, LifecycleError, LifecycleSettings, LifecycleStore,
    NotificationDispatcher, ReservationOp, TripEvent, UnitOfWork, Write,
};

/// Writes and notifications produced by one operation, not yet committed.
pub(crate) struct Staged {
    pub(crate) uow: UnitOfWork,
    pub(crate) notices: Vec<Notification>,
}

impl Staged {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self {
            uow: UnitOfWork::new(now),
            notices: Vec::new(),
        }
    }

    /// Queue a shipment's writes. A shipment that ended CANCELLED gives up its
    /// vehicle holds in the same unit.
    pub(crate) fn shipment(&mut self, change: ShipmentChange) -> ApplyResult {
        let (res, notice) = change.finish(&mut self.uow);
        let release = ReservationOp::Release(res.shipment_id);
        if res.order_status == OrderStatus::Cancelled && !self.uow.reservations.contains(&release) {
            self.uow.reservations.push(release);
        }
        self.notices.extend(notice);
        res
    }
}

/// Orchestrates status tables, reservations, off-route escalation and
/// compensation around one store.
///
/// Every public operation loads what it needs, computes the full change in
/// memory, commits it as one [`UnitOfWork`], and only then dispatches
/// notifications.
pub struct ShipmentLifecycleCoordinator {
    pub(crate) store: Arc<dyn LifecycleStore>,
    pub(crate) guard: VehicleReservationGuard,
    pub(crate) notifier: Arc<dyn NotificationDispatcher>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: LifecycleSettings,
}

impl ShipmentLifecycleCoordinator {
    pub fn new<S: LifecycleStore + 'static>(
        store: Arc<S>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        settings: LifecycleSettings,
    ) -> Self {
        let guard = VehicleReservationGuard::new(store.clone(), settings.payment_lead);
        Self {
            store,
            guard,
            notifier,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    pub fn guard(&self) -> &VehicleReservationGuard {
        &self.guard
    }

    pub fn store(&self) -> &Arc<dyn LifecycleStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Shipments
    // -----------------------------------------------------------------------

    /// Create a PENDING shipment with `package_count` PENDING packages.
    pub async fn register_shipment(
        &self,
        package_count: usize,
    ) -> Result<ShipmentSnapshot, LifecycleError> {
        if package_count == 0 {
            return Err(LifecycleError::validation("a shipment needs at least one package"));
        }
        let now = self.clock.now();
        let shipment = Shipment {
            id: ShipmentId::new(),
            status: OrderStatus::Pending,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let packages: Vec<Package> = (0..package_count)
            .map(|_| Package {
                id: PackageId::new(),
                shipment_id: shipment.id,
                trip_id: None,
                status: PackageStatus::Pending,
                version: 0,
                updated_at: now,
            })
            .collect();

        let mut staged = Staged::new(now);
        staged.uow.shipments.push(Write::Insert(shipment.clone()));
        staged
            .uow
            .packages
            .extend(packages.iter().cloned().map(Write::Insert));
        self.commit(staged).await?;

        info!(shipment_id = %shipment.id, packages = package_count, "shipment registered");
        Ok(ShipmentSnapshot { shipment, packages })
    }

    pub async fn shipment(&self, id: ShipmentId) -> Result<ShipmentSnapshot, LifecycleError> {
        Ok(self.store.load_shipment(id).await?)
    }

    /// Apply a commercial order event (payment, contract, cancellation, close-out).
    ///
    /// Delivery-phase order statuses are derived from packages and cannot be
    /// set directly.
    pub async fn on_order_event(
        &self,
        shipment_id: ShipmentId,
        event: OrderEvent,
    ) -> Result<ApplyResult, LifecycleError> {
        if !event.is_commercial() {
            return Err(LifecycleError::validation(format!(
                "{} is derived from package statuses",
                event.name()
            )));
        }
        match event {
            OrderEvent::Cancelled => return self.cancel_shipment(shipment_id, "order cancelled").await,
            OrderEvent::DepositPaid => return self.confirm_deposit(shipment_id, &[]).await,
            _ => {}
        }

        let now = self.clock.now();
        let snap = self.store.load_shipment(shipment_id).await?;
        if event == OrderEvent::ClosedOut {
            self.ensure_trips_closed(shipment_id).await?;
        }

        let mut change = ShipmentChange::new(snap);
        change.apply_order(event, now)?;

        let mut staged = Staged::new(now);
        if event == OrderEvent::FullyPaid {
            staged
                .uow
                .reservations
                .push(ReservationOp::ClearDeadline(shipment_id));
        }
        let res = staged.shipment(change);
        self.commit(staged).await?;
        log_result("order event", event.name(), &res);
        Ok(res)
    }

    /// Apply an event to one package and recompute its shipment.
    pub async fn on_package_event(
        &self,
        package_id: PackageId,
        event: PackageEvent,
    ) -> Result<ApplyResult, LifecycleError> {
        let now = self.clock.now();
        let pkg = self.store.load_package(package_id).await?;
        let snap = self.store.load_shipment(pkg.shipment_id).await?;

        let mut change = ShipmentChange::new(snap);
        change.apply_package(package_id, event, Via::Direct, now)?;
        change.rederive(now)?;

        let mut staged = Staged::new(now);
        let res = staged.shipment(change);
        self.commit(staged).await?;
        log_result("package event", event.name(), &res);
        Ok(res)
    }

    /// Apply a trip-level event to every package on the trip.
    ///
    /// Packages held IN_TROUBLES wait for their issue and are skipped, as are
    /// packages that already finished. `Completed` closes the trip and, once
    /// every trip is closed, closes out a DELIVERED shipment as SUCCESSFUL.
    pub async fn on_trip_event(
        &self,
        trip_id: TripId,
        event: TripEvent,
    ) -> Result<ApplyResult, LifecycleError> {
        let now = self.clock.now();
        let mut trip = self.store.load_trip(trip_id).await?;
        if trip.status == TripStatus::Closed {
            return Err(LifecycleError::validation(format!("trip {trip_id} is closed")));
        }
        let snap = self.store.load_shipment(trip.shipment_id).await?;
        let on_trip: Vec<(PackageId, PackageStatus)> = snap
            .packages
            .iter()
            .filter(|p| p.trip_id == Some(trip_id))
            .map(|p| (p.id, p.status))
            .collect();
        let mut change = ShipmentChange::new(snap);
        let mut staged = Staged::new(now);

        match event.package_event() {
            Some(pev) => {
                for (id, status) in on_trip {
                    let finished = status.is_terminal() && status != pev.target();
                    if status == PackageStatus::InTroubles || finished {
                        change.skip(id, status);
                        continue;
                    }
                    change.apply_package(id, pev, Via::Direct, now)?;
                }
                change.rederive(now)?;
            }
            None => {
                if let Some((id, status)) = on_trip.iter().find(|(_, s)| !s.is_terminal()) {
                    return Err(LifecycleError::validation(format!(
                        "trip {trip_id} still carries package {id} in {status}"
                    )));
                }
                trip.status = TripStatus::Closed;
                trip.closed_at = Some(now);
                let shipment_id = trip.shipment_id;
                staged.uow.trips.push(Write::updated(trip));

                let others_open = self
                    .store
                    .trips_for_shipment(shipment_id)
                    .await?
                    .iter()
                    .any(|t| t.id != trip_id && t.status == TripStatus::Active);
                if !others_open && change.order_status() == OrderStatus::Delivered {
                    change.apply_order(OrderEvent::ClosedOut, now)?;
                }
            }
        }

        let res = staged.shipment(change);
        self.commit(staged).await?;
        info!(
            %trip_id,
            event = ?event,
            order_status = %res.order_status,
            changed = res.package_changes.len(),
            skipped = res.skipped.len(),
            "trip event applied"
        );
        Ok(res)
    }

    /// Cancel a shipment and every package that has not left the depot, and
    /// release its vehicle holds.
    pub async fn cancel_shipment(
        &self,
        shipment_id: ShipmentId,
        reason: &str,
    ) -> Result<ApplyResult, LifecycleError> {
        let now = self.clock.now();
        let mut staged = Staged::new(now);
        let res = self.stage_cancel(&mut staged, shipment_id, now).await?;
        self.commit(staged).await?;
        info!(%shipment_id, reason, "shipment cancelled");
        Ok(res)
    }

    pub(crate) async fn stage_cancel(
        &self,
        staged: &mut Staged,
        shipment_id: ShipmentId,
        now: DateTime<Utc>,
    ) -> Result<ApplyResult, LifecycleError> {
        let snap = self.store.load_shipment(shipment_id).await?;
        let open: Vec<PackageId> = snap
            .packages
            .iter()
            .filter(|p| !p.status.is_terminal())
            .map(|p| p.id)
            .collect();

        let mut change = ShipmentChange::new(snap);
        change.apply_order(OrderEvent::Cancelled, now)?;
        for id in open {
            change.apply_package(id, PackageEvent::Cancelled, Via::Direct, now)?;
        }
        change.rederive(now)?;

        for mut trip in self.store.trips_for_shipment(shipment_id).await? {
            if trip.status == TripStatus::Active {
                trip.status = TripStatus::Closed;
                trip.closed_at = Some(now);
                staged.uow.trips.push(Write::updated(trip));
            }
        }
        Ok(staged.shipment(change))
    }

    // -----------------------------------------------------------------------
    // Commit / notify
    // -----------------------------------------------------------------------

    pub(crate) async fn commit(&self, staged: Staged) -> Result<(), LifecycleError> {
        let Staged { uow, notices } = staged;
        if !uow.is_empty() {
            self.store.commit(uow).await?;
        }
        self.dispatch(notices).await;
        Ok(())
    }

    pub(crate) async fn dispatch(&self, notices: Vec<Notification>) {
        for n in notices {
            let (role, kind) = (n.role, n.kind);
            if let Err(err) = self.notifier.notify(n).await {
                warn!(%role, %kind, error = %err, "notification dispatch failed");
            }
        }
    }

    async fn ensure_trips_closed(&self, shipment_id: ShipmentId) -> Result<(), LifecycleError> {
        let trips = self.store.trips_for_shipment(shipment_id).await?;
        match trips.iter().find(|t| t.status == TripStatus::Active) {
            Some(t) => Err(LifecycleError::validation(format!(
                "trip {} of shipment {shipment_id} is still active",
                t.id
            ))),
            None => Ok(()),
        }
    }
}

fn log_result(what: &'static str, event: &'static str, res: &ApplyResult) {
    match res.order_changed {
        Some(c) => info!(
            shipment_id = %res.shipment_id,
            event,
            from = %c.from,
            to = %c.to,
            "{what}: order status changed"
        ),
        None => info!(
            shipment_id = %res.shipment_id,
            event,
            order_status = %res.order_status,
            packages_changed = res.package_changes.len(),
            "{what} applied"
        ),
    }
}
