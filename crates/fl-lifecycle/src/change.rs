//! Working copy of one shipment while an operation is being applied.
//!
//! Every package and order transition goes through here, and the shipment's
//! derived status is recomputed before anything is written, so the order and
//! its packages always land in the same unit of work.

use chrono::{DateTime, Utc};
use fl_schemas::{
    Notification, NotificationKind, OrderStatus, PackageId, PackageStatus, ShipmentSnapshot,
    TripId,
};
use fl_status::{
    derive_order_event, requires_issue, Applied, OrderEvent, PackageEvent, StatusEvent,
    ORDER_TRANSITIONS, PACKAGE_TRANSITIONS,
};
use serde_json::json;

use crate::{
    ApplyResult, LifecycleError, PackageChange, SkippedPackage, StatusChange, UnitOfWork, Write,
};

/// Who is driving a package transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Via {
    /// A caller-supplied package or trip event.
    Direct,
    /// Issue handling, the only path into and out of IN_TROUBLES / COMPENSATION.
    Issue,
}

pub(crate) struct ShipmentChange {
    snap: ShipmentSnapshot,
    original_order: OrderStatus,
    dirty: Vec<PackageId>,
    package_changes: Vec<PackageChange>,
    skipped: Vec<SkippedPackage>,
}

impl ShipmentChange {
    pub(crate) fn new(snap: ShipmentSnapshot) -> Self {
        let original_order = snap.shipment.status;
        Self {
            snap,
            original_order,
            dirty: Vec::new(),
            package_changes: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub(crate) fn snapshot(&self) -> &ShipmentSnapshot {
        &self.snap
    }

    pub(crate) fn order_status(&self) -> OrderStatus {
        self.snap.shipment.status
    }

    pub(crate) fn package_status(&self, id: PackageId) -> Result<PackageStatus, LifecycleError> {
        self.snap
            .package(id)
            .map(|p| p.status)
            .ok_or_else(|| LifecycleError::NotFound {
                entity: "package",
                id: format!("{id} in shipment {}", self.snap.shipment.id),
            })
    }

    pub(crate) fn apply_order(
        &mut self,
        event: OrderEvent,
        now: DateTime<Utc>,
    ) -> Result<Applied<OrderStatus>, LifecycleError> {
        let shipment = &mut self.snap.shipment;
        let applied = ORDER_TRANSITIONS.apply_in_place(&mut shipment.status, event)?;
        if applied.is_changed() {
            shipment.updated_at = now;
        }
        Ok(applied)
    }

    pub(crate) fn apply_package(
        &mut self,
        id: PackageId,
        event: PackageEvent,
        via: Via,
        now: DateTime<Utc>,
    ) -> Result<Applied<PackageStatus>, LifecycleError> {
        let pkg = self
            .snap
            .packages
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| LifecycleError::NotFound {
                entity: "package",
                id: id.to_string(),
            })?;

        if via == Via::Direct && event.target() != pkg.status && requires_issue(pkg.status, event) {
            return Err(LifecycleError::IssueRequired {
                package_id: id,
                event: event.name(),
            });
        }

        let applied = PACKAGE_TRANSITIONS.apply_in_place(&mut pkg.status, event)?;
        if let Applied::Changed { from, to } = applied {
            pkg.updated_at = now;
            if !self.dirty.contains(&id) {
                self.dirty.push(id);
            }
            self.package_changes.push(PackageChange {
                package_id: id,
                from,
                to,
            });
        }
        Ok(applied)
    }

    pub(crate) fn set_trip(&mut self, id: PackageId, trip: TripId) {
        if let Some(p) = self.snap.packages.iter_mut().find(|p| p.id == id) {
            p.trip_id = Some(trip);
            if !self.dirty.contains(&id) {
                self.dirty.push(id);
            }
        }
    }

    pub(crate) fn skip(&mut self, id: PackageId, status: PackageStatus) {
        self.skipped.push(SkippedPackage {
            package_id: id,
            status,
        });
    }

    /// Bring the order status in line with its packages.
    pub(crate) fn rederive(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        let statuses = self.snap.package_statuses();
        if let Some(event) = derive_order_event(self.order_status(), &statuses)? {
            self.apply_order(event, now)?;
        }
        Ok(())
    }

    /// Queue the writes and build the caller-facing result plus the customer
    /// notification for an order status change.
    pub(crate) fn finish(self, uow: &mut UnitOfWork) -> (ApplyResult, Option<Notification>) {
        let ShipmentChange {
            snap,
            original_order,
            dirty,
            package_changes,
            skipped,
        } = self;

        let order_status = snap.shipment.status;
        let order_changed = (order_status != original_order).then_some(StatusChange {
            from: original_order,
            to: order_status,
        });
        let shipment_id = snap.shipment.id;

        // Any package write also claims the shipment row, so a concurrent
        // writer that derived the order from stale siblings loses with StaleWrite.
        if order_changed.is_some() || !dirty.is_empty() {
            uow.shipments.push(Write::updated(snap.shipment));
        }
        for p in snap.packages.into_iter().filter(|p| dirty.contains(&p.id)) {
            uow.packages.push(Write::updated(p));
        }

        let notice = order_changed.map(|c| {
            Notification::customer(
                NotificationKind::OrderStatusChanged,
                json!({
                    "shipment_id": shipment_id,
                    "from": c.from,
                    "to": c.to,
                }),
            )
        });

        (
            ApplyResult {
                shipment_id,
                order_status,
                order_changed,
                package_changes,
                skipped,
            },
            notice,
        )
    }
}
