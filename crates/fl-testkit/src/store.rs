//! In-memory `LifecycleStore`.
//!
//! One mutex covers every table, so a commit is trivially atomic: all writes
//! are validated against the current state first and applied only if every
//! one of them passes.

use std::collections::HashSet;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fl_lifecycle::{LifecycleStore, ReservationOp, UnitOfWork, Write};
use fl_reservation::{NewReservation, ReservationBook, ReservationStore, ReserveOutcome};
use fl_schemas::{
    CompensationAssessment, Issue, IssueId, IssueSnapshot, OffRouteEvent, OffRouteEventId,
    Package, PackageId, ReservationId, Shipment, ShipmentId, ShipmentSnapshot, StoreError, Trip,
    TripId, VehicleId, VehicleReservation, Versioned,
};
use parking_lot::Mutex;

/// Every table the coordinator writes.
#[derive(Debug, Default, Clone)]
pub struct Tables {
    pub shipments: Vec<Shipment>,
    pub packages: Vec<Package>,
    pub trips: Vec<Trip>,
    pub offroute_events: Vec<OffRouteEvent>,
    pub issues: Vec<Issue>,
    pub assessments: Vec<CompensationAssessment>,
    pub reservations: ReservationBook,
}

type Interleave = Box<dyn FnOnce(&mut Tables) + Send>;

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    before_commit: Mutex<Option<Interleave>>,
    commits: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every table.
    pub fn dump(&self) -> Tables {
        self.tables.lock().clone()
    }

    pub fn reservations(&self) -> Vec<VehicleReservation> {
        self.tables.lock().reservations.rows().to_vec()
    }

    /// Number of units of work applied so far.
    pub fn commit_count(&self) -> u64 {
        *self.commits.lock()
    }

    /// Run `f` against the tables right before the next commit validates, as
    /// if a concurrent writer got there first.
    pub fn interleave_before_next_commit(&self, f: impl FnOnce(&mut Tables) + Send + 'static) {
        *self.before_commit.lock() = Some(Box::new(f));
    }

    /// Bump a shipment's version behind the coordinator's back.
    pub fn touch_shipment(&self, id: ShipmentId) {
        if let Some(s) = self.tables.lock().shipments.iter_mut().find(|s| s.id == id) {
            s.version += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Validation / apply
// ---------------------------------------------------------------------------

fn check<T: Versioned>(rows: &[T], writes: &[Write<T>]) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for w in writes {
        let key = w.record().key();
        if !seen.insert(key) {
            return Err(StoreError::Backend(anyhow!(
                "{} {key} written twice in one unit of work",
                T::ENTITY
            )));
        }
        let stored = rows.iter().find(|r| r.key() == key);
        match (w, stored) {
            (Write::Insert(_), Some(_)) => {
                return Err(StoreError::Backend(anyhow!("duplicate {} {key}", T::ENTITY)));
            }
            (Write::Insert(_), None) => {}
            (Write::Update { .. }, None) => return Err(StoreError::not_found(T::ENTITY, key)),
            (Write::Update { expected_version, .. }, Some(r)) => {
                if r.version() != *expected_version {
                    return Err(StoreError::stale(T::ENTITY, key, *expected_version));
                }
            }
        }
    }
    Ok(())
}

fn apply<T: Versioned>(rows: &mut Vec<T>, writes: Vec<Write<T>>) {
    for w in writes {
        match w {
            Write::Insert(record) => rows.push(record),
            Write::Update { record, .. } => {
                if let Some(slot) = rows.iter_mut().find(|r| r.key() == record.key()) {
                    *slot = record;
                }
            }
        }
    }
}

/// At most one active off-route event per trip, as the partial unique index
/// enforces in Postgres.
fn check_single_active_offroute(
    rows: &[OffRouteEvent],
    writes: &[Write<OffRouteEvent>],
) -> Result<(), StoreError> {
    for w in writes {
        let ev = w.record();
        if !ev.status.is_active() {
            continue;
        }
        let clash = rows
            .iter()
            .any(|r| r.trip_id == ev.trip_id && r.id != ev.id && r.status.is_active());
        if clash {
            return Err(StoreError::Backend(anyhow!(
                "trip {} already has an active off-route event",
                ev.trip_id
            )));
        }
    }
    Ok(())
}

fn commit_into(t: &mut Tables, uow: UnitOfWork) -> Result<(), StoreError> {
    check(&t.shipments, &uow.shipments)?;
    check(&t.packages, &uow.packages)?;
    check(&t.trips, &uow.trips)?;
    check(&t.offroute_events, &uow.offroute_events)?;
    check_single_active_offroute(&t.offroute_events, &uow.offroute_events)?;
    check(&t.issues, &uow.issues)?;
    check(&t.assessments, &uow.assessments)?;

    let at = uow.at;
    apply(&mut t.shipments, uow.shipments);
    apply(&mut t.packages, uow.packages);
    apply(&mut t.trips, uow.trips);
    apply(&mut t.offroute_events, uow.offroute_events);
    apply(&mut t.issues, uow.issues);
    apply(&mut t.assessments, uow.assessments);
    for op in uow.reservations {
        match op {
            ReservationOp::Consume(s) => t.reservations.consume(s, at),
            ReservationOp::Release(s) => t.reservations.release(s, at),
            ReservationOp::ClearDeadline(s) => t.reservations.clear_deadline(s, at),
        };
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn try_reserve(
        &self,
        req: NewReservation,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, StoreError> {
        Ok(self.tables.lock().reservations.try_reserve(req, now))
    }

    async fn consume(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.tables.lock().reservations.consume(shipment, now))
    }

    async fn release(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.tables.lock().reservations.release(shipment, now))
    }

    async fn release_one(&self, id: ReservationId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.tables.lock().reservations.release_one(id, now))
    }

    async fn clear_deadline(
        &self,
        shipment: ShipmentId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self.tables.lock().reservations.clear_deadline(shipment, now))
    }

    async fn active_holder(
        &self,
        vehicle: VehicleId,
        trip_date: NaiveDate,
        exclude: Option<ShipmentId>,
        now: DateTime<Utc>,
    ) -> Result<Option<VehicleReservation>, StoreError> {
        Ok(self
            .tables
            .lock()
            .reservations
            .active_holder(vehicle, trip_date, exclude, now))
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<VehicleReservation>, StoreError> {
        Ok(self.tables.lock().reservations.expire_due(now))
    }

    async fn list_for_shipment(
        &self,
        shipment: ShipmentId,
    ) -> Result<Vec<VehicleReservation>, StoreError> {
        Ok(self.tables.lock().reservations.for_shipment(shipment))
    }
}

#[async_trait]
impl LifecycleStore for MemoryStore {
    async fn load_shipment(&self, id: ShipmentId) -> Result<ShipmentSnapshot, StoreError> {
        let t = self.tables.lock();
        let shipment = t
            .shipments
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("shipment", id))?;
        let packages = t
            .packages
            .iter()
            .filter(|p| p.shipment_id == id)
            .cloned()
            .collect();
        Ok(ShipmentSnapshot { shipment, packages })
    }

    async fn load_package(&self, id: PackageId) -> Result<Package, StoreError> {
        self.tables
            .lock()
            .packages
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("package", id))
    }

    async fn load_trip(&self, id: TripId) -> Result<Trip, StoreError> {
        self.tables
            .lock()
            .trips
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("trip", id))
    }

    async fn trips_for_shipment(&self, id: ShipmentId) -> Result<Vec<Trip>, StoreError> {
        Ok(self
            .tables
            .lock()
            .trips
            .iter()
            .filter(|t| t.shipment_id == id)
            .cloned()
            .collect())
    }

    async fn active_offroute_event(&self, trip: TripId) -> Result<Option<OffRouteEvent>, StoreError> {
        Ok(self
            .tables
            .lock()
            .offroute_events
            .iter()
            .find(|e| e.trip_id == trip && e.status.is_active())
            .cloned())
    }

    async fn load_offroute_event(&self, id: OffRouteEventId) -> Result<OffRouteEvent, StoreError> {
        self.tables
            .lock()
            .offroute_events
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("off-route event", id))
    }

    async fn active_offroute_events(&self) -> Result<Vec<OffRouteEvent>, StoreError> {
        Ok(self
            .tables
            .lock()
            .offroute_events
            .iter()
            .filter(|e| e.status.is_active())
            .cloned()
            .collect())
    }

    async fn load_issue(&self, id: IssueId) -> Result<IssueSnapshot, StoreError> {
        let t = self.tables.lock();
        let issue = t
            .issues
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("issue", id))?;
        let assessment = t.assessments.iter().find(|a| a.issue_id == id).cloned();
        Ok(IssueSnapshot { issue, assessment })
    }

    async fn issues_for_shipment(&self, id: ShipmentId) -> Result<Vec<Issue>, StoreError> {
        Ok(self
            .tables
            .lock()
            .issues
            .iter()
            .filter(|i| i.shipment_id == id)
            .cloned()
            .collect())
    }

    async fn commit(&self, uow: UnitOfWork) -> Result<(), StoreError> {
        let hook = self.before_commit.lock().take();
        let mut t = self.tables.lock();
        if let Some(hook) = hook {
            hook(&mut t);
        }
        commit_into(&mut t, uow)?;
        *self.commits.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fl_schemas::OrderStatus;

    fn shipment(version: i64) -> Shipment {
        let now = Utc::now();
        Shipment {
            id: ShipmentId::new(),
            status: OrderStatus::Pending,
            version,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn stale_update_aborts_the_whole_unit() {
        let store = MemoryStore::new();
        let s = shipment(0);
        let mut uow = UnitOfWork::new(Utc::now());
        uow.shipments.push(Write::Insert(s.clone()));
        store.commit(uow).await.unwrap();

        store.touch_shipment(s.id);

        let other = shipment(0);
        let mut uow = UnitOfWork::new(Utc::now());
        uow.shipments.push(Write::Insert(other.clone()));
        uow.shipments.push(Write::updated(s.clone()));
        let err = store.commit(uow).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleWrite { .. }), "{err:?}");

        // The insert in the same unit did not land.
        assert!(store.load_shipment(other.id).await.is_err());
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_record_is_not_found() {
        let store = MemoryStore::new();
        let mut uow = UnitOfWork::new(Utc::now());
        uow.shipments.push(Write::updated(shipment(0)));
        let err = store.commit(uow).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }), "{err:?}");
    }
}
