//! Seams to the world outside the coordinator: persistence, notification
//! delivery and time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fl_reservation::ReservationStore;
use fl_schemas::{
    CompensationAssessment, Issue, IssueId, IssueSnapshot, Notification, OffRouteEvent,
    OffRouteEventId, Package, PackageId, Shipment, ShipmentId, ShipmentSnapshot, StoreError,
    Trip, TripId, Versioned,
};

// ---------------------------------------------------------------------------
// Unit of work
// ---------------------------------------------------------------------------

/// One record write inside a [`UnitOfWork`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write<T> {
    Insert(T),
    /// Store `record` only if the stored version still equals `expected_version`.
    Update { record: T, expected_version: i64 },
}

impl<T: Versioned> Write<T> {
    /// Update of a record loaded at its current `version`. Bumps the version.
    pub fn updated(mut record: T) -> Self {
        let expected_version = record.version();
        record.set_version(expected_version + 1);
        Write::Update {
            record,
            expected_version,
        }
    }

    pub fn record(&self) -> &T {
        match self {
            Write::Insert(r) | Write::Update { record: r, .. } => r,
        }
    }
}

/// Reservation change committed together with entity writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOp {
    Consume(ShipmentId),
    Release(ShipmentId),
    ClearDeadline(ShipmentId),
}

/// Everything one coordinator operation persists.
///
/// A store applies it all-or-nothing: any stale version or missing record
/// aborts the whole unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOfWork {
    pub at: DateTime<Utc>,
    pub shipments: Vec<Write<Shipment>>,
    pub packages: Vec<Write<Package>>,
    pub trips: Vec<Write<Trip>>,
    pub offroute_events: Vec<Write<OffRouteEvent>>,
    pub issues: Vec<Write<Issue>>,
    pub assessments: Vec<Write<CompensationAssessment>>,
    pub reservations: Vec<ReservationOp>,
}

impl UnitOfWork {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            shipments: Vec::new(),
            packages: Vec::new(),
            trips: Vec::new(),
            offroute_events: Vec::new(),
            issues: Vec::new(),
            assessments: Vec::new(),
            reservations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
            && self.packages.is_empty()
            && self.trips.is_empty()
            && self.offroute_events.is_empty()
            && self.issues.is_empty()
            && self.assessments.is_empty()
            && self.reservations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Persistence for everything the coordinator touches.
///
/// Loads return `StoreError::NotFound` for unknown ids. `commit` applies a
/// [`UnitOfWork`] atomically and enforces optimistic versions.
#[async_trait]
pub trait LifecycleStore: ReservationStore {
    async fn load_shipment(&self, id: ShipmentId) -> Result<ShipmentSnapshot, StoreError>;

    async fn load_package(&self, id: PackageId) -> Result<Package, StoreError>;

    async fn load_trip(&self, id: TripId) -> Result<Trip, StoreError>;

    async fn trips_for_shipment(&self, id: ShipmentId) -> Result<Vec<Trip>, StoreError>;

    /// The non-terminal off-route event of a trip, if any.
    async fn active_offroute_event(&self, trip: TripId) -> Result<Option<OffRouteEvent>, StoreError>;

    async fn load_offroute_event(&self, id: OffRouteEventId) -> Result<OffRouteEvent, StoreError>;

    async fn active_offroute_events(&self) -> Result<Vec<OffRouteEvent>, StoreError>;

    async fn load_issue(&self, id: IssueId) -> Result<IssueSnapshot, StoreError>;

    async fn issues_for_shipment(&self, id: ShipmentId) -> Result<Vec<Issue>, StoreError>;

    async fn commit(&self, uow: UnitOfWork) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Notification / clock
// ---------------------------------------------------------------------------

/// Delivery of notifications (push, e-mail, websocket) lives behind this.
/// Called after the commit; failures are logged and never undo the change.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
