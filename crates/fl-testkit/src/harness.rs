//! Fixture wiring a coordinator to the in-memory store, a recording notifier
//! and a manual clock, plus shortcuts to common shipment states.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use fl_lifecycle::{
    Clock, LifecycleError, LifecycleSettings, ShipmentLifecycleCoordinator, TripAssignment, TripEvent,
};
use fl_schemas::{
    AssessmentInput, DamageEvidence, DriverId, ShipmentId, ShipmentSnapshot, TelemetrySample, Trip,
    VehicleId, VehicleReservation,
};
use fl_status::OrderEvent;

use crate::{ManualClock, MemoryStore, RecordingNotifier};

/// 2026-03-02T08:00:00Z, a Monday morning.
pub const START_TS: i64 = 1_772_438_400;

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(START_TS, 0).unwrap_or_default()
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub coordinator: ShipmentLifecycleCoordinator,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(LifecycleSettings::default())
    }

    pub fn with_settings(settings: LifecycleSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let coordinator = ShipmentLifecycleCoordinator::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
            settings,
        );
        Self {
            store,
            notifier,
            clock,
            coordinator,
        }
    }

    /// Trip date used by the shortcuts: three days after the start.
    pub fn trip_date(&self) -> NaiveDate {
        (start_time() + Duration::days(3)).date_naive()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        self.clock.advance(by)
    }

    /// Registered and walked to CONTRACT_SIGNED.
    pub async fn signed_shipment(&self, packages: usize) -> Result<ShipmentSnapshot, LifecycleError> {
        let snap = self.coordinator.register_shipment(packages).await?;
        for ev in [
            OrderEvent::Process,
            OrderEvent::DraftContract,
            OrderEvent::SignContract,
        ] {
            self.coordinator.on_order_event(snap.shipment.id, ev).await?;
        }
        self.coordinator.shipment(snap.shipment.id).await
    }

    /// Deposit (without vehicle holds) and full payment: FULLY_PAID with
    /// every package ON_PLANNING.
    pub async fn paid_shipment(&self, packages: usize) -> Result<ShipmentSnapshot, LifecycleError> {
        let snap = self.signed_shipment(packages).await?;
        let id = snap.shipment.id;
        self.coordinator.confirm_deposit(id, &[]).await?;
        self.coordinator.on_order_event(id, OrderEvent::FullyPaid).await?;
        self.coordinator.shipment(id).await
    }

    /// Every package of `snap` on one trip with `vehicle` on [`Self::trip_date`].
    pub async fn assign_all(
        &self,
        snap: &ShipmentSnapshot,
        vehicle: VehicleId,
    ) -> Result<Trip, LifecycleError> {
        let (trip, _) = self
            .coordinator
            .assign_trip(TripAssignment {
                shipment_id: snap.shipment.id,
                vehicle_id: vehicle,
                driver_ids: vec![DriverId::new()],
                trip_date: self.trip_date(),
                package_ids: snap.packages.iter().map(|p| p.id).collect(),
            })
            .await?;
        Ok(trip)
    }

    /// Paid shipment on a trip whose packages are picked up and ON_DELIVERED.
    pub async fn shipment_in_transit(
        &self,
        packages: usize,
    ) -> Result<(ShipmentSnapshot, Trip), LifecycleError> {
        let snap = self.paid_shipment(packages).await?;
        let trip = self.assign_all(&snap, VehicleId::new()).await?;
        self.coordinator
            .on_trip_event(trip.id, TripEvent::PickupStarted)
            .await?;
        self.coordinator
            .on_trip_event(trip.id, TripEvent::PickedUp)
            .await?;
        let snap = self.coordinator.shipment(snap.shipment.id).await?;
        Ok((snap, trip))
    }

    pub async fn reservations_for(
        &self,
        shipment: ShipmentId,
    ) -> Result<Vec<VehicleReservation>, LifecycleError> {
        Ok(self.coordinator.guard().list_for_shipment(shipment).await?)
    }

    /// Telemetry sample for `trip` stamped with the current clock.
    pub fn sample(&self, trip: &Trip, on_route: bool) -> TelemetrySample {
        TelemetrySample {
            trip_id: trip.id,
            lat: 10.7769,
            lng: 106.7009,
            on_route,
            distance_from_route_m: (!on_route).then_some(850.0),
            recorded_at: self.clock.now(),
        }
    }
}

/// Insured, documented claim for half of a 2,000,000 declared value. The
/// package is half the load, so 37,500 of the fee is refunded.
pub fn insured_damage() -> AssessmentInput {
    AssessmentInput {
        has_insurance: true,
        has_documents: true,
        declared_value: Some(2_000_000),
        evidence: DamageEvidence::Ratio(0.5),
        freight_fee: 150_000,
        weight_share: Some(0.5),
    }
}

/// Uninsured claim without documents; capped at the legal limit.
pub fn uninsured_damage(market_estimate: i64) -> AssessmentInput {
    AssessmentInput {
        has_insurance: false,
        has_documents: false,
        declared_value: None,
        evidence: DamageEvidence::Amount(market_estimate),
        freight_fee: 100_000,
        weight_share: None,
    }
}
