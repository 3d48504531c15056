//! A writer that lost an optimistic-version race gets `StaleWrite` and leaves
//! no partial change behind: packages, order, trips and vehicle holds stay as
//! the winner left them.

use fl_lifecycle::{LifecycleError, TripEvent};
use fl_schemas::{OrderStatus, PackageStatus, ReservationStatus, VehicleId};
use fl_status::PackageEvent;
use fl_testkit::Harness;

#[tokio::test]
async fn package_event_on_a_moved_shipment_is_stale() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, _trip) = h.shipment_in_transit(2).await?;
    let id = snap.shipment.id;
    let pkg = snap.packages[0].id;

    h.store.interleave_before_next_commit(move |t| {
        if let Some(s) = t.shipments.iter_mut().find(|s| s.id == id) {
            s.version += 1;
        }
    });
    h.notifier.clear();

    let err = h
        .coordinator
        .on_package_event(pkg, PackageEvent::NearingDestination)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::StaleWrite { .. }), "{err}");

    let after = h.coordinator.shipment(id).await?;
    assert_eq!(after.package(pkg).map(|p| p.status), Some(PackageStatus::OnDelivered));
    assert_eq!(after.shipment.status, OrderStatus::OnDelivered);
    assert!(h.notifier.all().is_empty(), "nothing is announced for a lost race");

    // A retry on fresh state goes through.
    let res = h
        .coordinator
        .on_package_event(pkg, PackageEvent::NearingDestination)
        .await?;
    assert_eq!(res.order_status, OrderStatus::OngoingDelivered);
    Ok(())
}

#[tokio::test]
async fn stale_assignment_gives_the_vehicle_back() -> anyhow::Result<()> {
    let h = Harness::new();
    let vehicle = VehicleId::new();
    let snap = h.paid_shipment(1).await?;
    let pkg = snap.packages[0].id;

    h.store.interleave_before_next_commit(move |t| {
        if let Some(p) = t.packages.iter_mut().find(|p| p.id == pkg) {
            p.version += 1;
        }
    });
    let err = h.assign_all(&snap, vehicle).await.unwrap_err();
    assert!(matches!(err, LifecycleError::StaleWrite { .. }), "{err}");

    assert!(h.store.dump().trips.is_empty());
    let holds = h.reservations_for(snap.shipment.id).await?;
    assert_eq!(holds.len(), 1);
    assert_eq!(holds[0].status, ReservationStatus::Cancelled);
    assert!(h
        .coordinator
        .guard()
        .is_available(vehicle, h.trip_date(), None, h.now())
        .await?);

    h.assign_all(&snap, vehicle).await?;
    Ok(())
}

#[tokio::test]
async fn stale_trip_event_changes_no_package() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, trip) = h.shipment_in_transit(3).await?;
    h.store.touch_shipment(snap.shipment.id);

    // The coordinator loads after the touch, so this one succeeds.
    h.coordinator
        .on_trip_event(trip.id, TripEvent::NearingDestination)
        .await?;

    let id = snap.shipment.id;
    h.store.interleave_before_next_commit(move |t| {
        if let Some(s) = t.shipments.iter_mut().find(|s| s.id == id) {
            s.version += 1;
        }
    });
    let err = h
        .coordinator
        .on_trip_event(trip.id, TripEvent::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::StaleWrite { .. }), "{err}");

    let after = h.coordinator.shipment(id).await?;
    assert!(after
        .packages
        .iter()
        .all(|p| p.status == PackageStatus::OngoingDelivered));
    assert_eq!(after.shipment.status, OrderStatus::OngoingDelivered);
    Ok(())
}

#[tokio::test]
async fn sibling_package_race_cannot_leave_order_stale() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, _trip) = h.shipment_in_transit(2).await?;
    let id = snap.shipment.id;
    let (a, b) = (snap.packages[0].id, snap.packages[1].id);
    for pkg in [a, b] {
        h.coordinator
            .on_package_event(pkg, PackageEvent::NearingDestination)
            .await?;
    }

    let before = h.coordinator.shipment(id).await?.shipment.version;

    // A concurrent writer delivers B (bumping B and the shipment) after this
    // writer loaded the snapshot in which B is still on its way.
    h.store.interleave_before_next_commit(move |t| {
        if let Some(p) = t.packages.iter_mut().find(|p| p.id == b) {
            p.status = PackageStatus::Delivered;
            p.version += 1;
        }
        if let Some(s) = t.shipments.iter_mut().find(|s| s.id == id) {
            s.version += 1;
        }
    });
    let err = h
        .coordinator
        .on_package_event(a, PackageEvent::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::StaleWrite { .. }), "{err}");

    let after = h.coordinator.shipment(id).await?;
    assert_eq!(after.package(a).map(|p| p.status), Some(PackageStatus::OngoingDelivered));

    // Retried on fresh state, the last delivery completes the order.
    let res = h.coordinator.on_package_event(a, PackageEvent::Delivered).await?;
    assert_eq!(res.order_status, OrderStatus::Delivered);
    let after = h.coordinator.shipment(id).await?;
    assert!(after
        .packages
        .iter()
        .all(|p| p.status == PackageStatus::Delivered));
    assert_eq!(after.shipment.status, OrderStatus::Delivered);
    assert!(after.shipment.version > before);
    Ok(())
}
