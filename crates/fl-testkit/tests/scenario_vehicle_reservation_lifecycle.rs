use std::sync::Arc;

use chrono::Duration;
use fl_lifecycle::{LifecycleError, VehicleSlot};
use fl_schemas::{
    NotificationKind, OrderStatus, PackageStatus, ReservationStatus, Role, VehicleId,
};
use fl_status::OrderEvent;
use fl_testkit::Harness;
use tokio::sync::Barrier;

#[tokio::test]
async fn conflicting_assignment_writes_nothing() -> anyhow::Result<()> {
    let h = Harness::new();
    let vehicle = VehicleId::new();
    let a = h.paid_shipment(1).await?;
    let b = h.paid_shipment(2).await?;
    h.assign_all(&a, vehicle).await?;
    let commits = h.store.commit_count();
    let notices = h.notifier.all().len();

    let err = h.assign_all(&b, vehicle).await.unwrap_err();
    match &err {
        LifecycleError::ReservationConflict { holder, vehicle_id, .. } => {
            assert_eq!(*holder, a.shipment.id);
            assert_eq!(*vehicle_id, vehicle);
        }
        other => panic!("expected conflict, got {other}"),
    }
    assert!(err.is_business_outcome());

    assert_eq!(h.store.commit_count(), commits);
    assert_eq!(h.notifier.all().len(), notices);
    let b_after = h.coordinator.shipment(b.shipment.id).await?;
    assert_eq!(b_after.shipment.status, OrderStatus::FullyPaid);
    assert!(b_after
        .packages
        .iter()
        .all(|p| p.status == PackageStatus::OnPlanning && p.trip_id.is_none()));
    assert_eq!(h.store.dump().trips.len(), 1);
    assert!(h.reservations_for(b.shipment.id).await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assignments_have_one_winner() -> anyhow::Result<()> {
    const CONTENDERS: usize = 8;
    let h = Arc::new(Harness::new());
    let vehicle = VehicleId::new();
    let mut shipments = Vec::new();
    for _ in 0..CONTENDERS {
        shipments.push(h.paid_shipment(1).await?);
    }

    let barrier = Arc::new(Barrier::new(CONTENDERS));
    let mut tasks = Vec::new();
    for snap in shipments {
        let h = h.clone();
        let barrier = barrier.clone();
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            h.assign_all(&snap, vehicle).await
        }));
    }

    let mut won = 0;
    let mut lost = 0;
    for t in tasks {
        match t.await? {
            Ok(_) => won += 1,
            Err(LifecycleError::ReservationConflict { .. }) => lost += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(lost, CONTENDERS - 1);

    let tables = h.store.dump();
    assert_eq!(tables.trips.len(), 1);
    let holding: Vec<_> = tables
        .reservations
        .rows()
        .iter()
        .filter(|r| r.status.holds_slot())
        .collect();
    assert_eq!(holding.len(), 1);
    assert_eq!(holding[0].shipment_id, tables.trips[0].shipment_id);
    Ok(())
}

#[tokio::test]
async fn deposit_hold_is_reused_by_the_same_shipment() -> anyhow::Result<()> {
    let h = Harness::new();
    let vehicle = VehicleId::new();
    let snap = h.signed_shipment(1).await?;
    let slot = VehicleSlot {
        vehicle_id: vehicle,
        trip_date: h.trip_date(),
    };

    let res = h.coordinator.confirm_deposit(snap.shipment.id, &[slot]).await?;
    assert_eq!(res.order_status, OrderStatus::OnPlanning);
    let holds = h.store.reservations();
    assert_eq!(holds.len(), 1);
    assert_eq!(holds[0].status, ReservationStatus::Reserved);
    let deadline = h.coordinator.guard().payment_deadline(h.trip_date());
    assert_eq!(holds[0].expires_at, Some(deadline));

    h.coordinator
        .on_order_event(snap.shipment.id, OrderEvent::FullyPaid)
        .await?;
    assert_eq!(h.store.reservations()[0].expires_at, None);

    h.assign_all(&snap, vehicle).await?;
    let holds = h.store.reservations();
    assert_eq!(holds.len(), 1, "no second row for the same shipment");
    assert_eq!(holds[0].status, ReservationStatus::Consumed);
    Ok(())
}

#[tokio::test]
async fn deposit_on_a_taken_slot_aborts_the_deposit() -> anyhow::Result<()> {
    let h = Harness::new();
    let vehicle = VehicleId::new();
    let free = VehicleId::new();
    let a = h.signed_shipment(1).await?;
    let b = h.signed_shipment(1).await?;
    let slot = |vehicle_id| VehicleSlot {
        vehicle_id,
        trip_date: h.trip_date(),
    };
    h.coordinator.confirm_deposit(a.shipment.id, &[slot(vehicle)]).await?;

    let err = h
        .coordinator
        .confirm_deposit(b.shipment.id, &[slot(free), slot(vehicle)])
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::ReservationConflict { .. }), "{err}");

    // The hold on the free vehicle taken earlier in the call was given back.
    let b_holds = h.reservations_for(b.shipment.id).await?;
    assert!(b_holds.iter().all(|r| r.status == ReservationStatus::Cancelled));
    assert!(h.coordinator.guard().is_available(free, h.trip_date(), None, h.now()).await?);
    let b_after = h.coordinator.shipment(b.shipment.id).await?;
    assert_eq!(b_after.shipment.status, OrderStatus::ContractSigned);
    Ok(())
}

#[tokio::test]
async fn deposit_too_close_to_the_trip_is_rejected() -> anyhow::Result<()> {
    let h = Harness::new();
    let snap = h.signed_shipment(1).await?;
    let slot = VehicleSlot {
        vehicle_id: VehicleId::new(),
        trip_date: h.now().date_naive(),
    };

    let err = h
        .coordinator
        .confirm_deposit(snap.shipment.id, &[slot])
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)), "{err}");
    assert!(h.store.reservations().is_empty());
    Ok(())
}

#[tokio::test]
async fn unpaid_shipment_is_cancelled_when_its_hold_lapses() -> anyhow::Result<()> {
    let h = Harness::new();
    let vehicle = VehicleId::new();
    let snap = h.signed_shipment(2).await?;
    let id = snap.shipment.id;
    h.coordinator
        .confirm_deposit(
            id,
            &[VehicleSlot {
                vehicle_id: vehicle,
                trip_date: h.trip_date(),
            }],
        )
        .await?;

    // Before the deadline the sweep leaves it alone.
    let report = h.coordinator.sweep_reservations().await?;
    assert!(report.expired.is_empty());

    h.advance(Duration::days(2));
    let report = h.coordinator.sweep_reservations().await?;
    assert_eq!(report.expired.len(), 1);
    assert_eq!(report.cancelled_shipments, vec![id]);
    assert_eq!(report.failed, 0);

    let after = h.coordinator.shipment(id).await?;
    assert_eq!(after.shipment.status, OrderStatus::Cancelled);
    assert!(after.packages.iter().all(|p| p.status == PackageStatus::Cancelled));
    assert_eq!(h.store.reservations()[0].status, ReservationStatus::Cancelled);
    assert_eq!(h.notifier.count(Role::Customer, NotificationKind::ReservationExpired), 1);
    assert_eq!(h.notifier.count(Role::Staff, NotificationKind::ReservationExpired), 1);

    // A second sweep finds nothing.
    let report = h.coordinator.sweep_reservations().await?;
    assert!(report.expired.is_empty());
    Ok(())
}

#[tokio::test]
async fn lapsed_hold_does_not_block_another_shipment() -> anyhow::Result<()> {
    let h = Harness::new();
    let vehicle = VehicleId::new();
    let unpaid = h.signed_shipment(1).await?;
    h.coordinator
        .confirm_deposit(
            unpaid.shipment.id,
            &[VehicleSlot {
                vehicle_id: vehicle,
                trip_date: h.trip_date(),
            }],
        )
        .await?;
    let paid = h.paid_shipment(1).await?;

    h.advance(Duration::days(2));
    h.notifier.clear();
    // No sweep has run yet; the lapsed hold still gives way.
    h.assign_all(&paid, vehicle).await?;

    // The displaced shipment is expired right away, exactly as the sweep
    // would have done it.
    let after = h.coordinator.shipment(unpaid.shipment.id).await?;
    assert_eq!(after.shipment.status, OrderStatus::Cancelled);
    assert!(after.packages.iter().all(|p| p.status == PackageStatus::Cancelled));
    let holds = h.reservations_for(unpaid.shipment.id).await?;
    assert_eq!(holds.len(), 1);
    assert_eq!(holds[0].status, ReservationStatus::Cancelled);
    assert_eq!(h.notifier.count(Role::Customer, NotificationKind::ReservationExpired), 1);
    assert_eq!(h.notifier.count(Role::Staff, NotificationKind::ReservationExpired), 1);

    let report = h.coordinator.sweep_reservations().await?;
    assert!(report.expired.is_empty());
    assert!(report.cancelled_shipments.is_empty());
    Ok(())
}

#[tokio::test]
async fn deposit_inside_the_payment_lead_takes_no_hold() -> anyhow::Result<()> {
    let h = Harness::new();
    let vehicle = VehicleId::new();
    let snap = h.signed_shipment(1).await?;
    h.advance(Duration::days(2) + Duration::hours(1));

    let err = h
        .coordinator
        .confirm_deposit(
            snap.shipment.id,
            &[VehicleSlot {
                vehicle_id: vehicle,
                trip_date: h.trip_date(),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)), "{err}");
    assert!(h.store.reservations().is_empty());

    // The guard itself refuses the dead hold as well.
    let direct = h
        .coordinator
        .guard()
        .reserve(vehicle, h.trip_date(), snap.shipment.id, h.now())
        .await;
    assert!(matches!(
        direct,
        Err(fl_reservation::ReservationError::DeadlinePassed { .. })
    ));
    assert!(h.store.reservations().is_empty());
    Ok(())
}

#[tokio::test]
async fn cancellation_releases_the_vehicle() -> anyhow::Result<()> {
    let h = Harness::new();
    let vehicle = VehicleId::new();
    let a = h.paid_shipment(1).await?;
    let b = h.paid_shipment(1).await?;
    h.assign_all(&a, vehicle).await?;

    let res = h.coordinator.cancel_shipment(a.shipment.id, "customer withdrew").await?;
    assert_eq!(res.order_status, OrderStatus::Cancelled);
    assert!(h
        .reservations_for(a.shipment.id)
        .await?
        .iter()
        .all(|r| r.status == ReservationStatus::Cancelled));
    assert!(h
        .store
        .dump()
        .trips
        .iter()
        .all(|t| t.status == fl_schemas::TripStatus::Closed));

    h.assign_all(&b, vehicle).await?;
    Ok(())
}

#[tokio::test]
async fn moving_goods_cannot_be_cancelled() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, _trip) = h.shipment_in_transit(1).await?;

    let err = h
        .coordinator
        .cancel_shipment(snap.shipment.id, "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition(_)), "{err}");
    let holds = h.reservations_for(snap.shipment.id).await?;
    assert_eq!(holds[0].status, ReservationStatus::Consumed);
    Ok(())
}
