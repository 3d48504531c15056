use chrono::Duration;
use fl_lifecycle::{IssueResolution, LifecycleError};
use fl_offroute::{OffRouteEffect, OffRouteError};
use fl_schemas::{
    IssueCategory, IssueReporter, IssueStatus, NotificationKind, OffRouteStatus, OrderStatus,
    PackageStatus, Role,
};
use fl_testkit::{insured_damage, Harness};

#[tokio::test]
async fn unattended_deviation_opens_runaway_issue_and_freezes_packages() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, trip) = h.shipment_in_transit(2).await?;

    let out = h.coordinator.ingest_telemetry(h.sample(&trip, false)).await?;
    let ev = out.event.expect("event opened");
    assert_eq!(ev.status, OffRouteStatus::Detected);

    h.advance(Duration::minutes(5));
    let report = h.coordinator.run_offroute_tick().await?;
    assert_eq!(report.advanced, 1);
    let ev = h.coordinator.active_offroute_event(trip.id).await?.expect("active");
    assert_eq!(ev.status, OffRouteStatus::YellowSent);

    h.advance(Duration::minutes(5));
    h.coordinator.run_offroute_tick().await?;
    let ev = h.coordinator.active_offroute_event(trip.id).await?.expect("active");
    assert_eq!(ev.status, OffRouteStatus::RedSent);
    assert_eq!(h.notifier.count(Role::Staff, NotificationKind::OffRouteWarning), 2);

    // Nothing happens inside the grace period.
    h.advance(Duration::minutes(19));
    let report = h.coordinator.run_offroute_tick().await?;
    assert_eq!(report.advanced, 0);

    h.advance(Duration::minutes(1));
    let report = h.coordinator.run_offroute_tick().await?;
    assert_eq!(report.issues_opened, 1);
    assert!(h.coordinator.active_offroute_event(trip.id).await?.is_none());

    let issues = h.coordinator.issues_for_shipment(snap.shipment.id).await?;
    assert_eq!(issues.len(), 1);
    let issue = &issues[0];
    assert_eq!(issue.category, IssueCategory::OffRouteRunaway);
    assert_eq!(issue.reporter, IssueReporter::System);
    assert_eq!(issue.held_packages.len(), 2);
    assert_eq!(issue.off_route_event_id, Some(ev.id));

    let closed = h.store.dump().offroute_events;
    assert_eq!(closed[0].status, OffRouteStatus::IssueCreated);
    assert_eq!(closed[0].issue_id, Some(issue.id));

    let after = h.coordinator.shipment(snap.shipment.id).await?;
    assert_eq!(after.shipment.status, OrderStatus::InTroubles);
    assert!(after.packages.iter().all(|p| p.status == PackageStatus::InTroubles));
    assert_eq!(h.notifier.count(Role::Staff, NotificationKind::OffRouteEscalation), 1);
    assert_eq!(h.notifier.count(Role::Staff, NotificationKind::NewIssue), 1);

    // Driver turns up safe: packages resume their leg.
    let out = h
        .coordinator
        .resolve_issue(issue.id, IssueResolution::DriverSafe, None)
        .await?;
    assert_eq!(out.issue.status, IssueStatus::ResolvedSafe);
    assert_eq!(out.result.order_status, OrderStatus::OnDelivered);
    Ok(())
}

#[tokio::test]
async fn late_tick_sends_both_warnings_then_grace_runs_from_red() -> anyhow::Result<()> {
    let h = Harness::new();
    let (_snap, trip) = h.shipment_in_transit(1).await?;
    h.coordinator.ingest_telemetry(h.sample(&trip, false)).await?;

    // Scheduler was down for an hour.
    h.advance(Duration::hours(1));
    let report = h.coordinator.run_offroute_tick().await?;
    assert_eq!(report.advanced, 1);
    assert_eq!(report.issues_opened, 0);
    assert_eq!(h.notifier.count(Role::Staff, NotificationKind::OffRouteWarning), 2);
    let ev = h.coordinator.active_offroute_event(trip.id).await?.expect("active");
    assert_eq!(ev.status, OffRouteStatus::RedSent);
    assert_eq!(ev.red_sent_at, Some(h.now()));

    h.advance(Duration::minutes(20));
    let report = h.coordinator.run_offroute_tick().await?;
    assert_eq!(report.issues_opened, 1);
    Ok(())
}

#[tokio::test]
async fn back_on_route_closes_without_issue() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, trip) = h.shipment_in_transit(1).await?;
    h.coordinator.ingest_telemetry(h.sample(&trip, false)).await?;
    h.advance(Duration::minutes(12));
    h.coordinator.run_offroute_tick().await?;

    h.advance(Duration::minutes(1));
    let out = h.coordinator.ingest_telemetry(h.sample(&trip, true)).await?;
    let ev = out.event.expect("event closed");
    assert_eq!(ev.status, OffRouteStatus::BackOnRoute);
    assert!(matches!(out.effects.as_slice(), [OffRouteEffect::Resolved { .. }]));
    assert_eq!(h.notifier.count(Role::Staff, NotificationKind::OffRouteResolved), 1);

    h.advance(Duration::hours(1));
    let report = h.coordinator.run_offroute_tick().await?;
    assert_eq!(report.evaluated, 0);
    assert!(h
        .coordinator
        .issues_for_shipment(snap.shipment.id)
        .await?
        .is_empty());

    // On-route samples with nothing open do nothing.
    let out = h.coordinator.ingest_telemetry(h.sample(&trip, true)).await?;
    assert!(out.event.is_none());
    Ok(())
}

#[tokio::test]
async fn contacted_driver_confirmed_safe_in_grace() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, trip) = h.shipment_in_transit(1).await?;
    h.coordinator.ingest_telemetry(h.sample(&trip, false)).await?;
    h.advance(Duration::minutes(10));
    h.coordinator.run_offroute_tick().await?;

    let ev = h
        .coordinator
        .record_contact(trip.id, "dispatcher-7", Some("fuel stop detour"))
        .await?;
    assert_eq!(ev.status, OffRouteStatus::ContactedWaitingReturn);
    assert_eq!(ev.grace_expires_at, Some(h.now() + Duration::minutes(20)));

    h.advance(Duration::minutes(15));
    let ev = h.coordinator.confirm_safe(trip.id, "dispatcher-7", None).await?;
    assert_eq!(ev.status, OffRouteStatus::ResolvedSafe);
    assert!(h
        .coordinator
        .issues_for_shipment(snap.shipment.id)
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn confirmation_after_grace_escalates_immediately() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, trip) = h.shipment_in_transit(1).await?;
    h.coordinator.ingest_telemetry(h.sample(&trip, false)).await?;
    h.advance(Duration::minutes(10));
    h.coordinator.run_offroute_tick().await?;
    h.coordinator.record_contact(trip.id, "dispatcher-7", None).await?;

    h.advance(Duration::minutes(21));
    let err = h
        .coordinator
        .confirm_safe(trip.id, "dispatcher-7", None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, LifecycleError::Escalation(OffRouteError::GracePeriodElapsed { .. })),
        "{err}"
    );

    let issues = h.coordinator.issues_for_shipment(snap.shipment.id).await?;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].category, IssueCategory::OffRouteRunaway);
    Ok(())
}

#[tokio::test]
async fn extensions_are_bounded() -> anyhow::Result<()> {
    let h = Harness::new();
    let (_snap, trip) = h.shipment_in_transit(1).await?;
    h.coordinator.ingest_telemetry(h.sample(&trip, false)).await?;
    h.advance(Duration::minutes(10));
    h.coordinator.run_offroute_tick().await?;
    h.coordinator.record_contact(trip.id, "dispatcher-7", None).await?;

    for _ in 0..3 {
        h.coordinator.extend_grace(trip.id, "dispatcher-7").await?;
    }
    let err = h
        .coordinator
        .extend_grace(trip.id, "dispatcher-7")
        .await
        .unwrap_err();
    assert!(
        matches!(err, LifecycleError::Escalation(OffRouteError::ExtensionLimit { max: 3 })),
        "{err}"
    );
    let ev = h.coordinator.active_offroute_event(trip.id).await?.expect("active");
    assert_eq!(ev.extension_count, 3);
    Ok(())
}

#[tokio::test]
async fn unreachable_driver_escalates_at_once() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, trip) = h.shipment_in_transit(1).await?;
    h.coordinator.ingest_telemetry(h.sample(&trip, false)).await?;
    h.advance(Duration::minutes(6));
    h.coordinator.run_offroute_tick().await?;

    h.coordinator
        .report_contact_failure(trip.id, "dispatcher-7", Some("phone off"))
        .await?;
    assert!(h.coordinator.active_offroute_event(trip.id).await?.is_none());
    let issues = h.coordinator.issues_for_shipment(snap.shipment.id).await?;
    assert_eq!(issues.len(), 1);
    assert_eq!(h.notifier.count(Role::Staff, NotificationKind::OffRouteEscalation), 1);
    Ok(())
}

#[tokio::test]
async fn confirmed_runaway_hands_packages_to_a_damage_issue() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, trip) = h.shipment_in_transit(2).await?;
    h.coordinator.ingest_telemetry(h.sample(&trip, false)).await?;
    h.advance(Duration::minutes(10));
    h.coordinator.run_offroute_tick().await?;
    h.advance(Duration::minutes(20));
    h.coordinator.run_offroute_tick().await?;
    let runaway = h.coordinator.issues_for_shipment(snap.shipment.id).await?[0].clone();

    let out = h
        .coordinator
        .resolve_issue(runaway.id, IssueResolution::RunawayConfirmed, None)
        .await?;
    assert_eq!(out.issue.status, IssueStatus::RunawayConfirmed);
    let follow_up = out.follow_up.expect("damage issue opened");
    assert_eq!(out.result.order_status, OrderStatus::InTroubles);

    let damage = h.coordinator.issue(follow_up).await?;
    assert_eq!(damage.issue.category, IssueCategory::Damage);
    assert_eq!(damage.issue.held_packages, runaway.held_packages);
    assert!(damage.assessment.is_some());

    let out = h
        .coordinator
        .resolve_issue(
            follow_up,
            IssueResolution::ApproveCompensation {
                input: Some(insured_damage()),
            },
            None,
        )
        .await?;
    assert_eq!(out.result.order_status, OrderStatus::Compensation);
    let after = h.coordinator.shipment(snap.shipment.id).await?;
    assert!(after
        .packages
        .iter()
        .all(|p| p.status == PackageStatus::Compensation));
    Ok(())
}

#[tokio::test]
async fn telemetry_for_a_closed_trip_is_ignored() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, trip) = h.shipment_in_transit(1).await?;
    h.coordinator
        .on_package_event(snap.packages[0].id, fl_status::PackageEvent::NearingDestination)
        .await?;
    h.coordinator
        .on_package_event(snap.packages[0].id, fl_status::PackageEvent::Delivered)
        .await?;
    h.coordinator
        .on_trip_event(trip.id, fl_lifecycle::TripEvent::Completed)
        .await?;

    let out = h.coordinator.ingest_telemetry(h.sample(&trip, false)).await?;
    assert!(out.event.is_none());
    assert!(h.store.dump().offroute_events.is_empty());
    Ok(())
}
