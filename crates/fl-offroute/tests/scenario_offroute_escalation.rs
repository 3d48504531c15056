//! Scenario: an off-route vehicle escalates on elapsed time alone.
//!
//! 1. A vehicle that stays off route with nobody acting goes
//!    YELLOW_SENT -> RED_SENT -> CONTACT_FAILED -> ISSUE_CREATED.
//! 2. Coming back on route from any active status closes the event as
//!    BACK_ON_ROUTE and never asks for an issue.

use chrono::{DateTime, Duration, TimeZone, Utc};
use fl_offroute::{
    observe, open, record_contact, tick, OffRouteConfig, OffRouteEffect, WarningLevel,
};
use fl_schemas::{OffRouteEvent, OffRouteStatus, TelemetrySample, TripId};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 11, 14, 0, 0).unwrap()
}

fn at(mins: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(mins)
}

fn sample(trip_id: TripId, mins: i64, on_route: bool) -> TelemetrySample {
    TelemetrySample {
        trip_id,
        lat: 21.03,
        lng: 105.85,
        on_route,
        distance_from_route_m: if on_route { None } else { Some(1_200.0) },
        recorded_at: at(mins),
    }
}

#[test]
fn unattended_deviation_escalates_to_runaway_issue() {
    let cfg = OffRouteConfig::default();
    let trip = TripId::new();
    let mut ev = open(&sample(trip, 0, false));

    // Samples arriving every minute before the yellow threshold change nothing.
    for m in 1..5 {
        assert!(observe(&mut ev, &sample(trip, m, false), &cfg).unwrap().is_empty());
    }
    assert_eq!(ev.status, OffRouteStatus::Detected);

    assert_eq!(
        tick(&mut ev, at(5), &cfg),
        vec![OffRouteEffect::Warn { level: WarningLevel::Yellow }]
    );
    assert_eq!(
        tick(&mut ev, at(10), &cfg),
        vec![OffRouteEffect::Warn { level: WarningLevel::Red }]
    );
    assert!(tick(&mut ev, at(29), &cfg).is_empty());

    let fx = tick(&mut ev, at(30), &cfg);
    assert_eq!(
        fx,
        vec![
            OffRouteEffect::EscalationTimeout { deadline: at(30) },
            OffRouteEffect::OpenRunawayIssue,
        ]
    );
    assert_eq!(ev.status, OffRouteStatus::IssueCreated);
    assert!(tick(&mut ev, at(90), &cfg).is_empty());
}

#[test]
fn a_single_late_tick_lands_on_the_same_outcome() {
    let cfg = OffRouteConfig::default();
    let mut ev = open(&sample(TripId::new(), 0, false));

    // The RED deadline counts from when RED went out, so one very late tick
    // sends both warnings but does not escalate yet.
    let fx = tick(&mut ev, at(45), &cfg);
    assert_eq!(fx.len(), 2);
    assert_eq!(ev.status, OffRouteStatus::RedSent);

    let fx = tick(&mut ev, at(65), &cfg);
    assert_eq!(fx.last(), Some(&OffRouteEffect::OpenRunawayIssue));
    assert_eq!(ev.status, OffRouteStatus::IssueCreated);
}

#[test]
fn contact_grace_expiry_also_escalates() {
    let cfg = OffRouteConfig::default();
    let mut ev = open(&sample(TripId::new(), 0, false));
    tick(&mut ev, at(6), &cfg);
    record_contact(&mut ev, at(7), "dispatcher-2", Some("stuck in traffic"), &cfg).unwrap();

    assert!(tick(&mut ev, at(26), &cfg).is_empty());
    let fx = tick(&mut ev, at(27), &cfg);
    assert_eq!(fx.last(), Some(&OffRouteEffect::OpenRunawayIssue));
}

fn at_status(status: OffRouteStatus) -> (TripId, OffRouteEvent) {
    let cfg = OffRouteConfig::default();
    let trip = TripId::new();
    let mut ev = open(&sample(trip, 0, false));
    match status {
        OffRouteStatus::Detected => {}
        OffRouteStatus::YellowSent => {
            tick(&mut ev, at(5), &cfg);
        }
        OffRouteStatus::RedSent => {
            tick(&mut ev, at(10), &cfg);
        }
        OffRouteStatus::ContactedWaitingReturn => {
            tick(&mut ev, at(10), &cfg);
            record_contact(&mut ev, at(11), "s", None, &cfg).unwrap();
        }
        other => panic!("not an open status: {other}"),
    }
    assert_eq!(ev.status, status);
    (trip, ev)
}

#[test]
fn back_on_route_closes_every_open_status_without_issue() {
    let cfg = OffRouteConfig::default();
    for status in [
        OffRouteStatus::Detected,
        OffRouteStatus::YellowSent,
        OffRouteStatus::RedSent,
        OffRouteStatus::ContactedWaitingReturn,
    ] {
        let (trip, mut ev) = at_status(status);
        let fx = observe(&mut ev, &sample(trip, 12, true), &cfg).unwrap();
        assert_eq!(
            fx,
            vec![OffRouteEffect::Resolved { status: OffRouteStatus::BackOnRoute }],
            "from {status}"
        );
        assert_eq!(ev.status, OffRouteStatus::BackOnRoute);
        assert!(ev.issue_id.is_none());
        assert!(observe(&mut ev, &sample(trip, 13, false), &cfg).is_err());
    }
}
