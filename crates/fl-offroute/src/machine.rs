use chrono::{DateTime, Utc};
use fl_schemas::{OffRouteEvent, OffRouteEventId, OffRouteStatus, TelemetrySample};

use crate::{OffRouteConfig, OffRouteEffect, OffRouteError, WarningLevel};

use OffRouteStatus as St;

/// Start tracking a deviation from the first off-route sample.
pub fn open(sample: &TelemetrySample) -> OffRouteEvent {
    OffRouteEvent {
        id: OffRouteEventId::new(),
        trip_id: sample.trip_id,
        status: St::Detected,
        started_at: sample.recorded_at,
        last_seen_at: sample.recorded_at,
        last_lat: sample.lat,
        last_lng: sample.lng,
        distance_m: sample.distance_from_route_m,
        previous_distance_m: None,
        yellow_sent_at: None,
        red_sent_at: None,
        contacted_at: None,
        contacted_by: None,
        contact_notes: None,
        can_contact_driver: None,
        grace_expires_at: None,
        extension_count: 0,
        resolved_at: None,
        resolution: None,
        issue_id: None,
        version: 0,
    }
}

/// Fold one telemetry sample into an active event.
///
/// Back on route closes the event as BACK_ON_ROUTE from any active status.
/// Still off route runs [`tick`] at the sample's timestamp. Samples older than
/// the last one seen are ignored.
pub fn observe(
    ev: &mut OffRouteEvent,
    sample: &TelemetrySample,
    cfg: &OffRouteConfig,
) -> Result<Vec<OffRouteEffect>, OffRouteError> {
    ensure_active(ev, "observe")?;
    if sample.recorded_at < ev.last_seen_at {
        return Ok(Vec::new());
    }

    ev.last_seen_at = sample.recorded_at;
    ev.last_lat = sample.lat;
    ev.last_lng = sample.lng;
    if sample.distance_from_route_m.is_some() {
        ev.previous_distance_m = ev.distance_m;
        ev.distance_m = sample.distance_from_route_m;
    }

    if sample.on_route {
        close(ev, St::BackOnRoute, sample.recorded_at, "vehicle returned to route");
        return Ok(vec![OffRouteEffect::Resolved {
            status: St::BackOnRoute,
        }]);
    }

    Ok(tick(ev, sample.recorded_at, cfg))
}

/// Apply every time-driven edge that is due at `now`.
///
/// Cascades in one call, so a late evaluation still lands in the right
/// status: DETECTED -> YELLOW_SENT -> RED_SENT, and once the contact deadline
/// lapses RED_SENT / CONTACTED_WAITING_RETURN -> CONTACT_FAILED -> ISSUE_CREATED.
/// The RED deadline counts from when RED was actually sent.
pub fn tick(ev: &mut OffRouteEvent, now: DateTime<Utc>, cfg: &OffRouteConfig) -> Vec<OffRouteEffect> {
    let mut effects = Vec::new();
    loop {
        let elapsed = now - ev.started_at;
        match ev.status {
            St::Detected if elapsed >= cfg.yellow_after => {
                ev.status = St::YellowSent;
                ev.yellow_sent_at = Some(now);
                effects.push(OffRouteEffect::Warn {
                    level: WarningLevel::Yellow,
                });
            }
            St::YellowSent if elapsed >= cfg.red_after => {
                ev.status = St::RedSent;
                ev.red_sent_at = Some(now);
                effects.push(OffRouteEffect::Warn {
                    level: WarningLevel::Red,
                });
            }
            St::RedSent | St::ContactedWaitingReturn => match contact_deadline(ev, cfg) {
                Some(deadline) if now >= deadline => {
                    ev.status = St::ContactFailed;
                    effects.push(OffRouteEffect::EscalationTimeout { deadline });
                }
                _ => break,
            },
            St::ContactFailed => {
                close(ev, St::IssueCreated, now, "runaway issue opened");
                effects.push(OffRouteEffect::OpenRunawayIssue);
                break;
            }
            _ => break,
        }
    }
    effects
}

/// Deadline by which the vehicle must be back on route before escalation.
pub fn contact_deadline(ev: &OffRouteEvent, cfg: &OffRouteConfig) -> Option<DateTime<Utc>> {
    match ev.status {
        St::RedSent => ev.red_sent_at.map(|t| t + cfg.grace_period),
        St::ContactedWaitingReturn => ev.grace_expires_at,
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Staff actions
// ---------------------------------------------------------------------------

/// Staff reached the driver: YELLOW_SENT / RED_SENT -> CONTACTED_WAITING_RETURN.
pub fn record_contact(
    ev: &mut OffRouteEvent,
    now: DateTime<Utc>,
    staff: &str,
    note: Option<&str>,
    cfg: &OffRouteConfig,
) -> Result<Vec<OffRouteEffect>, OffRouteError> {
    if !matches!(ev.status, St::YellowSent | St::RedSent) {
        return Err(invalid("record contact", ev));
    }
    ensure_before_deadline(ev, now, cfg)?;

    ev.status = St::ContactedWaitingReturn;
    ev.contacted_at = Some(now);
    ev.contacted_by = Some(staff.to_string());
    ev.can_contact_driver = Some(true);
    ev.grace_expires_at = Some(now + cfg.grace_period);
    append_note(ev, note);
    Ok(Vec::new())
}

/// CONTACTED_WAITING_RETURN -> RESOLVED_SAFE, only before the grace deadline.
pub fn confirm_safe(
    ev: &mut OffRouteEvent,
    now: DateTime<Utc>,
    staff: &str,
    note: Option<&str>,
    cfg: &OffRouteConfig,
) -> Result<Vec<OffRouteEffect>, OffRouteError> {
    if ev.status != St::ContactedWaitingReturn {
        return Err(invalid("confirm safe", ev));
    }
    ensure_before_deadline(ev, now, cfg)?;

    append_note(ev, note);
    close(ev, St::ResolvedSafe, now, &format!("confirmed safe by {staff}"));
    Ok(vec![OffRouteEffect::Resolved {
        status: St::ResolvedSafe,
    }])
}

/// Push the grace deadline out by one extension.
pub fn extend_grace(
    ev: &mut OffRouteEvent,
    now: DateTime<Utc>,
    staff: &str,
    cfg: &OffRouteConfig,
) -> Result<DateTime<Utc>, OffRouteError> {
    if ev.status != St::ContactedWaitingReturn {
        return Err(invalid("extend grace period", ev));
    }
    ensure_before_deadline(ev, now, cfg)?;
    if ev.extension_count >= cfg.max_extensions {
        return Err(OffRouteError::ExtensionLimit {
            max: cfg.max_extensions,
        });
    }

    let deadline = ev.grace_expires_at.unwrap_or(now) + cfg.extension;
    ev.grace_expires_at = Some(deadline);
    ev.extension_count += 1;
    append_note(ev, Some(&format!("grace extended by {staff}")));
    Ok(deadline)
}

/// Staff could not reach the driver. Escalates straight to ISSUE_CREATED.
pub fn report_contact_failure(
    ev: &mut OffRouteEvent,
    now: DateTime<Utc>,
    staff: &str,
    note: Option<&str>,
    cfg: &OffRouteConfig,
) -> Result<Vec<OffRouteEffect>, OffRouteError> {
    if !matches!(
        ev.status,
        St::YellowSent | St::RedSent | St::ContactedWaitingReturn
    ) {
        return Err(invalid("report contact failure", ev));
    }

    ev.can_contact_driver = Some(false);
    append_note(ev, note);
    ev.status = St::ContactFailed;

    let mut effects = vec![OffRouteEffect::ContactFailed {
        reported_by: staff.to_string(),
    }];
    effects.extend(tick(ev, now, cfg));
    Ok(effects)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn close(ev: &mut OffRouteEvent, status: OffRouteStatus, now: DateTime<Utc>, why: &str) {
    ev.status = status;
    ev.resolved_at = Some(now);
    ev.resolution = Some(why.to_string());
}

fn ensure_active(ev: &OffRouteEvent, action: &'static str) -> Result<(), OffRouteError> {
    if ev.status.is_terminal() {
        return Err(invalid(action, ev));
    }
    Ok(())
}

fn ensure_before_deadline(
    ev: &OffRouteEvent,
    now: DateTime<Utc>,
    cfg: &OffRouteConfig,
) -> Result<(), OffRouteError> {
    match contact_deadline(ev, cfg) {
        Some(deadline) if now >= deadline => Err(OffRouteError::GracePeriodElapsed { deadline }),
        _ => Ok(()),
    }
}

fn invalid(action: &'static str, ev: &OffRouteEvent) -> OffRouteError {
    OffRouteError::InvalidState {
        action,
        status: ev.status.as_str(),
    }
}

fn append_note(ev: &mut OffRouteEvent, note: Option<&str>) {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return;
    };
    ev.contact_notes = Some(match ev.contact_notes.take() {
        Some(prev) => format!("{prev}\n{note}"),
        None => note.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use fl_schemas::TripId;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn sample(mins: i64, on_route: bool) -> TelemetrySample {
        TelemetrySample {
            trip_id: TripId::new(),
            lat: 10.77,
            lng: 106.70,
            on_route,
            distance_from_route_m: Some(if on_route { 0.0 } else { 800.0 }),
            recorded_at: t0() + Duration::minutes(mins),
        }
    }

    fn at(mins: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(mins)
    }

    #[test]
    fn warnings_follow_elapsed_time() {
        let cfg = OffRouteConfig::default();
        let mut ev = open(&sample(0, false));

        assert!(tick(&mut ev, at(4), &cfg).is_empty());
        assert_eq!(
            tick(&mut ev, at(5), &cfg),
            vec![OffRouteEffect::Warn { level: WarningLevel::Yellow }]
        );
        assert_eq!(
            tick(&mut ev, at(10), &cfg),
            vec![OffRouteEffect::Warn { level: WarningLevel::Red }]
        );
        assert_eq!(ev.status, St::RedSent);
    }

    #[test]
    fn late_tick_cascades_both_warnings() {
        let cfg = OffRouteConfig::default();
        let mut ev = open(&sample(0, false));
        let fx = tick(&mut ev, at(12), &cfg);
        assert_eq!(fx.len(), 2);
        assert_eq!(ev.status, St::RedSent);
        assert_eq!(ev.red_sent_at, Some(at(12)));
    }

    #[test]
    fn contact_then_return_closes_back_on_route() {
        let cfg = OffRouteConfig::default();
        let mut ev = open(&sample(0, false));
        tick(&mut ev, at(10), &cfg);
        record_contact(&mut ev, at(11), "dispatcher-1", Some("driver at fuel stop"), &cfg).unwrap();
        assert_eq!(ev.grace_expires_at, Some(at(31)));

        let fx = observe(&mut ev, &sample(20, true), &cfg).unwrap();
        assert_eq!(fx, vec![OffRouteEffect::Resolved { status: St::BackOnRoute }]);
        assert!(ev.status.is_terminal());
    }

    #[test]
    fn confirm_safe_after_deadline_is_refused() {
        let cfg = OffRouteConfig::default();
        let mut ev = open(&sample(0, false));
        tick(&mut ev, at(10), &cfg);
        record_contact(&mut ev, at(11), "dispatcher-1", None, &cfg).unwrap();
        let err = confirm_safe(&mut ev, at(31), "dispatcher-1", None, &cfg).unwrap_err();
        assert_eq!(err, OffRouteError::GracePeriodElapsed { deadline: at(31) });
        assert_eq!(ev.status, St::ContactedWaitingReturn);
    }

    #[test]
    fn extensions_are_bounded() {
        let cfg = OffRouteConfig::default();
        let mut ev = open(&sample(0, false));
        tick(&mut ev, at(5), &cfg);
        record_contact(&mut ev, at(6), "s", None, &cfg).unwrap();
        for i in 1..=3 {
            let d = extend_grace(&mut ev, at(7), "s", &cfg).unwrap();
            assert_eq!(d, at(26 + 15 * i));
        }
        assert_eq!(
            extend_grace(&mut ev, at(7), "s", &cfg),
            Err(OffRouteError::ExtensionLimit { max: 3 })
        );
    }

    #[test]
    fn staff_reported_failure_opens_issue_immediately() {
        let cfg = OffRouteConfig::default();
        let mut ev = open(&sample(0, false));
        tick(&mut ev, at(10), &cfg);
        let fx = report_contact_failure(&mut ev, at(12), "s", Some("phone off"), &cfg).unwrap();
        assert_eq!(
            fx,
            vec![
                OffRouteEffect::ContactFailed { reported_by: "s".into() },
                OffRouteEffect::OpenRunawayIssue,
            ]
        );
        assert_eq!(ev.status, St::IssueCreated);
        assert_eq!(ev.can_contact_driver, Some(false));
    }

    #[test]
    fn contact_is_not_allowed_before_any_warning() {
        let cfg = OffRouteConfig::default();
        let mut ev = open(&sample(0, false));
        assert!(matches!(
            record_contact(&mut ev, at(1), "s", None, &cfg),
            Err(OffRouteError::InvalidState { .. })
        ));
    }

    #[test]
    fn stale_samples_are_ignored() {
        let cfg = OffRouteConfig::default();
        let mut ev = open(&sample(3, false));
        let fx = observe(&mut ev, &sample(1, true), &cfg).unwrap();
        assert!(fx.is_empty());
        assert_eq!(ev.status, St::Detected);
    }
}
