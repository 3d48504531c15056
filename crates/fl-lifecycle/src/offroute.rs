use chrono::{DateTime, Utc};
use fl_offroute::{self as machine, OffRouteEffect, OffRouteError};
use fl_schemas::{
    IssueCategory, IssueId, IssueReporter, Notification, NotificationKind, OffRouteEvent, TelemetrySample,
    TripId, TripStatus,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::change::ShipmentChange;
use crate::coordinator::Staged;
use crate::issues::{Freeze, IssueDraft};
use crate::{
    LifecycleError, ShipmentLifecycleCoordinator, TelemetryOutcome, TickReport, Write,
};

impl ShipmentLifecycleCoordinator {
    /// Feed one telemetry sample for an active trip.
    ///
    /// The first off-route sample opens an event; later samples advance it, and
    /// an on-route sample closes it as BACK_ON_ROUTE. Samples for closed trips
    /// are ignored.
    pub async fn ingest_telemetry(
        &self,
        sample: TelemetrySample,
    ) -> Result<TelemetryOutcome, LifecycleError> {
        let trip = self.store.load_trip(sample.trip_id).await?;
        if trip.status == TripStatus::Closed {
            return Ok(TelemetryOutcome {
                event: None,
                effects: Vec::new(),
            });
        }

        let (ev, effects, fresh) = match self.store.active_offroute_event(trip.id).await? {
            Some(mut ev) => {
                let effects = machine::observe(&mut ev, &sample, &self.settings.offroute)?;
                (ev, effects, false)
            }
            None if sample.on_route => {
                return Ok(TelemetryOutcome {
                    event: None,
                    effects: Vec::new(),
                })
            }
            None => {
                let mut ev = machine::open(&sample);
                let effects = machine::tick(&mut ev, sample.recorded_at, &self.settings.offroute);
                info!(
                    trip_id = %trip.id,
                    event_id = %ev.id,
                    distance_m = ?sample.distance_from_route_m,
                    "vehicle off route"
                );
                (ev, effects, true)
            }
        };

        let ev = self.settle(ev, &effects, fresh, sample.recorded_at).await?;
        Ok(TelemetryOutcome {
            event: Some(ev),
            effects,
        })
    }

    /// Re-evaluate every active off-route event at the current time.
    ///
    /// One failing event does not stop the others; a stale write is picked up
    /// again on the next tick.
    pub async fn run_offroute_tick(&self) -> Result<TickReport, LifecycleError> {
        let now = self.clock.now();
        let events = self.store.active_offroute_events().await?;
        let mut report = TickReport {
            evaluated: events.len(),
            ..TickReport::default()
        };

        for mut ev in events {
            let effects = machine::tick(&mut ev, now, &self.settings.offroute);
            if effects.is_empty() {
                continue;
            }
            let event_id = ev.id;
            match self.settle(ev, &effects, false, now).await {
                Ok(_) => {
                    report.advanced += 1;
                    if effects.contains(&OffRouteEffect::OpenRunawayIssue) {
                        report.issues_opened += 1;
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(%event_id, error = %err, "off-route tick failed");
                }
            }
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Staff actions
    // -----------------------------------------------------------------------

    /// Staff reached the driver.
    pub async fn record_contact(
        &self,
        trip_id: TripId,
        staff: &str,
        note: Option<&str>,
    ) -> Result<OffRouteEvent, LifecycleError> {
        let cfg = self.settings.offroute;
        self.staff_action(trip_id, "record_contact", |ev, now| {
            machine::record_contact(ev, now, staff, note, &cfg)
        })
        .await
    }

    /// Staff confirmed the driver is safe before the grace deadline.
    pub async fn confirm_safe(
        &self,
        trip_id: TripId,
        staff: &str,
        note: Option<&str>,
    ) -> Result<OffRouteEvent, LifecycleError> {
        let cfg = self.settings.offroute;
        self.staff_action(trip_id, "confirm_safe", |ev, now| {
            machine::confirm_safe(ev, now, staff, note, &cfg)
        })
        .await
    }

    pub async fn extend_grace(
        &self,
        trip_id: TripId,
        staff: &str,
    ) -> Result<OffRouteEvent, LifecycleError> {
        let cfg = self.settings.offroute;
        self.staff_action(trip_id, "extend_grace", |ev, now| {
            machine::extend_grace(ev, now, staff, &cfg).map(|_| Vec::new())
        })
        .await
    }

    /// Staff could not reach the driver; escalates to a runaway issue.
    pub async fn report_contact_failure(
        &self,
        trip_id: TripId,
        staff: &str,
        note: Option<&str>,
    ) -> Result<OffRouteEvent, LifecycleError> {
        let cfg = self.settings.offroute;
        self.staff_action(trip_id, "report_contact_failure", |ev, now| {
            machine::report_contact_failure(ev, now, staff, note, &cfg)
        })
        .await
    }

    pub async fn active_offroute_event(
        &self,
        trip_id: TripId,
    ) -> Result<Option<OffRouteEvent>, LifecycleError> {
        Ok(self.store.active_offroute_event(trip_id).await?)
    }

    async fn staff_action<F>(
        &self,
        trip_id: TripId,
        action: &'static str,
        apply: F,
    ) -> Result<OffRouteEvent, LifecycleError>
    where
        F: FnOnce(&mut OffRouteEvent, DateTime<Utc>) -> Result<Vec<OffRouteEffect>, OffRouteError>,
    {
        let now = self.clock.now();
        let Some(mut ev) = self.store.active_offroute_event(trip_id).await? else {
            return Err(LifecycleError::NotFound {
                entity: "active off-route event",
                id: trip_id.to_string(),
            });
        };

        match apply(&mut ev, now) {
            Ok(effects) => {
                info!(%trip_id, event_id = %ev.id, action, status = %ev.status, "off-route staff action");
                self.settle(ev, &effects, false, now).await
            }
            Err(err @ OffRouteError::GracePeriodElapsed { .. }) => {
                // Deadline already passed; apply the overdue escalation now
                // instead of waiting for the scheduler.
                let mut overdue = self.store.load_offroute_event(ev.id).await?;
                let effects = machine::tick(&mut overdue, now, &self.settings.offroute);
                if !effects.is_empty() {
                    self.settle(overdue, &effects, false, now).await?;
                }
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Effects
    // -----------------------------------------------------------------------

    /// Persist `ev` and carry out `effects` in one unit of work.
    async fn settle(
        &self,
        mut ev: OffRouteEvent,
        effects: &[OffRouteEffect],
        fresh: bool,
        now: DateTime<Utc>,
    ) -> Result<OffRouteEvent, LifecycleError> {
        let mut staged = Staged::new(now);
        let payload = |severity: &str, ev: &OffRouteEvent| {
            json!({
                "trip_id": ev.trip_id,
                "event_id": ev.id,
                "severity": severity,
                "status": ev.status,
                "started_at": ev.started_at,
                "lat": ev.last_lat,
                "lng": ev.last_lng,
                "distance_m": ev.distance_m,
                "previous_distance_m": ev.previous_distance_m,
            })
        };

        for effect in effects {
            match effect {
                OffRouteEffect::Warn { level } => {
                    warn!(trip_id = %ev.trip_id, level = level.as_str(), "off-route warning");
                    staged.notices.push(Notification::staff(
                        NotificationKind::OffRouteWarning,
                        payload(level.as_str(), &ev),
                    ));
                }
                OffRouteEffect::EscalationTimeout { deadline } => {
                    error!(trip_id = %ev.trip_id, %deadline, "off-route grace deadline passed");
                    staged.notices.push(Notification::staff(
                        NotificationKind::OffRouteEscalation,
                        payload("ESCALATION", &ev),
                    ));
                }
                OffRouteEffect::ContactFailed { reported_by } => {
                    error!(trip_id = %ev.trip_id, reported_by, "driver unreachable");
                    staged.notices.push(Notification::staff(
                        NotificationKind::OffRouteEscalation,
                        payload("CONTACT_FAILED", &ev),
                    ));
                }
                OffRouteEffect::OpenRunawayIssue => {
                    let issue_id = self.stage_runaway_issue(&mut staged, &ev, now).await?;
                    ev.issue_id = Some(issue_id);
                }
                OffRouteEffect::Resolved { status } => {
                    info!(trip_id = %ev.trip_id, %status, "off-route event closed");
                    staged.notices.push(Notification::staff(
                        NotificationKind::OffRouteResolved,
                        payload(status.as_str(), &ev),
                    ));
                }
            }
        }

        let write = if fresh {
            Write::Insert(ev)
        } else {
            Write::updated(ev)
        };
        let saved = write.record().clone();
        staged.uow.offroute_events.push(write);
        self.commit(staged).await?;
        Ok(saved)
    }

    /// Open the OFF_ROUTE_RUNAWAY issue and freeze every package on the trip
    /// that can still be frozen.
    async fn stage_runaway_issue(
        &self,
        staged: &mut Staged,
        ev: &OffRouteEvent,
        now: DateTime<Utc>,
    ) -> Result<IssueId, LifecycleError> {
        let trip = self.store.load_trip(ev.trip_id).await?;
        let snap = self.store.load_shipment(trip.shipment_id).await?;
        let package_ids = snap
            .packages
            .iter()
            .filter(|p| p.trip_id == Some(trip.id))
            .map(|p| p.id)
            .collect();

        let mut change = ShipmentChange::new(snap);
        let opened = self.stage_issue(
            staged,
            &mut change,
            IssueDraft {
                trip_id: Some(trip.id),
                category: IssueCategory::OffRouteRunaway,
                reporter: IssueReporter::System,
                description: format!(
                    "vehicle {} off route since {} and driver not confirmed safe",
                    trip.vehicle_id, ev.started_at
                ),
                package_ids,
                off_route_event_id: Some(ev.id),
            },
            Freeze::Eligible,
            now,
        )?;
        change.rederive(now)?;
        staged.shipment(change);

        error!(trip_id = %trip.id, issue_id = %opened.issue.id, "runaway issue opened");
        Ok(opened.issue.id)
    }
}
