use chrono::{DateTime, Utc};
use fl_compensation::{adjust, approve, new_assessment, propose, reject};
use fl_schemas::{
    AssessmentInput, AssessmentStatus, CompensationAssessment, HeldPackage, Issue, IssueCategory,
    IssueId, IssueReporter, IssueSnapshot, IssueStatus, Notification, NotificationKind,
    OffRouteEventId, PackageId, PackageStatus, ShipmentId, TripId,
};
use fl_status::{PackageEvent, PACKAGE_TRANSITIONS};
use serde_json::json;
use tracing::info;

use crate::change::{ShipmentChange, Via};
use crate::coordinator::Staged;
use crate::{
    IssueReport, IssueResolution, LifecycleError, ResolutionOutcome,
    ShipmentLifecycleCoordinator, Write,
};

/// Fields of an issue about to be opened.
pub(crate) struct IssueDraft {
    pub(crate) trip_id: Option<TripId>,
    pub(crate) category: IssueCategory,
    pub(crate) reporter: IssueReporter,
    pub(crate) description: String,
    pub(crate) package_ids: Vec<PackageId>,
    pub(crate) off_route_event_id: Option<OffRouteEventId>,
}

/// How the packages named by a new issue are put on hold.
pub(crate) enum Freeze {
    /// Every named package must be freezable; anything else is an error.
    Strict,
    /// Freeze what can be frozen, skip the rest.
    Eligible,
    /// Packages already IN_TROUBLES change hands from a closing issue.
    Transfer(Vec<HeldPackage>),
}

/// Where held packages go when their issue closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Resume,
    Return,
    Compensate,
    /// Stay IN_TROUBLES under a follow-up issue.
    Keep,
}

impl ShipmentLifecycleCoordinator {
    /// Open an issue and freeze the named packages into IN_TROUBLES.
    ///
    /// DAMAGE issues start with a PENDING_ASSESSMENT compensation assessment.
    pub async fn open_issue(&self, report: IssueReport) -> Result<IssueSnapshot, LifecycleError> {
        if report.description.trim().is_empty() {
            return Err(LifecycleError::validation("issue description must not be empty"));
        }
        if let Some(trip_id) = report.trip_id {
            let trip = self.store.load_trip(trip_id).await?;
            if trip.shipment_id != report.shipment_id {
                return Err(LifecycleError::validation(format!(
                    "trip {trip_id} does not belong to shipment {}",
                    report.shipment_id
                )));
            }
        }

        let now = self.clock.now();
        let snap = self.store.load_shipment(report.shipment_id).await?;
        let mut change = ShipmentChange::new(snap);
        let mut staged = Staged::new(now);
        let opened = self.stage_issue(
            &mut staged,
            &mut change,
            IssueDraft {
                trip_id: report.trip_id,
                category: report.category,
                reporter: report.reporter,
                description: report.description.trim().to_string(),
                package_ids: report.package_ids,
                off_route_event_id: None,
            },
            Freeze::Strict,
            now,
        )?;
        change.rederive(now)?;
        staged.shipment(change);
        self.commit(staged).await?;
        Ok(opened)
    }

    pub async fn issue(&self, id: IssueId) -> Result<IssueSnapshot, LifecycleError> {
        Ok(self.store.load_issue(id).await?)
    }

    pub async fn issues_for_shipment(&self, id: ShipmentId) -> Result<Vec<Issue>, LifecycleError> {
        Ok(self.store.issues_for_shipment(id).await?)
    }

    /// Run the compensation engine on a DAMAGE issue and record the proposal.
    pub async fn propose_compensation(
        &self,
        issue_id: IssueId,
        input: AssessmentInput,
    ) -> Result<CompensationAssessment, LifecycleError> {
        let now = self.clock.now();
        let IssueSnapshot { mut issue, assessment } = self.open_damage_issue(issue_id).await?;
        let mut assessment = assessment.ok_or_else(|| missing_assessment(issue_id))?;

        let decision = propose(&mut assessment, input, &self.settings.compensation, now)?;
        let mut staged = Staged::new(now);
        if issue.status == IssueStatus::Open {
            issue.status = IssueStatus::InProgress;
            staged.uow.issues.push(Write::updated(issue));
        }
        let write = Write::updated(assessment);
        let saved = write.record().clone();
        staged.uow.assessments.push(write);
        staged.notices.push(Notification::staff(
            NotificationKind::CompensationProposed,
            json!({
                "issue_id": issue_id,
                "case": decision.case,
                "raw_estimate": decision.raw_estimate,
                "legal_limit": decision.legal_limit,
                "payout": decision.payout,
                "freight_refund": decision.freight_refund,
                "total": decision.total,
                "capped": decision.capped,
            }),
        ));
        self.commit(staged).await?;

        info!(
            %issue_id,
            case = %decision.case,
            raw_estimate = decision.raw_estimate,
            payout = decision.payout,
            total = decision.total,
            capped = decision.capped,
            "compensation proposed"
        );
        Ok(saved)
    }

    /// Staff override of the proposed payout.
    pub async fn adjust_compensation(
        &self,
        issue_id: IssueId,
        payout: i64,
        reason: &str,
    ) -> Result<CompensationAssessment, LifecycleError> {
        let now = self.clock.now();
        let snap = self.open_damage_issue(issue_id).await?;
        let mut assessment = snap.assessment.ok_or_else(|| missing_assessment(issue_id))?;
        adjust(&mut assessment, payout, reason, now)?;

        let write = Write::updated(assessment);
        let saved = write.record().clone();
        let mut staged = Staged::new(now);
        staged.uow.assessments.push(write);
        self.commit(staged).await?;
        info!(%issue_id, payout, reason, "compensation adjusted");
        Ok(saved)
    }

    /// Close an issue and move its held packages on.
    pub async fn resolve_issue(
        &self,
        issue_id: IssueId,
        resolution: IssueResolution,
        note: Option<String>,
    ) -> Result<ResolutionOutcome, LifecycleError> {
        let now = self.clock.now();
        let IssueSnapshot {
            mut issue,
            mut assessment,
        } = self.store.load_issue(issue_id).await?;
        if issue.status.is_terminal() {
            return Err(LifecycleError::validation(format!(
                "issue {issue_id} is already {}",
                issue.status
            )));
        }
        if !resolution.applies_to(issue.category) {
            return Err(LifecycleError::validation(format!(
                "{} cannot close a {} issue",
                resolution.as_str(),
                issue.category
            )));
        }

        let snap = self.store.load_shipment(issue.shipment_id).await?;
        let mut change = ShipmentChange::new(snap);
        let mut staged = Staged::new(now);
        let mut assessment_changed = false;
        let mut payout = None;
        let mut follow_up = None;

        let (status, release) = match resolution {
            IssueResolution::ApproveCompensation { input } => {
                let a = assessment
                    .as_mut()
                    .ok_or_else(|| missing_assessment(issue_id))?;
                if let Some(input) = input {
                    propose(a, input, &self.settings.compensation, now)?;
                }
                payout = Some(approve(a, now)?);
                assessment_changed = true;
                (IssueStatus::Resolved, Release::Compensate)
            }
            IssueResolution::RejectCompensation => {
                if let Some(a) = assessment.as_mut() {
                    reject(a, now)?;
                    assessment_changed = true;
                }
                (IssueStatus::Resolved, Release::Resume)
            }
            IssueResolution::Fraud => {
                if let Some(a) = assessment.as_mut() {
                    if a.status != AssessmentStatus::Rejected {
                        reject(a, now)?;
                        assessment_changed = true;
                    }
                }
                (IssueStatus::ClosedFraud, Release::Resume)
            }
            IssueResolution::Resume => (IssueStatus::Resolved, Release::Resume),
            IssueResolution::Return => (IssueStatus::Resolved, Release::Return),
            IssueResolution::DriverSafe => (IssueStatus::ResolvedSafe, Release::Resume),
            IssueResolution::RunawayConfirmed => {
                let opened = self.stage_issue(
                    &mut staged,
                    &mut change,
                    IssueDraft {
                        trip_id: issue.trip_id,
                        category: IssueCategory::Damage,
                        reporter: IssueReporter::Staff,
                        description: format!("cargo lost after runaway issue {issue_id}"),
                        package_ids: Vec::new(),
                        off_route_event_id: issue.off_route_event_id,
                    },
                    Freeze::Transfer(issue.held_packages.clone()),
                    now,
                )?;
                follow_up = Some(opened.issue.id);
                (IssueStatus::RunawayConfirmed, Release::Keep)
            }
        };

        release_held(&mut change, &issue.held_packages, release, now)?;
        change.rederive(now)?;

        issue.status = status;
        issue.resolved_at = Some(now);
        issue.resolution_note = note.filter(|n| !n.trim().is_empty());
        let write = Write::updated(issue);
        let issue = write.record().clone();
        staged.uow.issues.push(write);
        if assessment_changed {
            if let Some(a) = assessment.take() {
                let write = Write::updated(a);
                assessment = Some(write.record().clone());
                staged.uow.assessments.push(write);
            }
        }

        let notice = json!({
            "issue_id": issue_id,
            "shipment_id": issue.shipment_id,
            "category": issue.category,
            "status": status,
            "payout": payout,
        });
        staged.notices.push(Notification::staff(
            NotificationKind::IssueResolved,
            notice.clone(),
        ));
        staged
            .notices
            .push(Notification::customer(NotificationKind::IssueResolved, notice));
        let result = staged.shipment(change);
        self.commit(staged).await?;

        info!(
            %issue_id,
            %status,
            order_status = %result.order_status,
            ?payout,
            "issue resolved"
        );
        Ok(ResolutionOutcome {
            issue,
            assessment,
            payout,
            follow_up,
            result,
        })
    }

    /// Queue a new issue (and its assessment, for DAMAGE) and freeze its packages.
    pub(crate) fn stage_issue(
        &self,
        staged: &mut Staged,
        change: &mut ShipmentChange,
        draft: IssueDraft,
        freeze: Freeze,
        now: DateTime<Utc>,
    ) -> Result<IssueSnapshot, LifecycleError> {
        let held = match freeze {
            Freeze::Transfer(held) => held,
            Freeze::Strict | Freeze::Eligible => {
                let strict = matches!(freeze, Freeze::Strict);
                let mut held = Vec::new();
                for id in draft.package_ids {
                    let status = change.package_status(id)?;
                    if status == PackageStatus::InTroubles {
                        if strict {
                            return Err(LifecycleError::validation(format!(
                                "package {id} is already held by an open issue"
                            )));
                        }
                        change.skip(id, status);
                        continue;
                    }
                    if !strict && !freezable(status) {
                        change.skip(id, status);
                        continue;
                    }
                    change.apply_package(id, PackageEvent::TroubleReported, Via::Issue, now)?;
                    held.push(HeldPackage {
                        package_id: id,
                        prior_status: status,
                    });
                }
                held
            }
        };

        let issue = Issue {
            id: IssueId::new(),
            shipment_id: change.snapshot().shipment.id,
            trip_id: draft.trip_id,
            category: draft.category,
            status: IssueStatus::Open,
            reporter: draft.reporter,
            description: draft.description,
            held_packages: held,
            off_route_event_id: draft.off_route_event_id,
            resolution_note: None,
            created_at: now,
            resolved_at: None,
            version: 0,
        };
        let assessment =
            (issue.category == IssueCategory::Damage).then(|| new_assessment(issue.id, now));

        staged.uow.issues.push(Write::Insert(issue.clone()));
        if let Some(a) = &assessment {
            staged.uow.assessments.push(Write::Insert(a.clone()));
        }
        staged.notices.push(Notification::staff(
            NotificationKind::NewIssue,
            json!({
                "issue_id": issue.id,
                "shipment_id": issue.shipment_id,
                "trip_id": issue.trip_id,
                "category": issue.category,
                "reporter": issue.reporter,
                "packages": issue.held_packages.iter().map(|h| h.package_id).collect::<Vec<_>>(),
            }),
        ));
        info!(
            issue_id = %issue.id,
            shipment_id = %issue.shipment_id,
            category = %issue.category,
            held = issue.held_packages.len(),
            "issue opened"
        );
        Ok(IssueSnapshot { issue, assessment })
    }

    async fn open_damage_issue(&self, issue_id: IssueId) -> Result<IssueSnapshot, LifecycleError> {
        let snap = self.store.load_issue(issue_id).await?;
        if snap.issue.category != IssueCategory::Damage {
            return Err(LifecycleError::validation(format!(
                "issue {issue_id} is {}, not DAMAGE",
                snap.issue.category
            )));
        }
        if snap.issue.status.is_terminal() {
            return Err(LifecycleError::validation(format!(
                "issue {issue_id} is already {}",
                snap.issue.status
            )));
        }
        Ok(snap)
    }
}

fn release_held(
    change: &mut ShipmentChange,
    held: &[HeldPackage],
    release: Release,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    if release == Release::Keep {
        return Ok(());
    }
    for h in held {
        if change.package_status(h.package_id)? != PackageStatus::InTroubles {
            continue;
        }
        let event = match release {
            Release::Compensate => PackageEvent::Compensated,
            Release::Return => PackageEvent::ReturnStarted,
            Release::Resume => PackageEvent::resume_to(h.prior_status).ok_or_else(|| {
                LifecycleError::validation(format!(
                    "package {} cannot resume from {}",
                    h.package_id, h.prior_status
                ))
            })?,
            Release::Keep => continue,
        };
        change.apply_package(h.package_id, event, Via::Issue, now)?;
    }
    Ok(())
}

fn freezable(status: PackageStatus) -> bool {
    PACKAGE_TRANSITIONS
        .apply(status, PackageEvent::TroubleReported)
        .is_ok_and(|a| a.is_changed())
}

fn missing_assessment(issue_id: IssueId) -> LifecycleError {
    LifecycleError::NotFound {
        entity: "compensation assessment for issue",
        id: issue_id.to_string(),
    }
}
