use fl_compensation::CompensationError;
use fl_lifecycle::{IssueReport, IssueResolution, LifecycleError};
use fl_schemas::{
    AssessmentStatus, CompensationCase, IssueCategory, IssueReporter, IssueSnapshot, IssueStatus,
    NotificationKind, OrderStatus, PackageStatus, ShipmentSnapshot, Trip,
};
use fl_testkit::{insured_damage, uninsured_damage, Harness};

async fn damaged(h: &Harness) -> anyhow::Result<(ShipmentSnapshot, Trip, IssueSnapshot)> {
    let (snap, trip) = h.shipment_in_transit(2).await?;
    let opened = h
        .coordinator
        .open_issue(IssueReport {
            shipment_id: snap.shipment.id,
            trip_id: Some(trip.id),
            category: IssueCategory::Damage,
            reporter: IssueReporter::Staff,
            description: "water damage in container".to_string(),
            package_ids: vec![snap.packages[0].id],
        })
        .await?;
    Ok((snap, trip, opened))
}

#[tokio::test]
async fn adjusted_proposal_is_paid_and_package_compensated() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, _trip, opened) = damaged(&h).await?;
    let issue_id = opened.issue.id;
    assert_eq!(
        opened.assessment.as_ref().map(|a| a.status),
        Some(AssessmentStatus::PendingAssessment)
    );

    let proposed = h
        .coordinator
        .propose_compensation(issue_id, insured_damage())
        .await?;
    let decision = proposed.decision.expect("decision recorded");
    assert_eq!(decision.case, CompensationCase::HasInsuranceHasDocuments);
    assert_eq!(decision.payout, 1_000_000);
    assert_eq!(decision.freight_refund, 37_500);
    assert_eq!(decision.total, 1_037_500);
    assert!(!decision.capped);
    assert_eq!(h.notifier.of_kind(NotificationKind::CompensationProposed).len(), 1);
    assert_eq!(h.coordinator.issue(issue_id).await?.issue.status, IssueStatus::InProgress);

    let adjusted = h
        .coordinator
        .adjust_compensation(issue_id, 900_000, "partial salvage recovered")
        .await?;
    assert_eq!(adjusted.final_payout(), Some(900_000));

    let out = h
        .coordinator
        .resolve_issue(
            issue_id,
            IssueResolution::ApproveCompensation { input: None },
            None,
        )
        .await?;
    assert_eq!(out.payout, Some(900_000));
    assert_eq!(out.issue.status, IssueStatus::Resolved);
    assert_eq!(
        out.assessment.as_ref().map(|a| a.status),
        Some(AssessmentStatus::Approved)
    );
    assert_eq!(out.result.order_status, OrderStatus::Compensation);

    let after = h.coordinator.shipment(snap.shipment.id).await?;
    assert_eq!(after.packages[0].status, PackageStatus::Compensation);
    assert_eq!(after.packages[1].status, PackageStatus::OnDelivered);
    Ok(())
}

#[tokio::test]
async fn uninsured_claim_is_capped_at_the_legal_limit() -> anyhow::Result<()> {
    let h = Harness::new();
    let (_snap, _trip, opened) = damaged(&h).await?;

    let out = h
        .coordinator
        .resolve_issue(
            opened.issue.id,
            IssueResolution::ApproveCompensation {
                input: Some(uninsured_damage(5_000_000)),
            },
            None,
        )
        .await?;

    let decision = out
        .assessment
        .as_ref()
        .and_then(|a| a.decision)
        .expect("decision recorded");
    assert_eq!(decision.case, CompensationCase::NoInsuranceNoDocuments);
    assert_eq!(decision.raw_estimate, 5_000_000);
    assert_eq!(decision.legal_limit, Some(1_000_000));
    assert!(decision.capped);
    assert_eq!(out.payout, Some(1_000_000));
    Ok(())
}

#[tokio::test]
async fn approval_without_a_proposal_writes_nothing() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, _trip, opened) = damaged(&h).await?;
    let commits = h.store.commit_count();

    let err = h
        .coordinator
        .resolve_issue(
            opened.issue.id,
            IssueResolution::ApproveCompensation { input: None },
            None,
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, LifecycleError::Compensation(CompensationError::InvalidState { .. })),
        "{err}"
    );
    assert_eq!(h.store.commit_count(), commits);

    let after = h.coordinator.shipment(snap.shipment.id).await?;
    assert_eq!(after.packages[0].status, PackageStatus::InTroubles);
    assert_eq!(h.coordinator.issue(opened.issue.id).await?.issue.status, IssueStatus::Open);
    Ok(())
}

#[tokio::test]
async fn approved_assessment_is_immutable() -> anyhow::Result<()> {
    let h = Harness::new();
    let (_snap, _trip, opened) = damaged(&h).await?;
    let issue_id = opened.issue.id;
    h.coordinator
        .propose_compensation(issue_id, insured_damage())
        .await?;
    h.coordinator
        .resolve_issue(
            issue_id,
            IssueResolution::ApproveCompensation { input: None },
            None,
        )
        .await?;

    assert!(h
        .coordinator
        .adjust_compensation(issue_id, 1, "typo")
        .await
        .is_err());
    assert!(h
        .coordinator
        .resolve_issue(issue_id, IssueResolution::Fraud, None)
        .await
        .is_err());

    let stored = h.coordinator.issue(issue_id).await?;
    let a = stored.assessment.expect("assessment");
    assert_eq!(a.status, AssessmentStatus::Approved);
    assert_eq!(a.final_payout(), Some(1_037_500));
    Ok(())
}

#[tokio::test]
async fn fraud_closes_the_issue_and_resumes_packages() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, _trip, opened) = damaged(&h).await?;
    h.coordinator
        .propose_compensation(opened.issue.id, insured_damage())
        .await?;

    let out = h
        .coordinator
        .resolve_issue(
            opened.issue.id,
            IssueResolution::Fraud,
            Some("photos predate pickup".to_string()),
        )
        .await?;
    assert_eq!(out.issue.status, IssueStatus::ClosedFraud);
    assert_eq!(out.payout, None);
    assert_eq!(
        out.assessment.as_ref().map(|a| a.status),
        Some(AssessmentStatus::Rejected)
    );
    assert_eq!(out.result.order_status, OrderStatus::OnDelivered);

    let after = h.coordinator.shipment(snap.shipment.id).await?;
    assert!(after
        .packages
        .iter()
        .all(|p| p.status == PackageStatus::OnDelivered));
    Ok(())
}

#[tokio::test]
async fn runaway_resolutions_do_not_apply_to_damage() -> anyhow::Result<()> {
    let h = Harness::new();
    let (_snap, _trip, opened) = damaged(&h).await?;

    let err = h
        .coordinator
        .resolve_issue(opened.issue.id, IssueResolution::DriverSafe, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)), "{err}");
    Ok(())
}

#[tokio::test]
async fn out_of_range_ratio_is_a_validation_error() -> anyhow::Result<()> {
    let h = Harness::new();
    let (_snap, _trip, opened) = damaged(&h).await?;
    let mut input = insured_damage();
    input.evidence = fl_schemas::DamageEvidence::Ratio(1.5);

    let err = h
        .coordinator
        .propose_compensation(opened.issue.id, input)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)), "{err}");

    let mut input = insured_damage();
    input.weight_share = Some(-0.1);
    let err = h
        .coordinator
        .propose_compensation(opened.issue.id, input)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)), "{err}");
    Ok(())
}

#[tokio::test]
async fn damage_cannot_be_waved_through_without_a_decision() -> anyhow::Result<()> {
    let h = Harness::new();
    let (snap, _trip, opened) = damaged(&h).await?;
    let issue_id = opened.issue.id;
    h.coordinator
        .propose_compensation(issue_id, insured_damage())
        .await?;

    for resolution in [IssueResolution::Resume, IssueResolution::Return] {
        let err = h
            .coordinator
            .resolve_issue(issue_id, resolution, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)), "{err}");
    }

    let still = h.coordinator.issue(issue_id).await?;
    assert_eq!(still.issue.status, IssueStatus::InProgress);
    assert_eq!(
        still.assessment.as_ref().map(|a| a.status),
        Some(AssessmentStatus::Proposed)
    );
    let after = h.coordinator.shipment(snap.shipment.id).await?;
    assert_eq!(after.packages[0].status, PackageStatus::InTroubles);
    assert_eq!(after.shipment.status, OrderStatus::InTroubles);
    Ok(())
}
