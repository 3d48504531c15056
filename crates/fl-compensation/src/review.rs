//! Assessment lifecycle: PENDING_ASSESSMENT -> PROPOSED -> {APPROVED | REJECTED}.
//!
//! An APPROVED assessment is frozen. A PROPOSED one may be re-assessed (for
//! example after documents arrive late) or adjusted by staff with a reason.

use chrono::{DateTime, Utc};
use fl_schemas::{
    AssessmentId, AssessmentInput, AssessmentStatus, CompensationAssessment,
    CompensationDecision, IssueId,
};

use crate::{assess, CompensationError, CompensationPolicy};

pub fn new_assessment(issue_id: IssueId, now: DateTime<Utc>) -> CompensationAssessment {
    CompensationAssessment {
        id: AssessmentId::new(),
        issue_id,
        status: AssessmentStatus::PendingAssessment,
        input: None,
        decision: None,
        adjusted_payout: None,
        adjust_reason: None,
        updated_at: now,
        version: 0,
    }
}

/// Run the engine on `input` and record the result as the current proposal.
/// Any earlier staff adjustment is discarded.
pub fn propose(
    a: &mut CompensationAssessment,
    input: AssessmentInput,
    policy: &CompensationPolicy,
    now: DateTime<Utc>,
) -> Result<CompensationDecision, CompensationError> {
    ensure_open(a, "propose")?;
    let decision = assess(&input, policy)?;
    a.status = AssessmentStatus::Proposed;
    a.input = Some(input);
    a.decision = Some(decision);
    a.adjusted_payout = None;
    a.adjust_reason = None;
    a.updated_at = now;
    Ok(decision)
}

pub fn adjust(
    a: &mut CompensationAssessment,
    payout: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), CompensationError> {
    ensure_open(a, "adjust")?;
    if a.status != AssessmentStatus::Proposed {
        return Err(CompensationError::InvalidState {
            action: "adjust",
            status: a.status.as_str(),
        });
    }
    if payout < 0 {
        return Err(CompensationError::NegativeAmount {
            field: "adjusted_payout",
            value: payout,
        });
    }
    if reason.trim().is_empty() {
        return Err(CompensationError::MissingAdjustReason);
    }
    a.adjusted_payout = Some(payout);
    a.adjust_reason = Some(reason.trim().to_string());
    a.updated_at = now;
    Ok(())
}

/// PROPOSED -> APPROVED. Returns the amount to pay.
pub fn approve(a: &mut CompensationAssessment, now: DateTime<Utc>) -> Result<i64, CompensationError> {
    ensure_open(a, "approve")?;
    let payout = match (a.status, a.final_payout()) {
        (AssessmentStatus::Proposed, Some(p)) => p,
        _ => {
            return Err(CompensationError::InvalidState {
                action: "approve",
                status: a.status.as_str(),
            })
        }
    };
    a.status = AssessmentStatus::Approved;
    a.updated_at = now;
    Ok(payout)
}

pub fn reject(a: &mut CompensationAssessment, now: DateTime<Utc>) -> Result<(), CompensationError> {
    ensure_open(a, "reject")?;
    a.status = AssessmentStatus::Rejected;
    a.updated_at = now;
    Ok(())
}

fn ensure_open(a: &CompensationAssessment, action: &'static str) -> Result<(), CompensationError> {
    match a.status {
        AssessmentStatus::Approved => Err(CompensationError::Immutable {
            status: a.status.as_str(),
        }),
        AssessmentStatus::Rejected => Err(CompensationError::InvalidState {
            action,
            status: a.status.as_str(),
        }),
        AssessmentStatus::PendingAssessment | AssessmentStatus::Proposed => Ok(()),
    }
}
