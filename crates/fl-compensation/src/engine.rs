use fl_schemas::{AssessmentInput, CompensationCase, CompensationDecision, DamageEvidence};

use crate::{CompensationError, CompensationPolicy, DamageRatio};

/// Decide the compensation case and payout for one damaged shipment.
///
/// | insurance | documents | case | payout                       |
/// |-----------|-----------|------|------------------------------|
/// | yes       | yes       | 1    | estimate, bounded by declared |
/// | yes       | no        | 2    | min(estimate, legal limit)   |
/// | no        | yes       | 3    | min(documented, legal limit) |
/// | no        | no        | 4    | min(market est., legal limit)|
///
/// The estimate is `ratio x declared value` for ratio evidence, or the given
/// amount. Legal limit = `policy.legal_cap_multiplier x freight fee`.
///
/// On top of the payout the customer gets back the freight paid for the
/// damaged part of the load: `fee x weight share x damage rate`. For amount
/// evidence the damage rate is `amount / declared value` (zero when nothing
/// was declared). In case 2 the insurance is void and the legal limit bounds
/// the total, refund included.
pub fn assess(
    input: &AssessmentInput,
    policy: &CompensationPolicy,
) -> Result<CompensationDecision, CompensationError> {
    if let Some(declared) = input.declared_value {
        non_negative("declared_value", declared)?;
    }
    non_negative("freight_fee", input.freight_fee)?;
    let share = match input.weight_share {
        Some(s) => DamageRatio::new(s).map_err(|_| CompensationError::WeightShareOutOfRange(s))?,
        None => DamageRatio::FULL,
    };

    let case = CompensationCase::from_flags(input.has_insurance, input.has_documents);

    let (raw_estimate, rate) = match input.evidence {
        DamageEvidence::Ratio(r) => {
            let ratio = DamageRatio::new(r)?;
            let declared = input
                .declared_value
                .ok_or(CompensationError::MissingDeclaredValue("ratio evidence"))?;
            (ratio.of(declared), ratio)
        }
        DamageEvidence::Amount(amount) => {
            non_negative("damage_amount", amount)?;
            let rate = match input.declared_value {
                Some(declared) => DamageRatio::from_parts(amount, declared),
                None => DamageRatio::ZERO,
            };
            (amount, rate)
        }
    };
    let freight_refund = freight_refund(input.freight_fee, share, rate);

    if !case.applies_legal_limit() {
        let declared = input
            .declared_value
            .ok_or(CompensationError::MissingDeclaredValue("an insured claim"))?;
        let payout = raw_estimate.min(declared);
        return Ok(CompensationDecision {
            case,
            raw_estimate,
            legal_limit: None,
            payout,
            freight_refund,
            total: payout.saturating_add(freight_refund),
            capped: false,
        });
    }

    if input.freight_fee == 0 {
        return Err(CompensationError::NonPositiveFreightFee(input.freight_fee));
    }
    let legal_limit = input
        .freight_fee
        .checked_mul(policy.legal_cap_multiplier)
        .ok_or(CompensationError::LimitOverflow {
            fee: input.freight_fee,
            multiplier: policy.legal_cap_multiplier,
        })?;

    let payout = raw_estimate.min(legal_limit);
    let mut total = payout.saturating_add(freight_refund);
    if case == CompensationCase::HasInsuranceNoDocuments {
        total = total.min(legal_limit);
    }

    Ok(CompensationDecision {
        case,
        raw_estimate,
        legal_limit: Some(legal_limit),
        payout,
        freight_refund,
        total,
        capped: raw_estimate > legal_limit || total < payout.saturating_add(freight_refund),
    })
}

/// `fee x share x rate`, rounded half up.
fn freight_refund(fee: i64, share: DamageRatio, rate: DamageRatio) -> i64 {
    let scale = DamageRatio::SCALE as i128;
    let den = scale * scale;
    let num = fee as i128 * share.ppm() as i128 * rate.ppm() as i128;
    ((num + den / 2) / den) as i64
}

fn non_negative(field: &'static str, value: i64) -> Result<(), CompensationError> {
    if value < 0 {
        return Err(CompensationError::NegativeAmount { field, value });
    }
    Ok(())
}
