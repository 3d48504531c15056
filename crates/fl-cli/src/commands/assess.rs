//! `fl assess`: run the compensation engine on one input without touching
//! any issue. Used by claims staff to sanity-check a figure before proposing.

use anyhow::{Context, Result};
use fl_compensation::{assess, CompensationPolicy};
use fl_schemas::AssessmentInput;

use super::{load_cli_config, read_json_file};

pub fn run(input_path: &str, config_paths: &[String], as_json: bool) -> Result<()> {
    let settings = load_cli_config(config_paths)?.settings()?;
    let policy = CompensationPolicy {
        legal_cap_multiplier: settings.compensation.legal_cap_multiplier,
    };

    let raw = read_json_file(input_path)?;
    let input: AssessmentInput =
        serde_json::from_value(raw).context("input is not an assessment input")?;
    let decision = assess(&input, &policy).map_err(|e| anyhow::anyhow!("ASSESS_REJECTED: {e}"))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
        return Ok(());
    }

    println!("case={}", decision.case);
    println!("raw_estimate={}", decision.raw_estimate);
    match decision.legal_limit {
        Some(limit) => println!("legal_limit={}", limit),
        None => println!("legal_limit=NONE"),
    }
    println!("payout={}", decision.payout);
    println!("freight_refund={}", decision.freight_refund);
    println!("total={}", decision.total);
    println!("capped={}", decision.capped);
    Ok(())
}
