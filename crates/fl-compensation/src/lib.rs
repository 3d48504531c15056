//! fl-compensation
//!
//! Damage compensation decisions.
//!
//! Architectural decisions:
//! - Case chosen from (insurance, documents) alone
//! - Money in integer minor units; ratios held as parts-per-million
//! - Out-of-range or missing inputs are errors, never clamped or defaulted
//! - APPROVED assessments are immutable
//!
//! Pure deterministic logic. No IO, no wall-clock. Callers supply `now`.

mod engine;
mod review;
mod types;

pub use engine::assess;
pub use review::{adjust, approve, new_assessment, propose, reject};
pub use types::{CompensationError, CompensationPolicy, DamageRatio};
