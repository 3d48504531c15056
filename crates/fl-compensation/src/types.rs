use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Knobs of the compensation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationPolicy {
    /// Legal limit = multiplier x freight fee (cases 2-4).
    pub legal_cap_multiplier: i64,
}

impl Default for CompensationPolicy {
    fn default() -> Self {
        Self {
            legal_cap_multiplier: 10,
        }
    }
}

/// Damage ratio validated into [0, 1], held as parts-per-million.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DamageRatio(u32);

impl DamageRatio {
    pub const SCALE: u32 = 1_000_000;
    pub const ZERO: Self = Self(0);
    pub const FULL: Self = Self(Self::SCALE);

    pub fn new(ratio: f64) -> Result<Self, CompensationError> {
        if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
            return Err(CompensationError::RatioOutOfRange(ratio));
        }
        Ok(Self((ratio * Self::SCALE as f64).round() as u32))
    }

    /// `part / whole`, clamped into [0, 1]. A non-positive whole gives zero.
    pub fn from_parts(part: i64, whole: i64) -> Self {
        if whole <= 0 || part <= 0 {
            return Self::ZERO;
        }
        let ppm = (part as i128 * Self::SCALE as i128 + whole as i128 / 2) / whole as i128;
        Self(ppm.min(Self::SCALE as i128) as u32)
    }

    pub fn ppm(&self) -> u32 {
        self.0
    }

    /// `ratio x value`, rounded half up.
    pub fn of(&self, value: i64) -> i64 {
        let scale = Self::SCALE as i128;
        ((value as i128 * self.0 as i128 + scale / 2) / scale) as i64
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompensationError {
    #[error("damage ratio must lie in [0, 1], got {0}")]
    RatioOutOfRange(f64),

    #[error("weight share must lie in [0, 1], got {0}")]
    WeightShareOutOfRange(f64),

    #[error("{field} must not be negative, got {value}")]
    NegativeAmount { field: &'static str, value: i64 },

    #[error("declared value is required for {0}")]
    MissingDeclaredValue(&'static str),

    #[error("freight fee must be positive to compute the legal limit, got {0}")]
    NonPositiveFreightFee(i64),

    #[error("legal limit overflows: fee {fee} x {multiplier}")]
    LimitOverflow { fee: i64, multiplier: i64 },

    #[error("assessment is {status} and can no longer change")]
    Immutable { status: &'static str },

    #[error("cannot {action} an assessment in {status}")]
    InvalidState {
        action: &'static str,
        status: &'static str,
    },

    #[error("a payout adjustment needs a reason")]
    MissingAdjustReason,
}
