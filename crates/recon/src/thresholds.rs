use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Numeric tolerance applied uniformly to every numeric mapping of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Maximum absolute difference (e.g. 0.01 = ±0.01).
    pub abs: f64,
    /// Maximum relative difference (e.g. 0.001 = 0.1%).
    pub rel: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { abs: 0.01, rel: 0.001 }
    }
}

impl Thresholds {
    pub fn new(abs: f64, rel: f64) -> Result<Self, ValidationError> {
        let thresholds = Self { abs, rel };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.abs.is_finite() || self.abs < 0.0 {
            return Err(ValidationError::InvalidThreshold { name: "abs", value: self.abs });
        }
        if !self.rel.is_finite() || self.rel < 0.0 {
            return Err(ValidationError::InvalidThreshold { name: "rel", value: self.rel });
        }
        Ok(())
    }
}
