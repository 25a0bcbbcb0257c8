use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("ranking weights must sum to 100 (got {sum})")]
    WeightsSum { sum: u64 },

    #[error("good threshold ({good}) must be greater than warning threshold ({warning})")]
    ThresholdOrder { good: u32, warning: u32 },

    #[error("{field} must be between 0 and 100 (got {value})")]
    OutOfRange { field: &'static str, value: u32 },

    #[error("invalid {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
}

impl SettingsError {
    pub fn details(&self) -> serde_json::Value {
        match self {
            SettingsError::WeightsSum { sum } => json!({ "field": "weights", "sum": sum }),
            SettingsError::ThresholdOrder { good, warning } => {
                json!({ "field": "thresholds", "good": good, "warning": warning })
            }
            SettingsError::OutOfRange { field, value } => {
                json!({ "field": field, "value": value })
            }
            SettingsError::Malformed { field, reason } => {
                json!({ "field": field, "reason": reason })
            }
        }
    }
}

/// Per-category ranking weights, in whole percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingWeights {
    pub casas_reading: u32,
    pub casas_listening: u32,
    pub tests: u32,
    pub attendance: u32,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            casas_reading: 25,
            casas_listening: 25,
            tests: 25,
            attendance: 25,
        }
    }
}

impl RankingWeights {
    pub fn sum(&self) -> u64 {
        [
            self.casas_reading,
            self.casas_listening,
            self.tests,
            self.attendance,
        ]
        .iter()
        .map(|w| u64::from(*w))
        .sum()
    }

    /// Weights are never normalized here; an off-total set is rejected as-is.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let sum = self.sum();
        if sum != 100 {
            return Err(SettingsError::WeightsSum { sum });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorThresholds {
    pub good: u32,
    pub warning: u32,
}

impl Default for ColorThresholds {
    fn default() -> Self {
        Self {
            good: 80,
            warning: 60,
        }
    }
}

impl ColorThresholds {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.good > 100 {
            return Err(SettingsError::OutOfRange {
                field: "thresholds.good",
                value: self.good,
            });
        }
        if self.good <= self.warning {
            return Err(SettingsError::ThresholdOrder {
                good: self.good,
                warning: self.warning,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSettings {
    pub weights: RankingWeights,
    pub thresholds: ColorThresholds,
}

impl ClassSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.weights.validate()?;
        self.thresholds.validate()
    }
}
