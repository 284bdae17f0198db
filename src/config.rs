use crate::error::{Result, SynbioError};
use crate::planner::{CandidateOrder, PlannerConfig};
use crate::staging::SizingConfig;
use crate::units::VolumeUnit;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Tunable planning and sizing policy. Missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynbioParameters {
    pub planner: PlannerConfig,
    pub sizing: SizingConfig,
}

pub const PARAMETER_NAMES: [&str; 7] = [
    "output_decimals",
    "output_unit",
    "source_plate_label",
    "destination_plate_label",
    "candidate_order",
    "buffer_vol",
    "sizing_decimals",
];

impl SynbioParameters {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Sets one parameter by name and returns a short confirmation.
    pub fn set_parameter(&mut self, name: &str, value: &Value) -> Result<String> {
        match name {
            "output_decimals" => {
                self.planner.output_decimals = decimals(name, value)?;
            }
            "output_unit" => {
                self.planner.output_unit = value
                    .as_str()
                    .and_then(VolumeUnit::parse)
                    .ok_or_else(|| invalid(name, "one of nL, uL, mL"))?;
            }
            "source_plate_label" => {
                self.planner.source_plate_label = label(name, value)?;
            }
            "destination_plate_label" => {
                self.planner.destination_plate_label = label(name, value)?;
            }
            "candidate_order" => {
                self.planner.candidate_order = value
                    .as_str()
                    .and_then(CandidateOrder::parse)
                    .ok_or_else(|| invalid(name, "'lifo' or 'ascending'"))?;
            }
            "buffer_vol" => {
                let raw = value
                    .as_f64()
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .ok_or_else(|| invalid(name, "a nonnegative number of uL"))?;
                self.sizing.buffer_vol = raw;
            }
            "sizing_decimals" => {
                self.sizing.decimals = decimals(name, value)?;
            }
            _ => {
                return Err(SynbioError::InvalidParameter(format!(
                    "unknown parameter '{name}', expected one of: {}",
                    PARAMETER_NAMES.join(", ")
                )));
            }
        }
        Ok(format!("Set parameter '{name}' to {value}"))
    }
}

fn invalid(name: &str, expected: &str) -> SynbioError {
    SynbioError::InvalidParameter(format!("{name} requires {expected}"))
}

fn decimals(name: &str, value: &Value) -> Result<u32> {
    value
        .as_u64()
        .filter(|v| *v <= 12)
        .map(|v| v as u32)
        .ok_or_else(|| invalid(name, "an integer between 0 and 12"))
}

fn label(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(invalid(name, "a non-empty string")),
    }
}
