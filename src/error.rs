use std::fmt;
use thiserror::Error;

/// A reagent whose source wells cannot cover what the destination needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReagentDeficit {
    pub reagent: String,
    pub available: f64,
    pub required: f64,
}

impl ReagentDeficit {
    pub fn shortfall(&self) -> f64 {
        (self.required - self.available).max(0.0)
    }
}

impl fmt::Display for ReagentDeficit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (available {:.4} uL, required {:.4} uL)",
            self.reagent, self.available, self.required
        )
    }
}

fn join_deficits(deficits: &[ReagentDeficit]) -> String {
    deficits
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum SynbioError {
    #[error("volume {volume} uL for well {well} is out of range")]
    Range { well: String, volume: f64 },

    #[error("volume {volume} uL exceeds max well volume {max_vol} uL for well {well}")]
    Capacity {
        well: String,
        volume: f64,
        max_vol: f64,
    },

    #[error("inconsistent plate geometry: {0}")]
    InconsistentGeometry(String),

    #[error(
        "source plate doesn't have enough material to populate destination plate: {}",
        join_deficits(.deficits)
    )]
    InsufficientSourceVolume { deficits: Vec<ReagentDeficit> },

    #[error(
        "source plate has {source_full} full well(s) but destination plate has {destination_full}"
    )]
    EmptyPlateMismatch {
        source_full: usize,
        destination_full: usize,
    },

    #[error("could not complete assignment: {0}")]
    PlanningInvariant(String),

    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    #[error("reagent '{0}' belongs to a different registry")]
    ForeignReagent(String),

    #[error("reagent '{0}' is already defined with different contents")]
    DuplicateReagent(String),

    #[error("unknown reagent '{0}'")]
    UnknownReagent(String),

    #[error("cyclic mixture definition: {}", .0.join(" -> "))]
    CyclicMixture(Vec<String>),

    #[error("unknown well '{0}'")]
    UnknownWell(String),

    #[error("unknown condition '{0}'")]
    UnknownCondition(String),

    #[error("malformed plate map: {0}")]
    PlateMapFormat(String),

    #[error("plate map is {map_rows}x{map_cols} but plate is {plate_rows}x{plate_cols}")]
    PlateMapShape {
        map_rows: usize,
        map_cols: usize,
        plate_rows: usize,
        plate_cols: usize,
    },

    #[error("source layout for '{reagent}' has {found} well(s), sizing needs {expected}")]
    SourceLayoutMismatch {
        reagent: String,
        expected: usize,
        found: usize,
    },

    #[error("unable to find appropriate overhang set(s): {0}")]
    NoOverhangSolution(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SynbioError {
    /// Errors a caller can fix by changing inputs, as opposed to internal bugs.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::PlanningInvariant(_) | Self::InconsistentGeometry(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SynbioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_volume_names_reagents() {
        let err = SynbioError::InsufficientSourceVolume {
            deficits: vec![ReagentDeficit {
                reagent: "H2O".to_string(),
                available: 8.0,
                required: 10.0,
            }],
        };
        let text = err.to_string();
        assert!(text.contains("H2O"));
        assert!(text.contains("8.0000"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_planning_invariant_is_fatal() {
        let err = SynbioError::PlanningInvariant("no candidate".to_string());
        assert!(!err.is_recoverable());
        assert!(err.to_string().starts_with("could not complete assignment"));
    }

    #[test]
    fn test_cycle_message_shows_path() {
        let err = SynbioError::CyclicMixture(vec!["A".into(), "B".into(), "A".into()]);
        assert_eq!(err.to_string(), "cyclic mixture definition: A -> B -> A");
    }
}
