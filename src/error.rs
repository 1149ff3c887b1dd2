// src/error.rs
use thiserror::Error;

/// Failure taxonomy for one retargeting pass.
///
/// None of these are fatal to the pipeline. The first four are per-frame
/// conditions; the component that hits one holds its previous output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetargetError {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("low confidence: {0}")]
    LowConfidence(String),

    #[error("geometric degeneracy: {0}")]
    GeometricDegeneracy(String),

    #[error("external solver failure: {0}")]
    ExternalSolverFailure(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("joint {0} has no forward calibration")]
    UncalibratedJoint(String),
}

impl RetargetError {
    /// Conditions that only cost the current frame its output for one region.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RetargetError::MissingInput(_)
                | RetargetError::LowConfidence(_)
                | RetargetError::GeometricDegeneracy(_)
                | RetargetError::ExternalSolverFailure(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RetargetError::MissingInput(_) => "missing_input",
            RetargetError::LowConfidence(_) => "low_confidence",
            RetargetError::GeometricDegeneracy(_) => "geometric_degeneracy",
            RetargetError::ExternalSolverFailure(_) => "external_solver_failure",
            RetargetError::InvalidConfig(_) => "invalid_config",
            RetargetError::UncalibratedJoint(_) => "uncalibrated_joint",
        }
    }
}

pub type Result<T> = std::result::Result<T, RetargetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RetargetError::MissingInput("face".into()).is_transient());
        assert!(RetargetError::GeometricDegeneracy("torso".into()).is_transient());
        assert!(!RetargetError::InvalidConfig("q".into()).is_transient());
        assert!(!RetargetError::UncalibratedJoint("hips".into()).is_transient());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = RetargetError::ExternalSolverFailure("did not converge".into());
        assert_eq!(err.to_string(), "external solver failure: did not converge");
    }
}
