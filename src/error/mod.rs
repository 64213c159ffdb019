use thiserror::Error;

use crate::model::wls::SingularSystem;

/// Errors raised while building or fitting a kinetic model
#[derive(Error, Debug)]
pub enum KineticModelError {
    /// Shape, length, unit or value problems in the inputs.
    ///
    /// Always raised before any row is fitted.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A weighted normal-equation solve failed for a row and the estimator
    /// does not degrade on singular systems
    #[error("Singular linear system while fitting row {row}")]
    SingularSystem { row: usize },

    /// The optimizer could not be set up or failed to run
    #[error("Optimization failed for row {row}: {reason}")]
    Optimization { row: usize, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Settings(#[from] serde_json::Error),
}

impl KineticModelError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        KineticModelError::InvalidInput(msg.into())
    }

    pub(crate) fn singular(row: usize, _err: SingularSystem) -> Self {
        KineticModelError::SingularSystem { row }
    }
}
