//! Error types for solver operations.

use qn_core::CoreError;
use qn_model::ModelError;
use thiserror::Error;

/// Errors that can occur while configuring or running a solver.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Input validation failed: {what}")]
    Validation { what: String },

    #[error("Algorithm {algorithm} cannot handle this model: {what}")]
    Incompatible { algorithm: &'static str, what: String },

    #[error("Model is unstable: {what}")]
    Unstable { what: String },

    #[error("Numeric singularity: {what}")]
    Singular { what: String },

    #[error("Solver lifecycle violation: expected phase {expected}, was {actual}")]
    Phase {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type SolverResult<T> = Result<T, SolverError>;
