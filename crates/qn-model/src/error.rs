use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model validation failed: {what}")]
    Validation { what: String },

    #[error("Core error: {0}")]
    Core(#[from] qn_core::CoreError),
}
