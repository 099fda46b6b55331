use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Dimension mismatch in {what}: {rows}x{cols} against length {len}")]
    DimensionMismatch {
        what: &'static str,
        rows: usize,
        cols: usize,
        len: usize,
    },

    #[error("Arithmetic overflow in {what} at n = {n}")]
    Overflow { what: &'static str, n: usize },
}
