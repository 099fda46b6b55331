//! Undefined-propagating rational arithmetic.
//!
//! Exact algorithms can hit rank-deficient constructions (zero service rate,
//! non-positive marginal probability). Those spots carry `None` instead of a
//! fabricated zero, and `None` poisons exactly the outputs that depend on it.

use crate::error::{CoreError, CoreResult};
use nalgebra::{DMatrix, DVector};
use num_rational::BigRational;
use num_traits::Zero;

/// A rational value that may be undefined (diverged / singular).
pub type MaybeRational = Option<BigRational>;

/// Multiplication short-circuits to undefined the instant an operand is.
pub fn mul(a: &MaybeRational, b: &MaybeRational) -> MaybeRational {
    match (a, b) {
        (Some(x), Some(y)) => Some(x * y),
        _ => None,
    }
}

pub fn add(a: &MaybeRational, b: &MaybeRational) -> MaybeRational {
    match (a, b) {
        (Some(x), Some(y)) => Some(x + y),
        _ => None,
    }
}

/// Division by an undefined or zero denominator is undefined.
pub fn div(a: &MaybeRational, b: &MaybeRational) -> MaybeRational {
    match (a, b) {
        (Some(x), Some(y)) if !y.is_zero() => Some(x / y),
        _ => None,
    }
}

/// Matrix-vector product over `MaybeRational` with strict shape checking.
///
/// `matrix` is row-major, `rows x cols`; each output row is undefined if any
/// term feeding it is undefined.
pub fn mat_vec_mul(
    matrix: &[Vec<MaybeRational>],
    vector: &[MaybeRational],
) -> CoreResult<Vec<MaybeRational>> {
    let rows = matrix.len();
    let cols = matrix.first().map_or(0, Vec::len);
    if matrix.iter().any(|row| row.len() != cols) {
        return Err(CoreError::InvalidArg {
            what: "ragged matrix rows",
        });
    }
    if vector.len() != cols {
        return Err(CoreError::DimensionMismatch {
            what: "mat_vec_mul",
            rows,
            cols,
            len: vector.len(),
        });
    }
    let mut out = Vec::with_capacity(rows);
    for row in matrix {
        let mut acc: MaybeRational = Some(BigRational::zero());
        for (a, b) in row.iter().zip(vector) {
            acc = add(&acc, &mul(a, b));
        }
        out.push(acc);
    }
    Ok(out)
}

/// f64 twin of [`mat_vec_mul`] with the same shape discipline.
pub fn mat_vec_mul_f64(matrix: &DMatrix<f64>, vector: &DVector<f64>) -> CoreResult<DVector<f64>> {
    if matrix.ncols() != vector.len() {
        return Err(CoreError::DimensionMismatch {
            what: "mat_vec_mul_f64",
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            len: vector.len(),
        });
    }
    Ok(matrix * vector)
}
