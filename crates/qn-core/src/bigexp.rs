//! Stable exp/log bridging the f64 exponent range and `BigRational`.
//!
//! Normalizing constants of large closed networks live far outside the f64
//! exponent range. The trick used throughout: split an exponent into an
//! integer power of two (kept exact in rational arithmetic) and a small
//! fractional remainder (evaluated in f64, where it is well conditioned).

use crate::error::{CoreError, CoreResult};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};

/// Split `p` as `p = q*ln2 + r` with `r` in `(-ln2, ln2)`.
pub fn exp_split(p: f64) -> (i64, f64) {
    let q = (p / std::f64::consts::LN_2).trunc();
    (q as i64, p - q * std::f64::consts::LN_2)
}

/// `e^p` as an exact-by-construction rational: `2^q * rational(e^r)`.
///
/// The power-of-two factor carries the magnitude, so `p` may be far outside
/// the f64 exponent range.
pub fn big_exp(p: f64) -> CoreResult<BigRational> {
    if !p.is_finite() {
        return Err(CoreError::NonFinite {
            what: "big_exp argument",
            value: p,
        });
    }
    let (q, r) = exp_split(p);
    let frac = BigRational::from_float(r.exp()).ok_or(CoreError::NonFinite {
        what: "big_exp fractional part",
        value: r,
    })?;
    let two = BigInt::from(2);
    let scale = if q >= 0 {
        BigRational::from_integer(two.pow(q as u32))
    } else {
        BigRational::new(BigInt::from(1), two.pow((-q) as u32))
    };
    Ok(scale * frac)
}

/// `ln x` for a positive rational of arbitrary magnitude.
///
/// Writes `x = m * 2^k` with `m` in `[0.5, 1)`; `m` fits f64 comfortably and
/// the exponent re-enters as `k * ln 2`.
pub fn big_ln(x: &BigRational) -> CoreResult<f64> {
    if !x.is_positive() {
        return Err(CoreError::InvalidArg {
            what: "big_ln of non-positive value",
        });
    }
    let k = x.numer().bits() as i64 - x.denom().bits() as i64;
    let two = BigInt::from(2);
    let scaled = if k >= 0 {
        x / BigRational::from_integer(two.pow(k as u32))
    } else {
        x * BigRational::from_integer(two.pow((-k) as u32))
    };
    // scaled is within a couple of octaves of 1 by construction
    let m = scaled.to_f64().ok_or(CoreError::InvalidArg {
        what: "big_ln mantissa conversion",
    })?;
    Ok(m.ln() + k as f64 * std::f64::consts::LN_2)
}

/// Stable `ln(sum(exp(x_i)))` for log-domain weights.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    let m = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return m;
    }
    let sum: f64 = xs.iter().map(|x| (x - m).exp()).sum();
    m + sum.ln()
}
