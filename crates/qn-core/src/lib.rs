//! qn-core: stable foundation for the queueing-network solvers.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers)
//! - combinatorics (memoized factorial/binomial tables, fixed and big precision)
//! - bigexp (exp/log bridging f64 exponent range and `BigRational`)
//! - maybe (undefined-propagating rational arithmetic and matrix kernels)
//! - population (population-vector lattice enumeration and memo keys)
//! - error (shared error types)

pub mod bigexp;
pub mod combinatorics;
pub mod error;
pub mod maybe;
pub mod numeric;
pub mod population;

// Re-exports: nice ergonomics for downstream crates
pub use bigexp::{big_exp, big_ln, exp_split, log_sum_exp};
pub use combinatorics::{BigFactorialTable, FactorialTable};
pub use error::{CoreError, CoreResult};
pub use maybe::MaybeRational;
pub use numeric::*;
pub use population::{PopulationMap, generate_populations, pop_hash_code};
