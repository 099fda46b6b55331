//! Memoized factorial and binomial tables, fixed and arbitrary precision.

use crate::error::{CoreError, CoreResult};
use num_bigint::BigUint;
use num_traits::One;

/// Lazily growing f64 factorial table with a parallel ln-factorial table.
///
/// The ln table stays usable far past the point where `n!` itself overflows
/// f64, which is what the log-domain sampling weights need.
#[derive(Debug, Clone)]
pub struct FactorialTable {
    fact: Vec<f64>,
    ln_fact: Vec<f64>,
}

impl Default for FactorialTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FactorialTable {
    pub fn new() -> Self {
        Self {
            fact: vec![1.0, 1.0],
            ln_fact: vec![0.0, 0.0],
        }
    }

    fn grow_to(&mut self, n: usize) {
        while self.fact.len() <= n {
            let k = self.fact.len();
            let prev = self.fact[k - 1];
            self.fact.push(prev * k as f64);
            self.ln_fact.push(self.ln_fact[k - 1] + (k as f64).ln());
        }
    }

    /// `n!` as f64. Overflow past the representable range is an error,
    /// not a silent `inf`.
    pub fn factorial(&mut self, n: usize) -> CoreResult<f64> {
        self.grow_to(n);
        let v = self.fact[n];
        if v.is_finite() {
            Ok(v)
        } else {
            Err(CoreError::Overflow {
                what: "factorial",
                n,
            })
        }
    }

    /// `ln(n!)`, finite for any practical `n`.
    pub fn ln_factorial(&mut self, n: usize) -> f64 {
        self.grow_to(n);
        self.ln_fact[n]
    }

    /// Binomial coefficient `C(n, k)` as f64.
    pub fn binomial(&mut self, n: usize, k: usize) -> CoreResult<f64> {
        if k > n {
            return Ok(0.0);
        }
        // Log-domain quotient avoids overflowing the intermediate factorials.
        let v = (self.ln_factorial(n) - self.ln_factorial(k) - self.ln_factorial(n - k)).exp();
        if v.is_finite() {
            Ok(v)
        } else {
            Err(CoreError::Overflow {
                what: "binomial",
                n,
            })
        }
    }
}

/// Memoized exact factorials for the arbitrary-precision paths.
#[derive(Debug, Clone)]
pub struct BigFactorialTable {
    fact: Vec<BigUint>,
}

impl Default for BigFactorialTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BigFactorialTable {
    pub fn new() -> Self {
        Self {
            fact: vec![BigUint::one(), BigUint::one()],
        }
    }

    pub fn factorial(&mut self, n: usize) -> &BigUint {
        while self.fact.len() <= n {
            let k = self.fact.len();
            let next = &self.fact[k - 1] * BigUint::from(k);
            self.fact.push(next);
        }
        &self.fact[n]
    }

    pub fn binomial(&mut self, n: usize, k: usize) -> BigUint {
        if k > n {
            return BigUint::ZERO;
        }
        let num = self.factorial(n).clone();
        let den = self.factorial(k).clone() * self.factorial(n - k).clone();
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_factorials() {
        let mut t = FactorialTable::new();
        assert_eq!(t.factorial(0).unwrap(), 1.0);
        assert_eq!(t.factorial(5).unwrap(), 120.0);
        assert_eq!(t.factorial(10).unwrap(), 3_628_800.0);
    }

    #[test]
    fn factorial_overflow_is_reported() {
        let mut t = FactorialTable::new();
        assert!(matches!(
            t.factorial(200),
            Err(CoreError::Overflow { n: 200, .. })
        ));
        // ln table keeps working past the f64 factorial range
        assert!(t.ln_factorial(200).is_finite());
    }

    #[test]
    fn binomial_values() {
        let mut t = FactorialTable::new();
        assert_eq!(t.binomial(5, 0).unwrap(), 1.0);
        assert!((t.binomial(5, 2).unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(t.binomial(3, 5).unwrap(), 0.0);
        // large n stays finite through the log-domain quotient
        assert!((t.binomial(300, 2).unwrap() - 44_850.0).abs() < 1e-6);
    }

    #[test]
    fn big_factorial_exact() {
        let mut t = BigFactorialTable::new();
        assert_eq!(t.factorial(20).to_string(), "2432902008176640000");
        assert_eq!(t.binomial(52, 5), BigUint::from(2_598_960_u64));
    }
}
