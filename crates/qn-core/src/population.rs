//! Population-vector lattice enumeration and memo-table keys.
//!
//! Exact MVA walks the lattice of population vectors between zero and the
//! target population, bottom-up: metrics at `n` are computed from metrics at
//! every `n - e_r`. The enumeration order produced here guarantees those
//! predecessors always come first.

use std::collections::{HashMap, HashSet, VecDeque};

/// Every vector `v` with `0 <= v <= target` componentwise, ordered so that
/// all componentwise-smaller vectors of any element precede it.
///
/// Breadth-first expansion from the zero vector, then a lexicographic sort
/// comparing components from the last class to the first. The result length
/// is always `prod(target[c] + 1)`.
pub fn generate_populations(target: &[usize]) -> Vec<Vec<usize>> {
    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    let mut queue: VecDeque<Vec<usize>> = VecDeque::new();
    let zero = vec![0; target.len()];
    seen.insert(zero.clone());
    queue.push_back(zero);

    while let Some(pop) = queue.pop_front() {
        for c in 0..target.len() {
            if pop[c] < target[c] {
                let mut next = pop.clone();
                next[c] += 1;
                if seen.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }
    }

    let mut all: Vec<Vec<usize>> = seen.into_iter().collect();
    all.sort_by(|a, b| {
        for c in (0..a.len()).rev() {
            match a[c].cmp(&b[c]) {
                std::cmp::Ordering::Equal => continue,
                other => return other,
            }
        }
        std::cmp::Ordering::Equal
    });
    all
}

/// Bijective mixed-radix encoding of a population vector, base `max + 1`.
///
/// Callers must use one consistent `max` (an upper bound on every component)
/// within a solve, otherwise distinct vectors can collide.
pub fn pop_hash_code(pop: &[usize], max: usize) -> u64 {
    let base = (max + 1) as u64;
    let mut code = 0u64;
    for &c in pop.iter().rev() {
        code = code * base + c as u64;
    }
    code
}

/// Per-population memo table keyed by the vector itself.
///
/// Structural hashing sidesteps the mixed-radix encoding's implicit bound on
/// `max`; [`pop_hash_code`] remains available where a compact integer key is
/// wanted and the bound is known.
#[derive(Debug, Clone, Default)]
pub struct PopulationMap<V> {
    inner: HashMap<Vec<usize>, V>,
}

impl<V> PopulationMap<V> {
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn insert(&mut self, pop: &[usize], value: V) -> Option<V> {
        self.inner.insert(pop.to_vec(), value)
    }

    pub fn get(&self, pop: &[usize]) -> Option<&V> {
        self.inner.get(pop)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_2_3_has_twelve_unique_vectors() {
        let pops = generate_populations(&[2, 3]);
        assert_eq!(pops.len(), 12);
        let unique: HashSet<_> = pops.iter().cloned().collect();
        assert_eq!(unique.len(), 12);
    }

    #[test]
    fn predecessors_always_precede() {
        let pops = generate_populations(&[2, 3, 2]);
        for (i, p) in pops.iter().enumerate() {
            for (j, q) in pops.iter().enumerate() {
                let smaller = q.iter().zip(p).all(|(a, b)| a <= b) && q != p;
                if smaller {
                    assert!(j < i, "{q:?} must precede {p:?}");
                }
            }
        }
    }

    #[test]
    fn zero_target_yields_only_zero() {
        assert_eq!(generate_populations(&[0, 0]), vec![vec![0, 0]]);
    }

    #[test]
    fn hash_code_is_injective_over_lattice() {
        let pops = generate_populations(&[3, 2, 4]);
        let codes: HashSet<u64> = pops.iter().map(|p| pop_hash_code(p, 4)).collect();
        assert_eq!(codes.len(), pops.len());
    }

    #[test]
    fn population_map_round_trip() {
        let mut map = PopulationMap::new();
        map.insert(&[1, 2], 42);
        map.insert(&[2, 1], 7);
        assert_eq!(map.get(&[1, 2]), Some(&42));
        assert_eq!(map.get(&[2, 1]), Some(&7));
        assert_eq!(map.get(&[0, 0]), None);
        assert_eq!(map.len(), 2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn hash_is_injective_for_random_targets(
                target in prop::collection::vec(0_usize..4, 1..4)
            ) {
                let pops = generate_populations(&target);
                let max = target.iter().copied().max().unwrap_or(0);
                let codes: HashSet<u64> =
                    pops.iter().map(|p| pop_hash_code(p, max)).collect();
                prop_assert_eq!(codes.len(), pops.len());
            }

            #[test]
            fn lattice_size_is_product_of_targets(
                target in prop::collection::vec(0_usize..4, 1..4)
            ) {
                let expected: usize = target.iter().map(|t| t + 1).product();
                prop_assert_eq!(generate_populations(&target).len(), expected);
            }
        }
    }
}
