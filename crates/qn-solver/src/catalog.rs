//! Static algorithm catalog and compatibility validation.
//!
//! The catalog is the single source of truth for what each algorithm can
//! handle; a chosen algorithm is checked against a model's shape here before
//! any numeric work begins.

use crate::error::{SolverError, SolverResult};
use qn_model::QnModel;
use std::sync::OnceLock;

/// The closed set of solution algorithms shipped by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Exact recursive MVA over the population lattice (rational arithmetic).
    ExactMva,
    /// Bard-Schweitzer fixed-point approximation.
    BardSchweitzer,
    /// Chow's aggregate-scaling fixed-point approximation.
    Chow,
    /// Chandy-Neuse Linearizer.
    Linearizer,
    /// Aggregate-queue-length Linearizer variant.
    Aql,
    /// Reduced-rate priority MVA for PRS/HOL stations.
    PriorityMva,
    /// Logistic importance sampling of the normalizing constant.
    MonteCarloLogistic,
}

/// Capability flags for one algorithm; used purely for compatibility
/// validation, never for dispatch logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmDescriptor {
    pub algorithm: Algorithm,
    pub name: &'static str,
    pub closed: bool,
    pub open: bool,
    pub exact: bool,
    pub iterative: bool,
    pub load_dependent: bool,
    pub priority: bool,
    /// Handles queueing stations with more than one server.
    pub multi_server: bool,
}

pub const CATALOG: [AlgorithmDescriptor; 7] = [
    AlgorithmDescriptor {
        algorithm: Algorithm::ExactMva,
        name: "MVA",
        closed: true,
        open: true,
        exact: true,
        iterative: false,
        load_dependent: true,
        priority: false,
        multi_server: true,
    },
    AlgorithmDescriptor {
        algorithm: Algorithm::BardSchweitzer,
        name: "Bard-Schweitzer",
        closed: true,
        open: false,
        exact: false,
        iterative: true,
        load_dependent: false,
        priority: false,
        multi_server: false,
    },
    AlgorithmDescriptor {
        algorithm: Algorithm::Chow,
        name: "Chow",
        closed: true,
        open: false,
        exact: false,
        iterative: true,
        load_dependent: false,
        priority: false,
        multi_server: false,
    },
    AlgorithmDescriptor {
        algorithm: Algorithm::Linearizer,
        name: "Linearizer",
        closed: true,
        open: false,
        exact: false,
        iterative: true,
        load_dependent: false,
        priority: false,
        multi_server: false,
    },
    AlgorithmDescriptor {
        algorithm: Algorithm::Aql,
        name: "AQL",
        closed: true,
        open: false,
        exact: false,
        iterative: true,
        load_dependent: false,
        priority: false,
        multi_server: false,
    },
    AlgorithmDescriptor {
        algorithm: Algorithm::PriorityMva,
        name: "Priority MVA",
        closed: true,
        open: false,
        exact: false,
        iterative: true,
        load_dependent: false,
        priority: true,
        multi_server: false,
    },
    AlgorithmDescriptor {
        algorithm: Algorithm::MonteCarloLogistic,
        name: "Logistic Sampling",
        closed: true,
        open: false,
        exact: false,
        iterative: false,
        load_dependent: false,
        priority: false,
        multi_server: false,
    },
];

impl Algorithm {
    pub fn descriptor(self) -> &'static AlgorithmDescriptor {
        // CATALOG is closed; every variant has exactly one entry.
        CATALOG
            .iter()
            .find(|d| d.algorithm == self)
            .unwrap_or_else(|| unreachable!("algorithm missing from catalog"))
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

/// Lookup by catalog name, case-insensitive.
pub fn by_name(name: &str) -> Option<&'static AlgorithmDescriptor> {
    CATALOG
        .iter()
        .find(|d| d.name.eq_ignore_ascii_case(name.trim()))
}

fn partition(f: fn(&AlgorithmDescriptor) -> bool) -> Vec<&'static AlgorithmDescriptor> {
    CATALOG.iter().filter(|d| f(d)).collect()
}

/// All algorithms able to solve purely closed models.
pub fn closed_capable() -> &'static [&'static AlgorithmDescriptor] {
    static VIEW: OnceLock<Vec<&'static AlgorithmDescriptor>> = OnceLock::new();
    VIEW.get_or_init(|| partition(|d| d.closed))
}

/// All algorithms able to solve purely open models.
pub fn open_capable() -> &'static [&'static AlgorithmDescriptor] {
    static VIEW: OnceLock<Vec<&'static AlgorithmDescriptor>> = OnceLock::new();
    VIEW.get_or_init(|| partition(|d| d.open))
}

/// All algorithms able to solve mixed open/closed models.
pub fn mixed_capable() -> &'static [&'static AlgorithmDescriptor] {
    static VIEW: OnceLock<Vec<&'static AlgorithmDescriptor>> = OnceLock::new();
    VIEW.get_or_init(|| partition(|d| d.closed && d.open))
}

/// Reject an algorithm/model pairing the algorithm cannot handle.
///
/// Must be called (directly or through `build_solver`) before any numeric
/// work on the model.
pub fn validate_choice(model: &QnModel, algorithm: Algorithm) -> SolverResult<()> {
    let desc = algorithm.descriptor();
    let reject = |what: String| {
        Err(SolverError::Incompatible {
            algorithm: desc.name,
            what,
        })
    };

    if model.has_open_classes() && !desc.open {
        return reject("model has open classes".into());
    }
    if model.has_closed_classes() && !desc.closed {
        return reject("model has closed classes".into());
    }
    if model.has_load_dependent() && !desc.load_dependent {
        return reject("model has load-dependent stations".into());
    }
    if model.uses_priorities() && !desc.priority {
        return reject("model uses priority scheduling".into());
    }
    if model.has_multi_server_queues() && !desc.multi_server {
        return reject("model has multi-server queueing stations".into());
    }
    // The exact load-dependent recursion is defined over the closed lattice
    // only; open arrivals at load-dependent stations are out of reach.
    if algorithm == Algorithm::ExactMva && model.has_load_dependent() && model.has_open_classes() {
        return reject("load-dependent stations require a purely closed model".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use qn_model::{CustomerClass, Station, StationKind};

    fn closed_model() -> QnModel {
        QnModel::new(
            vec![Station::load_independent("cpu", vec![0.1])],
            vec![CustomerClass::closed("jobs", 2)],
            DMatrix::from_row_slice(1, 1, &[1.0]),
        )
        .unwrap()
    }

    fn open_model() -> QnModel {
        QnModel::new(
            vec![Station::load_independent("cpu", vec![0.1])],
            vec![CustomerClass::open("web", 0.5)],
            DMatrix::from_row_slice(1, 1, &[1.0]),
        )
        .unwrap()
    }

    #[test]
    fn every_algorithm_is_cataloged() {
        for alg in [
            Algorithm::ExactMva,
            Algorithm::BardSchweitzer,
            Algorithm::Chow,
            Algorithm::Linearizer,
            Algorithm::Aql,
            Algorithm::PriorityMva,
            Algorithm::MonteCarloLogistic,
        ] {
            assert_eq!(alg.descriptor().algorithm, alg);
        }
    }

    #[test]
    fn lookup_by_name_is_case_insensitive() {
        assert_eq!(by_name("mva").unwrap().algorithm, Algorithm::ExactMva);
        assert_eq!(by_name(" AQL ").unwrap().algorithm, Algorithm::Aql);
        assert!(by_name("simplex").is_none());
    }

    #[test]
    fn partitions_are_consistent() {
        assert!(closed_capable().len() >= 6);
        assert_eq!(open_capable().len(), 1);
        assert_eq!(mixed_capable().len(), 1);
        for d in mixed_capable() {
            assert!(d.closed && d.open);
        }
    }

    #[test]
    fn open_model_rejected_for_closed_only_algorithm() {
        let err = validate_choice(&open_model(), Algorithm::BardSchweitzer).unwrap_err();
        assert!(matches!(err, SolverError::Incompatible { .. }));
        assert!(validate_choice(&open_model(), Algorithm::ExactMva).is_ok());
    }

    #[test]
    fn priority_model_needs_priority_algorithm() {
        let m = QnModel::new(
            vec![Station::priority(
                "prio",
                StationKind::HeadOfLinePriority,
                vec![0.1],
            )],
            vec![CustomerClass::closed("jobs", 2)],
            DMatrix::from_row_slice(1, 1, &[1.0]),
        )
        .unwrap();
        assert!(validate_choice(&m, Algorithm::ExactMva).is_err());
        assert!(validate_choice(&m, Algorithm::PriorityMva).is_ok());
    }

    #[test]
    fn multi_server_queue_needs_a_multi_server_algorithm() {
        let m = QnModel::new(
            vec![Station::load_independent("dual", vec![0.4]).with_servers(2)],
            vec![CustomerClass::closed("jobs", 3)],
            DMatrix::from_row_slice(1, 1, &[1.0]),
        )
        .unwrap();
        for alg in [
            Algorithm::BardSchweitzer,
            Algorithm::Chow,
            Algorithm::Linearizer,
            Algorithm::Aql,
            Algorithm::MonteCarloLogistic,
        ] {
            assert!(
                matches!(
                    validate_choice(&m, alg),
                    Err(SolverError::Incompatible { .. })
                ),
                "{alg:?}"
            );
        }
        assert!(validate_choice(&m, Algorithm::ExactMva).is_ok());

        // multi-server delay centers are a no-op and stay legal everywhere
        let delay = QnModel::new(
            vec![Station::delay("think", vec![1.0]).with_servers(8)],
            vec![CustomerClass::closed("jobs", 3)],
            DMatrix::from_row_slice(1, 1, &[1.0]),
        )
        .unwrap();
        assert!(validate_choice(&delay, Algorithm::BardSchweitzer).is_ok());
    }

    #[test]
    fn load_dependent_open_combination_rejected() {
        let m = QnModel::new(
            vec![Station::load_dependent("flex", vec![vec![0.5]])],
            vec![CustomerClass::open("web", 0.4)],
            DMatrix::from_row_slice(1, 1, &[1.0]),
        )
        .unwrap();
        assert!(validate_choice(&m, Algorithm::ExactMva).is_err());
    }

    #[test]
    fn closed_model_accepts_iterative_family() {
        let m = closed_model();
        for alg in [
            Algorithm::BardSchweitzer,
            Algorithm::Chow,
            Algorithm::Linearizer,
            Algorithm::Aql,
            Algorithm::MonteCarloLogistic,
        ] {
            assert!(validate_choice(&m, alg).is_ok(), "{alg:?}");
        }
    }
}
