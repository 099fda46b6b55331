//! Multi-class MVA solver framework for product-form queueing networks.
//!
//! One contract, many algorithms: exact recursive MVA over the population
//! lattice (arbitrary-precision rationals), the Bard-Schweitzer / Chow /
//! Linearizer / AQL fixed-point family, reduced-rate priority MVA, and Monte
//! Carlo normalizing-constant sampling. The algorithm catalog validates an
//! algorithm against a model's shape before any numeric work; the
//! processing-capacity gate in `qn-model` must pass before solving models
//! with open classes.

pub mod approx;
pub mod catalog;
pub mod error;
pub mod exact;
pub mod montecarlo;
pub mod open;
pub mod output;
pub mod solver;
pub mod sweep;

pub use approx::priority::PriorityMvaSolver;
pub use approx::{
    AqlSolver, BardSchweitzerSolver, ChowSolver, IterativeConfig, LinearizerSolver,
};
pub use catalog::{
    Algorithm, AlgorithmDescriptor, CATALOG, by_name, closed_capable, mixed_capable,
    open_capable, validate_choice,
};
pub use error::{SolverError, SolverResult};
pub use exact::ExactMvaSolver;
pub use montecarlo::{MonteCarloConfig, MonteCarloSolver};
pub use output::SolverOutput;
pub use solver::{MvaSolver, Phase, SolveOutcome, build_solver};
pub use sweep::sweep_populations;
