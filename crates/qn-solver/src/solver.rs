//! Solver lifecycle contract shared by every algorithm.

use crate::approx::{AqlSolver, BardSchweitzerSolver, ChowSolver, LinearizerSolver};
use crate::approx::priority::PriorityMvaSolver;
use crate::catalog::{Algorithm, validate_choice};
use crate::error::{SolverError, SolverResult};
use crate::exact::ExactMvaSolver;
use crate::montecarlo::MonteCarloSolver;
use crate::output::SolverOutput;
use qn_model::QnModel;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Single-use lifecycle: `Constructed -> Inputted -> Solved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Constructed,
    Inputted,
    Solved,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Constructed => "Constructed",
            Phase::Inputted => "Inputted",
            Phase::Solved => "Solved",
        }
    }
}

/// How a solve finished. Non-convergence is data, never silently a result.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolveOutcome {
    /// Exact recursion completed; no convergence question arises.
    Exact,
    /// Fixed-point iteration met the tolerance.
    Converged { iterations: usize },
    /// Iteration cap hit before the tolerance; tables hold the last sweep.
    IterationCapReached { iterations: usize, max_delta: f64 },
    /// Stochastic run; `within_precision` says whether the half-width target
    /// was met inside the sample budget.
    Sampled {
        samples: usize,
        half_width: f64,
        within_precision: bool,
    },
}

/// The contract every algorithm implements.
///
/// One instance solves one model once; instances over distinct models are
/// independent and safe to run on parallel workers.
pub trait MvaSolver: Send {
    fn algorithm(&self) -> Algorithm;

    /// Validate and deep-copy the model; moves `Constructed -> Inputted`.
    /// On failure the solver stays un-inputted and `solve()` is rejected.
    fn input(&mut self, model: &QnModel) -> SolverResult<()>;

    /// Compute the output tables; moves `Inputted -> Solved`. Re-solving a
    /// `Solved` instance is permitted and must be idempotent for exact
    /// algorithms.
    fn solve(&mut self) -> SolverResult<SolveOutcome>;

    /// Output accessors are valid only after `solve()` returned.
    fn output(&self) -> SolverResult<&SolverOutput>;
}

/// Shared lifecycle bookkeeping embedded in each concrete solver.
#[derive(Debug, Clone)]
pub(crate) struct SolverState {
    pub algorithm: Algorithm,
    pub phase: Phase,
    pub model: Option<QnModel>,
    pub output: Option<SolverOutput>,
}

impl SolverState {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            phase: Phase::Constructed,
            model: None,
            output: None,
        }
    }

    pub fn accept_input(&mut self, model: &QnModel) -> SolverResult<()> {
        if self.phase != Phase::Constructed {
            return Err(SolverError::Phase {
                expected: Phase::Constructed.name(),
                actual: self.phase.name(),
            });
        }
        model.validate().map_err(|e| SolverError::Validation {
            what: e.to_string(),
        })?;
        validate_choice(model, self.algorithm)?;
        // Deep copy: the solver is insulated from later external mutation.
        self.model = Some(model.clone());
        self.phase = Phase::Inputted;
        Ok(())
    }

    pub fn require_model(&self) -> SolverResult<&QnModel> {
        match (&self.model, self.phase) {
            (Some(m), Phase::Inputted | Phase::Solved) => Ok(m),
            _ => Err(SolverError::Phase {
                expected: Phase::Inputted.name(),
                actual: self.phase.name(),
            }),
        }
    }

    pub fn store_output(&mut self, output: SolverOutput) {
        self.output = Some(output);
        self.phase = Phase::Solved;
    }

    pub fn output(&self) -> SolverResult<&SolverOutput> {
        match (&self.output, self.phase) {
            (Some(out), Phase::Solved) => Ok(out),
            _ => Err(SolverError::Phase {
                expected: Phase::Solved.name(),
                actual: self.phase.name(),
            }),
        }
    }
}

/// Build a solver for `algorithm` after checking it is legal for `model`.
///
/// The model itself is passed separately to `input()`; this only consults the
/// catalog so an incompatible pairing fails before any numeric work.
pub fn build_solver(model: &QnModel, algorithm: Algorithm) -> SolverResult<Box<dyn MvaSolver>> {
    validate_choice(model, algorithm)?;
    Ok(match algorithm {
        Algorithm::ExactMva => Box::new(ExactMvaSolver::new()),
        Algorithm::BardSchweitzer => Box::new(BardSchweitzerSolver::default()),
        Algorithm::Chow => Box::new(ChowSolver::default()),
        Algorithm::Linearizer => Box::new(LinearizerSolver::default()),
        Algorithm::Aql => Box::new(AqlSolver::default()),
        Algorithm::PriorityMva => Box::new(PriorityMvaSolver::default()),
        Algorithm::MonteCarloLogistic => Box::new(MonteCarloSolver::default()),
    })
}
