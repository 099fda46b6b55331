//! Iterative (fixed-point) MVA family.
//!
//! All members share one sweep: recompute residence times as if the current
//! queue-length estimate already reflected population `n - e_r`, then
//! throughputs and queue lengths with the exact inner formulas, until the
//! largest relative queue-length change drops below tolerance. They differ
//! only in how `Q_k(n - e_r)` is estimated.

pub mod linearizer;
pub mod priority;

use crate::catalog::Algorithm;
use crate::error::{SolverError, SolverResult};
use crate::output::SolverOutput;
use crate::solver::{MvaSolver, SolveOutcome, SolverState};
use nalgebra::DMatrix;
use qn_model::{QnModel, StationKind};
use tracing::{debug, warn};

pub use linearizer::{AqlSolver, LinearizerSolver};

/// Convergence tolerance and iteration cap shared by the fixed-point family.
#[derive(Debug, Clone, Copy)]
pub struct IterativeConfig {
    /// Maximum relative queue-length change that still counts as converged.
    pub tolerance: f64,
    /// Hard cap on sweeps; hitting it is reported, never silently accepted.
    pub max_iterations: usize,
}

impl Default for IterativeConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            max_iterations: 1000,
        }
    }
}

/// f64 view of a closed model, precomputed once per solve.
pub(crate) struct ClosedView {
    pub stations: usize,
    pub classes: usize,
    /// Closed population per class (open classes never reach this family).
    pub n: Vec<f64>,
    pub visits: DMatrix<f64>,
    /// Per-visit service time.
    pub s: DMatrix<f64>,
    pub kind: Vec<StationKind>,
    pub priority: Vec<u32>,
}

impl ClosedView {
    pub fn build(model: &QnModel) -> Self {
        let m = model.station_count();
        let r = model.class_count();
        let mut s = DMatrix::zeros(m, r);
        for k in 0..m {
            for c in 0..r {
                s[(k, c)] = model.service_time(k, c);
            }
        }
        Self {
            stations: m,
            classes: r,
            n: model
                .classes
                .iter()
                .map(|c| c.population() as f64)
                .collect(),
            visits: model.visits.clone(),
            s,
            kind: model.stations.iter().map(|st| st.kind).collect(),
            priority: model.classes.iter().map(|c| c.priority).collect(),
        }
    }

    /// Initial guess: each class's population spread evenly over the
    /// stations it visits.
    pub fn initial_queue(&self) -> DMatrix<f64> {
        let mut q = DMatrix::zeros(self.stations, self.classes);
        for c in 0..self.classes {
            let visited = (0..self.stations)
                .filter(|&k| self.visits[(k, c)] > 0.0)
                .count();
            if visited == 0 {
                continue;
            }
            for k in 0..self.stations {
                if self.visits[(k, c)] > 0.0 {
                    q[(k, c)] = self.n[c] / visited as f64;
                }
            }
        }
        q
    }
}

/// Result of one fixed-point run.
pub(crate) struct FixedPoint {
    pub q: DMatrix<f64>,
    pub x_class: Vec<f64>,
    pub r_per_visit: DMatrix<f64>,
    pub outcome: SolveOutcome,
}

/// Run the shared sweep with `estimate(q, k, c)` supplying the approximation
/// of the station-`k` total queue length at population `n - e_c`.
pub(crate) fn fixed_point<F>(
    view: &ClosedView,
    config: &IterativeConfig,
    mut estimate: F,
) -> SolverResult<FixedPoint>
where
    F: FnMut(&DMatrix<f64>, usize, usize) -> f64,
{
    let (m, r) = (view.stations, view.classes);
    let mut q = view.initial_queue();
    let mut x_class = vec![0.0; r];
    let mut r_pv = DMatrix::zeros(m, r);

    let mut last_delta = f64::INFINITY;
    for iter in 1..=config.max_iterations {
        for c in 0..r {
            if view.n[c] <= 0.0 {
                continue;
            }
            let mut cycle = 0.0;
            for k in 0..m {
                let res = match view.kind[k] {
                    StationKind::Delay => view.s[(k, c)],
                    _ => view.s[(k, c)] * (1.0 + estimate(&q, k, c)),
                };
                r_pv[(k, c)] = res;
                cycle += view.visits[(k, c)] * res;
            }
            if cycle <= 0.0 {
                return Err(SolverError::Singular {
                    what: format!("class {c} has zero cycle time"),
                });
            }
            x_class[c] = view.n[c] / cycle;
        }

        let mut max_delta = 0.0f64;
        for c in 0..r {
            for k in 0..m {
                let q_new = x_class[c] * view.visits[(k, c)] * r_pv[(k, c)];
                let scale = q_new.abs().max(q[(k, c)].abs()).max(1e-12);
                max_delta = max_delta.max((q_new - q[(k, c)]).abs() / scale);
                q[(k, c)] = q_new;
            }
        }

        last_delta = max_delta;
        if max_delta < config.tolerance {
            debug!(iterations = iter, "fixed point converged");
            return Ok(FixedPoint {
                q,
                x_class,
                r_per_visit: r_pv,
                outcome: SolveOutcome::Converged { iterations: iter },
            });
        }
    }

    warn!(
        cap = config.max_iterations,
        "iteration cap reached before convergence"
    );
    Ok(FixedPoint {
        q,
        x_class,
        r_per_visit: r_pv,
        outcome: SolveOutcome::IterationCapReached {
            iterations: config.max_iterations,
            max_delta: last_delta,
        },
    })
}

/// Bard-Schweitzer estimator: keep other classes' queues, scale the tagged
/// class by `(n_r - 1)/n_r`.
pub(crate) fn bard_schweitzer_estimate(
    view: &ClosedView,
    q: &DMatrix<f64>,
    k: usize,
    c: usize,
) -> f64 {
    let total: f64 = q.row(k).sum();
    if view.n[c] > 0.0 {
        total - q[(k, c)] / view.n[c]
    } else {
        total
    }
}

macro_rules! simple_iterative_solver {
    ($name:ident, $alg:expr, $estimator:expr) => {
        pub struct $name {
            state: SolverState,
            pub config: IterativeConfig,
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new(IterativeConfig::default())
            }
        }

        impl $name {
            pub fn new(config: IterativeConfig) -> Self {
                Self {
                    state: SolverState::new($alg),
                    config,
                }
            }
        }

        impl MvaSolver for $name {
            fn algorithm(&self) -> Algorithm {
                $alg
            }

            fn input(&mut self, model: &QnModel) -> SolverResult<()> {
                self.state.accept_input(model)
            }

            fn solve(&mut self) -> SolverResult<SolveOutcome> {
                let model = self.state.require_model()?.clone();
                let view = ClosedView::build(&model);
                let estimator = $estimator;
                let fp = fixed_point(&view, &self.config, |q, k, c| {
                    estimator(&view, q, k, c)
                })?;
                let output = SolverOutput::assemble(&model, &fp.x_class, &fp.r_per_visit);
                self.state.store_output(output);
                Ok(fp.outcome)
            }

            fn output(&self) -> SolverResult<&SolverOutput> {
                self.state.output()
            }
        }
    };
}

simple_iterative_solver!(
    BardSchweitzerSolver,
    Algorithm::BardSchweitzer,
    bard_schweitzer_estimate
);

simple_iterative_solver!(
    ChowSolver,
    Algorithm::Chow,
    |view: &ClosedView, q: &DMatrix<f64>, k: usize, _c: usize| {
        let total_pop: f64 = view.n.iter().sum();
        if total_pop > 0.0 {
            (total_pop - 1.0) / total_pop * q.row(k).sum()
        } else {
            0.0
        }
    }
);
