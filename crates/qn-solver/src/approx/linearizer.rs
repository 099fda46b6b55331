//! Chandy-Neuse Linearizer and its aggregate (AQL) variant.
//!
//! Both refine Bard-Schweitzer's population-scaling with correction terms
//! estimated by actually solving the core fixed point at each one-customer-
//! removed population, trading extra inner passes for materially better
//! accuracy on small-to-moderate networks.

use super::{ClosedView, FixedPoint, IterativeConfig, fixed_point};
use crate::catalog::Algorithm;
use crate::error::SolverResult;
use crate::output::SolverOutput;
use crate::solver::{MvaSolver, SolveOutcome, SolverState};
use nalgebra::DMatrix;
use qn_model::QnModel;
use tracing::debug;

/// Standard number of outer correction passes.
const OUTER_PASSES: usize = 3;

enum Corrections {
    /// `d[k][s][c]`: shift of class `s`'s queue fraction at station `k` when
    /// one class-`c` customer is removed.
    PerClass(Vec<Vec<Vec<f64>>>),
    /// `d[k][c]`: shift of the aggregate queue fraction at station `k`.
    Aggregate(Vec<Vec<f64>>),
}

impl Corrections {
    fn zeros(stations: usize, classes: usize, aggregate: bool) -> Self {
        if aggregate {
            Corrections::Aggregate(vec![vec![0.0; classes]; stations])
        } else {
            Corrections::PerClass(vec![vec![vec![0.0; classes]; classes]; stations])
        }
    }

    /// Estimated total queue length at station `k` for population
    /// `pops - e_c`, given the current queue matrix at `pops`.
    fn estimate(&self, pops: &[f64], q: &DMatrix<f64>, k: usize, c: usize) -> f64 {
        match self {
            Corrections::PerClass(d) => {
                let mut est = 0.0;
                for (s, &pop_s) in pops.iter().enumerate() {
                    let removed = if s == c { pop_s - 1.0 } else { pop_s };
                    if removed <= 0.0 || pop_s <= 0.0 {
                        continue;
                    }
                    est += removed * (q[(k, s)] / pop_s + d[k][s][c]);
                }
                est
            }
            Corrections::Aggregate(d) => {
                let total: f64 = pops.iter().sum();
                if total <= 1.0 {
                    return 0.0;
                }
                (total - 1.0) * (q.row(k).sum() / total + d[k][c])
            }
        }
    }

    /// Refresh corrections from solved queue matrices at the full population
    /// (`q_full`) and at each removed population (`q_removed[c]`).
    fn update(
        &mut self,
        n: &[f64],
        q_full: &DMatrix<f64>,
        q_removed: &[Option<DMatrix<f64>>],
    ) {
        match self {
            Corrections::PerClass(d) => {
                for (k, dk) in d.iter_mut().enumerate() {
                    for (s, dks) in dk.iter_mut().enumerate() {
                        for (c, dksc) in dks.iter_mut().enumerate() {
                            let Some(qc) = &q_removed[c] else { continue };
                            let n_s = n[s];
                            let removed = if s == c { n_s - 1.0 } else { n_s };
                            if n_s <= 0.0 || removed <= 0.0 {
                                *dksc = 0.0;
                                continue;
                            }
                            *dksc = qc[(k, s)] / removed - q_full[(k, s)] / n_s;
                        }
                    }
                }
            }
            Corrections::Aggregate(d) => {
                let total: f64 = n.iter().sum();
                for (k, dk) in d.iter_mut().enumerate() {
                    for (c, dkc) in dk.iter_mut().enumerate() {
                        let Some(qc) = &q_removed[c] else { continue };
                        if total <= 1.0 {
                            *dkc = 0.0;
                            continue;
                        }
                        *dkc = qc.row(k).sum() / (total - 1.0)
                            - q_full.row(k).sum() / total;
                    }
                }
            }
        }
    }
}

/// Core fixed point at an arbitrary (possibly reduced) population.
fn core(
    view: &ClosedView,
    pops: &[f64],
    corrections: &Corrections,
    config: &IterativeConfig,
) -> SolverResult<FixedPoint> {
    let sub = ClosedView {
        stations: view.stations,
        classes: view.classes,
        n: pops.to_vec(),
        visits: view.visits.clone(),
        s: view.s.clone(),
        kind: view.kind.clone(),
        priority: view.priority.clone(),
    };
    // reuse the shared sweep with the correction-based estimator
    fixed_point(&sub, config, |q, k, c| {
        corrections.estimate(pops, q, k, c)
    })
}

fn run_linearizer(
    view: &ClosedView,
    config: &IterativeConfig,
    aggregate: bool,
) -> SolverResult<FixedPoint> {
    let n = view.n.clone();
    let mut corrections = Corrections::zeros(view.stations, view.classes, aggregate);
    let mut total_sweeps = 0usize;

    for pass in 0..OUTER_PASSES {
        let full = core(view, &n, &corrections, config)?;
        total_sweeps += iterations_of(&full.outcome);

        let mut q_removed: Vec<Option<DMatrix<f64>>> = vec![None; view.classes];
        for c in 0..view.classes {
            if n[c] < 1.0 {
                continue;
            }
            let mut reduced = n.clone();
            reduced[c] -= 1.0;
            let fp = core(view, &reduced, &corrections, config)?;
            total_sweeps += iterations_of(&fp.outcome);
            q_removed[c] = Some(fp.q);
        }

        corrections.update(&n, &full.q, &q_removed);
        debug!(pass, total_sweeps, "linearizer correction pass done");
    }

    let mut fp = core(view, &n, &corrections, config)?;
    total_sweeps += iterations_of(&fp.outcome);
    fp.outcome = match fp.outcome {
        SolveOutcome::Converged { .. } => SolveOutcome::Converged {
            iterations: total_sweeps,
        },
        SolveOutcome::IterationCapReached { max_delta, .. } => {
            SolveOutcome::IterationCapReached {
                iterations: total_sweeps,
                max_delta,
            }
        }
        other => other,
    };
    Ok(fp)
}

fn iterations_of(outcome: &SolveOutcome) -> usize {
    match outcome {
        SolveOutcome::Converged { iterations }
        | SolveOutcome::IterationCapReached { iterations, .. } => *iterations,
        _ => 0,
    }
}

macro_rules! linearizer_solver {
    ($name:ident, $alg:expr, $aggregate:expr) => {
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
                let fp = run_linearizer(&view, &self.config, $aggregate)?;
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

linearizer_solver!(LinearizerSolver, Algorithm::Linearizer, false);
linearizer_solver!(AqlSolver, Algorithm::Aql, true);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approx::BardSchweitzerSolver;
    use crate::exact::ExactMvaSolver;
    use nalgebra::DMatrix;
    use qn_model::{CustomerClass, Station};

    fn model() -> QnModel {
        QnModel::new(
            vec![
                Station::load_independent("cpu", vec![0.3, 0.2]),
                Station::load_independent("disk", vec![0.5, 0.1]),
                Station::delay("think", vec![1.0, 2.0]),
            ],
            vec![
                CustomerClass::closed("batch", 3),
                CustomerClass::closed("interactive", 2),
            ],
            DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]),
        )
        .unwrap()
    }

    fn throughput_of(solver: &mut dyn MvaSolver, m: &QnModel) -> Vec<f64> {
        solver.input(m).unwrap();
        solver.solve().unwrap();
        solver.output().unwrap().class_throughput.clone()
    }

    #[test]
    fn linearizer_beats_bard_schweitzer_against_exact() {
        let m = model();
        let exact = throughput_of(&mut ExactMvaSolver::new(), &m);
        let bs = throughput_of(&mut BardSchweitzerSolver::default(), &m);
        let lin = throughput_of(&mut LinearizerSolver::default(), &m);

        for c in 0..2 {
            let err_bs = (bs[c] - exact[c]).abs() / exact[c];
            let err_lin = (lin[c] - exact[c]).abs() / exact[c];
            // generous slack: linearizer must not be materially worse
            assert!(
                err_lin <= err_bs + 1e-3,
                "class {c}: lin {err_lin} vs bs {err_bs}"
            );
            assert!(err_lin < 0.05, "class {c} error {err_lin}");
        }
    }

    #[test]
    fn aql_converges_near_exact() {
        let m = model();
        let exact = throughput_of(&mut ExactMvaSolver::new(), &m);
        let aql = throughput_of(&mut AqlSolver::default(), &m);
        for c in 0..2 {
            assert!((aql[c] - exact[c]).abs() / exact[c] < 0.1, "class {c}");
        }
    }

    #[test]
    fn single_customer_degenerates_gracefully() {
        // N=1: every approximation must agree with exact MVA, since the
        // removed-customer population is empty.
        let m = QnModel::new(
            vec![
                Station::load_independent("cpu", vec![0.3]),
                Station::delay("think", vec![1.0]),
            ],
            vec![CustomerClass::closed("jobs", 1)],
            DMatrix::from_row_slice(2, 1, &[1.0, 1.0]),
        )
        .unwrap();
        let exact = throughput_of(&mut ExactMvaSolver::new(), &m);
        let lin = throughput_of(&mut LinearizerSolver::default(), &m);
        assert!((lin[0] - exact[0]).abs() < 1e-6);
    }
}
