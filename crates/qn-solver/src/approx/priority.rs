//! Reduced-rate priority MVA for preemptive-resume and head-of-line queues.
//!
//! Higher-priority work shrinks the capacity a class sees: its effective
//! service time is inflated by `1 / (1 - U_higher)`, recomputed from the
//! current throughput estimates each sweep. Preemptive-resume classes do not
//! see lower-priority queue content at all; head-of-line classes additionally
//! wait out the mean residual service of lower-priority jobs already in
//! service. The tie-break policy mirrors the capacity gate: equal priorities
//! are ordered by per-visit demand.

use super::{ClosedView, IterativeConfig, bard_schweitzer_estimate};
use crate::catalog::Algorithm;
use crate::error::{SolverError, SolverResult};
use crate::output::SolverOutput;
use crate::solver::{MvaSolver, SolveOutcome, SolverState};
use nalgebra::DMatrix;
use qn_model::{QnModel, StationKind};
use tracing::{debug, warn};

/// Floor on remaining capacity; a sweep can transiently drive the
/// higher-priority utilization estimate past one.
const MIN_CAPACITY: f64 = 1e-6;

pub struct PriorityMvaSolver {
    state: SolverState,
    pub config: IterativeConfig,
}

impl Default for PriorityMvaSolver {
    fn default() -> Self {
        Self::new(IterativeConfig::default())
    }
}

impl PriorityMvaSolver {
    pub fn new(config: IterativeConfig) -> Self {
        Self {
            state: SolverState::new(Algorithm::PriorityMva),
            config,
        }
    }
}

/// True when class `s` outranks class `c` at station `k`.
fn outranks(view: &ClosedView, k: usize, s: usize, c: usize) -> bool {
    if view.priority[s] != view.priority[c] {
        return view.priority[s] > view.priority[c];
    }
    if s == c {
        return false;
    }
    let demand = |class: usize| view.visits[(k, class)] * view.s[(k, class)];
    demand(s) > demand(c)
}

fn run(view: &ClosedView, config: &IterativeConfig) -> SolverResult<super::FixedPoint> {
    let (m, r) = (view.stations, view.classes);
    let mut q = view.initial_queue();
    let mut x_class = vec![0.0; r];
    let mut r_pv = DMatrix::zeros(m, r);
    let mut last_delta = f64::INFINITY;

    for iter in 1..=config.max_iterations {
        // Utilizations from the previous sweep's throughputs.
        let mut util = DMatrix::zeros(m, r);
        for k in 0..m {
            for c in 0..r {
                util[(k, c)] = x_class[c] * view.visits[(k, c)] * view.s[(k, c)];
            }
        }

        for c in 0..r {
            if view.n[c] <= 0.0 {
                continue;
            }
            let mut cycle = 0.0;
            for k in 0..m {
                let res = match view.kind[k] {
                    StationKind::Delay => view.s[(k, c)],
                    StationKind::PreemptivePriority | StationKind::HeadOfLinePriority => {
                        let u_higher: f64 = (0..r)
                            .filter(|&s| outranks(view, k, s, c))
                            .map(|s| util[(k, s)])
                            .sum();
                        let capacity = (1.0 - u_higher).max(MIN_CAPACITY);

                        // queue content visible to class c: itself and
                        // everything that outranks it
                        let mut visible = q[(k, c)] * (view.n[c] - 1.0).max(0.0) / view.n[c];
                        for s in 0..r {
                            if outranks(view, k, s, c) {
                                visible += q[(k, s)];
                            }
                        }
                        let mut res = view.s[(k, c)] / capacity * (1.0 + visible);
                        if view.kind[k] == StationKind::HeadOfLinePriority {
                            // residual service of a lower-priority job holding
                            // the server when class c arrives
                            let residual: f64 = (0..r)
                                .filter(|&s| s != c && !outranks(view, k, s, c))
                                .map(|s| util[(k, s)] * view.s[(k, s)])
                                .sum();
                            res += residual / capacity;
                        }
                        res
                    }
                    StationKind::LoadIndependent | StationKind::LoadDependent => {
                        view.s[(k, c)] * (1.0 + bard_schweitzer_estimate(view, &q, k, c))
                    }
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
            debug!(iterations = iter, "priority MVA converged");
            return Ok(super::FixedPoint {
                q,
                x_class,
                r_per_visit: r_pv,
                outcome: SolveOutcome::Converged { iterations: iter },
            });
        }
    }

    warn!(
        cap = config.max_iterations,
        "priority MVA hit the iteration cap"
    );
    Ok(super::FixedPoint {
        q,
        x_class,
        r_per_visit: r_pv,
        outcome: SolveOutcome::IterationCapReached {
            iterations: config.max_iterations,
            max_delta: last_delta,
        },
    })
}

impl MvaSolver for PriorityMvaSolver {
    fn algorithm(&self) -> Algorithm {
        Algorithm::PriorityMva
    }

    fn input(&mut self, model: &QnModel) -> SolverResult<()> {
        self.state.accept_input(model)
    }

    fn solve(&mut self) -> SolverResult<SolveOutcome> {
        let model = self.state.require_model()?.clone();
        let view = ClosedView::build(&model);
        let fp = run(&view, &self.config)?;
        let output = SolverOutput::assemble(&model, &fp.x_class, &fp.r_per_visit);
        self.state.store_output(output);
        Ok(fp.outcome)
    }

    fn output(&self) -> SolverResult<&SolverOutput> {
        self.state.output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use qn_model::{CustomerClass, Station};

    fn priority_model(kind: StationKind) -> QnModel {
        QnModel::new(
            vec![
                Station::priority("server", kind, vec![0.4, 0.4]),
                Station::delay("think", vec![2.0, 2.0]),
            ],
            vec![
                CustomerClass::closed("urgent", 2).with_priority(5),
                CustomerClass::closed("bulk", 2).with_priority(1),
            ],
            DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]),
        )
        .unwrap()
    }

    fn solve(model: &QnModel) -> SolverOutput {
        let mut solver = PriorityMvaSolver::default();
        solver.input(model).unwrap();
        assert!(matches!(
            solver.solve().unwrap(),
            SolveOutcome::Converged { .. }
        ));
        solver.output().unwrap().clone()
    }

    #[test]
    fn high_priority_class_sees_shorter_residence() {
        let out = solve(&priority_model(StationKind::PreemptivePriority));
        // identical demands and think times; priority is the only difference
        assert!(
            out.residence_time[(0, 0)] < out.residence_time[(0, 1)],
            "urgent {} vs bulk {}",
            out.residence_time[(0, 0)],
            out.residence_time[(0, 1)]
        );
        assert!(out.class_throughput[0] > out.class_throughput[1]);
    }

    #[test]
    fn head_of_line_is_never_faster_than_preemptive_for_top_class() {
        let prs = solve(&priority_model(StationKind::PreemptivePriority));
        let hol = solve(&priority_model(StationKind::HeadOfLinePriority));
        assert!(hol.residence_time[(0, 0)] >= prs.residence_time[(0, 0)] - 1e-9);
    }

    #[test]
    fn equal_priorities_fall_back_to_demand_ordering() {
        let model = QnModel::new(
            vec![
                Station::priority(
                    "server",
                    StationKind::PreemptivePriority,
                    vec![0.6, 0.2],
                ),
                Station::delay("think", vec![1.0, 1.0]),
            ],
            vec![
                CustomerClass::closed("heavy", 1).with_priority(3),
                CustomerClass::closed("light", 1).with_priority(3),
            ],
            DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]),
        )
        .unwrap();
        let out = solve(&model);
        // the larger-demand class ranks higher on the tie-break, so the
        // smaller-demand class absorbs the interference
        assert!(out.class_throughput[0] > 0.0 && out.class_throughput[1] > 0.0);
        assert!(out.residence_time[(0, 1)] >= out.residence_time[(0, 0)] * 0.2 / 0.6 - 1e-9);
    }
}
