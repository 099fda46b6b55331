//! Exact recursive MVA, the reference algorithm.
//!
//! The closed recursion runs end to end in arbitrary-precision rational
//! arithmetic: error does not accumulate over long population chains, and
//! singular spots (zero rates, non-positive marginal probabilities) carry an
//! explicit undefined instead of a fabricated zero. Conversion to f64 happens
//! once, at the output boundary.

use crate::catalog::Algorithm;
use crate::error::{SolverError, SolverResult};
use crate::open::{open_offered_loads, solve_open};
use crate::output::SolverOutput;
use crate::solver::{MvaSolver, SolveOutcome, SolverState};
use nalgebra::DMatrix;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use qn_core::maybe::{self, MaybeRational};
use qn_core::{PopulationMap, generate_populations};
use qn_model::{QnModel, ServiceProfile, StationKind};

pub struct ExactMvaSolver {
    state: SolverState,
}

impl Default for ExactMvaSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ExactMvaSolver {
    pub fn new() -> Self {
        Self {
            state: SolverState::new(Algorithm::ExactMva),
        }
    }
}

impl MvaSolver for ExactMvaSolver {
    fn algorithm(&self) -> Algorithm {
        Algorithm::ExactMva
    }

    fn input(&mut self, model: &QnModel) -> SolverResult<()> {
        self.state.accept_input(model)
    }

    fn solve(&mut self) -> SolverResult<SolveOutcome> {
        let model = self.state.require_model()?.clone();
        let (x_class, r_pv) = if !model.has_open_classes() {
            let closed = solve_closed(&model, None)?;
            (closed.x_class, closed.r_per_visit)
        } else if !model.has_closed_classes() {
            solve_open(&model)?
        } else {
            solve_mixed(&model)?
        };
        let output = SolverOutput::assemble(&model, &x_class, &r_pv);
        self.state.store_output(output);
        Ok(SolveOutcome::Exact)
    }

    fn output(&self) -> SolverResult<&SolverOutput> {
        self.state.output()
    }
}

/// Closed-recursion result at the target population, converted to f64.
pub(crate) struct ClosedSolution {
    pub x_class: Vec<f64>,
    pub r_per_visit: DMatrix<f64>,
}

fn rat(x: f64, what: &'static str) -> SolverResult<BigRational> {
    BigRational::from_float(x).ok_or(SolverError::Singular {
        what: format!("{what} {x} is not representable"),
    })
}

/// Model constants lifted to rationals once, up front.
///
/// Multi-server queueing stations are folded into the load-dependent form
/// `s(j) = s / min(j, servers)`, which the marginal-probability recursion
/// solves exactly; `kind` holds that effective kind, not the declared one.
struct RationalModel {
    stations: usize,
    classes: usize,
    kind: Vec<StationKind>,
    visits: Vec<Vec<BigRational>>,
    /// `service[k][r][j-1]` = service time with `j` jobs present; fixed
    /// profiles carry a single entry.
    service: Vec<Vec<Vec<BigRational>>>,
    target: Vec<usize>,
}

impl RationalModel {
    /// `inflate[k]` multiplies station `k`'s service times (mixed models
    /// reduce closed-chain capacity by the open utilization this way).
    fn build(model: &QnModel, inflate: Option<&[f64]>) -> SolverResult<Self> {
        let m = model.station_count();
        let r = model.class_count();
        let total = model.total_closed_population().max(1);

        let mut kind = Vec::with_capacity(m);
        let mut visits = Vec::with_capacity(m);
        let mut service = Vec::with_capacity(m);
        for k in 0..m {
            let station = &model.stations[k];
            let factor = inflate.map_or(1.0, |f| f[k]);
            let pooled = station.servers > 1 && !station.kind.is_delay();
            kind.push(if pooled {
                StationKind::LoadDependent
            } else {
                station.kind
            });

            let mut vrow = Vec::with_capacity(r);
            let mut srow = Vec::with_capacity(r);
            for c in 0..r {
                vrow.push(rat(model.visits[(k, c)], "visit ratio")?);
                let table = match &station.service[c] {
                    ServiceProfile::Fixed(s) if pooled => {
                        let mut out = Vec::with_capacity(total);
                        for j in 1..=total {
                            let pool = j.min(station.servers) as f64;
                            out.push(rat(s * factor / pool, "service time")?);
                        }
                        out
                    }
                    ServiceProfile::Fixed(s) => vec![rat(s * factor, "service time")?],
                    ServiceProfile::LoadDependent(t) => {
                        let mut out = Vec::with_capacity(total);
                        for j in 1..=total {
                            let s = t.get(j - 1).copied().unwrap_or_else(|| {
                                t.last().copied().unwrap_or(0.0)
                            });
                            out.push(rat(s * factor, "service time")?);
                        }
                        out
                    }
                };
                srow.push(table);
            }
            visits.push(vrow);
            service.push(srow);
        }

        Ok(Self {
            stations: m,
            classes: r,
            kind,
            visits,
            service,
            target: model.target_population(),
        })
    }

    fn service_at(&self, k: usize, r: usize, jobs: usize) -> &BigRational {
        let table = &self.service[k][r];
        let idx = jobs.max(1).min(table.len()) - 1;
        &table[idx]
    }
}

/// Per-population memo record.
struct Record {
    /// Total mean queue length per station.
    q_total: Vec<MaybeRational>,
    /// `marginals[k][j]` = P(j jobs at station k), kept for load-dependent
    /// stations only (empty otherwise).
    marginals: Vec<Vec<MaybeRational>>,
}

/// Exact multi-class MVA over the population lattice.
///
/// One arithmetic pass per class per lattice vector; no fixed point. Open
/// classes in the model contribute zero-population components and fall out of
/// the recursion.
pub(crate) fn solve_closed(
    model: &QnModel,
    inflate: Option<&[f64]>,
) -> SolverResult<ClosedSolution> {
    let rm = RationalModel::build(model, inflate)?;
    let m = rm.stations;
    let r = rm.classes;

    // An all-zero target is the empty network: nothing circulates, every
    // metric is zero, and there is no lattice to walk.
    if rm.target.iter().all(|&n| n == 0) {
        return Ok(ClosedSolution {
            x_class: vec![0.0; r],
            r_per_visit: DMatrix::zeros(m, r),
        });
    }

    let lattice = generate_populations(&rm.target);

    let mut memo: PopulationMap<Record> = PopulationMap::new();
    let mut at_target: Option<(Vec<MaybeRational>, Vec<Vec<MaybeRational>>)> = None;

    for pop in &lattice {
        let ntot: usize = pop.iter().sum();
        if ntot == 0 {
            memo.insert(pop, empty_record(&rm));
            continue;
        }

        // Residence times per visit, per class with jobs in this vector.
        let mut r_pv: Vec<Vec<MaybeRational>> = vec![vec![Some(BigRational::zero()); m]; r];
        let mut x_class: Vec<MaybeRational> = vec![Some(BigRational::zero()); r];

        for c in 0..r {
            if pop[c] == 0 {
                continue;
            }
            let mut pred = pop.clone();
            pred[c] -= 1;
            let prev = memo.get(&pred).ok_or_else(|| SolverError::Singular {
                what: "lattice predecessor missing".into(),
            })?;

            let mut cycle_time: MaybeRational = Some(BigRational::zero());
            for k in 0..m {
                let res = match rm.kind[k] {
                    StationKind::Delay => Some(rm.service_at(k, c, 1).clone()),
                    StationKind::LoadIndependent
                    | StationKind::PreemptivePriority
                    | StationKind::HeadOfLinePriority => {
                        let one_plus_q =
                            maybe::add(&Some(BigRational::one()), &prev.q_total[k]);
                        maybe::mul(&Some(rm.service_at(k, c, 1).clone()), &one_plus_q)
                    }
                    StationKind::LoadDependent => {
                        // R = sum_j j * s(j) * p(j-1 | n - e_c)
                        let mut acc: MaybeRational = Some(BigRational::zero());
                        for j in 1..=ntot {
                            let pj = prev
                                .marginals[k]
                                .get(j - 1)
                                .cloned()
                                .unwrap_or(Some(BigRational::zero()));
                            let jr = BigRational::from_integer(j.into());
                            let term = maybe::mul(
                                &maybe::mul(&Some(jr), &Some(rm.service_at(k, c, j).clone())),
                                &pj,
                            );
                            acc = maybe::add(&acc, &term);
                        }
                        acc
                    }
                };
                cycle_time = maybe::add(
                    &cycle_time,
                    &maybe::mul(&Some(rm.visits[k][c].clone()), &res),
                );
                r_pv[c][k] = res;
            }
            let n_c = BigRational::from_integer(pop[c].into());
            x_class[c] = maybe::div(&Some(n_c), &cycle_time);
        }

        // Queue-length totals and load-dependent marginals for this vector.
        let mut q_total: Vec<MaybeRational> = Vec::with_capacity(m);
        for k in 0..m {
            let mut q: MaybeRational = Some(BigRational::zero());
            for c in 0..r {
                if pop[c] == 0 {
                    continue;
                }
                let term = maybe::mul(
                    &maybe::mul(&x_class[c], &Some(rm.visits[k][c].clone())),
                    &r_pv[c][k],
                );
                q = maybe::add(&q, &term);
            }
            q_total.push(q);
        }

        let mut marginals: Vec<Vec<MaybeRational>> = vec![Vec::new(); m];
        for k in 0..m {
            if rm.kind[k] != StationKind::LoadDependent {
                continue;
            }
            let mut p: Vec<MaybeRational> = vec![Some(BigRational::zero()); ntot + 1];
            let mut tail: MaybeRational = Some(BigRational::zero());
            for j in 1..=ntot {
                let mut acc: MaybeRational = Some(BigRational::zero());
                for c in 0..r {
                    if pop[c] == 0 {
                        continue;
                    }
                    let mut pred = pop.clone();
                    pred[c] -= 1;
                    let prev = memo.get(&pred).ok_or_else(|| SolverError::Singular {
                        what: "lattice predecessor missing".into(),
                    })?;
                    let pj = prev
                        .marginals[k]
                        .get(j - 1)
                        .cloned()
                        .unwrap_or(Some(BigRational::zero()));
                    let term = maybe::mul(
                        &maybe::mul(
                            &maybe::mul(&x_class[c], &Some(rm.visits[k][c].clone())),
                            &Some(rm.service_at(k, c, j).clone()),
                        ),
                        &pj,
                    );
                    acc = maybe::add(&acc, &term);
                }
                tail = maybe::add(&tail, &acc);
                p[j] = acc;
            }
            // Normalization; a non-positive p(0) marks a singular construction
            // and poisons everything downstream of this station.
            p[0] = match maybe::add(&Some(BigRational::one()), &tail.map(|t| -t)) {
                Some(p0) if !p0.is_negative() => Some(p0),
                _ => None,
            };
            if p[0].is_none() {
                q_total[k] = None;
            }
            marginals[k] = p;
        }

        if pop == &rm.target {
            at_target = Some((x_class.clone(), r_pv.clone()));
        }
        memo.insert(
            pop,
            Record {
                q_total,
                marginals,
            },
        );
    }

    let (x_maybe, r_maybe) = at_target.ok_or_else(|| SolverError::Singular {
        what: "target population never reached".into(),
    })?;

    let mut x_class = vec![0.0; r];
    let mut r_per_visit = DMatrix::zeros(m, r);
    for c in 0..r {
        if rm.target[c] == 0 {
            continue;
        }
        x_class[c] = to_f64(&x_maybe[c], "class throughput")?;
        for k in 0..m {
            r_per_visit[(k, c)] = to_f64(&r_maybe[c][k], "residence time")?;
        }
    }
    Ok(ClosedSolution {
        x_class,
        r_per_visit,
    })
}

fn empty_record(rm: &RationalModel) -> Record {
    let mut marginals = vec![Vec::new(); rm.stations];
    for k in 0..rm.stations {
        if rm.kind[k] == StationKind::LoadDependent {
            marginals[k] = vec![Some(BigRational::one())];
        }
    }
    Record {
        q_total: vec![Some(BigRational::zero()); rm.stations],
        marginals,
    }
}

fn to_f64(v: &MaybeRational, what: &'static str) -> SolverResult<f64> {
    match v {
        Some(x) => x.to_f64().ok_or(SolverError::Singular {
            what: format!("{what} does not fit f64"),
        }),
        None => Err(SolverError::Singular {
            what: format!("{what} is undefined"),
        }),
    }
}

/// Mixed models: open chains first, closed chains on capacity-reduced service
/// times, then open residence inflated by the closed congestion.
fn solve_mixed(model: &QnModel) -> SolverResult<(Vec<f64>, DMatrix<f64>)> {
    let m = model.station_count();
    let r = model.class_count();
    let loads = open_offered_loads(model);

    let mut inflate = vec![1.0; m];
    for (k, station) in model.stations.iter().enumerate() {
        if station.kind.is_delay() {
            continue;
        }
        let rho = loads[k].0 / station.servers as f64;
        if rho >= 1.0 {
            return Err(SolverError::Unstable {
                what: format!(
                    "station '{}' open load {:.4} saturates {} servers",
                    station.name, loads[k].0, station.servers
                ),
            });
        }
        inflate[k] = 1.0 / (1.0 - rho);
    }

    let closed = solve_closed(model, Some(&inflate))?;

    // Closed congestion seen by open arrivals at the target population.
    let mut q_closed = vec![0.0; m];
    for k in 0..m {
        for (c, class) in model.classes.iter().enumerate() {
            if class.is_closed() {
                q_closed[k] +=
                    closed.x_class[c] * model.visits[(k, c)] * closed.r_per_visit[(k, c)];
            }
        }
    }

    let mut x_class = closed.x_class;
    let mut r_pv = closed.r_per_visit;
    for (c, class) in model.classes.iter().enumerate() {
        if !class.is_open() {
            continue;
        }
        x_class[c] = class.arrival_rate();
        for (k, station) in model.stations.iter().enumerate() {
            let s = model.service_time(k, c);
            r_pv[(k, c)] = if station.kind.is_delay() {
                s
            } else {
                s * (1.0 + q_closed[k]) * inflate[k]
            };
        }
    }
    Ok((x_class, r_pv))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use nalgebra::DMatrix;
    use proptest::prelude::*;
    use qn_model::{CustomerClass, Station};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn population_is_conserved_and_littles_law_holds(
            d1 in 0.05_f64..2.0,
            d2 in 0.05_f64..2.0,
            think in 0.0_f64..5.0,
            pop in 1_usize..6,
        ) {
            let model = QnModel::new(
                vec![
                    Station::load_independent("cpu", vec![d1]),
                    Station::load_independent("disk", vec![d2]),
                    Station::delay("think", vec![think]),
                ],
                vec![CustomerClass::closed("jobs", pop)],
                DMatrix::from_row_slice(3, 1, &[1.0, 1.0, 1.0]),
            )
            .unwrap();
            let mut solver = ExactMvaSolver::new();
            solver.input(&model).unwrap();
            solver.solve().unwrap();
            let out = solver.output().unwrap();

            prop_assert!((out.system_population - pop as f64).abs() < 1e-6);
            for k in 0..3 {
                let q = out.queue_length[(k, 0)];
                let xr = out.class_throughput[0] * out.residence_time[(k, 0)];
                prop_assert!((q - xr).abs() < 1e-9);
            }
            // single-server utilizations never exceed one
            prop_assert!(out.utilization[(0, 0)] <= 1.0 + 1e-9);
            prop_assert!(out.utilization[(1, 0)] <= 1.0 + 1e-9);
        }
    }
}
