//! Monte Carlo estimation of the normalizing constant by importance sampling.
//!
//! For closed networks whose lattice is too large for exact recursion, the
//! normalizing constant `G(N)` is a sum of product-form state weights over
//! all allocations of the population to stations. Each class's jobs are
//! proposed multinomially in proportion to its service demands; the
//! importance weights then make `G` the plain mean of the (log-domain)
//! weight stream. Throughputs come from the ratio `G(N - e_r) / G(N)` and
//! queue lengths from self-normalized weighted allocation averages.
//!
//! Two runs with different seeds legitimately disagree within the configured
//! precision; that is variance, not a defect.

use crate::catalog::Algorithm;
use crate::error::{SolverError, SolverResult};
use crate::output::SolverOutput;
use crate::solver::{MvaSolver, SolveOutcome, SolverState};
use nalgebra::DMatrix;
use qn_core::{FactorialTable, log_sum_exp};
use qn_model::{QnModel, StationKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct MonteCarloConfig {
    /// Total sample budget across all normalizing-constant estimates.
    pub max_samples: usize,
    /// Target relative half-width of the G estimates.
    pub precision: f64,
    /// Samples between precision checks; also the batch size for the
    /// batch-means variance estimate.
    pub batch: usize,
    /// Fixed seed for reproducible runs; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            max_samples: 200_000,
            precision: 0.02,
            batch: 1_000,
            seed: None,
        }
    }
}

pub struct MonteCarloSolver {
    state: SolverState,
    pub config: MonteCarloConfig,
}

impl Default for MonteCarloSolver {
    fn default() -> Self {
        Self::new(MonteCarloConfig::default())
    }
}

impl MonteCarloSolver {
    pub fn new(config: MonteCarloConfig) -> Self {
        Self {
            state: SolverState::new(Algorithm::MonteCarloLogistic),
            config,
        }
    }
}

/// Demands and proposal distributions, precomputed per solve.
struct Sampler {
    stations: usize,
    classes: usize,
    /// `d[(k, r)] = v_kr * s_kr`
    demands: DMatrix<f64>,
    /// Per-class station-allocation probabilities (demand proportional).
    probs: Vec<Vec<f64>>,
    is_delay: Vec<bool>,
    facts: FactorialTable,
}

impl Sampler {
    fn build(model: &QnModel) -> SolverResult<Self> {
        let m = model.station_count();
        let r = model.class_count();
        let mut demands = DMatrix::zeros(m, r);
        for k in 0..m {
            for c in 0..r {
                demands[(k, c)] = model.service_demand(k, c);
            }
        }
        let mut probs = Vec::with_capacity(r);
        for c in 0..r {
            let total: f64 = (0..m).map(|k| demands[(k, c)]).sum();
            if model.classes[c].population() > 0 && total <= 0.0 {
                return Err(SolverError::Singular {
                    what: format!("class {c} has zero total service demand"),
                });
            }
            probs.push(
                (0..m)
                    .map(|k| if total > 0.0 { demands[(k, c)] / total } else { 0.0 })
                    .collect(),
            );
        }
        Ok(Self {
            stations: m,
            classes: r,
            demands,
            probs,
            is_delay: model
                .stations
                .iter()
                .map(|s| s.kind == StationKind::Delay)
                .collect(),
            facts: FactorialTable::new(),
        })
    }

    /// Draw one allocation for `pop` and return its log importance weight
    /// together with the allocation matrix.
    fn draw(&mut self, pop: &[usize], rng: &mut StdRng) -> (f64, Vec<Vec<usize>>) {
        let mut alloc = vec![vec![0usize; self.classes]; self.stations];
        for c in 0..self.classes {
            for _ in 0..pop[c] {
                let mut u: f64 = rng.gen_range(0.0..1.0);
                let mut k = self.stations - 1;
                for (i, p) in self.probs[c].iter().enumerate() {
                    if u < *p {
                        k = i;
                        break;
                    }
                    u -= p;
                }
                alloc[k][c] += 1;
            }
        }

        let mut log_target = 0.0;
        let mut log_proposal = 0.0;
        for k in 0..self.stations {
            let station_total: usize = alloc[k].iter().sum();
            if !self.is_delay[k] {
                log_target += self.facts.ln_factorial(station_total);
            }
            for c in 0..self.classes {
                let n = alloc[k][c];
                if n == 0 {
                    continue;
                }
                let lf = self.facts.ln_factorial(n);
                log_target += n as f64 * self.demands[(k, c)].ln() - lf;
                log_proposal += n as f64 * self.probs[c][k].ln() - lf;
            }
        }
        for &p in pop {
            if p > 0 {
                log_proposal += self.facts.ln_factorial(p);
            }
        }
        (log_target - log_proposal, alloc)
    }
}

/// One normalizing-constant estimate with batch-means precision tracking.
struct GEstimate {
    ln_g: f64,
    samples: usize,
    half_width: f64,
    within_precision: bool,
    /// Self-normalized allocation averages (mean queue lengths).
    q_mean: DMatrix<f64>,
}

fn estimate_g(
    sampler: &mut Sampler,
    pop: &[usize],
    budget: usize,
    config: &MonteCarloConfig,
    rng: &mut StdRng,
) -> GEstimate {
    const MIN_BATCHES: usize = 8;
    let (m, r) = (sampler.stations, sampler.classes);
    let mut logws: Vec<f64> = Vec::with_capacity(budget.min(1 << 20));

    // online self-normalized sums with adaptive shift
    let mut shift = f64::NEG_INFINITY;
    let mut sum_w = 0.0f64;
    let mut sum_wn = DMatrix::zeros(m, r);

    let mut half_width = f64::INFINITY;
    let mut within = false;

    while logws.len() < budget {
        let chunk = config.batch.min(budget - logws.len());
        for _ in 0..chunk {
            let (lw, alloc) = sampler.draw(pop, rng);
            logws.push(lw);

            if lw > shift {
                let factor = (shift - lw).exp(); // zero on the first sample
                sum_w *= factor;
                sum_wn *= factor;
                shift = lw;
            }
            let w = (lw - shift).exp();
            sum_w += w;
            for k in 0..m {
                for c in 0..r {
                    sum_wn[(k, c)] += w * alloc[k][c] as f64;
                }
            }
        }

        let batches = logws.len() / config.batch;
        if batches >= MIN_BATCHES {
            let overall = log_sum_exp(&logws) - (logws.len() as f64).ln();
            let means: Vec<f64> = logws
                .chunks(config.batch)
                .filter(|b| b.len() == config.batch)
                .map(|b| (log_sum_exp(b) - (b.len() as f64).ln() - overall).exp())
                .collect();
            let mean: f64 = means.iter().sum::<f64>() / means.len() as f64;
            let var: f64 = means
                .iter()
                .map(|t| (t - mean) * (t - mean))
                .sum::<f64>()
                / (means.len() - 1) as f64;
            half_width = 1.96 * var.sqrt() / (means.len() as f64).sqrt();
            if half_width < config.precision {
                within = true;
                break;
            }
        }
    }

    let samples = logws.len();
    let ln_g = log_sum_exp(&logws) - (samples as f64).ln();
    let q_mean = if sum_w > 0.0 {
        sum_wn / sum_w
    } else {
        DMatrix::zeros(m, r)
    };
    debug!(samples, ln_g, half_width, "normalizing constant estimated");
    GEstimate {
        ln_g,
        samples,
        half_width,
        within_precision: within,
        q_mean,
    }
}

impl MvaSolver for MonteCarloSolver {
    fn algorithm(&self) -> Algorithm {
        Algorithm::MonteCarloLogistic
    }

    fn input(&mut self, model: &QnModel) -> SolverResult<()> {
        self.state.accept_input(model)
    }

    fn solve(&mut self) -> SolverResult<SolveOutcome> {
        let model = self.state.require_model()?.clone();
        let (m, r) = (model.station_count(), model.class_count());
        let target = model.target_population();

        if target.iter().all(|&n| n == 0) {
            let output =
                SolverOutput::assemble(&model, &vec![0.0; r], &DMatrix::zeros(m, r));
            self.state.store_output(output);
            return Ok(SolveOutcome::Sampled {
                samples: 0,
                half_width: 0.0,
                within_precision: true,
            });
        }

        let mut sampler = Sampler::build(&model)?;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let populated: Vec<usize> = (0..r).filter(|&c| target[c] > 0).collect();
        let runs = populated.len() + 1;
        let share = (self.config.max_samples / runs).max(self.config.batch);

        let full = estimate_g(&mut sampler, &target, share, &self.config, &mut rng);

        let mut x_class = vec![0.0; r];
        let mut samples = full.samples;
        let mut all_within = full.within_precision;
        for &c in &populated {
            let mut reduced = target.clone();
            reduced[c] -= 1;
            let est = estimate_g(&mut sampler, &reduced, share, &self.config, &mut rng);
            samples += est.samples;
            all_within &= est.within_precision;
            // X_r = G(N - e_r) / G(N), in log domain
            x_class[c] = (est.ln_g - full.ln_g).exp();
        }

        // Residence by Little's law from the self-normalized queue lengths.
        let mut r_pv = DMatrix::zeros(m, r);
        for &c in &populated {
            for k in 0..m {
                let v = model.visits[(k, c)];
                if v > 0.0 && x_class[c] > 0.0 {
                    r_pv[(k, c)] = full.q_mean[(k, c)] / (x_class[c] * v);
                }
            }
        }

        let output = SolverOutput::assemble(&model, &x_class, &r_pv);
        self.state.store_output(output);
        Ok(SolveOutcome::Sampled {
            samples,
            half_width: full.half_width,
            within_precision: all_within,
        })
    }

    fn output(&self) -> SolverResult<&SolverOutput> {
        self.state.output()
    }
}
