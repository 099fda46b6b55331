//! Exact solution of open chains (M/M/m per station).
//!
//! Used directly for purely open models and as the open half of the mixed
//! solution. Callers are expected to have run the processing-capacity gate;
//! the offered-load check here is a boundary guard, not a substitute.

use crate::error::{SolverError, SolverResult};
use nalgebra::DMatrix;
use qn_core::FactorialTable;
use qn_model::{QnModel, StationKind};

/// Per-station offered load `a_k = sum over open classes of lambda*v*s` and
/// aggregate open arrival rate `lambda_k = sum of lambda*v`.
pub(crate) fn open_offered_loads(model: &QnModel) -> Vec<(f64, f64)> {
    (0..model.station_count())
        .map(|k| {
            let mut a = 0.0;
            let mut lambda = 0.0;
            for (c, class) in model.classes.iter().enumerate() {
                if class.is_open() {
                    a += class.arrival_rate() * model.service_demand(k, c);
                    lambda += class.arrival_rate() * model.visits[(k, c)];
                }
            }
            (a, lambda)
        })
        .collect()
}

/// Erlang-C waiting probability for `m` servers at offered load `a` erlangs.
pub(crate) fn erlang_c(facts: &mut FactorialTable, m: usize, a: f64) -> SolverResult<f64> {
    debug_assert!(m >= 1);
    let rho = a / m as f64;
    if rho >= 1.0 {
        return Err(SolverError::Unstable {
            what: format!("offered load {a} saturates {m} servers"),
        });
    }
    let mut sum = 0.0;
    for j in 0..m {
        sum += a.powi(j as i32) / facts.factorial(j)?;
    }
    let top = a.powi(m as i32) / facts.factorial(m)?;
    Ok(top / ((1.0 - rho) * sum + top))
}

/// Exact open-chain metrics: per-class system throughput (the arrival rate)
/// and per-visit response at every station.
pub(crate) fn solve_open(model: &QnModel) -> SolverResult<(Vec<f64>, DMatrix<f64>)> {
    let m = model.station_count();
    let r = model.class_count();
    let loads = open_offered_loads(model);
    let mut facts = FactorialTable::new();
    let mut r_pv = DMatrix::zeros(m, r);

    for (k, station) in model.stations.iter().enumerate() {
        let (a, lambda) = loads[k];
        let servers = station.servers;

        let wait = match station.kind {
            StationKind::Delay => 0.0,
            StationKind::LoadIndependent => {
                if a >= servers as f64 {
                    return Err(SolverError::Unstable {
                        what: format!(
                            "station '{}' offered load {a:.4} >= {servers} servers",
                            station.name
                        ),
                    });
                }
                if lambda > 0.0 {
                    let s_bar = a / lambda;
                    erlang_c(&mut facts, servers, a)? * s_bar / (servers as f64 - a)
                } else {
                    0.0
                }
            }
            StationKind::LoadDependent
            | StationKind::PreemptivePriority
            | StationKind::HeadOfLinePriority => {
                // The catalog never routes these kinds here.
                return Err(SolverError::Incompatible {
                    algorithm: "MVA",
                    what: format!(
                        "open chains cannot visit station kind {:?}",
                        station.kind
                    ),
                });
            }
        };

        for (c, class) in model.classes.iter().enumerate() {
            if class.is_open() {
                r_pv[(k, c)] = model.service_time(k, c) + wait;
            }
        }
    }

    let x_class = model
        .classes
        .iter()
        .map(|c| c.arrival_rate())
        .collect::<Vec<_>>();
    Ok((x_class, r_pv))
}
