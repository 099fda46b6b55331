//! Output schema shared by every algorithm.

use nalgebra::DMatrix;
use qn_model::{QnModel, StationKind};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense per-station-per-class metric tables plus aggregates.
///
/// `residence_time` is per reference cycle (`v_kr` times the per-visit
/// response), so Little's law reads `queue_length = class_throughput *
/// residence_time` entrywise.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverOutput {
    /// `X_kr = X_r * v_kr`
    pub throughput: DMatrix<f64>,
    /// Fraction of the station's capacity class `r` keeps busy
    /// (queue length itself for delay centers).
    pub utilization: DMatrix<f64>,
    /// Mean number of class-`r` jobs at station `k`.
    pub queue_length: DMatrix<f64>,
    /// Time a class-`r` job spends at station `k` per cycle.
    pub residence_time: DMatrix<f64>,

    /// Aggregates over classes, one entry per station.
    pub station_throughput: Vec<f64>,
    pub station_utilization: Vec<f64>,
    pub station_queue_length: Vec<f64>,
    pub station_residence_time: Vec<f64>,

    /// Aggregates over stations, one entry per class.
    pub class_throughput: Vec<f64>,
    pub class_queue_length: Vec<f64>,
    pub class_residence_time: Vec<f64>,

    pub system_response_time: f64,
    pub system_throughput: f64,
    pub system_population: f64,
}

impl SolverOutput {
    /// Assemble the full output bundle from per-class system throughputs and
    /// the per-visit response table.
    ///
    /// `x_class[r]` is class `r`'s system throughput; `r_per_visit[(k, r)]`
    /// its per-visit response at station `k`.
    pub fn assemble(model: &QnModel, x_class: &[f64], r_per_visit: &DMatrix<f64>) -> Self {
        let m = model.station_count();
        let r = model.class_count();
        debug_assert_eq!(x_class.len(), r);
        debug_assert_eq!((r_per_visit.nrows(), r_per_visit.ncols()), (m, r));

        let mut throughput = DMatrix::zeros(m, r);
        let mut utilization = DMatrix::zeros(m, r);
        let mut queue_length = DMatrix::zeros(m, r);
        let mut residence_time = DMatrix::zeros(m, r);

        for k in 0..m {
            let station = &model.stations[k];
            for c in 0..r {
                let v = model.visits[(k, c)];
                let res = v * r_per_visit[(k, c)];
                let x = x_class[c] * v;
                let q = x_class[c] * res;
                let u = match station.kind {
                    StationKind::Delay => q,
                    StationKind::LoadIndependent
                    | StationKind::LoadDependent
                    | StationKind::PreemptivePriority
                    | StationKind::HeadOfLinePriority => {
                        x_class[c] * model.service_demand(k, c) / station.servers as f64
                    }
                };
                throughput[(k, c)] = x;
                residence_time[(k, c)] = res;
                queue_length[(k, c)] = q;
                utilization[(k, c)] = u;
            }
        }

        let row_sum = |t: &DMatrix<f64>| -> Vec<f64> {
            (0..m).map(|k| t.row(k).sum()).collect()
        };
        let col_sum = |t: &DMatrix<f64>| -> Vec<f64> {
            (0..r).map(|c| t.column(c).sum()).collect()
        };

        let station_throughput = row_sum(&throughput);
        let station_utilization = row_sum(&utilization);
        let station_queue_length = row_sum(&queue_length);
        let station_residence_time = row_sum(&residence_time);

        let class_throughput = x_class.to_vec();
        let class_queue_length = col_sum(&queue_length);
        let class_residence_time = col_sum(&residence_time);

        let system_population: f64 = station_queue_length.iter().sum();
        let system_throughput: f64 = class_throughput.iter().sum();
        let system_response_time = if system_throughput > 0.0 {
            system_population / system_throughput
        } else {
            0.0
        };

        Self {
            throughput,
            utilization,
            queue_length,
            residence_time,
            station_throughput,
            station_utilization,
            station_queue_length,
            station_residence_time,
            class_throughput,
            class_queue_length,
            class_residence_time,
            system_response_time,
            system_throughput,
            system_population,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use qn_model::{CustomerClass, Station};

    #[test]
    fn littles_law_holds_by_construction() {
        let model = QnModel::new(
            vec![
                Station::load_independent("cpu", vec![0.2]),
                Station::delay("think", vec![2.0]),
            ],
            vec![CustomerClass::closed("jobs", 4)],
            DMatrix::from_row_slice(2, 1, &[1.0, 1.0]),
        )
        .unwrap();

        let x = vec![1.5];
        let r = DMatrix::from_row_slice(2, 1, &[0.5, 2.0]);
        let out = SolverOutput::assemble(&model, &x, &r);

        for k in 0..2 {
            let q = out.queue_length[(k, 0)];
            let xr = out.class_throughput[0] * out.residence_time[(k, 0)];
            assert!((q - xr).abs() < 1e-12);
        }
        // delay utilization mirrors its queue length
        assert_eq!(out.utilization[(1, 0)], out.queue_length[(1, 0)]);
        // aggregates are plain sums
        assert!((out.system_population - (out.queue_length[(0, 0)] + out.queue_length[(1, 0)])).abs() < 1e-12);
        assert!((out.system_throughput - 1.5).abs() < 1e-12);
    }
}
