//! Validated queueing-network model: stations + classes + visit matrix.

use crate::class::{ClassKind, CustomerClass};
use crate::error::{ModelError, ModelResult};
use crate::station::{ServiceProfile, Station, StationKind};
use nalgebra::DMatrix;

/// A multi-class product-form queueing network.
///
/// `visits[(k, r)]` is the mean number of visits a class-`r` job makes to
/// station `k` per reference-station cycle; zero means never visited.
#[derive(Debug, Clone, PartialEq)]
pub struct QnModel {
    pub stations: Vec<Station>,
    pub classes: Vec<CustomerClass>,
    pub visits: DMatrix<f64>,
}

impl QnModel {
    pub fn new(
        stations: Vec<Station>,
        classes: Vec<CustomerClass>,
        visits: DMatrix<f64>,
    ) -> ModelResult<Self> {
        let model = Self {
            stations,
            classes,
            visits,
        };
        model.validate()?;
        Ok(model)
    }

    /// Shape and range checks; a model that fails here never reaches a solver.
    pub fn validate(&self) -> ModelResult<()> {
        let m = self.stations.len();
        let r = self.classes.len();
        if m == 0 || r == 0 {
            return Err(ModelError::Validation {
                what: "model needs at least one station and one class".into(),
            });
        }
        if self.visits.nrows() != m || self.visits.ncols() != r {
            return Err(ModelError::Validation {
                what: format!(
                    "visit matrix is {}x{}, expected {}x{}",
                    self.visits.nrows(),
                    self.visits.ncols(),
                    m,
                    r
                ),
            });
        }
        if self.visits.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ModelError::Validation {
                what: "visit ratios must be finite and non-negative".into(),
            });
        }

        let total_closed = self.total_closed_population();
        for (k, station) in self.stations.iter().enumerate() {
            if station.servers == 0 {
                return Err(ModelError::Validation {
                    what: format!("station '{}' has zero servers", station.name),
                });
            }
            if station.service.len() != r {
                return Err(ModelError::Validation {
                    what: format!(
                        "station '{}' has {} service profiles, expected {}",
                        station.name,
                        station.service.len(),
                        r
                    ),
                });
            }
            for (c, profile) in station.service.iter().enumerate() {
                match (station.kind, profile) {
                    (StationKind::LoadDependent, ServiceProfile::LoadDependent(table)) => {
                        if total_closed > 0 && table.len() < total_closed {
                            return Err(ModelError::Validation {
                                what: format!(
                                    "station '{}' class {} load-dependent table has {} entries, \
                                     needs {} for the full closed population",
                                    station.name,
                                    c,
                                    table.len(),
                                    total_closed
                                ),
                            });
                        }
                        if table.iter().any(|s| !s.is_finite() || *s < 0.0) {
                            return Err(ModelError::Validation {
                                what: format!(
                                    "station '{}' class {} has a negative or non-finite \
                                     load-dependent service time",
                                    station.name, c
                                ),
                            });
                        }
                    }
                    (StationKind::LoadDependent, ServiceProfile::Fixed(_)) => {
                        return Err(ModelError::Validation {
                            what: format!(
                                "load-dependent station '{}' (index {k}) carries a fixed \
                                 service profile for class {c}",
                                station.name
                            ),
                        });
                    }
                    (_, ServiceProfile::LoadDependent(_)) => {
                        return Err(ModelError::Validation {
                            what: format!(
                                "station '{}' (index {k}) is not load-dependent but carries \
                                 an occupancy-indexed profile for class {c}",
                                station.name
                            ),
                        });
                    }
                    (_, ServiceProfile::Fixed(s)) => {
                        if !s.is_finite() || *s < 0.0 {
                            return Err(ModelError::Validation {
                                what: format!(
                                    "station '{}' class {} service time must be finite and \
                                     non-negative",
                                    station.name, c
                                ),
                            });
                        }
                    }
                }
            }
        }

        for class in &self.classes {
            if let ClassKind::Open { arrival_rate } = class.kind {
                if !arrival_rate.is_finite() || arrival_rate < 0.0 {
                    return Err(ModelError::Validation {
                        what: format!(
                            "open class '{}' arrival rate must be finite and non-negative",
                            class.name
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn has_open_classes(&self) -> bool {
        self.classes.iter().any(CustomerClass::is_open)
    }

    pub fn has_closed_classes(&self) -> bool {
        self.classes.iter().any(CustomerClass::is_closed)
    }

    pub fn is_mixed(&self) -> bool {
        self.has_open_classes() && self.has_closed_classes()
    }

    pub fn has_load_dependent(&self) -> bool {
        self.stations
            .iter()
            .any(|s| s.kind == StationKind::LoadDependent)
    }

    pub fn uses_priorities(&self) -> bool {
        self.stations.iter().any(|s| s.kind.is_priority())
    }

    /// True when any queueing (non-delay) station has more than one server.
    pub fn has_multi_server_queues(&self) -> bool {
        self.stations
            .iter()
            .any(|s| s.servers > 1 && !s.kind.is_delay())
    }

    /// Target population vector over closed classes, in class order
    /// (open classes contribute a zero component).
    pub fn target_population(&self) -> Vec<usize> {
        self.classes.iter().map(CustomerClass::population).collect()
    }

    pub fn total_closed_population(&self) -> usize {
        self.classes.iter().map(CustomerClass::population).sum()
    }

    /// Per-visit service time of class `r` at station `k` at occupancy one.
    pub fn service_time(&self, k: usize, r: usize) -> f64 {
        self.stations[k].service[r].at_occupancy(1)
    }

    /// Service demand `v_kr * s_kr` per reference cycle.
    pub fn service_demand(&self, k: usize, r: usize) -> f64 {
        self.visits[(k, r)] * self.service_time(k, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_station_model() -> QnModel {
        QnModel::new(
            vec![
                Station::load_independent("cpu", vec![0.2]),
                Station::delay("think", vec![1.0]),
            ],
            vec![CustomerClass::closed("jobs", 3)],
            DMatrix::from_row_slice(2, 1, &[1.0, 1.0]),
        )
        .unwrap()
    }

    #[test]
    fn valid_model_passes() {
        let m = two_station_model();
        assert_eq!(m.station_count(), 2);
        assert_eq!(m.target_population(), vec![3]);
        assert!((m.service_demand(0, 0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn visit_shape_mismatch_rejected() {
        let err = QnModel::new(
            vec![Station::load_independent("cpu", vec![0.2])],
            vec![CustomerClass::closed("jobs", 3)],
            DMatrix::from_row_slice(2, 1, &[1.0, 1.0]),
        )
        .unwrap_err();
        assert!(format!("{err}").contains("visit matrix"));
    }

    #[test]
    fn short_load_dependent_table_rejected() {
        let err = QnModel::new(
            vec![Station::load_dependent("disk", vec![vec![0.5, 0.3]])],
            vec![CustomerClass::closed("jobs", 4)],
            DMatrix::from_row_slice(1, 1, &[1.0]),
        )
        .unwrap_err();
        assert!(format!("{err}").contains("load-dependent table"));
    }

    #[test]
    fn profile_kind_must_match_station_kind() {
        let bad = Station {
            name: "q".into(),
            kind: StationKind::LoadIndependent,
            servers: 1,
            service: vec![ServiceProfile::LoadDependent(vec![1.0])],
        };
        let err = QnModel::new(
            vec![bad],
            vec![CustomerClass::closed("jobs", 1)],
            DMatrix::from_row_slice(1, 1, &[1.0]),
        )
        .unwrap_err();
        assert!(format!("{err}").contains("not load-dependent"));
    }

    #[test]
    fn mixed_shape_accessors() {
        let m = QnModel::new(
            vec![Station::load_independent("cpu", vec![0.2, 0.1])],
            vec![
                CustomerClass::closed("batch", 2),
                CustomerClass::open("web", 0.5),
            ],
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
        )
        .unwrap();
        assert!(m.is_mixed());
        assert_eq!(m.target_population(), vec![2, 0]);
        assert_eq!(m.total_closed_population(), 2);
    }

    #[test]
    fn multi_server_detection_ignores_delay_centers() {
        let m = QnModel::new(
            vec![
                Station::load_independent("cpu", vec![0.2]).with_servers(3),
                Station::delay("think", vec![1.0]).with_servers(10),
            ],
            vec![CustomerClass::closed("jobs", 2)],
            DMatrix::from_row_slice(2, 1, &[1.0, 1.0]),
        )
        .unwrap();
        assert!(m.has_multi_server_queues());

        let delay_only = QnModel::new(
            vec![Station::delay("think", vec![1.0]).with_servers(10)],
            vec![CustomerClass::closed("jobs", 2)],
            DMatrix::from_row_slice(1, 1, &[1.0]),
        )
        .unwrap();
        assert!(!delay_only.has_multi_server_queues());
    }
}
