//! Service stations.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scheduling discipline of a station.
///
/// Exhaustive matching everywhere a kind is consumed: adding a kind breaks
/// every consumer at compile time instead of silently defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StationKind {
    /// FCFS/PS queue whose service rate does not depend on local occupancy.
    LoadIndependent,
    /// Queue whose per-job service time depends on the local queue length.
    LoadDependent,
    /// Infinite-server think-time center; never saturates.
    Delay,
    /// Preemptive-resume priority queue.
    PreemptivePriority,
    /// Non-preemptive head-of-line priority queue.
    HeadOfLinePriority,
}

impl StationKind {
    /// Delay centers are infinite-server by convention and excluded from the
    /// stability check.
    pub fn is_delay(self) -> bool {
        matches!(self, StationKind::Delay)
    }

    pub fn is_priority(self) -> bool {
        matches!(
            self,
            StationKind::PreemptivePriority | StationKind::HeadOfLinePriority
        )
    }
}

/// Per-class service-time function at one station.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ServiceProfile {
    /// One scalar service time per visit.
    Fixed(f64),
    /// Service time indexed by local occupancy: entry `j-1` applies when
    /// `j` jobs are present (`j = 1..=max closed population`).
    LoadDependent(Vec<f64>),
}

impl ServiceProfile {
    /// Service time with `jobs` present locally; a fixed profile ignores
    /// occupancy, a load-dependent one clamps to its last entry.
    pub fn at_occupancy(&self, jobs: usize) -> f64 {
        match self {
            ServiceProfile::Fixed(s) => *s,
            ServiceProfile::LoadDependent(table) => {
                if table.is_empty() {
                    0.0
                } else {
                    let idx = jobs.max(1).min(table.len()) - 1;
                    table[idx]
                }
            }
        }
    }

    /// Scalar service time for the stations whose kind promises one.
    pub fn fixed(&self) -> Option<f64> {
        match self {
            ServiceProfile::Fixed(s) => Some(*s),
            ServiceProfile::LoadDependent(_) => None,
        }
    }
}

/// One service station: kind, server count, and one service profile per class.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Station {
    pub name: String,
    pub kind: StationKind,
    /// Number of servers, >= 1. Ignored for delay centers.
    pub servers: usize,
    /// Service profile per class, indexed by class position in the model.
    pub service: Vec<ServiceProfile>,
}

impl Station {
    pub fn load_independent(name: impl Into<String>, service_times: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind: StationKind::LoadIndependent,
            servers: 1,
            service: service_times.into_iter().map(ServiceProfile::Fixed).collect(),
        }
    }

    pub fn delay(name: impl Into<String>, think_times: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind: StationKind::Delay,
            servers: 1,
            service: think_times.into_iter().map(ServiceProfile::Fixed).collect(),
        }
    }

    pub fn load_dependent(name: impl Into<String>, tables: Vec<Vec<f64>>) -> Self {
        Self {
            name: name.into(),
            kind: StationKind::LoadDependent,
            servers: 1,
            service: tables
                .into_iter()
                .map(ServiceProfile::LoadDependent)
                .collect(),
        }
    }

    pub fn priority(
        name: impl Into<String>,
        kind: StationKind,
        service_times: Vec<f64>,
    ) -> Self {
        debug_assert!(kind.is_priority());
        Self {
            name: name.into(),
            kind,
            servers: 1,
            service: service_times.into_iter().map(ServiceProfile::Fixed).collect(),
        }
    }

    pub fn with_servers(mut self, servers: usize) -> Self {
        self.servers = servers;
        self
    }
}
