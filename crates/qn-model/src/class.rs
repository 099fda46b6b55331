//! Customer classes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Open or closed chain membership with the one scalar each implies.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClassKind {
    /// Fixed number of circulating customers.
    Closed { population: usize },
    /// External Poisson arrival stream, jobs/time-unit.
    Open { arrival_rate: f64 },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CustomerClass {
    pub name: String,
    pub kind: ClassKind,
    /// Higher priority is served first at priority stations.
    pub priority: u32,
}

impl CustomerClass {
    pub fn closed(name: impl Into<String>, population: usize) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Closed { population },
            priority: 0,
        }
    }

    pub fn open(name: impl Into<String>, arrival_rate: f64) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Open { arrival_rate },
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.kind, ClassKind::Closed { .. })
    }

    pub fn is_open(&self) -> bool {
        matches!(self.kind, ClassKind::Open { .. })
    }

    /// Closed population, zero for open classes.
    pub fn population(&self) -> usize {
        match self.kind {
            ClassKind::Closed { population } => population,
            ClassKind::Open { .. } => 0,
        }
    }

    /// Arrival rate, zero for closed classes.
    pub fn arrival_rate(&self) -> f64 {
        match self.kind {
            ClassKind::Closed { .. } => 0.0,
            ClassKind::Open { arrival_rate } => arrival_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_kind() {
        let c = CustomerClass::closed("batch", 5).with_priority(2);
        assert!(c.is_closed());
        assert_eq!(c.population(), 5);
        assert_eq!(c.arrival_rate(), 0.0);
        assert_eq!(c.priority, 2);

        let o = CustomerClass::open("interactive", 0.8);
        assert!(o.is_open());
        assert_eq!(o.population(), 0);
        assert_eq!(o.arrival_rate(), 0.8);
    }
}
