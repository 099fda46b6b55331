//! qn-model: queueing-network data model and preconditions.
//!
//! Contains:
//! - station (station kinds + per-class service profiles)
//! - class (open/closed customer classes with priorities)
//! - model (stations + classes + visit matrix, validated)
//! - capacity (processing-capacity stability gate for open classes)

pub mod capacity;
pub mod class;
pub mod error;
pub mod model;
pub mod station;

pub use capacity::has_processing_capacity;
pub use class::{ClassKind, CustomerClass};
pub use error::{ModelError, ModelResult};
pub use model::QnModel;
pub use station::{ServiceProfile, Station, StationKind};
