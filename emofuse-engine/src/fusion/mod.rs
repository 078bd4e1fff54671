//! Confidence-weighted temporal fusion
//!
//! Bottom-up: observations are buffered per room ([`store`]), weighted
//! ([`weights`]) and combined ([`combiner`]) into a raw decision, stabilized
//! against recent decisions ([`smoother`]) and bridged across weak readings
//! ([`persistence`]). [`engine`] composes the stages per room.

pub mod combiner;
pub mod engine;
pub mod observation;
pub mod persistence;
pub mod room;
pub mod smoother;
pub mod store;
pub mod weights;

pub use combiner::{combine, Combination, CombinationDetail};
pub use engine::{
    spawn_gc_task, EngineSettings, EngineStats, FusionEngine, GlobalStats, RoomHistory,
    RoomStats, Submission,
};
pub use observation::{Observation, ObservationSnapshot};
pub use persistence::{PersistenceSnapshot, PersistenceTracker};
pub use smoother::{smooth, FusionHistory, Smoothed};
pub use store::{ObservationStore, PlanReport, SweepReport, TimeoutStats};
pub use weights::compute_weights;
