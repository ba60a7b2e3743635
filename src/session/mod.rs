pub mod tracker;
pub mod types;

pub use tracker::{is_legal_transition, Observation, SessionTracker, StatusAnomaly};
pub use types::*;
