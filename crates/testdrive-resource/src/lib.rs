//! Resource arbitration (worker slots + core budget) and build-group
//! leader/follower gating.

mod arbiter;
mod buildgroup;
mod cost;

pub use arbiter::ResourceArbiter;
pub use buildgroup::{BuildGroupRegistry, Gate};
pub use cost::{compute_cost, PhaseCostInputs, PhaseCostOutcome};
