//! Core vocabulary shared across the testdrive workspace: phases, test
//! identifiers, and the pure path computations derived from them.

mod layout;
mod phase;
mod test_id;

pub use layout::TestDirectoryLayout;
pub use phase::{PhaseId, PhasePruning, PhaseTable, Status};
pub use test_id::{Opt, TestId};
