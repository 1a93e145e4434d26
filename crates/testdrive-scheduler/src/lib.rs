//! The phase-parallel test scheduler: per-test state machine, resource-aware
//! producer loop, per-phase worker logic, and one-time case scaffolding.

mod scheduler;
mod setup_controller;
mod test_state;
mod worker;
mod xml_phase;

pub use scheduler::{Scheduler, TotalPesLookup};
pub use setup_controller::SetupController;
pub use test_state::TestState;
pub use worker::{
    follower_short_circuit, record_status, PhaseOutcome, WorkerContext,
    NAMELIST_COMPARE_FAILED_CODE,
};
pub use xml_phase::{
    apply_xml_change, apply_xml_changes, async_io_requires_nuopc, is_performance_class,
    lock_env_run, read_exeroot, write_exeroot, xml_changes_for_opts, XmlChange,
};
