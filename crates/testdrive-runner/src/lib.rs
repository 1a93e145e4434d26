//! Argv-only subprocess execution: a `ProcessRunner` trait abstracting
//! actual invocation, a native thread+timeout implementation, the
//! bad-interpreter retry policy, and phase-specific command builders.

mod command_spec;
mod native;
mod phase_commands;
mod process;
mod retry;

pub use command_spec::CommandSpec;
pub use native::NativeRunner;
pub use phase_commands::{
    build_case_setup, build_cmpgen_namelists, build_create_newcase, build_model_build,
    build_sharedlib_build, build_submit, CreateNewcaseExtra, SubmitExtra,
};
pub use process::{test_support, ProcessOutput, ProcessRunner};
pub use retry::run_with_retry;
