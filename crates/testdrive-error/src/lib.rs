//! Shared error taxonomy for the testdrive workspace.
//!
//! Each crate that needs its own error kinds defines a `thiserror`-derived
//! enum here rather than scattering ad hoc `String` errors; the binary
//! aggregates all of them through `anyhow` at the command-dispatch boundary
//! and maps them down to a small, stable table of process exit codes.

use thiserror::Error;

/// Errors raised while resolving layered configuration (CLI/file/env/default).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file at {path} could not be read: {reason}")]
    FileUnreadable { path: String, reason: String },

    #[error("config file at {path} is not valid TOML: {reason}")]
    MalformedToml { path: String, reason: String },

    #[error("field `{field}` has invalid value `{value}`: {reason}")]
    InvalidField {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors raised while parsing a test name / opts string or computing layout paths.
#[derive(Debug, Error)]
pub enum TestIdError {
    #[error("unrecognized opt code `{code}` in test name `{name}`")]
    UnknownOpt { name: String, code: String },

    #[error("opts `N` and `C` are mutually exclusive in test name `{name}`")]
    ConflictingInstanceCount { name: String },

    #[error("opt `N` is incompatible with the nuopc driver in test name `{name}`")]
    NInstWithNuopc { name: String },

    #[error("malformed test name `{name}`: {reason}")]
    Malformed { name: String, reason: String },
}

/// Errors raised by the durable per-test status log.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("could not open status log at {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("could not append to status log at {path}: {reason}")]
    Append { path: String, reason: String },

    #[error("status log at {path} contains an unparsable record: {line}")]
    MalformedRecord { path: String, line: String },
}

/// Errors raised by the resource arbiter and build-group registry.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("requested cost {cost} exceeds total core budget {budget} for non-RUN phase")]
    CostExceedsBudget { cost: u32, budget: u32 },

    #[error("resource accounting invariant violated: {reason}")]
    InvariantViolated { reason: String },
}

#[derive(Debug, Error)]
pub enum BuildGroupError {
    #[error("test `{test}` is not a member of any build group")]
    NoGroup { test: String },

    #[error("build group for `{test}` has no leader")]
    NoLeader { test: String },

    #[error("cannot use build for test {test} because it failed")]
    LeaderFailed { test: String },
}

/// Errors raised by the subprocess execution layer.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("process `{program}` could not be spawned: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("process `{program}` exceeded its {timeout_seconds}s timeout")]
    Timeout { program: String, timeout_seconds: u64 },

    #[error("process `{program}` exited with status {code}")]
    NonZeroExit { program: String, code: i32 },

    #[error("process `{program}` terminated by signal")]
    Signaled { program: String },
}

/// Errors raised by the scheduler itself — construction-time user/config
/// errors propagate as `Err`; true invariant violations are treated as bugs
/// (see `SchedulerError::Invariant`) and are expected to be escalated via
/// `panic!` inside the scheduler rather than folded into a per-test `FAIL`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    TestId(#[from] TestIdError),

    #[error(transparent)]
    BuildGroup(#[from] BuildGroupError),

    #[error("scheduler invariant violated: {0}")]
    Invariant(String),

    #[error("no baseline compare directory configured but COMPARE opt was requested for `{test}`")]
    MissingBaselineCompareDir { test: String },

    #[error("queue `{queue}` requested but batch execution is disabled")]
    QueueWithoutBatch { queue: String },
}

/// Stable process exit codes. Calling scripts and CI should branch on these
/// rather than parsing stderr text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    ConfigError = 2,
    SchedulerInvariant = 3,
    PartialTestFailure = 4,
    IoError = 5,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl SchedulerError {
    /// Maps a construction-time error to the exit code `main` should return.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            SchedulerError::Config(_) => ExitCode::ConfigError,
            SchedulerError::TestId(_) | SchedulerError::QueueWithoutBatch { .. } => {
                ExitCode::ConfigError
            }
            SchedulerError::BuildGroup(_)
            | SchedulerError::Invariant(_)
            | SchedulerError::MissingBaselineCompareDir { .. } => ExitCode::SchedulerInvariant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::ConfigError.code(), 2);
        assert_eq!(ExitCode::SchedulerInvariant.code(), 3);
        assert_eq!(ExitCode::PartialTestFailure.code(), 4);
        assert_eq!(ExitCode::IoError.code(), 5);
    }

    #[test]
    fn scheduler_error_wraps_config_error() {
        let cfg = ConfigError::InvalidField {
            field: "worker_slots".into(),
            value: "-1".into(),
            reason: "must be positive".into(),
        };
        let sched: SchedulerError = cfg.into();
        assert!(matches!(sched, SchedulerError::Config(_)));
    }
}
