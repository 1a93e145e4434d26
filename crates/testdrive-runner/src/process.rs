use std::time::Duration;

use testdrive_error::RunnerError;

use crate::command_spec::CommandSpec;

/// Captured output from one subprocess invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: Option<i32>, timed_out: bool) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            timed_out,
        }
    }

    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Combined stdout+stderr, the view the "bad interpreter" retry check
    /// and the per-test log both use.
    pub fn combined_string(&self) -> String {
        let mut s = self.stdout_string();
        s.push_str(&self.stderr_string());
        s
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Abstracts actual subprocess invocation so phase logic is testable
/// against a fake runner. Implementations MUST be synchronous at this
/// boundary — they may drive an async runtime internally, but must not
/// expose `async` in this trait's signature.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError>;
}

/// Fake `ProcessRunner` implementations for exercising phase logic without
/// spawning real subprocesses. Available to other workspace crates' test
/// suites, not just this crate's own.
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Returns a fixed, canned output for every invocation.
    pub struct MockRunner {
        pub output: ProcessOutput,
    }

    impl ProcessRunner for MockRunner {
        fn run(&self, _cmd: &CommandSpec, _timeout: Duration) -> Result<ProcessOutput, RunnerError> {
            Ok(self.output.clone())
        }
    }

    /// Returns queued outputs in order, one per call; panics if exhausted.
    pub struct SequenceRunner {
        pub outputs: Mutex<Vec<ProcessOutput>>,
    }

    impl SequenceRunner {
        pub fn new(outputs: Vec<ProcessOutput>) -> Self {
            let mut outputs = outputs;
            outputs.reverse();
            Self {
                outputs: Mutex::new(outputs),
            }
        }
    }

    impl ProcessRunner for SequenceRunner {
        fn run(&self, _cmd: &CommandSpec, _timeout: Duration) -> Result<ProcessOutput, RunnerError> {
            let mut outputs = self.outputs.lock().unwrap();
            Ok(outputs.pop().expect("SequenceRunner exhausted"))
        }
    }

    /// Always returns a spawn error.
    pub struct ErrorRunner;

    impl ProcessRunner for ErrorRunner {
        fn run(&self, cmd: &CommandSpec, _timeout: Duration) -> Result<ProcessOutput, RunnerError> {
            Err(RunnerError::SpawnFailed {
                program: cmd.program().to_string_lossy().into_owned(),
                reason: "mock failure".to_string(),
            })
        }
    }

    /// Always reports a timeout.
    pub struct TimeoutRunner;

    impl ProcessRunner for TimeoutRunner {
        fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError> {
            Err(RunnerError::Timeout {
                program: cmd.program().to_string_lossy().into_owned(),
                timeout_seconds: timeout.as_secs(),
            })
        }
    }
}
