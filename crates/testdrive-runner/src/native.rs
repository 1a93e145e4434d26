use std::process::Stdio;
use std::sync::mpsc;
use std::time::Duration;

use testdrive_error::RunnerError;

use crate::command_spec::CommandSpec;
use crate::process::{ProcessOutput, ProcessRunner};

/// Runs phase commands as native OS subprocesses. Spawns a helper thread to
/// block on `wait_with_output` and ferries the result back over an `mpsc`
/// channel so the caller can apply a wall-clock timeout via
/// `recv_timeout` without the complexity of an async runtime — the same
/// spawn+channel+timeout idiom this codebase's process-execution layer
/// uses elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRunner;

impl ProcessRunner for NativeRunner {
    fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError> {
        let program = cmd.program().to_string_lossy().into_owned();
        let mut command = cmd.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;
        let child_id = child.id();

        let (tx, rx) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            let result = child.wait_with_output();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(output)) => {
                let _ = handle.join();
                Ok(ProcessOutput::new(
                    output.stdout,
                    output.stderr,
                    output.status.code(),
                    false,
                ))
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(RunnerError::SpawnFailed {
                    program,
                    reason: e.to_string(),
                })
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                terminate_process(child_id);
                let _ = handle.join();
                Err(RunnerError::Timeout {
                    program,
                    timeout_seconds: timeout.as_secs(),
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Err(RunnerError::SpawnFailed {
                    program,
                    reason: "worker thread disconnected before reporting a result".to_string(),
                })
            }
        }
    }
}

#[cfg(unix)]
fn terminate_process(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(windows)]
fn terminate_process(pid: u32) {
    // Best-effort: a process that has already exited is not an error case
    // we need to surface, the subsequent `wait_with_output` join handles it.
    unsafe {
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
        use winapi::um::winnt::PROCESS_TERMINATE;
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if !handle.is_null() {
            TerminateProcess(handle, 1);
            CloseHandle(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_a_trivial_command_successfully() {
        let runner = NativeRunner;
        let cmd = CommandSpec::new("true");
        let output = runner.run(&cmd, Duration::from_secs(5)).unwrap();
        assert!(output.success());
    }

    #[test]
    fn captures_nonzero_exit_code() {
        let runner = NativeRunner;
        let cmd = CommandSpec::new("false");
        let output = runner.run(&cmd, Duration::from_secs(5)).unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, Some(1));
    }

    #[test]
    fn times_out_a_long_running_command() {
        let runner = NativeRunner;
        let cmd = CommandSpec::new("sleep").arg("5");
        let err = runner
            .run(&cmd, Duration::from_millis(100))
            .expect_err("expected a timeout");
        assert!(matches!(err, RunnerError::Timeout { .. }));
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let runner = NativeRunner;
        let cmd = CommandSpec::new("sh").arg("-c").arg("echo out; echo err 1>&2");
        let output = runner.run(&cmd, Duration::from_secs(5)).unwrap();
        assert_eq!(output.stdout_string().trim(), "out");
        assert_eq!(output.stderr_string().trim(), "err");
    }
}
