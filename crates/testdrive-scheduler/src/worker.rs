use std::path::Path;
use std::time::{Duration, Instant};

use testdrive_resource::{BuildGroupRegistry, Gate};
use testdrive_runner::{
    build_case_setup, build_cmpgen_namelists, build_create_newcase, build_model_build,
    build_sharedlib_build, build_submit, run_with_retry, CreateNewcaseExtra, ProcessRunner,
    SubmitExtra,
};
use testdrive_status::StatusStore;
use testdrive_types::{Opt, PhaseId, Status, TestId};

use crate::xml_phase::{
    apply_xml_change, apply_xml_changes, async_io_requires_nuopc, is_performance_class,
    lock_env_run, read_exeroot, write_exeroot, XmlChange,
};

/// A non-zero exit from `case.cmpgen_namelists` meaning "comparisons
/// failed" rather than "the tool itself errored" — non-fatal at this level.
pub const NAMELIST_COMPARE_FAILED_CODE: i32 = 100;

/// The result of running one phase for one test.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub passed: bool,
    pub comment: Option<String>,
    /// Set when a phase's own failure should be attributed to a different
    /// phase's `StatusStore` entry (SETUP, per §4.6's `SHAREDLIB_BUILD`
    /// namelist-regen rule).
    pub retarget_status_to: Option<PhaseId>,
    pub elapsed: Duration,
}

impl PhaseOutcome {
    fn pass(elapsed: Duration) -> Self {
        Self {
            passed: true,
            comment: None,
            retarget_status_to: None,
            elapsed,
        }
    }

    fn fail(comment: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            passed: false,
            comment: Some(comment.into()),
            retarget_status_to: None,
            elapsed,
        }
    }
}

pub struct WorkerContext<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub timeout: Duration,
}

impl<'a> WorkerContext<'a> {
    pub fn run_create_newcase(
        &self,
        case_dir: &Path,
        test: &TestId,
        extra: &CreateNewcaseExtra,
    ) -> PhaseOutcome {
        let started = Instant::now();
        let spec = build_create_newcase(case_dir, test, extra);
        match run_with_retry(self.runner, &spec, self.timeout) {
            Ok(output) if output.success() => PhaseOutcome::pass(started.elapsed()),
            Ok(output) => PhaseOutcome::fail(output.stderr_string(), started.elapsed()),
            Err(e) => PhaseOutcome::fail(e.to_string(), started.elapsed()),
        }
    }

    /// Run the XML phase for a single case. Leaders record `EXEROOT` into
    /// the registry; followers overwrite their own `EXEROOT` with the
    /// leader's (§4.6). Both still apply their own `opts`-derived edits —
    /// only `SHAREDLIB_BUILD`/`MODEL_BUILD` are true short-circuits for
    /// followers.
    pub fn run_xml(
        &self,
        case_dir: &Path,
        test_name: &str,
        test: &TestId,
        is_leader: bool,
        registry: &mut BuildGroupRegistry,
    ) -> PhaseOutcome {
        let started = Instant::now();

        if async_io_requires_nuopc(test) {
            return PhaseOutcome::fail(
                "opt `A` (async I/O) requires the nuopc driver",
                started.elapsed(),
            );
        }

        if let Err(e) = apply_xml_changes(self.runner, case_dir, test, self.timeout) {
            return PhaseOutcome::fail(e.to_string(), started.elapsed());
        }

        if is_performance_class(test) {
            let save_timing = XmlChange {
                key: "SAVE_TIMING".to_string(),
                value: "TRUE".to_string(),
            };
            if let Err(e) = apply_xml_change(self.runner, case_dir, &save_timing, self.timeout) {
                return PhaseOutcome::fail(e.to_string(), started.elapsed());
            }
        }

        if let Err(e) = lock_env_run(self.runner, case_dir, self.timeout) {
            return PhaseOutcome::fail(e.to_string(), started.elapsed());
        }

        if is_leader {
            match read_exeroot(self.runner, case_dir, self.timeout) {
                Ok(exeroot) => {
                    if registry.set_shared_exe(test_name, exeroot).is_err() {
                        return PhaseOutcome::fail(
                            "could not record shared executable path for leader",
                            started.elapsed(),
                        );
                    }
                }
                Err(e) => return PhaseOutcome::fail(e.to_string(), started.elapsed()),
            }
        } else {
            let shared = match registry.shared_exe(test_name) {
                Ok(Some(path)) => path.to_string(),
                _ => {
                    return PhaseOutcome::fail(
                        "follower XML ran before leader recorded a shared executable",
                        started.elapsed(),
                    )
                }
            };
            if let Err(e) = write_exeroot(self.runner, case_dir, &shared, self.timeout) {
                return PhaseOutcome::fail(e.to_string(), started.elapsed());
            }
        }

        PhaseOutcome::pass(started.elapsed())
    }

    pub fn run_setup(&self, case_dir: &Path, single_exe: bool) -> PhaseOutcome {
        let started = Instant::now();
        let setup = match self.runner.run(&build_case_setup(case_dir), self.timeout) {
            Ok(o) => o,
            Err(e) => return PhaseOutcome::fail(e.to_string(), started.elapsed()),
        };
        if !setup.success() {
            return PhaseOutcome::fail(setup.stderr_string(), started.elapsed());
        }

        // cmpgen_namelists failures are tolerated here; a persistent
        // failure resurfaces at SHAREDLIB_BUILD time (§4.6).
        let _ = self
            .runner
            .run(&build_cmpgen_namelists(case_dir), self.timeout);

        if single_exe && !supports_shared_executable_policy() {
            return PhaseOutcome::fail(
                "test does not support sharing a single executable",
                started.elapsed(),
            );
        }

        PhaseOutcome::pass(started.elapsed())
    }

    pub fn run_sharedlib_build_leader(&self, case_dir: &Path) -> PhaseOutcome {
        let started = Instant::now();
        let build = match self
            .runner
            .run(&build_sharedlib_build(case_dir), self.timeout)
        {
            Ok(o) => o,
            Err(e) => return PhaseOutcome::fail(e.to_string(), started.elapsed()),
        };
        if !build.success() {
            return PhaseOutcome::fail(build.stderr_string(), started.elapsed());
        }

        let cmpgen = match self
            .runner
            .run(&build_cmpgen_namelists(case_dir), self.timeout)
        {
            Ok(o) => o,
            Err(e) => return PhaseOutcome::fail(e.to_string(), started.elapsed()),
        };
        match cmpgen.exit_code {
            Some(0) | Some(NAMELIST_COMPARE_FAILED_CODE) => PhaseOutcome::pass(started.elapsed()),
            _ => {
                let mut outcome =
                    PhaseOutcome::fail(cmpgen.stderr_string(), started.elapsed());
                outcome.retarget_status_to = Some(PhaseId::Setup);
                outcome
            }
        }
    }

    pub fn run_model_build_leader(&self, case_dir: &Path) -> PhaseOutcome {
        let started = Instant::now();
        match self.runner.run(&build_model_build(case_dir), self.timeout) {
            Ok(o) if o.success() => PhaseOutcome::pass(started.elapsed()),
            Ok(o) => PhaseOutcome::fail(o.stderr_string(), started.elapsed()),
            Err(e) => PhaseOutcome::fail(e.to_string(), started.elapsed()),
        }
    }

    /// `RUN`: a `B` opt short-circuits with no subprocess at all, marking
    /// `SUBMIT=PASS, RUN=PASS` directly — the one case where the scheduler
    /// must write the otherwise-externally-owned RUN status itself,
    /// because no external command ran to own it.
    pub fn run_submit(&self, case_dir: &Path, test: &TestId, extra: &SubmitExtra) -> PhaseOutcome {
        let started = Instant::now();
        if test.has_opt(|o| matches!(o, Opt::BuildOnly)) {
            return PhaseOutcome::pass(started.elapsed());
        }
        match self.runner.run(&build_submit(case_dir, extra), self.timeout) {
            Ok(o) if o.success() => PhaseOutcome::pass(started.elapsed()),
            Ok(o) => PhaseOutcome::fail(o.stderr_string(), started.elapsed()),
            Err(e) => PhaseOutcome::fail(e.to_string(), started.elapsed()),
        }
    }
}

/// Gate a follower's launch of a build-group-sensitive phase, translating
/// a `Gate` into the worker-facing outcome directly (no subprocess runs).
pub fn follower_short_circuit(gate: Gate, elapsed: Duration) -> Option<PhaseOutcome> {
    match gate {
        Gate::Ineligible => None,
        Gate::FollowerPass => Some(PhaseOutcome::pass(elapsed)),
        Gate::FollowerFail(message) => Some(PhaseOutcome::fail(message, elapsed)),
    }
}

/// Append the scheduler-owned `StatusStore` record for a completed phase,
/// honoring `retarget_status_to` when set.
pub fn record_status(
    test_dir: &Path,
    phase: PhaseId,
    outcome: &PhaseOutcome,
) -> Result<(), testdrive_error::StatusError> {
    let target_phase = outcome.retarget_status_to.unwrap_or(phase);
    let status = if outcome.passed { Status::Pass } else { Status::Fail };
    StatusStore::write(test_dir, target_phase, status, outcome.comment.as_deref())
}

/// Placeholder for the machine/test-specific "can this test share a single
/// executable with its group" check (§4.6 SETUP). No machine-descriptor
/// model exists in this crate yet, so this always allows sharing; a real
/// deployment would consult compset/component compatibility here.
fn supports_shared_executable_policy() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use testdrive_runner::test_support::{ErrorRunner, MockRunner, TimeoutRunner};
    use testdrive_runner::ProcessOutput;

    fn ctx(runner: &dyn ProcessRunner) -> WorkerContext<'_> {
        WorkerContext {
            runner,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn create_newcase_fails_on_nonzero_exit() {
        let runner = MockRunner {
            output: ProcessOutput::new(vec![], b"bad grid".to_vec(), Some(1), false),
        };
        let test = TestId::parse("SMS.f09_g16.X").unwrap();
        let outcome = ctx(&runner).run_create_newcase(
            Path::new("/tests/SMS"),
            &test,
            &CreateNewcaseExtra::default(),
        );
        assert!(!outcome.passed);
    }

    #[test]
    fn create_newcase_passes_on_zero_exit() {
        let runner = MockRunner {
            output: ProcessOutput::new(vec![], vec![], Some(0), false),
        };
        let test = TestId::parse("SMS.f09_g16.X").unwrap();
        let outcome = ctx(&runner).run_create_newcase(
            Path::new("/tests/SMS"),
            &test,
            &CreateNewcaseExtra::default(),
        );
        assert!(outcome.passed);
    }

    #[test]
    fn run_with_b_opt_short_circuits_without_subprocess() {
        let runner = ErrorRunner;
        let test = TestId::parse("SMS_B.f09_g16.X").unwrap();
        let outcome = ctx(&runner).run_submit(Path::new("/tests/SMS"), &test, &SubmitExtra::default());
        assert!(outcome.passed);
    }

    #[test]
    fn run_without_b_opt_invokes_submit_and_propagates_timeout() {
        let runner = TimeoutRunner;
        let test = TestId::parse("SMS.f09_g16.X").unwrap();
        let outcome = ctx(&runner).run_submit(Path::new("/tests/SMS"), &test, &SubmitExtra::default());
        assert!(!outcome.passed);
    }

    #[test]
    fn sharedlib_build_namelist_compare_failure_retargets_setup() {
        let runner = testdrive_runner::test_support::SequenceRunner::new(vec![
            ProcessOutput::new(vec![], vec![], Some(0), false),
            ProcessOutput::new(vec![], b"namelists differ".to_vec(), Some(2), false),
        ]);
        let outcome = ctx(&runner).run_sharedlib_build_leader(Path::new("/tests/SMS"));
        assert!(!outcome.passed);
        assert_eq!(outcome.retarget_status_to, Some(PhaseId::Setup));
    }

    #[test]
    fn sharedlib_build_tolerates_tests_failed_namelist_code() {
        let runner = testdrive_runner::test_support::SequenceRunner::new(vec![
            ProcessOutput::new(vec![], vec![], Some(0), false),
            ProcessOutput::new(vec![], vec![], Some(NAMELIST_COMPARE_FAILED_CODE), false),
        ]);
        let outcome = ctx(&runner).run_sharedlib_build_leader(Path::new("/tests/SMS"));
        assert!(outcome.passed);
    }
}
