use std::collections::HashMap;
use std::sync::Mutex;

use testdrive_error::SchedulerError;
use testdrive_types::{PhaseId, PhaseTable, Status};

/// Per-test `(phase, status)` pairs guarded by a single mutex. The original
/// implementation relies on a GIL-protected dict; a systems language must
/// make the per-test atomicity explicit (§4.2), so every read/mutate here
/// takes the lock for the whole operation rather than read-then-write.
#[derive(Debug)]
pub struct TestState {
    inner: Mutex<HashMap<String, (PhaseId, Status)>>,
}

impl TestState {
    /// Seed every test at the first active phase, `PEND` — the state a
    /// freshly constructed (non-resumed) scheduler run starts from.
    pub fn new(tests: &[String], table: &PhaseTable) -> Self {
        let first = table.first().expect("phase table must have at least one phase");
        let inner = tests
            .iter()
            .map(|t| (t.clone(), (first, Status::Pend)))
            .collect();
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Seed test state from externally-derived `(phase, status)` pairs —
    /// used when resuming from a `StatusStore` replay.
    pub fn from_resumed(entries: HashMap<String, (PhaseId, Status)>) -> Self {
        Self {
            inner: Mutex::new(entries),
        }
    }

    pub fn get(&self, test: &str) -> (PhaseId, Status) {
        let guard = self.inner.lock().unwrap();
        *guard
            .get(test)
            .unwrap_or_else(|| panic!("unknown test `{test}`"))
    }

    /// Move `test` to `new_phase` at `PEND`. Asserts the current status is
    /// `PASS` and `new_phase` is the immediate successor of the current
    /// phase in `table` — violating either is a scheduler bug (§4.2).
    pub fn advance(
        &self,
        test: &str,
        new_phase: PhaseId,
        table: &PhaseTable,
    ) -> Result<(), SchedulerError> {
        let mut guard = self.inner.lock().unwrap();
        let entry = guard
            .get_mut(test)
            .unwrap_or_else(|| panic!("unknown test `{test}`"));
        let (phase, status) = *entry;
        if status != Status::Pass {
            return Err(SchedulerError::Invariant(format!(
                "cannot advance `{test}` from {phase} while status is {status}, expected PASS"
            )));
        }
        let expected_next = table.next(phase);
        if expected_next != Some(new_phase) {
            return Err(SchedulerError::Invariant(format!(
                "cannot advance `{test}` from {phase} to {new_phase}: not the immediate successor"
            )));
        }
        *entry = (new_phase, Status::Pend);
        Ok(())
    }

    /// Complete the phase `test` is currently `PEND` at, with `status`
    /// (`PASS` or `FAIL`). Asserts the current status is `PEND` (§4.2).
    pub fn complete(&self, test: &str, status: Status) -> Result<(), SchedulerError> {
        if status != Status::Pass && status != Status::Fail {
            return Err(SchedulerError::Invariant(format!(
                "complete() called with non-terminal status {status} for `{test}`"
            )));
        }
        let mut guard = self.inner.lock().unwrap();
        let entry = guard
            .get_mut(test)
            .unwrap_or_else(|| panic!("unknown test `{test}`"));
        if entry.1 != Status::Pend {
            return Err(SchedulerError::Invariant(format!(
                "cannot complete `{test}` at {}: current status is {}, expected PEND",
                entry.0, entry.1
            )));
        }
        entry.1 = status;
        Ok(())
    }

    /// True once every test has reached `FAIL`, `PASS` at the terminal
    /// phase, or `PEND` at the terminal phase — the last meaning RUN was
    /// submitted to a batch queue and is awaiting completion outside this
    /// process (§4.9). The scheduler's own job for that test is finished;
    /// the job's real pass/fail lands in `TestStatus.log` later, written by
    /// the batch job itself.
    pub fn all_done(&self, table: &PhaseTable) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.values().all(|&(phase, status)| {
            status == Status::Fail || table.is_terminal(phase) && matches!(status, Status::Pass | Status::Pend)
        })
    }

    /// Tests with work the producer would pick up on its next pass, paired
    /// with the phase that would be launched: `PASS` at a non-terminal phase
    /// means "launch the next phase"; `PEND` at a non-terminal phase means
    /// "launch this phase itself" (true for both a fresh test's first phase
    /// and a resumed test picking up mid-pipeline). `PEND` at the terminal
    /// phase is excluded: it means RUN was already submitted to a batch
    /// queue and is awaiting completion, not that it should be relaunched.
    /// Ignores resource/gate availability — a caller still has to retry a
    /// phase this reports if the arbiter or build-group registry isn't
    /// ready for it yet.
    pub fn launchable(&self, table: &PhaseTable) -> Vec<(String, PhaseId)> {
        let guard = self.inner.lock().unwrap();
        let mut out = Vec::new();
        for (test, &(phase, status)) in guard.iter() {
            match status {
                Status::Pass if !table.is_terminal(phase) => {
                    if let Some(next) = table.next(phase) {
                        out.push((test.clone(), next));
                    }
                }
                Status::Pend | Status::Rerun if !table.is_terminal(phase) => {
                    out.push((test.clone(), phase))
                }
                _ => {}
            }
        }
        out
    }
}
