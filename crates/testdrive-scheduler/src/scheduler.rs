use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use testdrive_config::Config;
use testdrive_error::SchedulerError;
use testdrive_resource::{compute_cost, BuildGroupRegistry, Gate, PhaseCostInputs, PhaseCostOutcome, ResourceArbiter};
use testdrive_runner::{CreateNewcaseExtra, ProcessRunner, SubmitExtra};
use testdrive_types::{Opt, PhaseId, PhaseTable, Status, TestDirectoryLayout, TestId};

use crate::test_state::TestState;
use crate::worker::{follower_short_circuit, record_status, PhaseOutcome, WorkerContext};

/// A test's process-count cost at `RUN`; the scheduler needs this per-case
/// value (`TOTALPES`) to price in-process submission (§4.4). In the
/// absence of a live case-XML reader, callers supply it explicitly per
/// test (e.g. parsed from the `P` opt, or a configured default).
pub type TotalPesLookup = Arc<dyn Fn(&str) -> u32 + Send + Sync>;

/// One completed worker report, routed back to the producer so it can
/// release the reservation it made at launch (§5: the arbiter is
/// producer-only-written; workers only report what to release).
struct WorkerDone {
    test: String,
    cost: u32,
    was_sharedlib_build: bool,
}

/// The producer loop described in §4.8: selects next-phase candidates,
/// consults the arbiter and build-group registry, launches bounded
/// worker threads, and blocks only when no launch is possible.
pub struct Scheduler {
    tests: Vec<String>,
    test_ids: HashMap<String, TestId>,
    table: PhaseTable,
    state: Arc<TestState>,
    registry: Arc<Mutex<BuildGroupRegistry>>,
    layout: TestDirectoryLayout,
    config: Config,
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
    totalpes: TotalPesLookup,
    create_newcase_extra: CreateNewcaseExtra,
    submit_extra: SubmitExtra,
}

impl Scheduler {
    pub fn new(
        tests: Vec<String>,
        table: PhaseTable,
        registry: BuildGroupRegistry,
        layout: TestDirectoryLayout,
        config: Config,
        runner: Arc<dyn ProcessRunner>,
        timeout: Duration,
        totalpes: TotalPesLookup,
    ) -> Result<Self, SchedulerError> {
        let mut test_ids = HashMap::with_capacity(tests.len());
        for t in &tests {
            test_ids.insert(t.clone(), TestId::parse(t)?);
        }
        let state = Arc::new(TestState::new(&tests, &table));
        Ok(Self {
            tests,
            test_ids,
            table,
            state,
            registry: Arc::new(Mutex::new(registry)),
            layout,
            config,
            runner,
            timeout,
            totalpes,
            create_newcase_extra: CreateNewcaseExtra::default(),
            submit_extra: SubmitExtra::default(),
        })
    }

    /// Supply the `CREATE_NEWCASE`/`RUN` command flags derived from
    /// configuration (queue, walltime, project, preview/batch policy) —
    /// applied uniformly to every test in this run.
    pub fn with_phase_extras(
        mut self,
        create_newcase_extra: CreateNewcaseExtra,
        submit_extra: SubmitExtra,
    ) -> Self {
        self.create_newcase_extra = create_newcase_extra;
        self.submit_extra = submit_extra;
        self
    }

    /// Seed `TestState` from resumed `(phase, status)` pairs instead of the
    /// fresh-start default, for `use_existing` runs.
    pub fn with_resumed_state(mut self, resumed: HashMap<String, (PhaseId, Status)>) -> Self {
        self.state = Arc::new(TestState::from_resumed(resumed));
        self
    }

    fn case_dir(&self, test: &str) -> PathBuf {
        let test_id = &self.test_ids[test];
        self.layout.test_dir(test_id, false, false)
    }

    fn is_leader(&self, test: &str) -> bool {
        self.registry.lock().unwrap().is_leader(test).unwrap_or(true)
    }

    /// Drive every test to completion. Returns `true` iff every test ended
    /// `PASS` at the terminal phase (§7: `run_tests` returns a boolean).
    ///
    /// A test's `(phase, status)` means one of three things: `PASS` at a
    /// non-terminal phase says "this phase finished, launch the next one";
    /// `PEND` at any phase says "this phase itself is the next launch
    /// target" (true both for a fresh test's first phase and for a resumed
    /// test picking up mid-pipeline); `FAIL`/terminal `PASS` says "done".
    /// `dispatched` tracks tests with a worker currently in flight so a
    /// `PEND` candidate is launched exactly once, since `PEND` alone cannot
    /// distinguish "not yet launched" from "running".
    pub fn run(&self) -> Result<bool, SchedulerError> {
        let mut arbiter = ResourceArbiter::new(self.config.worker_slots, self.config.core_budget);
        let (tx, rx) = mpsc::channel::<WorkerDone>();
        let mut in_flight: usize = 0;
        let mut dispatched: std::collections::HashSet<String> = std::collections::HashSet::new();

        loop {
            if self.state.all_done(&self.table) {
                break;
            }

            let mut launched_any = false;
            for test in self.tests.clone() {
                if dispatched.contains(&test) {
                    continue;
                }

                let (phase, status) = self.state.get(&test);
                let (launch_phase, needs_advance) = match status {
                    Status::Fail => continue,
                    Status::Pass if self.table.is_terminal(phase) => continue,
                    Status::Pass => {
                        let Some(next_phase) = self.table.next(phase) else {
                            continue;
                        };
                        (next_phase, true)
                    }
                    // RUN submitted to batch and awaiting completion outside
                    // this process (§4.9) — not a relaunch candidate.
                    Status::Pend if self.table.is_terminal(phase) => continue,
                    // `Rerun` is folded into `Pend` before the scheduler observes it
                    // (see `testdrive_status::resume`); treat it identically here.
                    Status::Pend | Status::Rerun => (phase, false),
                };

                let is_leader = self.is_leader(&test);
                let gated = matches!(
                    launch_phase,
                    PhaseId::Xml | PhaseId::SharedlibBuild | PhaseId::ModelBuild
                ) && !is_leader;

                let gate = if gated {
                    let g = self.registry.lock().unwrap().gate(&test, launch_phase)?;
                    if g == Gate::Ineligible {
                        continue;
                    }
                    Some(g)
                } else {
                    None
                };

                let cost_inputs = PhaseCostInputs {
                    is_leader,
                    gmake_j: self.config.gmake_j,
                    calculate_model_build_cost: self.config.calculate_model_build_cost,
                    core_budget: arbiter.core_budget(),
                    no_batch: self.config.no_batch,
                    totalpes: (self.totalpes)(&test),
                    serialize_sharedlib_builds: self.config.serialize_sharedlib_builds,
                    sharedlib_build_in_flight: arbiter.has_sharedlib_build_in_flight(),
                };

                let outcome = compute_cost(launch_phase, &cost_inputs)
                    .map_err(|e| SchedulerError::Invariant(e.to_string()))?;

                let cost = match outcome {
                    PhaseCostOutcome::Ineligible => continue,
                    PhaseCostOutcome::RunExceedsBudget => {
                        // §4.4: synthesized immediate failure, not a bug.
                        if needs_advance {
                            self.state.advance(&test, launch_phase, &self.table)?;
                        }
                        self.state.complete(&test, Status::Fail)?;
                        let test_dir = self.case_dir(&test);
                        record_status(
                            &test_dir,
                            PhaseId::Run,
                            &PhaseOutcome {
                                passed: false,
                                comment: Some("RUN exceeds core budget".to_string()),
                                retarget_status_to: None,
                                elapsed: Duration::ZERO,
                            },
                        )
                        .map_err(|e| SchedulerError::Invariant(e.to_string()))?;
                        continue;
                    }
                    PhaseCostOutcome::Cost(c) => c,
                };

                let is_sharedlib_build = launch_phase == PhaseId::SharedlibBuild && is_leader;
                if !arbiter.try_request(cost, is_sharedlib_build) {
                    continue;
                }

                if needs_advance {
                    self.state.advance(&test, launch_phase, &self.table)?;
                }
                dispatched.insert(test.clone());
                launched_any = true;
                in_flight += 1;

                self.spawn_worker(
                    test.clone(),
                    launch_phase,
                    is_leader,
                    gate,
                    cost,
                    is_sharedlib_build,
                    tx.clone(),
                );
            }

            if !launched_any {
                if in_flight == 0 {
                    // No launches and nothing outstanding: either done or
                    // every remaining test is gate-blocked forever, which
                    // only happens if a leader never completes — treated
                    // as quiescence here rather than an infinite spin.
                    break;
                }
                let done = rx.recv().map_err(|_| {
                    SchedulerError::Invariant("worker channel closed unexpectedly".to_string())
                })?;
                dispatched.remove(&done.test);
                arbiter.release(done.cost, done.was_sharedlib_build);
                in_flight -= 1;
            } else {
                // Drain any completions that already arrived without
                // blocking, so freed resources are available to the next pass.
                while let Ok(done) = rx.try_recv() {
                    dispatched.remove(&done.test);
                    arbiter.release(done.cost, done.was_sharedlib_build);
                    in_flight -= 1;
                }
            }
        }

        // A terminal `PEND` means RUN was submitted to batch and the real
        // outcome isn't known yet; this crate has no batch-completion
        // poller, so "success" here means "the scheduler recorded no
        // failure", matching what it can actually observe (§7, §9).
        let guard_all_pass = self.tests.iter().all(|t| {
            let (phase, status) = self.state.get(t);
            self.table.is_terminal(phase) && matches!(status, Status::Pass | Status::Pend)
        });
        Ok(guard_all_pass)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_worker(
        &self,
        test: String,
        phase: PhaseId,
        is_leader: bool,
        gate: Option<Gate>,
        cost: u32,
        is_sharedlib_build: bool,
        tx: mpsc::Sender<WorkerDone>,
    ) {
        let state = Arc::clone(&self.state);
        let registry = Arc::clone(&self.registry);
        let runner = Arc::clone(&self.runner);
        let table = self.table.clone();
        let case_dir = self.case_dir(&test);
        let test_id = self.test_ids[&test].clone();
        let timeout = self.timeout;
        let no_batch = self.config.no_batch;
        let no_run = self.table.index_of(PhaseId::Run).is_none();
        let single_exe = self.config.single_exe;
        let create_newcase_extra = self.create_newcase_extra.clone();
        let submit_extra = self.submit_extra.clone();

        std::thread::spawn(move || {
            let ctx = WorkerContext {
                runner: runner.as_ref(),
                timeout,
            };

            let outcome = match phase {
                PhaseId::CreateNewcase => {
                    ctx.run_create_newcase(&case_dir, &test_id, &create_newcase_extra)
                }
                PhaseId::Xml => {
                    let mut reg = registry.lock().unwrap();
                    ctx.run_xml(&case_dir, &test, &test_id, is_leader, &mut reg)
                }
                PhaseId::Setup => ctx.run_setup(&case_dir, single_exe),
                PhaseId::SharedlibBuild => {
                    if is_leader {
                        ctx.run_sharedlib_build_leader(&case_dir)
                    } else {
                        follower_short_circuit(gate.clone().unwrap(), Duration::ZERO)
                            .expect("follower dispatch requires a resolved gate")
                    }
                }
                PhaseId::ModelBuild => {
                    if is_leader {
                        ctx.run_model_build_leader(&case_dir)
                    } else {
                        follower_short_circuit(gate.clone().unwrap(), Duration::ZERO)
                            .expect("follower dispatch requires a resolved gate")
                    }
                }
                PhaseId::Run => ctx.run_submit(&case_dir, &test_id, &submit_extra),
                PhaseId::Init => unreachable!("INIT is never launched"),
            };

            if matches!(
                phase,
                PhaseId::CreateNewcase | PhaseId::Xml | PhaseId::SharedlibBuild | PhaseId::ModelBuild
            ) {
                let scheduler_owned = matches!(phase, PhaseId::CreateNewcase | PhaseId::Xml)
                    || (!is_leader
                        && matches!(phase, PhaseId::SharedlibBuild | PhaseId::ModelBuild));
                if scheduler_owned {
                    let _ = record_status(&case_dir, phase, &outcome);
                }
                if is_leader && matches!(phase, PhaseId::Xml | PhaseId::SharedlibBuild | PhaseId::ModelBuild)
                {
                    let mut reg = registry.lock().unwrap();
                    let _ = reg.record_leader_result(&test, phase, outcome.passed);
                }
                if phase == PhaseId::Xml && outcome.passed {
                    let _ = crate::setup_controller::SetupController::append_readme_case_created(
                        &case_dir,
                        "create_newcase.py",
                    );
                }
            }

            // RUN is never scheduler-owned in `StatusStore` except the `B`
            // short circuit, where no external command ran to own it (§4.3,
            // §4.6). A genuine batch submission that succeeds leaves the
            // test at `(RUN, PEND)` — submitted but not yet decided; the
            // batch job reports the real outcome later. `no_batch` or a
            // failed submission decides the outcome synchronously instead.
            let finish_run = |outcome: &PhaseOutcome| {
                let is_b_opt = test_id.has_opt(|o| matches!(o, Opt::BuildOnly));
                if !outcome.passed {
                    state.complete(&test, Status::Fail).expect("complete() invariant");
                    return;
                }
                if is_b_opt {
                    let _ = record_status(&case_dir, PhaseId::Run, outcome);
                }
                if is_b_opt || no_batch {
                    state.complete(&test, Status::Pass).expect("complete() invariant");
                }
            };

            if phase == PhaseId::Run {
                finish_run(&outcome);
            } else {
                let status = if outcome.passed { Status::Pass } else { Status::Fail };
                state.complete(&test, status).expect("complete() invariant");
            }

            // §4.9: MODEL_BUILD success chains synchronously into RUN in the
            // same worker when batch submission is enabled and RUN is active.
            // The cost reserved by the producer at MODEL_BUILD launch covers
            // this chained RUN too; it is released only once, below.
            if phase == PhaseId::ModelBuild && outcome.passed && !no_batch && !no_run {
                if let Some(run_phase) = table.next(PhaseId::ModelBuild) {
                    state
                        .advance(&test, run_phase, &table)
                        .expect("advance() invariant");
                    let run_outcome = ctx.run_submit(&case_dir, &test_id, &submit_extra);
                    finish_run(&run_outcome);
                }
            }

            let _ = tx.send(WorkerDone {
                test,
                cost,
                was_sharedlib_build: is_sharedlib_build,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testdrive_runner::test_support::MockRunner;
    use testdrive_runner::ProcessOutput;

    fn always_pass_runner() -> Arc<dyn ProcessRunner> {
        Arc::new(MockRunner {
            output: ProcessOutput::new(vec![], vec![], Some(0), false),
        })
    }

    fn basic_config() -> Config {
        testdrive_config::resolve(
            &testdrive_config::CliOverrides {
                worker_slots: Some(2),
                core_budget: Some(8),
                ..Default::default()
            },
            None,
            &testdrive_config::EnvConfig::default(),
        )
    }

    #[test]
    fn single_test_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let tests = vec!["SMS.f09_g16.X".to_string()];
        let table = PhaseTable::full();
        let registry = BuildGroupRegistry::no_sharing(&tests);
        let layout = TestDirectoryLayout::new(dir.path());
        let scheduler = Scheduler::new(
            tests,
            table,
            registry,
            layout,
            basic_config(),
            always_pass_runner(),
            Duration::from_secs(5),
            Arc::new(|_| 4),
        )
        .unwrap();

        let ok = scheduler.run().unwrap();
        assert!(ok);
    }

    #[test]
    fn two_tests_share_worker_slots_without_violating_arbiter_invariants() {
        let dir = tempfile::tempdir().unwrap();
        let tests = vec!["SMS.f09_g16.X".to_string(), "ERS.f09_g16.X".to_string()];
        let table = PhaseTable::full();
        let registry = BuildGroupRegistry::no_sharing(&tests);
        let layout = TestDirectoryLayout::new(dir.path());
        let scheduler = Scheduler::new(
            tests,
            table,
            registry,
            layout,
            basic_config(),
            always_pass_runner(),
            Duration::from_secs(5),
            Arc::new(|_| 2),
        )
        .unwrap();

        let ok = scheduler.run().unwrap();
        assert!(ok);
    }
}
