//! Integration coverage for the boundary between `testdrive-status` and
//! `testdrive-scheduler`: a scheduler seeded with `TestState::from_resumed`
//! must pick up exactly where a prior run's `TestStatus.log` left off rather
//! than restarting a test from `CREATE_NEWCASE`.

use std::sync::Arc;
use std::time::Duration;

use testdrive_resource::BuildGroupRegistry;
use testdrive_runner::test_support::MockRunner;
use testdrive_runner::ProcessOutput;
use testdrive_scheduler::Scheduler;
use testdrive_status::{resume, StatusStore};
use testdrive_types::{PhaseId, PhaseTable, Status, TestDirectoryLayout, TestId};

fn always_pass_runner() -> Arc<dyn testdrive_runner::ProcessRunner> {
    Arc::new(MockRunner {
        output: ProcessOutput::new(vec![], vec![], Some(0), false),
    })
}

fn basic_config() -> testdrive_config::Config {
    testdrive_config::resolve(
        &testdrive_config::CliOverrides {
            worker_slots: Some(1),
            core_budget: Some(8),
            ..Default::default()
        },
        None,
        &testdrive_config::EnvConfig::default(),
    )
}

#[test]
fn resumed_scheduler_skips_already_passed_phases() {
    let dir = tempfile::tempdir().unwrap();
    let test_name = "SMS.f09_g16.X".to_string();
    let table = PhaseTable::full();
    let layout = TestDirectoryLayout::new(dir.path());
    let test_id = TestId::parse(&test_name).unwrap();
    let case_dir = layout.test_dir(&test_id, false, false);

    // Pretend a prior run got through SETUP before being interrupted.
    StatusStore::write(&case_dir, PhaseId::CreateNewcase, Status::Pass, None).unwrap();
    StatusStore::write(&case_dir, PhaseId::Xml, Status::Pass, None).unwrap();
    StatusStore::write(&case_dir, PhaseId::Setup, Status::Pass, None).unwrap();

    let resumed_state = resume(&case_dir, &table, false).unwrap();
    assert_eq!(resumed_state.phase, PhaseId::SharedlibBuild);
    assert_eq!(resumed_state.status, Status::Pend);

    let tests = vec![test_name.clone()];
    let registry = BuildGroupRegistry::no_sharing(&tests);
    let mut resumed = std::collections::HashMap::new();
    resumed.insert(
        test_name.clone(),
        (resumed_state.phase, Status::Pend),
    );

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
    .unwrap()
    .with_resumed_state(resumed);

    let ok = scheduler.run().unwrap();
    assert!(ok);

    let records = StatusStore::read(&case_dir).unwrap();
    // CREATE_NEWCASE/XML/SETUP were never re-run: still exactly one record each.
    let create_newcase_records = records
        .iter()
        .filter(|r| r.phase == PhaseId::CreateNewcase)
        .count();
    assert_eq!(create_newcase_records, 1);
}
