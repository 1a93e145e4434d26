//! End-to-end coverage for the `status` subcommand: parses real argv,
//! dispatches through the library crate, and reads back a `TestStatus.log`
//! written ahead of time, without touching any test directory logic beyond
//! `StatusStore`.

use clap::Parser;

use testdrive::cli::Cli;
use testdrive_status::StatusStore;
use testdrive_types::{PhaseId, Status, TestDirectoryLayout, TestId};

#[test]
fn status_subcommand_reports_success_for_recorded_test() {
    let dir = tempfile::tempdir().unwrap();
    let layout = TestDirectoryLayout::new(dir.path());
    let test_id = TestId::parse("SMS.f09_g16.X").unwrap();
    let case_dir = layout.test_dir(&test_id, false, false);

    StatusStore::write(&case_dir, PhaseId::CreateNewcase, Status::Pass, None).unwrap();
    StatusStore::write(&case_dir, PhaseId::Xml, Status::Fail, Some("bad grid")).unwrap();

    let cli = Cli::parse_from([
        "testdrive",
        "status",
        dir.path().to_str().unwrap(),
        "SMS.f09_g16.X",
    ]);
    let code = testdrive::dispatch(cli).unwrap();
    assert_eq!(code.code(), 0);
}

#[test]
fn status_subcommand_on_never_run_test_reports_success_without_panicking() {
    let dir = tempfile::tempdir().unwrap();
    let cli = Cli::parse_from([
        "testdrive",
        "status",
        dir.path().to_str().unwrap(),
        "SMS.f09_g16.X",
    ]);
    let code = testdrive::dispatch(cli).unwrap();
    assert_eq!(code.code(), 0);
}

#[test]
fn run_subcommand_requires_at_least_one_test_name() {
    let result = Cli::try_parse_from(["testdrive", "run"]);
    assert!(result.is_err());
}
