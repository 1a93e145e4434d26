//! Binary-facing glue: CLI parsing, configuration assembly, and dispatch
//! into the scheduler crate. The scheduler itself knows nothing about
//! `clap` or process exit codes — that boundary lives here.

pub mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use testdrive_config::{
    discover_config_file, load_file_config, resolve, CliOverrides, EnvConfig,
};
use testdrive_error::{ExitCode, SchedulerError};
use testdrive_resource::BuildGroupRegistry;
use testdrive_runner::{CreateNewcaseExtra, NativeRunner, SubmitExtra};
use testdrive_scheduler::{Scheduler, SetupController};
use testdrive_types::{PhasePruning, PhaseTable, Status, TestDirectoryLayout, TestId};

use cli::{Cli, Command, GlobalFlags, ResumeArgs, RunArgs, StatusArgs};

const STATUS_PAGE_SCAFFOLD: &str = "#!/bin/sh\n# generated by testdrive; see TestStatus.log for detail\n";
const TESTREPORTER_TEMPLATE: &str = "#!/bin/sh\n# generated by testdrive; reports TestStatus.log entries upstream\n";

/// Entry point shared by `main.rs`: parse flags into a `Config`, build the
/// scheduler, drive it, and translate the result into an exit code.
pub fn dispatch(cli: Cli) -> Result<ExitCode, SchedulerError> {
    match cli.command {
        Command::Run(args) => run(args, false),
        Command::Resume(ResumeArgs {
            tests,
            force_rebuild,
            flags,
        }) => run_resumable(tests, flags, true, force_rebuild),
        Command::Status(args) => print_status(args),
    }
}

fn run(args: RunArgs, use_existing: bool) -> Result<ExitCode, SchedulerError> {
    run_resumable(args.tests, args.flags, use_existing, false)
}

fn run_resumable(
    tests: Vec<String>,
    flags: GlobalFlags,
    use_existing: bool,
    force_rebuild: bool,
) -> Result<ExitCode, SchedulerError> {
    let tests = apply_forced_procs(tests, &flags)?;

    let config_path = discover_config_file();
    let file_config = config_path
        .as_deref()
        .map(load_file_config)
        .transpose()
        .map_err(SchedulerError::from)?;
    let env_config = EnvConfig::from_process_env();
    let cli_overrides = overrides_from_flags(&flags);
    let config = resolve(&cli_overrides, file_config.as_ref(), &env_config);

    let pruning = PhasePruning {
        no_setup: flags.no_setup,
        no_build: flags.no_build,
        no_run: flags.no_run,
        namelists_only: flags.namelists_only,
    };
    let table = PhaseTable::new(pruning);

    let registry = if config.single_exe {
        BuildGroupRegistry::single_exe(&tests)
    } else if config.share_exes {
        BuildGroupRegistry::share_exe(&tests, build_descriptor)
    } else {
        BuildGroupRegistry::no_sharing(&tests)
    };

    let test_root: PathBuf = config
        .output_root
        .clone()
        .unwrap_or_else(|| config.test_root.clone());
    let layout = TestDirectoryLayout::new(test_root.clone());

    if config.use_testreporter_template {
        SetupController::write_testreporter_template(&test_root, TESTREPORTER_TEMPLATE)
            .map_err(|e| SchedulerError::Invariant(e.to_string()))?;
    }
    for test in &tests {
        SetupController::write_status_page_scaffold(&test_root, test, STATUS_PAGE_SCAFFOLD)
            .map_err(|e| SchedulerError::Invariant(e.to_string()))?;
    }

    let test_ids: std::collections::HashMap<String, TestId> = tests
        .iter()
        .map(|t| TestId::parse(t).map(|id| (t.clone(), id)))
        .collect::<Result<_, _>>()?;

    let totalpes_lookup: std::collections::HashMap<String, u32> = test_ids
        .iter()
        .map(|(name, id)| {
            let pes = id.procs_opt().map(|(p, _)| p).unwrap_or(config.machine_max_tasks_per_node);
            (name.clone(), pes)
        })
        .collect();
    let totalpes = Arc::new(move |name: &str| {
        totalpes_lookup.get(name).copied().unwrap_or(1)
    });

    let worker_slots = config.worker_slots.min(tests.len() as u32).max(1);
    let mut scoped_config = config.clone();
    scoped_config.worker_slots = worker_slots;

    let timeout = Duration::from_secs(scoped_config.phase_timeout_seconds);
    let create_newcase_extra = CreateNewcaseExtra {
        queue: flags.queue.clone(),
        walltime: flags.walltime.clone(),
        project: scoped_config.project.clone(),
        output_root: scoped_config
            .output_root
            .as_ref()
            .map(|p| p.display().to_string()),
        ..Default::default()
    };
    let submit_extra = SubmitExtra {
        allow_preview_namelist: scoped_config.single_exe,
        force_no_batch: scoped_config.no_batch,
        ..Default::default()
    };

    let mut scheduler = Scheduler::new(
        tests.clone(),
        table.clone(),
        registry,
        layout.clone(),
        scoped_config,
        Arc::new(NativeRunner),
        timeout,
        totalpes,
    )?
    .with_phase_extras(create_newcase_extra, submit_extra);

    if use_existing {
        let mut resumed = std::collections::HashMap::with_capacity(tests.len());
        for test in &tests {
            let test_id = &test_ids[test];
            let case_dir = layout.test_dir(test_id, false, false);
            let state = testdrive_status::resume(&case_dir, &table, force_rebuild)
                .map_err(|e| SchedulerError::Invariant(e.to_string()))?;
            let status = if state.status == Status::Rerun {
                Status::Pend
            } else {
                state.status
            };
            resumed.insert(test.clone(), (state.phase, status));
        }
        scheduler = scheduler.with_resumed_state(resumed);
    }

    let all_passed = scheduler.run()?;
    Ok(if all_passed {
        ExitCode::Success
    } else {
        ExitCode::PartialTestFailure
    })
}

fn print_status(args: StatusArgs) -> Result<ExitCode, SchedulerError> {
    let layout = TestDirectoryLayout::new(args.test_root);
    let test_id = TestId::parse(&args.test_id)?;
    let case_dir = layout.test_dir(&test_id, false, false);
    let records =
        testdrive_status::StatusStore::read(&case_dir).map_err(|e| SchedulerError::Invariant(e.to_string()))?;
    if records.is_empty() {
        println!("{}: no recorded status", args.test_id);
        return Ok(ExitCode::Success);
    }
    for record in &records {
        match &record.comment {
            Some(c) => println!("{:<16} {:<6} {}", record.phase, record.status, c),
            None => println!("{:<16} {:<6}", record.phase, record.status),
        }
    }
    Ok(ExitCode::Success)
}

/// `force_procs`/`force_threads` rewrite each test name's `P` opt before
/// anything else sees it (§6, §8 S3): `ERS.f09.A` + `force_procs=16` becomes
/// `ERS_P16.f09.A`.
fn apply_forced_procs(tests: Vec<String>, flags: &GlobalFlags) -> Result<Vec<String>, SchedulerError> {
    let Some(procs) = flags.force_procs else {
        return Ok(tests);
    };
    tests
        .into_iter()
        .map(|t| {
            let id = TestId::parse(&t)?;
            Ok(id.with_forced_procs(procs, flags.force_threads).to_string())
        })
        .collect()
}

fn overrides_from_flags(flags: &GlobalFlags) -> CliOverrides {
    CliOverrides {
        worker_slots: flags.parallel_jobs,
        core_budget: flags.proc_pool,
        single_exe: Some(flags.single_exe).filter(|v| *v),
        share_exes: Some(flags.share_exes).filter(|v| *v),
        no_batch: Some(flags.no_batch).filter(|v| *v),
        test_root: flags.test_root.clone(),
        output_root: flags.output_root.clone(),
        project: flags.project.clone(),
        ..Default::default()
    }
}

/// Equivalence key for `share_exes` grouping: tests with identical
/// grid/compset/machine/compiler/mods can share a build (§3).
fn build_descriptor(test: &str) -> String {
    match TestId::parse(test) {
        Ok(id) => format!(
            "{}|{}|{}|{}|{}",
            id.grid,
            id.compset,
            id.machine.unwrap_or_default(),
            id.compiler.unwrap_or_default(),
            id.mods.unwrap_or_default()
        ),
        Err(_) => test.to_string(),
    }
}
