use std::path::Path;
use std::time::Duration;

use testdrive_error::RunnerError;
use testdrive_runner::{CommandSpec, ProcessRunner};
use testdrive_types::{Opt, TestId};

/// One `./xmlchange KEY=VALUE` edit derived from a test's `opts` (§4.6 XML).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlChange {
    pub key: String,
    pub value: String,
}

impl XmlChange {
    fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Translate a test's `opts` into the `env_test`/`env_run` edits the XML
/// phase applies. `D`/`E`/`CG`/`L`/`R`/`A` affect run parameters directly;
/// the remaining opts (`P`, `N`, `C`, `M`, `V`, `B`) were already consumed
/// at `CREATE_NEWCASE` and are not re-applied here.
pub fn xml_changes_for_opts(test: &TestId) -> Vec<XmlChange> {
    let mut changes = Vec::new();
    for opt in &test.opts {
        match opt {
            Opt::Debug => changes.push(XmlChange::new("DEBUG", "TRUE")),
            Opt::Esmf => changes.push(XmlChange::new("COMP_INTERFACE", "ESMF")),
            Opt::GregorianCalendar => changes.push(XmlChange::new("CALENDAR", "GREGORIAN")),
            Opt::StopOption { unit, n } => {
                changes.push(XmlChange::new("STOP_OPTION", unit_name(*unit)));
                changes.push(XmlChange::new("STOP_N", n.to_string()));
            }
            Opt::SinglePoint => {
                changes.push(XmlChange::new("NTASKS", "1"));
                changes.push(XmlChange::new("NTHRDS", "1"));
                changes.push(XmlChange::new("PIO_TYPENAME", "netcdf"));
            }
            Opt::AsyncIo { cpl, stride } => {
                changes.push(XmlChange::new("PIO_ASYNC_INTERVAL", cpl.to_string()));
                if let Some(stride) = stride {
                    changes.push(XmlChange::new("PIO_ASYNC_STRIDE", stride.to_string()));
                }
                changes.push(XmlChange::new("PIO_VERSION", "2"));
            }
            _ => {}
        }
    }
    changes
}

fn unit_name(unit: char) -> &'static str {
    match unit {
        'n' => "nsteps",
        'd' => "ndays",
        'm' => "nmonths",
        'y' => "nyears",
        'h' => "nhours",
        's' => "nseconds",
        _ => "nsteps",
    }
}

/// `A<n>[x<m>]` is only valid under the `nuopc` driver (§4.6).
pub fn async_io_requires_nuopc(test: &TestId) -> bool {
    let has_async = test.has_opt(|o| matches!(o, Opt::AsyncIo { .. }));
    has_async && test.driver_opt() != Some("nuopc")
}

fn build_xmlchange(case_dir: &Path, change: &XmlChange) -> CommandSpec {
    CommandSpec::new("./xmlchange")
        .arg(format!("{}={}", change.key, change.value))
        .cwd(case_dir)
}

fn build_xmlquery(case_dir: &Path, key: &str) -> CommandSpec {
    CommandSpec::new("./xmlquery")
        .arg(key)
        .arg("--value")
        .cwd(case_dir)
}

/// Apply every XML change for `test` by invoking `./xmlchange` once per edit.
pub fn apply_xml_changes(
    runner: &dyn ProcessRunner,
    case_dir: &Path,
    test: &TestId,
    timeout: Duration,
) -> Result<(), RunnerError> {
    for change in xml_changes_for_opts(test) {
        let output = runner.run(&build_xmlchange(case_dir, &change), timeout)?;
        if !output.success() {
            return Err(RunnerError::NonZeroExit {
                program: format!("xmlchange {}={}", change.key, change.value),
                code: output.exit_code.unwrap_or(-1),
            });
        }
    }
    Ok(())
}

/// Apply a single arbitrary `./xmlchange KEY=VALUE` edit, for settings
/// derived from something other than an `opts` code (e.g. `SAVE_TIMING`
/// for performance-class tests).
pub fn apply_xml_change(
    runner: &dyn ProcessRunner,
    case_dir: &Path,
    change: &XmlChange,
    timeout: Duration,
) -> Result<(), RunnerError> {
    let output = runner.run(&build_xmlchange(case_dir, change), timeout)?;
    if !output.success() {
        return Err(RunnerError::NonZeroExit {
            program: format!("xmlchange {}={}", change.key, change.value),
            code: output.exit_code.unwrap_or(-1),
        });
    }
    Ok(())
}

/// Read `EXEROOT` from the case, the value a leader records into the
/// `BuildGroupRegistry` and a follower later overwrites its own case with.
pub fn read_exeroot(
    runner: &dyn ProcessRunner,
    case_dir: &Path,
    timeout: Duration,
) -> Result<String, RunnerError> {
    let output = runner.run(&build_xmlquery(case_dir, "EXEROOT"), timeout)?;
    if !output.success() {
        return Err(RunnerError::NonZeroExit {
            program: "xmlquery EXEROOT".to_string(),
            code: output.exit_code.unwrap_or(-1),
        });
    }
    Ok(output.stdout_string().trim().to_string())
}

/// Overwrite a follower's `EXEROOT` with the leader's, so both cases share
/// the one compiled executable.
pub fn write_exeroot(
    runner: &dyn ProcessRunner,
    case_dir: &Path,
    exeroot: &str,
    timeout: Duration,
) -> Result<(), RunnerError> {
    let change = XmlChange::new("EXEROOT", exeroot);
    let output = runner.run(&build_xmlchange(case_dir, &change), timeout)?;
    if !output.success() {
        return Err(RunnerError::NonZeroExit {
            program: "xmlchange EXEROOT".to_string(),
            code: output.exit_code.unwrap_or(-1),
        });
    }
    Ok(())
}

/// Lock `env_run.xml` by copying it aside under a `.orig.xml` name, so
/// later phases can detect out-of-band edits.
pub fn lock_env_run(runner: &dyn ProcessRunner, case_dir: &Path, timeout: Duration) -> Result<(), RunnerError> {
    let spec = CommandSpec::new("cp")
        .arg("env_run.xml")
        .arg("env_run.orig.xml")
        .cwd(case_dir);
    let output = runner.run(&spec, timeout)?;
    if !output.success() {
        return Err(RunnerError::NonZeroExit {
            program: "cp env_run.xml env_run.orig.xml".to_string(),
            code: output.exit_code.unwrap_or(-1),
        });
    }
    Ok(())
}

/// Performance-class tests (case name prefixed `PFS`) receive
/// `SAVE_TIMING=TRUE` at XML time.
pub fn is_performance_class(test: &TestId) -> bool {
    test.case.starts_with("PFS")
}
