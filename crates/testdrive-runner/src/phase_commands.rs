use std::path::Path;

use testdrive_types::TestId;

use crate::command_spec::CommandSpec;

/// Flags for `CREATE_NEWCASE` that are not derivable from the test id
/// itself — configuration- or policy-level inputs resolved by the caller
/// (walltime precedence, queue overrides, baseline paths, etc).
#[derive(Debug, Clone, Default)]
pub struct CreateNewcaseExtra {
    pub queue: Option<String>,
    pub walltime: Option<String>,
    pub user_mods_dir: Option<String>,
    pub project: Option<String>,
    pub output_root: Option<String>,
    pub input_dir: Option<String>,
    pub non_local: bool,
    pub workflow: Option<String>,
    pub srcroot: Option<String>,
}

/// Build the `create_newcase.py` invocation for `test` into `case_dir`
/// (§4.6). `N`/`C` mutual exclusion and the `nuopc` driver restriction are
/// already enforced at `TestId` construction, so this function only needs
/// to translate whichever opt is present.
pub fn build_create_newcase(case_dir: &Path, test: &TestId, extra: &CreateNewcaseExtra) -> CommandSpec {
    let mut spec = CommandSpec::new("create_newcase.py")
        .arg("--case")
        .arg(case_dir.as_os_str())
        .arg("--res")
        .arg(test.grid.clone())
        .arg("--compset")
        .arg(test.compset.clone())
        .arg("--test");

    if let Some(mpilib) = test.mpilib_opt() {
        spec = spec.arg("--mpilib").arg(mpilib.to_string());
    }
    if let Some(n) = test.opts.iter().find_map(|o| match o {
        testdrive_types::Opt::Ninst(n) => Some(*n),
        _ => None,
    }) {
        spec = spec.arg("--ninst").arg(n.to_string());
        if n > 1 {
            spec = spec.arg("--multi-driver");
        }
    }
    if let Some((procs, threads)) = test.procs_opt() {
        let pecount = match threads {
            Some(t) => format!("{procs}x{t}"),
            None => procs.to_string(),
        };
        spec = spec.arg("--pecount").arg(pecount);
    }
    if let Some(driver) = test.driver_opt() {
        spec = spec.arg("--driver").arg(driver.to_string());
    }
    if let Some(machine) = &test.machine {
        spec = spec.arg("--machine").arg(machine.clone());
    }
    if let Some(compiler) = &test.compiler {
        spec = spec.arg("--compiler").arg(compiler.clone());
    }

    if let Some(queue) = &extra.queue {
        spec = spec.arg("--queue").arg(queue.clone());
    }
    if let Some(walltime) = &extra.walltime {
        spec = spec.arg("--walltime").arg(walltime.clone());
    }
    if let Some(mods) = &extra.user_mods_dir {
        spec = spec.arg("--user-mods-dir").arg(mods.clone());
    }
    if let Some(project) = &extra.project {
        spec = spec.arg("--project").arg(project.clone());
    }
    if let Some(output_root) = &extra.output_root {
        spec = spec.arg("--output-root").arg(output_root.clone());
    }
    if let Some(input_dir) = &extra.input_dir {
        spec = spec.arg("--input-dir").arg(input_dir.clone());
    }
    if extra.non_local {
        spec = spec.arg("--non-local");
    }
    if let Some(workflow) = &extra.workflow {
        spec = spec.arg("--workflow").arg(workflow.clone());
    }
    if let Some(srcroot) = &extra.srcroot {
        spec = spec.arg("--srcroot").arg(srcroot.clone());
    }

    spec = spec.env("FROM_CREATE_TEST", "True");
    spec
}

pub fn build_case_setup(case_dir: &Path) -> CommandSpec {
    CommandSpec::new("./case.setup").cwd(case_dir)
}

pub fn build_cmpgen_namelists(case_dir: &Path) -> CommandSpec {
    CommandSpec::new("./case.cmpgen_namelists").cwd(case_dir)
}

pub fn build_sharedlib_build(case_dir: &Path) -> CommandSpec {
    CommandSpec::new("./case.build").arg("--sharedlib-only").cwd(case_dir)
}

pub fn build_model_build(case_dir: &Path) -> CommandSpec {
    CommandSpec::new("./case.build").arg("--model-only").cwd(case_dir)
}

/// Flags for `case.submit` derived from configuration (§4.6, §6).
#[derive(Debug, Clone, Default)]
pub struct SubmitExtra {
    pub allow_preview_namelist: bool,
    pub force_no_batch: bool,
    pub mail_user: Option<String>,
    pub chksum: bool,
}

pub fn build_submit(case_dir: &Path, extra: &SubmitExtra) -> CommandSpec {
    let mut spec = CommandSpec::new("./case.submit").cwd(case_dir);
    if !extra.allow_preview_namelist {
        spec = spec.arg("--skip-preview-namelist");
    }
    if extra.force_no_batch {
        spec = spec.arg("--no-batch");
    }
    if let Some(mail_user) = &extra.mail_user {
        spec = spec.arg("--mail-user").arg(mail_user.clone());
    }
    if extra.chksum {
        spec = spec.arg("--chksum");
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use testdrive_types::TestId;

    #[test]
    fn create_newcase_translates_procs_and_mpilib() {
        let test = TestId::parse("ERS_P16x2_Mmpi-serial.f09_g16.X").unwrap();
        let spec = build_create_newcase(&PathBuf::from("/tests/ERS"), &test, &CreateNewcaseExtra::default());
        let args: Vec<String> = spec
            .args_slice()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"--pecount".to_string()));
        assert!(args.contains(&"16x2".to_string()));
        assert!(args.contains(&"--mpilib".to_string()));
        assert!(args.contains(&"mpi-serial".to_string()));
    }

    #[test]
    fn create_newcase_adds_multi_driver_for_ninst_above_one() {
        let test = TestId::parse("ERS_N4.f09_g16.X").unwrap();
        let spec = build_create_newcase(&PathBuf::from("/tests/ERS"), &test, &CreateNewcaseExtra::default());
        let args: Vec<String> = spec
            .args_slice()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"--multi-driver".to_string()));
    }

    #[test]
    fn submit_defaults_to_skip_preview_namelist() {
        let spec = build_submit(&PathBuf::from("/tests/ERS"), &SubmitExtra::default());
        let args: Vec<String> = spec
            .args_slice()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"--skip-preview-namelist".to_string()));
    }

    #[test]
    fn submit_allows_preview_namelist_when_configured() {
        let extra = SubmitExtra {
            allow_preview_namelist: true,
            ..Default::default()
        };
        let spec = build_submit(&PathBuf::from("/tests/ERS"), &extra);
        let args: Vec<String> = spec
            .args_slice()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(!args.contains(&"--skip-preview-namelist".to_string()));
    }
}
