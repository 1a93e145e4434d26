use std::fs;
use std::io::Write;
use std::path::Path;

use testdrive_error::SchedulerError;

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), SchedulerError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)
        .map_err(|e| io_err(path, e))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), SchedulerError> {
    Ok(())
}

fn io_err(path: &Path, e: std::io::Error) -> SchedulerError {
    SchedulerError::Invariant(format!("io error at {}: {e}", path.display()))
}

/// One-time scaffold creation performed before the producer loop starts:
/// the status-page submit script and, optionally, a `testreporter`
/// wrapper, both written 0755 at `test_root` (§6).
pub struct SetupController;

impl SetupController {
    pub fn write_status_page_scaffold(
        test_root: &Path,
        test_id: &str,
        contents: &str,
    ) -> Result<(), SchedulerError> {
        fs::create_dir_all(test_root).map_err(|e| io_err(test_root, e))?;
        let path = test_root.join(format!("cs.submit.{test_id}"));
        let mut file = fs::File::create(&path).map_err(|e| io_err(&path, e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| io_err(&path, e))?;
        make_executable(&path)?;
        Ok(())
    }

    pub fn write_testreporter_template(
        test_root: &Path,
        contents: &str,
    ) -> Result<(), SchedulerError> {
        fs::create_dir_all(test_root).map_err(|e| io_err(test_root, e))?;
        let path = test_root.join("testreporter");
        let mut file = fs::File::create(&path).map_err(|e| io_err(&path, e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| io_err(&path, e))?;
        make_executable(&path)?;
        Ok(())
    }

    /// Append the "Case Created using ..." line to `README.case`, written
    /// once at `XML` completion (§4.9).
    pub fn append_readme_case_created(case_dir: &Path, command_line: &str) -> Result<(), SchedulerError> {
        let path = case_dir.join("README.case");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        writeln!(file, "Case Created using {command_line}").map_err(|e| io_err(&path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_status_page_scaffold() {
        let dir = tempdir().unwrap();
        SetupController::write_status_page_scaffold(dir.path(), "GRID.X", "#!/bin/sh\n").unwrap();
        let path = dir.path().join("cs.submit.GRID.X");
        assert!(path.exists());
    }

    #[test]
    fn appends_readme_case_created_line() {
        let dir = tempdir().unwrap();
        SetupController::append_readme_case_created(dir.path(), "create_newcase.py ...").unwrap();
        let contents = fs::read_to_string(dir.path().join("README.case")).unwrap();
        assert!(contents.contains("Case Created using create_newcase.py ..."));
    }

    #[test]
    fn readme_case_created_appends_rather_than_truncates() {
        let dir = tempdir().unwrap();
        SetupController::append_readme_case_created(dir.path(), "first").unwrap();
        SetupController::append_readme_case_created(dir.path(), "second").unwrap();
        let contents = fs::read_to_string(dir.path().join("README.case")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
