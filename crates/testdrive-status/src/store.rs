use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use testdrive_error::StatusError;
use testdrive_types::{PhaseId, Status};

use crate::record::StatusRecord;

const STATUS_FILE_NAME: &str = "TestStatus.log";

/// Durable, append-only record of phase outcomes for a single test
/// directory, matching the `TestStatus` file convention this tool's
/// originating implementation uses. Treated as append-only text, never as a
/// database — readers reconstruct state by replaying the log.
#[derive(Debug, Clone)]
pub struct StatusStore;

impl StatusStore {
    fn log_path(test_dir: &Path) -> PathBuf {
        test_dir.join(STATUS_FILE_NAME)
    }

    /// Read every record currently on disk for `test_dir`, in file order.
    /// A missing log is treated as an empty history, not an error — a test
    /// directory that has never recorded a scheduler-owned transition is
    /// the common case for a brand-new test.
    pub fn read(test_dir: &Path) -> Result<Vec<StatusRecord>, StatusError> {
        let path = Self::log_path(test_dir);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StatusError::Open {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let mut records = Vec::new();
        for line in contents.lines() {
            if let Some(record) = StatusRecord::parse_line(&path.display().to_string(), line)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Append one record. Called by the scheduler only for the four
    /// scheduler-owned transitions named in the component design:
    /// `CREATE_NEWCASE`, `XML`, and — for followers only — `SHAREDLIB_BUILD`
    /// and `MODEL_BUILD`. All other phases manage their own status from
    /// within the external command they invoke.
    pub fn write(
        test_dir: &Path,
        phase: PhaseId,
        status: Status,
        comment: Option<&str>,
    ) -> Result<(), StatusError> {
        let path = Self::log_path(test_dir);
        let record = StatusRecord::new(phase, status, comment.map(|s| s.to_string()));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StatusError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        writeln!(file, "{}", record.to_line()).map_err(|e| StatusError::Append {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_of_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        let records = StatusStore::read(dir.path()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        StatusStore::write(dir.path(), PhaseId::CreateNewcase, Status::Pass, None).unwrap();
        StatusStore::write(
            dir.path(),
            PhaseId::Xml,
            Status::Fail,
            Some("bad grid"),
        )
        .unwrap();

        let records = StatusStore::read(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].phase, PhaseId::CreateNewcase);
        assert_eq!(records[0].status, Status::Pass);
        assert_eq!(records[1].phase, PhaseId::Xml);
        assert_eq!(records[1].status, Status::Fail);
        assert_eq!(records[1].comment.as_deref(), Some("bad grid"));
    }

    #[test]
    fn writes_append_rather_than_truncate() {
        let dir = tempdir().unwrap();
        StatusStore::write(dir.path(), PhaseId::CreateNewcase, Status::Pass, None).unwrap();
        StatusStore::write(dir.path(), PhaseId::Xml, Status::Pass, None).unwrap();
        assert_eq!(StatusStore::read(dir.path()).unwrap().len(), 2);
    }
}
