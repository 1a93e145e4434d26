use std::collections::HashMap;
use std::path::Path;

use testdrive_error::StatusError;
use testdrive_types::{PhaseId, PhaseTable, Status};

use crate::record::StatusRecord;
use crate::store::StatusStore;

/// The `(phase, status)` a resumed test should start from, derived by
/// replaying its `StatusStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumedState {
    pub phase: PhaseId,
    pub status: Status,
    pub comment: Option<String>,
}

/// Replay the on-disk status log for `test_dir` against `table` to derive
/// the `(currentPhase, currentStatus)` a resumed scheduler run should start
/// from (§4.3). `force_rebuild` pre-marks `SHAREDLIB_BUILD` as `PEND` before
/// the replay, so a previously-`PASS`ed build is retried even though its
/// on-disk record still says `PASS`.
pub fn resume(
    test_dir: &Path,
    table: &PhaseTable,
    force_rebuild: bool,
) -> Result<ResumedState, StatusError> {
    let records = StatusStore::read(test_dir)?;
    let mut latest: HashMap<PhaseId, StatusRecord> = HashMap::new();
    for record in records {
        latest.insert(record.phase, record);
    }

    if force_rebuild {
        latest.insert(
            PhaseId::SharedlibBuild,
            StatusRecord::new(PhaseId::SharedlibBuild, Status::Pend, None),
        );
    }

    let phases = table.phases();
    let mut last_pass: Option<PhaseId> = None;

    for (idx, &phase) in phases.iter().enumerate() {
        match latest.get(&phase) {
            None => {
                // No record for this phase: it has never started. If a
                // prior phase PASSed, this is exactly where work resumes;
                // if this is the very first phase, the test is fresh.
                return Ok(ResumedState {
                    phase,
                    status: Status::Pend,
                    comment: None,
                });
            }
            Some(record) => match record.status {
                Status::Pend => {
                    return Ok(ResumedState {
                        phase,
                        status: Status::Pend,
                        comment: record.comment.clone(),
                    });
                }
                Status::Fail | Status::Rerun => {
                    return Ok(ResumedState {
                        phase,
                        status: Status::Pend,
                        comment: Some(
                            record
                                .comment
                                .clone()
                                .unwrap_or_else(|| "rerunning after prior failure".to_string()),
                        ),
                    });
                }
                Status::Pass => {
                    last_pass = Some(phase);
                    if idx + 1 == phases.len() {
                        return Ok(ResumedState {
                            phase,
                            status: Status::Pass,
                            comment: record.comment.clone(),
                        });
                    }
                    // not terminal: continue the walk to the next phase
                }
            },
        }
    }

    // Every active phase had a PASS record but the loop fell through
    // without hitting the terminal-phase return above; this only happens
    // for an empty phase table, which the scheduler never constructs.
    let phase = last_pass.unwrap_or(PhaseId::Init);
    Ok(ResumedState {
        phase,
        status: Status::Pass,
        comment: None,
    })
}
