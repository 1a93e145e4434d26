use testdrive_error::StatusError;
use testdrive_types::{PhaseId, Status};

/// One line of a `TestStatus.log` file: `PHASE STATUS [comment...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub phase: PhaseId,
    pub status: Status,
    pub comment: Option<String>,
}

impl StatusRecord {
    pub fn new(phase: PhaseId, status: Status, comment: Option<String>) -> Self {
        Self {
            phase,
            status,
            comment,
        }
    }

    pub fn to_line(&self) -> String {
        match &self.comment {
            Some(c) => format!("{} {} {}", self.phase, self.status, c),
            None => format!("{} {}", self.phase, self.status),
        }
    }

    pub fn parse_line(path: &str, line: &str) -> Result<Option<StatusRecord>, StatusError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let mut parts = line.splitn(3, ' ');
        let phase_str = parts.next().ok_or_else(|| StatusError::MalformedRecord {
            path: path.to_string(),
            line: line.to_string(),
        })?;
        let status_str = parts.next().ok_or_else(|| StatusError::MalformedRecord {
            path: path.to_string(),
            line: line.to_string(),
        })?;
        let comment = parts.next().map(|s| s.to_string());

        let phase = parse_phase(phase_str).ok_or_else(|| StatusError::MalformedRecord {
            path: path.to_string(),
            line: line.to_string(),
        })?;
        let status = parse_status(status_str).ok_or_else(|| StatusError::MalformedRecord {
            path: path.to_string(),
            line: line.to_string(),
        })?;

        Ok(Some(StatusRecord::new(phase, status, comment)))
    }
}

fn parse_phase(s: &str) -> Option<PhaseId> {
    match s {
        "INIT" => Some(PhaseId::Init),
        "CREATE_NEWCASE" => Some(PhaseId::CreateNewcase),
        "XML" => Some(PhaseId::Xml),
        "SETUP" => Some(PhaseId::Setup),
        "SHAREDLIB_BUILD" => Some(PhaseId::SharedlibBuild),
        "MODEL_BUILD" => Some(PhaseId::ModelBuild),
        "RUN" | "SUBMIT" => Some(PhaseId::Run),
        _ => None,
    }
}

fn parse_status(s: &str) -> Option<Status> {
    match s {
        "PASS" => Some(Status::Pass),
        "PEND" => Some(Status::Pend),
        "FAIL" => Some(Status::Fail),
        "RERUN" => Some(Status::Rerun),
        _ => None,
    }
}
