use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of the fixed test pipeline. `Init` is a pseudo-phase marking
/// "not yet started" — it never appears in the active `PhaseTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseId {
    Init,
    CreateNewcase,
    Xml,
    Setup,
    SharedlibBuild,
    ModelBuild,
    Run,
}

impl PhaseId {
    pub const ALL: [PhaseId; 7] = [
        PhaseId::Init,
        PhaseId::CreateNewcase,
        PhaseId::Xml,
        PhaseId::Setup,
        PhaseId::SharedlibBuild,
        PhaseId::ModelBuild,
        PhaseId::Run,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseId::Init => "INIT",
            PhaseId::CreateNewcase => "CREATE_NEWCASE",
            PhaseId::Xml => "XML",
            PhaseId::Setup => "SETUP",
            PhaseId::SharedlibBuild => "SHAREDLIB_BUILD",
            PhaseId::ModelBuild => "MODEL_BUILD",
            PhaseId::Run => "RUN",
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// In-memory test status. `Rerun` is a transient marker produced while
/// replaying a `FAIL` record during resume; it is folded into `Pend` before
/// the scheduler observes it. Persisted logs may additionally carry
/// phase-specific comments alongside any of these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pass,
    Pend,
    Fail,
    Rerun,
}

impl Status {
    pub fn is_progressable(self) -> bool {
        matches!(self, Status::Pass | Status::Pend)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Pend => "PEND",
            Status::Fail => "FAIL",
            Status::Rerun => "RERUN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Construction-time flags that prune the active phase sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhasePruning {
    pub no_setup: bool,
    pub no_build: bool,
    pub no_run: bool,
    pub namelists_only: bool,
}

/// The ordered, pruned sequence of phases a scheduler run will walk.
///
/// Pruning rules (construction only, §4.1): `no_setup` drops `SETUP`;
/// `no_build` — or `no_setup`, or `namelists_only` — drops both build
/// phases; `no_run` drops `RUN`. `INIT` never appears in the active table.
#[derive(Debug, Clone)]
pub struct PhaseTable {
    phases: Vec<PhaseId>,
}

impl PhaseTable {
    pub fn new(pruning: PhasePruning) -> Self {
        let drop_build = pruning.no_build || pruning.no_setup || pruning.namelists_only;
        let mut phases = vec![PhaseId::CreateNewcase, PhaseId::Xml];
        if !pruning.no_setup {
            phases.push(PhaseId::Setup);
        }
        if !drop_build {
            phases.push(PhaseId::SharedlibBuild);
            phases.push(PhaseId::ModelBuild);
        }
        if !pruning.no_run {
            phases.push(PhaseId::Run);
        }
        Self { phases }
    }

    /// Table with every phase present; used for full runs and by tests that
    /// care about phase order rather than pruning.
    pub fn full() -> Self {
        Self::new(PhasePruning::default())
    }

    pub fn phases(&self) -> &[PhaseId] {
        &self.phases
    }

    pub fn index_of(&self, phase: PhaseId) -> Option<usize> {
        self.phases.iter().position(|&p| p == phase)
    }

    /// The phase that immediately follows `phase` in this table, or `None`
    /// if `phase` is the last active phase (or absent from the table).
    pub fn next(&self, phase: PhaseId) -> Option<PhaseId> {
        let idx = self.index_of(phase)?;
        self.phases.get(idx + 1).copied()
    }

    /// The first active phase a freshly-constructed test should run.
    pub fn first(&self) -> Option<PhaseId> {
        self.phases.first().copied()
    }

    pub fn is_terminal(&self, phase: PhaseId) -> bool {
        self.phases.last() == Some(&phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_table_has_all_non_init_phases_in_order() {
        let table = PhaseTable::full();
        assert_eq!(
            table.phases(),
            &[
                PhaseId::CreateNewcase,
                PhaseId::Xml,
                PhaseId::Setup,
                PhaseId::SharedlibBuild,
                PhaseId::ModelBuild,
                PhaseId::Run,
            ]
        );
        assert!(table.is_terminal(PhaseId::Run));
        assert!(!table.is_terminal(PhaseId::Setup));
    }

    #[test]
    fn no_setup_drops_setup_and_build() {
        let table = PhaseTable::new(PhasePruning {
            no_setup: true,
            ..Default::default()
        });
        assert_eq!(
            table.phases(),
            &[PhaseId::CreateNewcase, PhaseId::Xml, PhaseId::Run]
        );
    }

    #[test]
    fn no_build_drops_only_build_phases() {
        let table = PhaseTable::new(PhasePruning {
            no_build: true,
            ..Default::default()
        });
        assert_eq!(
            table.phases(),
            &[PhaseId::CreateNewcase, PhaseId::Xml, PhaseId::Setup, PhaseId::Run]
        );
    }

    #[test]
    fn namelists_only_implies_no_build() {
        let table = PhaseTable::new(PhasePruning {
            namelists_only: true,
            ..Default::default()
        });
        assert!(table.index_of(PhaseId::SharedlibBuild).is_none());
        assert!(table.index_of(PhaseId::ModelBuild).is_none());
    }

    #[test]
    fn next_walks_in_order_and_ends_at_none() {
        let table = PhaseTable::full();
        assert_eq!(table.next(PhaseId::CreateNewcase), Some(PhaseId::Xml));
        assert_eq!(table.next(PhaseId::Run), None);
    }
}
