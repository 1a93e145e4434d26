use std::collections::HashMap;

use testdrive_error::BuildGroupError;
use testdrive_types::PhaseId;

/// Outcome of gating a follower's launch on its leader's progress at the
/// same phase (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// The leader has not yet completed this phase; skip this iteration.
    Ineligible,
    /// The leader passed; the follower may run a short-circuit success at cost 1.
    FollowerPass,
    /// The leader failed; the follower fails the same phase with this message.
    FollowerFail(String),
}

/// A set of tests sharing one compiled executable. The first element is the
/// leader; `shared_exe` is written exactly once, by the leader's XML phase.
#[derive(Debug, Clone)]
struct BuildGroup {
    tests: Vec<String>,
    shared_exe: Option<String>,
    leader_phase_status: HashMap<PhaseId, bool>,
}

impl BuildGroup {
    fn leader(&self) -> &str {
        &self.tests[0]
    }
}

/// Partitions the test set into build groups and tracks leader/follower
/// gating and the shared-executable path (§3, §4.5).
#[derive(Debug)]
pub struct BuildGroupRegistry {
    groups: Vec<BuildGroup>,
    test_to_group: HashMap<String, usize>,
}

impl BuildGroupRegistry {
    /// Single-executable mode: one group containing every test, in order.
    pub fn single_exe(tests: &[String]) -> Self {
        Self::from_groups(vec![tests.to_vec()])
    }

    /// Share-executable mode: `descriptor` maps each test to an equivalence
    /// key; tests with equal keys land in the same group, in first-seen
    /// order. Tests with no match to any other test form singleton groups.
    pub fn share_exe(tests: &[String], descriptor: impl Fn(&str) -> String) -> Self {
        let mut order: Vec<String> = Vec::new();
        let mut by_key: HashMap<String, Vec<String>> = HashMap::new();
        for test in tests {
            let key = descriptor(test);
            if !by_key.contains_key(&key) {
                order.push(key.clone());
            }
            by_key.entry(key).or_default().push(test.clone());
        }
        let groups = order.into_iter().map(|k| by_key.remove(&k).unwrap()).collect();
        Self::from_groups(groups)
    }

    /// No sharing: every test is its own singleton group (it is its own leader).
    pub fn no_sharing(tests: &[String]) -> Self {
        Self::from_groups(tests.iter().map(|t| vec![t.clone()]).collect())
    }

    fn from_groups(groups: Vec<Vec<String>>) -> Self {
        let mut test_to_group = HashMap::new();
        let groups: Vec<BuildGroup> = groups
            .into_iter()
            .enumerate()
            .map(|(idx, tests)| {
                for test in &tests {
                    test_to_group.insert(test.clone(), idx);
                }
                BuildGroup {
                    tests,
                    shared_exe: None,
                    leader_phase_status: HashMap::new(),
                }
            })
            .collect();
        Self {
            groups,
            test_to_group,
        }
    }

    fn group_index_of(&self, test: &str) -> Result<usize, BuildGroupError> {
        self.test_to_group
            .get(test)
            .copied()
            .ok_or_else(|| BuildGroupError::NoGroup {
                test: test.to_string(),
            })
    }

    pub fn is_leader(&self, test: &str) -> Result<bool, BuildGroupError> {
        let idx = self.group_index_of(test)?;
        Ok(self.groups[idx].leader() == test)
    }

    pub fn leader_of(&self, test: &str) -> Result<&str, BuildGroupError> {
        let idx = self.group_index_of(test)?;
        Ok(self.groups[idx].leader())
    }

    pub fn shared_exe(&self, test: &str) -> Result<Option<&str>, BuildGroupError> {
        let idx = self.group_index_of(test)?;
        Ok(self.groups[idx].shared_exe.as_deref())
    }

    /// Written exactly once, by the leader's XML phase (invariant 5, §8).
    pub fn set_shared_exe(&mut self, test: &str, path: String) -> Result<(), BuildGroupError> {
        let idx = self.group_index_of(test)?;
        if !self.is_leader(test)? {
            return Err(BuildGroupError::NoLeader {
                test: test.to_string(),
            });
        }
        self.groups[idx].shared_exe = Some(path);
        Ok(())
    }

    /// Record the leader's terminal outcome at a gated phase. Must be
    /// called exactly once per leader per gated phase, before any follower
    /// in the group attempts that phase.
    pub fn record_leader_result(
        &mut self,
        leader_test: &str,
        phase: PhaseId,
        passed: bool,
    ) -> Result<(), BuildGroupError> {
        let idx = self.group_index_of(leader_test)?;
        if !self.is_leader(leader_test)? {
            return Err(BuildGroupError::NoLeader {
                test: leader_test.to_string(),
            });
        }
        self.groups[idx]
            .leader_phase_status
            .insert(phase, passed);
        Ok(())
    }

    /// Gate a follower's launch of `phase` on its leader's progress there.
    /// Leaders are never gated — callers should check `is_leader` first.
    pub fn gate(&self, test: &str, phase: PhaseId) -> Result<Gate, BuildGroupError> {
        let idx = self.group_index_of(test)?;
        let group = &self.groups[idx];
        match group.leader_phase_status.get(&phase) {
            None => Ok(Gate::Ineligible),
            Some(true) => Ok(Gate::FollowerPass),
            Some(false) => Ok(Gate::FollowerFail(format!(
                "Cannot use build for test {test} because it failed"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tests() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    #[test]
    fn single_exe_makes_one_group_with_first_as_leader() {
        let registry = BuildGroupRegistry::single_exe(&tests());
        assert!(registry.is_leader("A").unwrap());
        assert!(!registry.is_leader("B").unwrap());
        assert_eq!(registry.leader_of("C").unwrap(), "A");
    }

    #[test]
    fn no_sharing_makes_every_test_its_own_leader() {
        let registry = BuildGroupRegistry::no_sharing(&tests());
        for t in &tests() {
            assert!(registry.is_leader(t).unwrap());
        }
    }

    #[test]
    fn share_exe_groups_by_descriptor() {
        let registry = BuildGroupRegistry::share_exe(&tests(), |t| {
            if t == "C" { "k2".to_string() } else { "k1".to_string() }
        });
        assert!(registry.is_leader("A").unwrap());
        assert!(!registry.is_leader("B").unwrap());
        assert!(registry.is_leader("C").unwrap());
        assert_eq!(registry.leader_of("B").unwrap(), "A");
    }

    #[test]
    fn shared_exe_is_written_once_by_leader() {
        let mut registry = BuildGroupRegistry::single_exe(&tests());
        registry.set_shared_exe("A", "/path/to/exe".to_string()).unwrap();
        assert_eq!(registry.shared_exe("B").unwrap(), Some("/path/to/exe"));
    }

    #[test]
    fn follower_not_set_shared_exe() {
        let mut registry = BuildGroupRegistry::single_exe(&tests());
        let err = registry.set_shared_exe("B", "/x".to_string()).unwrap_err();
        assert!(matches!(err, BuildGroupError::NoLeader { .. }));
    }

    #[test]
    fn follower_ineligible_until_leader_completes_phase() {
        let registry = BuildGroupRegistry::single_exe(&tests());
        assert_eq!(registry.gate("B", PhaseId::Xml).unwrap(), Gate::Ineligible);
    }

    #[test]
    fn follower_passes_once_leader_passes() {
        let mut registry = BuildGroupRegistry::single_exe(&tests());
        registry.record_leader_result("A", PhaseId::Xml, true).unwrap();
        assert_eq!(registry.gate("B", PhaseId::Xml).unwrap(), Gate::FollowerPass);
    }

    #[test]
    fn follower_fails_with_message_when_leader_fails() {
        let mut registry = BuildGroupRegistry::single_exe(&tests());
        registry
            .record_leader_result("A", PhaseId::ModelBuild, false)
            .unwrap();
        let gate = registry.gate("B", PhaseId::ModelBuild).unwrap();
        match gate {
            Gate::FollowerFail(msg) => assert!(msg.contains("Cannot use build for test B")),
            other => panic!("expected FollowerFail, got {other:?}"),
        }
    }
}
