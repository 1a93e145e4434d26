use testdrive_error::ResourceError;
use testdrive_types::PhaseId;

/// Inputs needed to price a phase launch, per the cost table in §4.4.
#[derive(Debug, Clone, Copy)]
pub struct PhaseCostInputs {
    pub is_leader: bool,
    pub gmake_j: u32,
    pub calculate_model_build_cost: bool,
    pub core_budget: u32,
    pub no_batch: bool,
    pub totalpes: u32,
    pub serialize_sharedlib_builds: bool,
    pub sharedlib_build_in_flight: bool,
}

/// The outcome of pricing one phase launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseCostOutcome {
    /// Launch at this core cost.
    Cost(u32),
    /// Not launchable this iteration (e.g. a global shared-lib-build serialization slot is held).
    Ineligible,
    /// `RUN` would exceed the core budget: synthesize an immediate test failure instead of a bug.
    RunExceedsBudget,
}

/// Compute the core cost of launching `phase`, or report why it cannot run
/// this iteration. Exceeding `core_budget` on a non-`RUN` phase is treated
/// as a scheduler bug by the caller (§4.4) — this function reports it as an
/// error so the scheduler can `panic!` with full context, rather than
/// silently returning a nonsensical cost.
pub fn compute_cost(
    phase: PhaseId,
    inputs: &PhaseCostInputs,
) -> Result<PhaseCostOutcome, ResourceError> {
    let cost = match phase {
        PhaseId::Init => {
            return Err(ResourceError::InvariantViolated {
                reason: "cannot price the INIT pseudo-phase".to_string(),
            })
        }
        PhaseId::CreateNewcase | PhaseId::Xml | PhaseId::Setup => 1,
        PhaseId::SharedlibBuild => {
            if !inputs.is_leader {
                1
            } else if inputs.serialize_sharedlib_builds && inputs.sharedlib_build_in_flight {
                return Ok(PhaseCostOutcome::Ineligible);
            } else {
                1
            }
        }
        PhaseId::ModelBuild => {
            if !inputs.is_leader {
                1
            } else {
                model_build_cost(inputs)
            }
        }
        PhaseId::Run => {
            let cost = if inputs.no_batch { inputs.totalpes } else { 1 };
            if cost > inputs.core_budget {
                return Ok(PhaseCostOutcome::RunExceedsBudget);
            }
            return Ok(PhaseCostOutcome::Cost(cost));
        }
    };

    if cost > inputs.core_budget {
        return Err(ResourceError::CostExceedsBudget {
            cost,
            budget: inputs.core_budget,
        });
    }
    Ok(PhaseCostOutcome::Cost(cost))
}

fn model_build_cost(inputs: &PhaseCostInputs) -> u32 {
    let raw = if inputs.calculate_model_build_cost {
        let estimate = (2 * inputs.gmake_j) / 3 + 1;
        estimate.min(16)
    } else {
        4
    };
    raw.min(inputs.core_budget)
}
