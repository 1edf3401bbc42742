// ABOUTME: Publishing pipeline states and the steps that drive them.
// ABOUTME: Encodes the forward-only transition table plus the rollback branch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a pipeline run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Draft,
    Building,
    Contracting,
    Packaging,
    Uploading,
    Activating,
    Warming,
    Verifying,
    Announcing,
    Succeeded,
    RollingBack,
    RolledBack,
    Failed,
}

/// Forward order of the happy path.
const FORWARD: [PipelineState; 10] = [
    PipelineState::Draft,
    PipelineState::Building,
    PipelineState::Contracting,
    PipelineState::Packaging,
    PipelineState::Uploading,
    PipelineState::Activating,
    PipelineState::Warming,
    PipelineState::Verifying,
    PipelineState::Announcing,
    PipelineState::Succeeded,
];

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Draft => "draft",
            PipelineState::Building => "building",
            PipelineState::Contracting => "contracting",
            PipelineState::Packaging => "packaging",
            PipelineState::Uploading => "uploading",
            PipelineState::Activating => "activating",
            PipelineState::Warming => "warming",
            PipelineState::Verifying => "verifying",
            PipelineState::Announcing => "announcing",
            PipelineState::Succeeded => "succeeded",
            PipelineState::RollingBack => "rolling_back",
            PipelineState::RolledBack => "rolled_back",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Succeeded | PipelineState::RolledBack | PipelineState::Failed
        )
    }

    /// Failures in these states happen after the alias may have moved,
    /// so they are undone by rolling back.
    pub fn is_rollback_eligible(&self) -> bool {
        matches!(
            self,
            PipelineState::Activating
                | PipelineState::Warming
                | PipelineState::Verifying
                | PipelineState::Announcing
        )
    }

    /// Next state on the happy path, if any.
    pub fn next(&self) -> Option<PipelineState> {
        let index = FORWARD.iter().position(|s| s == self)?;
        FORWARD.get(index + 1).copied()
    }

    pub fn can_transition_to(&self, to: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            PipelineState::Failed => true,
            PipelineState::RollingBack => self.is_rollback_eligible(),
            PipelineState::RolledBack => *self == PipelineState::RollingBack,
            _ => self.next() == Some(to),
        }
    }

    /// The step executed while in this state.
    pub fn step(&self) -> Option<Step> {
        Step::ALL.into_iter().find(|step| step.state() == *self)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Units of work the pipeline executes, one per working state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Build,
    Contract,
    Package,
    Upload,
    Activate,
    Warm,
    Verify,
    Announce,
}

impl Step {
    pub const ALL: [Step; 8] = [
        Step::Build,
        Step::Contract,
        Step::Package,
        Step::Upload,
        Step::Activate,
        Step::Warm,
        Step::Verify,
        Step::Announce,
    ];

    pub fn state(&self) -> PipelineState {
        match self {
            Step::Build => PipelineState::Building,
            Step::Contract => PipelineState::Contracting,
            Step::Package => PipelineState::Packaging,
            Step::Upload => PipelineState::Uploading,
            Step::Activate => PipelineState::Activating,
            Step::Warm => PipelineState::Warming,
            Step::Verify => PipelineState::Verifying,
            Step::Announce => PipelineState::Announcing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Build => "build",
            Step::Contract => "contract",
            Step::Package => "package",
            Step::Upload => "upload",
            Step::Activate => "activate",
            Step::Warm => "warm",
            Step::Verify => "verify",
            Step::Announce => "announce",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_advances_one_state_at_a_time() {
        let mut state = PipelineState::Draft;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            assert!(state.can_transition_to(next));
            state = next;
            visited.push(state);
        }
        assert_eq!(visited.len(), 10);
        assert_eq!(state, PipelineState::Succeeded);
    }

    #[test]
    fn skipping_and_going_backwards_are_illegal() {
        assert!(!PipelineState::Draft.can_transition_to(PipelineState::Contracting));
        assert!(!PipelineState::Verifying.can_transition_to(PipelineState::Warming));
        assert!(!PipelineState::Uploading.can_transition_to(PipelineState::Uploading));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            PipelineState::Succeeded,
            PipelineState::RolledBack,
            PipelineState::Failed,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(PipelineState::Failed));
            assert!(!terminal.can_transition_to(PipelineState::RollingBack));
        }
    }

    #[test]
    fn rollback_branch_only_after_activation_starts() {
        assert!(!PipelineState::Uploading.can_transition_to(PipelineState::RollingBack));
        assert!(PipelineState::Activating.can_transition_to(PipelineState::RollingBack));
        assert!(PipelineState::Announcing.can_transition_to(PipelineState::RollingBack));
        assert!(PipelineState::RollingBack.can_transition_to(PipelineState::RolledBack));
        assert!(PipelineState::RollingBack.can_transition_to(PipelineState::Failed));
        assert!(!PipelineState::Verifying.can_transition_to(PipelineState::RolledBack));
    }

    #[test]
    fn every_step_maps_to_a_working_state() {
        for step in Step::ALL {
            assert_eq!(step.state().step(), Some(step));
        }
        assert_eq!(PipelineState::Draft.step(), None);
    }

    #[test]
    fn states_serialize_in_snake_case() {
        assert_eq!(
            serde_json::to_string(&PipelineState::RollingBack).unwrap(),
            "\"rolling_back\""
        );
    }
}
