// ABOUTME: Deployment status values and the legal transition table.
// ABOUTME: The engine consults this before every status change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a deployment record.
///
/// ```text
/// pending -> building -> deploying -> success | failed
/// success | rolled_back | failed -> rolling_back -> rolled_back
/// any non-terminal state -> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Building,
    Deploying,
    Success,
    Failed,
    RollingBack,
    RolledBack,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 7] = [
        DeploymentStatus::Pending,
        DeploymentStatus::Building,
        DeploymentStatus::Deploying,
        DeploymentStatus::Success,
        DeploymentStatus::Failed,
        DeploymentStatus::RollingBack,
        DeploymentStatus::RolledBack,
    ];

    /// No further forward transition happens automatically.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::RolledBack
        )
    }

    /// The forward deploy pipeline is still running.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Pending | DeploymentStatus::Building | DeploymentStatus::Deploying
        )
    }

    /// Whether a rollback may be started from this status.
    pub fn can_roll_back(self) -> bool {
        !self.is_in_flight()
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;

        match (self, next) {
            (Pending, Building) | (Building, Deploying) => true,
            (Deploying, Success) => true,
            (RollingBack, RolledBack) => true,
            // Re-entering rolling_back retries an incomplete rollback.
            (from, RollingBack) => from.can_roll_back(),
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::RollingBack => "rolling_back",
            DeploymentStatus::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown deployment status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for DeploymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeploymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::DeploymentStatus::*;
    use super::*;

    #[test]
    fn forward_pipeline_is_legal() {
        assert!(Pending.can_transition_to(Building));
        assert!(Building.can_transition_to(Deploying));
        assert!(Deploying.can_transition_to(Success));
        assert!(Deploying.can_transition_to(Failed));
    }

    #[test]
    fn cannot_skip_stages() {
        assert!(!Pending.can_transition_to(Deploying));
        assert!(!Pending.can_transition_to(Success));
        assert!(!Building.can_transition_to(Success));
    }

    #[test]
    fn terminal_records_are_never_resurrected() {
        for terminal in [Success, Failed, RolledBack] {
            for next in [Pending, Building, Deploying] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be illegal"
                );
            }
            assert!(!terminal.can_transition_to(Failed));
        }
    }

    #[test]
    fn rollback_eligibility() {
        assert!(Success.can_transition_to(RollingBack));
        assert!(RolledBack.can_transition_to(RollingBack));
        assert!(Failed.can_transition_to(RollingBack));
        assert!(RollingBack.can_transition_to(RollingBack));
        assert!(RollingBack.can_transition_to(RolledBack));
        assert!(!Deploying.can_transition_to(RollingBack));
        assert!(!Success.can_transition_to(RolledBack));
    }

    #[test]
    fn non_terminal_states_may_fail() {
        for status in [Pending, Building, Deploying, RollingBack] {
            assert!(status.can_transition_to(Failed));
        }
    }

    #[test]
    fn parses_and_displays_snake_case() {
        for status in DeploymentStatus::ALL {
            assert_eq!(status.to_string().parse::<DeploymentStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&RollingBack).unwrap(),
            "\"rolling_back\""
        );
        assert!("exploded".parse::<DeploymentStatus>().is_err());
    }
}
