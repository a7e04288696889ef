//! Remote-state types reported by the cloud control plane.

use std::collections::HashMap;
use std::fmt;

/// Provisioning state of an asynchronous deployment.
///
/// The control plane reports states as free-form strings; comparisons are
/// case-insensitive, and unrecognised states are preserved in
/// [`ProvisioningState::Other`] so they can be surfaced in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    /// Deployment accepted but not yet started.
    Pending,
    /// Deployment request accepted by the control plane.
    Accepted,
    /// Deployment is in progress.
    Running,
    /// Deployment reached its goal state.
    Succeeded,
    /// Deployment failed.
    Failed,
    /// Any other state reported by the control plane.
    Other(String),
}

impl ProvisioningState {
    /// Parse a remote-reported state string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "accepted" => Self::Accepted,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            _ => Self::Other(s.to_owned()),
        }
    }

    /// Get the state as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }

    /// Whether the deployment has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current status of a deployment.
#[derive(Debug, Clone)]
pub struct DeploymentInfo {
    /// The provisioning state reported by the control plane.
    pub provisioning_state: ProvisioningState,
}

/// Runtime state of a single container within a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// Container is waiting to start.
    Waiting,
    /// Container is running.
    Running,
    /// Container exited.
    Terminated,
    /// Any other state reported by the control plane.
    Other(String),
}

impl ContainerState {
    /// Parse a remote-reported container state (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "waiting" => Self::Waiting,
            "running" => Self::Running,
            "terminated" => Self::Terminated,
            _ => Self::Other(s.to_owned()),
        }
    }
}

/// View of one container inside a deployed group.
#[derive(Debug, Clone)]
pub struct ContainerView {
    /// Current state of the container.
    pub state: ContainerState,
}

/// View of a deployed container group.
#[derive(Debug, Clone, Default)]
pub struct ContainerGroupInfo {
    /// Assigned network address, if one has been allocated.
    pub ip_address: Option<String>,
    /// Containers in the group, keyed by container name.
    pub containers: HashMap<String, ContainerView>,
}

impl ContainerGroupInfo {
    /// Build a single-container group view, as produced for agent groups.
    #[must_use]
    pub fn single(name: impl Into<String>, state: ContainerState, ip: Option<String>) -> Self {
        let mut containers = HashMap::new();
        containers.insert(name.into(), ContainerView { state });
        Self {
            ip_address: ip,
            containers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_parse_is_case_insensitive() {
        assert_eq!(ProvisioningState::parse("Succeeded"), ProvisioningState::Succeeded);
        assert_eq!(ProvisioningState::parse("FAILED"), ProvisioningState::Failed);
        assert_eq!(ProvisioningState::parse("running"), ProvisioningState::Running);
    }

    #[test]
    fn unknown_state_is_preserved() {
        let state = ProvisioningState::parse("Canceling");
        assert_eq!(state, ProvisioningState::Other("Canceling".to_owned()));
        assert_eq!(state.as_str(), "Canceling");
        assert!(!state.is_terminal());
    }

    #[test]
    fn terminal_states() {
        assert!(ProvisioningState::Succeeded.is_terminal());
        assert!(ProvisioningState::Failed.is_terminal());
        assert!(!ProvisioningState::Pending.is_terminal());
    }

    #[test]
    fn container_state_parse() {
        assert_eq!(ContainerState::parse("Terminated"), ContainerState::Terminated);
        assert_eq!(
            ContainerState::parse("CrashLoop"),
            ContainerState::Other("CrashLoop".to_owned())
        );
    }
}
