//! Error types for cirrus-control.

use std::fmt;
use std::time::Duration;

use cirrus_cloud::CloudError;

/// Result type alias using [`ProvisionError`].
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Phase of a provisioning attempt, for timeout reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the remote deployment to reach a terminal state.
    Deployment,
    /// Waiting for the agent to come online.
    Connectivity,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "deployment"),
            Self::Connectivity => write!(f, "connectivity"),
        }
    }
}

/// Errors that can occur while provisioning agents.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Control-plane call failed.
    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// The remote deployment reported a failed state.
    #[error("deployment {deployment} reported state {state}")]
    DeploymentFailed {
        /// Deployment name.
        deployment: String,
        /// Remote-reported state.
        state: String,
    },

    /// The attempt exceeded its wall-clock budget.
    #[error("{phase} wait timed out after {budget:?}")]
    Timeout {
        /// Phase that was waiting when the budget ran out.
        phase: Phase,
        /// The attempt's wall-clock budget.
        budget: Duration,
    },

    /// The remote container terminated before the agent came online.
    #[error("container for agent {agent} terminated before coming online")]
    ContainerTerminated {
        /// Agent node name.
        agent: String,
    },

    /// The agent node record was removed from the registry externally.
    #[error("agent {agent} has been removed from the node registry")]
    NodeRemoved {
        /// Agent node name.
        agent: String,
    },

    /// No template matches the requested label.
    #[error("no template matches label {0:?}")]
    NoMatchingTemplate(String),

    /// The template is cooling down after recent failures.
    #[error("template {0} is disabled by the retry gate")]
    TemplateDisabled(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The orchestrator was shut down while the attempt was in flight.
    #[error("provisioning cancelled")]
    Cancelled,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProvisionError {
    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
