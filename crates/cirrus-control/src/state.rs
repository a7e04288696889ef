//! Typestate encoding of one provisioning attempt.
//!
//! The state parameter makes out-of-order phases a compile-time error: an
//! attempt cannot wait for connectivity before its deployment has been
//! submitted and observed, and it can only be declared online from one of
//! the two waiting states.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::registry::AgentNode;
use crate::waiter::AttemptClock;

/// Marker trait for attempt states.
pub trait AttemptState: private::Sealed + Send + Sync {
    /// State name for logging.
    fn name() -> &'static str;
}

mod private {
    pub trait Sealed {}
}

/// Node registered, descriptor not yet submitted.
#[derive(Debug, Clone, Copy)]
pub struct Created;

/// Deployment submitted, waiting for a terminal state.
#[derive(Debug, Clone, Copy)]
pub struct Deploying;

/// Deployment succeeded, waiting for the agent to handshake.
#[derive(Debug, Clone, Copy)]
pub struct WaitingOnline;

/// Deployment succeeded, waiting to open a shell connection.
#[derive(Debug, Clone, Copy)]
pub struct WaitingConnect;

/// Agent connected and serving.
#[derive(Debug, Clone, Copy)]
pub struct Online;

impl private::Sealed for Created {}
impl private::Sealed for Deploying {}
impl private::Sealed for WaitingOnline {}
impl private::Sealed for WaitingConnect {}
impl private::Sealed for Online {}

impl AttemptState for Created {
    fn name() -> &'static str {
        "created"
    }
}

impl AttemptState for Deploying {
    fn name() -> &'static str {
        "deploying"
    }
}

impl AttemptState for WaitingOnline {
    fn name() -> &'static str {
        "waiting-online"
    }
}

impl AttemptState for WaitingConnect {
    fn name() -> &'static str {
        "waiting-connect"
    }
}

impl AttemptState for Online {
    fn name() -> &'static str {
        "online"
    }
}

/// One provisioning attempt in a specific state.
#[derive(Debug)]
pub struct Attempt<S: AttemptState> {
    node: Arc<AgentNode>,
    clock: AttemptClock,
    _state: PhantomData<S>,
}

impl<S: AttemptState> Attempt<S> {
    /// The node this attempt is provisioning.
    #[must_use]
    pub fn node(&self) -> &Arc<AgentNode> {
        &self.node
    }

    /// The attempt's shared wall-clock budget.
    #[must_use]
    pub const fn clock(&self) -> AttemptClock {
        self.clock
    }

    /// The state name, for logging.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        S::name()
    }

    fn transition<T: AttemptState>(self) -> Attempt<T> {
        Attempt {
            node: self.node,
            clock: self.clock,
            _state: PhantomData,
        }
    }
}

impl Attempt<Created> {
    /// Begin an attempt for a registered node, starting its clock.
    #[must_use]
    pub fn begin(node: Arc<AgentNode>, clock: AttemptClock) -> Self {
        Self {
            node,
            clock,
            _state: PhantomData,
        }
    }

    /// The descriptor has been submitted.
    #[must_use]
    pub fn submitted(self) -> Attempt<Deploying> {
        self.transition()
    }
}

impl Attempt<Deploying> {
    /// The deployment succeeded; the agent will handshake inbound.
    #[must_use]
    pub fn await_handshake(self) -> Attempt<WaitingOnline> {
        self.transition()
    }

    /// The deployment succeeded; the controller will connect out.
    #[must_use]
    pub fn await_connect(self) -> Attempt<WaitingConnect> {
        self.transition()
    }
}

impl Attempt<WaitingOnline> {
    /// The agent handshook and is online.
    #[must_use]
    pub fn online(self) -> Attempt<Online> {
        self.transition()
    }
}

impl Attempt<WaitingConnect> {
    /// The shell connection was established.
    #[must_use]
    pub fn connected(self) -> Attempt<Online> {
        self.transition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::config::CloudProfile;
    use crate::types::AgentIdentity;

    fn node() -> Arc<AgentNode> {
        let profile = CloudProfile::from_toml(
            r#"
            name = "profile"
            credentials_id = "sp"
            resource_group = "rg"

            [controller]
            url = "https://ci.example.com/"
            instance_id = "controller-1"

            [[templates]]
            name = "linux"
            image = "example.azurecr.io/linux:latest"
            "#,
        )
        .unwrap();
        Arc::new(AgentNode::new(
            AgentIdentity::generate("linux"),
            &profile.templates[0],
        ))
    }

    #[tokio::test]
    async fn handshake_path_transitions() {
        let attempt = Attempt::begin(node(), AttemptClock::start(Duration::from_secs(60)));
        assert_eq!(attempt.state_name(), "created");

        let online = attempt.submitted().await_handshake().online();
        assert_eq!(online.state_name(), "online");
    }

    #[tokio::test]
    async fn shell_path_transitions() {
        let attempt = Attempt::begin(node(), AttemptClock::start(Duration::from_secs(60)));
        let online = attempt.submitted().await_connect().connected();
        assert_eq!(online.state_name(), "online");
        assert!(!online.clock().expired());
    }
}
