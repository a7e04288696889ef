//! Controller-side agent channel seam.
//!
//! The orchestrator never speaks the agent protocol itself. For handshake
//! launches it only needs the per-agent secret to bake into the container
//! command; for shell launches it asks the channel to dial the agent's
//! address once the container is running.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::{ProvisionError, ProvisionResult};
use crate::types::AgentIdentity;

/// Controller-side channel for one agent.
#[async_trait]
pub trait AgentChannel: Send + Sync {
    /// The one-time secret the agent presents when handshaking.
    fn handshake_secret(&self) -> SecretString;

    /// Dial the agent at the given address and complete the launch. Only
    /// used by the shell launch method.
    async fn connect(&self, host: &str) -> ProvisionResult<()>;
}

/// Factory handing out channels keyed by agent identity.
pub trait AgentChannels: Send + Sync {
    /// The channel for the given agent.
    fn channel(&self, identity: &AgentIdentity) -> Arc<dyn AgentChannel>;
}

#[derive(Debug)]
struct Shared {
    secret: SecretString,
    connects: Mutex<Vec<String>>,
    fail_connect: Mutex<bool>,
}

impl Shared {
    fn lock_connects(&self) -> MutexGuard<'_, Vec<String>> {
        self.connects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Channel factory with a fixed secret, recording connections. For tests
/// and embedding.
#[derive(Debug, Clone)]
pub struct StaticChannels {
    shared: Arc<Shared>,
}

impl StaticChannels {
    /// Create a factory handing out channels with the given secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                secret: SecretString::from(secret.into()),
                connects: Mutex::new(Vec::new()),
                fail_connect: Mutex::new(false),
            }),
        }
    }

    /// Make subsequent `connect` calls fail.
    pub fn fail_connects(&self) {
        *self
            .shared
            .fail_connect
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Hosts that have been dialled, in order.
    #[must_use]
    pub fn connected_hosts(&self) -> Vec<String> {
        self.shared.lock_connects().clone()
    }
}

struct StaticChannel {
    shared: Arc<Shared>,
}

#[async_trait]
impl AgentChannel for StaticChannel {
    fn handshake_secret(&self) -> SecretString {
        self.shared.secret.clone()
    }

    async fn connect(&self, host: &str) -> ProvisionResult<()> {
        if *self
            .shared
            .fail_connect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(ProvisionError::internal(format!(
                "connection to {host} refused"
            )));
        }
        self.shared.lock_connects().push(host.to_owned());
        Ok(())
    }
}

impl AgentChannels for StaticChannels {
    fn channel(&self, _identity: &AgentIdentity) -> Arc<dyn AgentChannel> {
        Arc::new(StaticChannel {
            shared: Arc::clone(&self.shared),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn static_channels_hand_out_the_secret_and_record_connects() {
        let channels = StaticChannels::new("s3cret");
        let channel = channels.channel(&AgentIdentity::generate("linux"));

        assert_eq!(channel.handshake_secret().expose_secret(), "s3cret");

        channel.connect("10.0.0.4").await.unwrap();
        assert_eq!(channels.connected_hosts(), vec!["10.0.0.4".to_owned()]);
    }

    #[tokio::test]
    async fn connects_can_be_made_to_fail() {
        let channels = StaticChannels::new("s3cret");
        channels.fail_connects();
        let channel = channels.channel(&AgentIdentity::generate("linux"));
        assert!(channel.connect("10.0.0.4").await.is_err());
        assert!(channels.connected_hosts().is_empty());
    }
}
