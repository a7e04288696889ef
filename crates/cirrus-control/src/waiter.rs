//! Polling waiters for the two provisioning phases.
//!
//! Both phases draw down one shared wall-clock budget per attempt, carried
//! by an [`AttemptClock`]: time spent waiting for the deployment is not
//! available to the connectivity wait that follows.

use std::sync::Arc;
use std::time::Duration;

use cirrus_cloud::{CloudClient, ContainerState, DeploymentDocument, ProvisioningState};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Phase, ProvisionError, ProvisionResult};
use crate::registry::{AgentNode, NodeRegistry};
use crate::types::AgentIdentity;

/// Poll interval while waiting for the deployment to reach a terminal state.
pub const DEPLOY_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Poll interval while waiting for the agent to come online.
pub const CONNECT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The shared wall-clock budget of one provisioning attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptClock {
    started: Instant,
    budget: Duration,
}

impl AttemptClock {
    /// Start the clock with the given budget.
    #[must_use]
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Time elapsed since the attempt started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the budget has run out.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.elapsed() >= self.budget
    }

    /// Whether at least half the budget has elapsed.
    #[must_use]
    pub fn half_elapsed(&self) -> bool {
        self.elapsed() >= self.budget / 2
    }

    /// The attempt's total budget.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }
}

/// Sleep for the given interval, returning early with
/// [`ProvisionError::Cancelled`] if the token fires first.
async fn sleep_or_cancelled(
    interval: Duration,
    cancel: &CancellationToken,
) -> ProvisionResult<()> {
    tokio::select! {
        () = cancel.cancelled() => Err(ProvisionError::Cancelled),
        () = tokio::time::sleep(interval) => Ok(()),
    }
}

/// Submits a deployment and waits for it to reach a terminal state.
pub struct DeploymentWaiter {
    cloud: Arc<dyn CloudClient>,
    resource_group: String,
}

impl DeploymentWaiter {
    /// Create a waiter polling the given resource group.
    #[must_use]
    pub fn new(cloud: Arc<dyn CloudClient>, resource_group: impl Into<String>) -> Self {
        Self {
            cloud,
            resource_group: resource_group.into(),
        }
    }

    /// Submit the descriptor and poll until the deployment succeeds, fails,
    /// or the budget runs out.
    ///
    /// Once half the budget has elapsed without a terminal state, the
    /// container's current log content is fetched once and surfaced as a
    /// diagnostic; the fetch is best-effort and never fails the wait.
    pub async fn deploy(
        &self,
        identity: &AgentIdentity,
        document: &DeploymentDocument,
        clock: AttemptClock,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        let deployment = identity.deployment_name();
        self.cloud
            .create_deployment(&self.resource_group, deployment, document)
            .await?;
        let mut logs_fetched = false;

        loop {
            if clock.expired() {
                return Err(ProvisionError::Timeout {
                    phase: Phase::Deployment,
                    budget: clock.budget(),
                });
            }

            let info = self
                .cloud
                .get_deployment(&self.resource_group, deployment)
                .await?;

            match info.provisioning_state {
                ProvisioningState::Succeeded => {
                    debug!(deployment, "deployment succeeded");
                    return Ok(());
                }
                ProvisioningState::Failed => {
                    return Err(ProvisionError::DeploymentFailed {
                        deployment: deployment.to_owned(),
                        state: info.provisioning_state.to_string(),
                    });
                }
                state => {
                    debug!(deployment, %state, "deployment still in progress");
                }
            }

            if clock.half_elapsed() && !logs_fetched {
                logs_fetched = true;
                self.fetch_diagnostic_logs(identity).await;
            }

            sleep_or_cancelled(DEPLOY_POLL_INTERVAL, cancel).await?;
        }
    }

    async fn fetch_diagnostic_logs(&self, identity: &AgentIdentity) {
        let group = identity.node_name();
        match self
            .cloud
            .container_logs(&self.resource_group, group, group)
            .await
        {
            Ok(logs) => info!(agent = group, %logs, "container logs at half budget"),
            Err(error) => debug!(agent = group, %error, "could not fetch container logs"),
        }
    }
}

/// Waits for a deployed agent to come online.
pub struct ConnectivityWaiter {
    cloud: Arc<dyn CloudClient>,
    registry: Arc<dyn NodeRegistry>,
    resource_group: String,
}

impl ConnectivityWaiter {
    /// Create a waiter polling the given resource group.
    #[must_use]
    pub fn new(
        cloud: Arc<dyn CloudClient>,
        registry: Arc<dyn NodeRegistry>,
        resource_group: impl Into<String>,
    ) -> Self {
        Self {
            cloud,
            registry,
            resource_group: resource_group.into(),
        }
    }

    /// Poll until the agent is online, drawing down the attempt clock.
    ///
    /// Fails early when the node record is removed from the registry (an
    /// operator deleted it) or the remote container terminates.
    pub async fn wait(
        &self,
        node: &Arc<AgentNode>,
        clock: AttemptClock,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        let agent = node.name();

        loop {
            if clock.expired() {
                return Err(ProvisionError::Timeout {
                    phase: Phase::Connectivity,
                    budget: clock.budget(),
                });
            }

            if self.registry.lookup(agent).await.is_none() {
                return Err(ProvisionError::NodeRemoved {
                    agent: agent.to_owned(),
                });
            }

            let group = self
                .cloud
                .get_container_group(&self.resource_group, agent)
                .await?;
            if let Some(container) = group.containers.get(agent) {
                if container.state == ContainerState::Terminated {
                    self.log_terminated(agent).await;
                    return Err(ProvisionError::ContainerTerminated {
                        agent: agent.to_owned(),
                    });
                }
            }

            if node.is_online() {
                debug!(agent, "agent online");
                return Ok(());
            }

            sleep_or_cancelled(CONNECT_POLL_INTERVAL, cancel).await?;
        }
    }

    async fn log_terminated(&self, agent: &str) {
        match self
            .cloud
            .container_logs(&self.resource_group, agent, agent)
            .await
        {
            Ok(logs) => warn!(agent, %logs, "container terminated before coming online"),
            Err(error) => warn!(agent, %error, "container terminated; logs unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_cloud::{DeploymentDocument, MockCloudClient};
    use crate::config::CloudProfile;
    use crate::registry::InMemoryRegistry;

    fn identity() -> AgentIdentity {
        AgentIdentity::generate("linux")
    }

    fn document_for(identity: &AgentIdentity) -> DeploymentDocument {
        let mut doc = DeploymentDocument::public_ip();
        doc.variables_mut().container_name = identity.node_name().to_owned();
        doc
    }

    async fn submit(cloud: &MockCloudClient, identity: &AgentIdentity) {
        cloud
            .create_deployment("rg", identity.deployment_name(), &document_for(identity))
            .await
            .unwrap();
    }

    fn node_for(identity: &AgentIdentity) -> Arc<AgentNode> {
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
        Arc::new(AgentNode::new(identity.clone(), &profile.templates[0]))
    }

    #[tokio::test(start_paused = true)]
    async fn deployment_wait_succeeds_after_polling() {
        let cloud = Arc::new(MockCloudClient::new());
        cloud.push_deployment_plan(vec![
            ProvisioningState::Pending,
            ProvisioningState::Running,
            ProvisioningState::Succeeded,
        ]);
        let identity = identity();

        let waiter = DeploymentWaiter::new(cloud.clone(), "rg");
        let clock = AttemptClock::start(Duration::from_secs(600));
        waiter
            .deploy(
                &identity,
                &document_for(&identity),
                clock,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        // Terminal on the third poll, well before half budget: no log fetch.
        assert!(cloud.log_fetches().is_empty());
        assert_eq!(cloud.created_deployments().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deployment_failure_is_reported() {
        let cloud = Arc::new(MockCloudClient::new());
        cloud.push_deployment_plan(vec![ProvisioningState::Failed]);
        let identity = identity();

        let waiter = DeploymentWaiter::new(cloud, "rg");
        let clock = AttemptClock::start(Duration::from_secs(600));
        let err = waiter
            .deploy(
                &identity,
                &document_for(&identity),
                clock,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::DeploymentFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn deployment_timeout_fetches_logs_exactly_once() {
        let cloud = Arc::new(MockCloudClient::new());
        cloud.push_deployment_plan(vec![ProvisioningState::Pending]);
        let identity = identity();

        let waiter = DeploymentWaiter::new(cloud.clone(), "rg");
        // 60s budget, 10s polls: half budget passes on the fourth poll.
        let clock = AttemptClock::start(Duration::from_secs(60));
        let err = waiter
            .deploy(
                &identity,
                &document_for(&identity),
                clock,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::Timeout {
                phase: Phase::Deployment,
                ..
            }
        ));
        assert_eq!(cloud.log_fetches().len(), 1);
        assert_eq!(cloud.log_fetches()[0], identity.node_name());
    }

    #[tokio::test(start_paused = true)]
    async fn deployment_wait_is_cancellable() {
        let cloud = Arc::new(MockCloudClient::new());
        cloud.push_deployment_plan(vec![ProvisioningState::Pending]);
        let identity = identity();

        let waiter = DeploymentWaiter::new(cloud, "rg");
        let clock = AttemptClock::start(Duration::from_secs(600));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = waiter
            .deploy(&identity, &document_for(&identity), clock, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_wait_resolves_when_node_comes_online() {
        let cloud = Arc::new(MockCloudClient::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let identity = identity();
        submit(&cloud, &identity).await;

        let node = node_for(&identity);
        registry.register(Arc::clone(&node)).await.unwrap();

        let waiter = ConnectivityWaiter::new(cloud, registry, "rg");
        let clock = AttemptClock::start(Duration::from_secs(600));
        let cancel = CancellationToken::new();

        let marker = Arc::clone(&node);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            marker.mark_online();
        });

        waiter.wait(&node, clock, &cancel).await.unwrap();
        handle.await.unwrap();
        assert!(node.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_wait_detects_removed_node() {
        let cloud = Arc::new(MockCloudClient::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let identity = identity();
        submit(&cloud, &identity).await;

        // Node never registered: removed before the first poll.
        let node = node_for(&identity);
        let waiter = ConnectivityWaiter::new(cloud, registry, "rg");
        let clock = AttemptClock::start(Duration::from_secs(600));

        let err = waiter
            .wait(&node, clock, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NodeRemoved { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_wait_detects_terminated_container() {
        let cloud = Arc::new(MockCloudClient::new());
        cloud.set_default_container_state(ContainerState::Terminated);
        let registry = Arc::new(InMemoryRegistry::new());
        let identity = identity();
        submit(&cloud, &identity).await;

        let node = node_for(&identity);
        registry.register(Arc::clone(&node)).await.unwrap();

        let waiter = ConnectivityWaiter::new(cloud.clone(), registry, "rg");
        let clock = AttemptClock::start(Duration::from_secs(600));

        let err = waiter
            .wait(&node, clock, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ContainerTerminated { .. }));
        // Terminated containers get a diagnostic log fetch.
        assert_eq!(cloud.log_fetches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_timeout_honours_shared_budget() {
        let cloud = Arc::new(MockCloudClient::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let identity = identity();
        submit(&cloud, &identity).await;

        let node = node_for(&identity);
        registry.register(Arc::clone(&node)).await.unwrap();

        let waiter = ConnectivityWaiter::new(cloud, registry, "rg");
        // A clock that already burned most of its budget elsewhere.
        let clock = AttemptClock::start(Duration::from_secs(20));
        tokio::time::sleep(Duration::from_secs(19)).await;

        let err = waiter
            .wait(&node, clock, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Timeout {
                phase: Phase::Connectivity,
                ..
            }
        ));
    }
}
