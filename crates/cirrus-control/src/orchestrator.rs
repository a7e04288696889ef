//! Concurrent provisioning of container-instance agents.

use std::collections::HashMap;
use std::sync::Arc;

use cirrus_cloud::CloudClient;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::TemplateCatalog;
use crate::channel::AgentChannels;
use crate::config::{CloudProfile, ContainerTemplate, LaunchMethod};
use crate::descriptor::DescriptorBuilder;
use crate::error::{ProvisionError, ProvisionResult};
use crate::registry::{AgentNode, NodeRegistry};
use crate::retry::RetryGate;
use crate::secrets::CredentialStore;
use crate::state::Attempt;
use crate::teardown::TeardownService;
use crate::telemetry::{events, TelemetrySink, CATEGORY_CONTAINER_AGENT};
use crate::types::AgentIdentity;
use crate::waiter::{AttemptClock, ConnectivityWaiter, DeploymentWaiter};

/// Handle on one in-flight provisioning attempt.
pub struct ProvisionHandle {
    node: Arc<AgentNode>,
    task: JoinHandle<ProvisionResult<()>>,
}

impl ProvisionHandle {
    /// The node being provisioned.
    #[must_use]
    pub fn node(&self) -> &Arc<AgentNode> {
        &self.node
    }

    /// Wait for the attempt to finish.
    pub async fn finished(self) -> ProvisionResult<()> {
        match self.task.await {
            Ok(result) => result,
            Err(error) => Err(ProvisionError::internal(format!(
                "provisioning task failed: {error}"
            ))),
        }
    }
}

/// Provisions agents for one cloud profile.
///
/// Each requested unit runs as an independent spawned attempt: it registers
/// its node, submits a deployment, waits it out, waits for connectivity, and
/// on any failure compensates by deregistering the node and tearing down
/// whatever cloud resources the attempt created. Failures of one unit never
/// affect its siblings.
pub struct ProvisionOrchestrator {
    profile: Arc<CloudProfile>,
    catalog: TemplateCatalog,
    cloud: Arc<dyn CloudClient>,
    registry: Arc<dyn NodeRegistry>,
    channels: Arc<dyn AgentChannels>,
    telemetry: Arc<dyn TelemetrySink>,
    retry_gate: RetryGate,
    descriptor: DescriptorBuilder,
    deployment_waiter: DeploymentWaiter,
    connectivity_waiter: ConnectivityWaiter,
    teardown: TeardownService,
    cancel: CancellationToken,
}

impl ProvisionOrchestrator {
    /// Wire up an orchestrator for the given profile and collaborators.
    #[must_use]
    pub fn new(
        profile: CloudProfile,
        cloud: Arc<dyn CloudClient>,
        registry: Arc<dyn NodeRegistry>,
        credentials: Arc<dyn CredentialStore>,
        channels: Arc<dyn AgentChannels>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Arc<Self> {
        let profile = Arc::new(profile);
        let resource_group = profile.resource_group.clone();
        Arc::new(Self {
            catalog: TemplateCatalog::new(profile.templates.clone()),
            descriptor: DescriptorBuilder::new(Arc::clone(&profile), credentials),
            deployment_waiter: DeploymentWaiter::new(Arc::clone(&cloud), resource_group.clone()),
            connectivity_waiter: ConnectivityWaiter::new(
                Arc::clone(&cloud),
                Arc::clone(&registry),
                resource_group.clone(),
            ),
            teardown: TeardownService::new(
                Arc::clone(&cloud),
                Arc::clone(&telemetry),
                resource_group,
            ),
            profile,
            cloud,
            registry,
            channels,
            telemetry,
            retry_gate: RetryGate::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// The template catalog backing this orchestrator.
    #[must_use]
    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Whether a request for the label would currently be admitted.
    ///
    /// False when no template serves the label or when the serving template
    /// is cooling down after recent failures.
    #[must_use]
    pub fn can_admit(&self, label: Option<&str>) -> bool {
        self.admit(label).is_ok()
    }

    fn admit(&self, label: Option<&str>) -> ProvisionResult<&ContainerTemplate> {
        let template = self.catalog.resolve(label).ok_or_else(|| {
            ProvisionError::NoMatchingTemplate(label.unwrap_or("<any>").to_owned())
        })?;
        if !self.retry_gate.is_eligible(&template.name) {
            return Err(ProvisionError::TemplateDisabled(template.name.clone()));
        }
        Ok(template)
    }

    /// Start `count` provisioning attempts for the label.
    ///
    /// Returns immediately with one handle per started attempt. An empty
    /// vector means no template serves the label or the serving template is
    /// cooling down.
    #[must_use]
    pub fn provision(self: &Arc<Self>, label: Option<&str>, count: usize) -> Vec<ProvisionHandle> {
        let template = match self.admit(label) {
            Ok(template) => template.clone(),
            Err(error) => {
                info!(label = label.unwrap_or("<any>"), %error, "not provisioning");
                return Vec::new();
            }
        };
        (0..count)
            .map(|_| {
                let identity = AgentIdentity::generate(&template.name);
                let node = Arc::new(AgentNode::new(identity, &template));
                let orchestrator = Arc::clone(self);
                let template = template.clone();
                let task_node = Arc::clone(&node);
                let task =
                    tokio::spawn(async move { orchestrator.run_attempt(template, task_node).await });
                ProvisionHandle { node, task }
            })
            .collect()
    }

    /// Cancel all in-flight attempts. Each fails with
    /// [`ProvisionError::Cancelled`] and runs its cleanup.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn run_attempt(
        self: Arc<Self>,
        template: ContainerTemplate,
        node: Arc<AgentNode>,
    ) -> ProvisionResult<()> {
        let agent = node.name().to_owned();
        let mut properties = self.base_properties(&template, &node);
        info!(agent = %agent, template = %template.name, "provisioning agent");

        match self.try_provision(&template, &node).await {
            Ok(()) => {
                self.retry_gate.record_success(&template.name);
                self.telemetry
                    .emit(CATEGORY_CONTAINER_AGENT, events::PROVISIONED, &properties);
                info!(agent = %agent, "agent provisioned");
                Ok(())
            }
            Err(error) => {
                warn!(agent = %agent, %error, "provisioning failed, cleaning up");
                properties.insert("message".to_owned(), error.to_string());
                self.telemetry.emit(
                    CATEGORY_CONTAINER_AGENT,
                    events::PROVISION_FAILED,
                    &properties,
                );

                self.registry.remove(&agent).await;
                self.teardown
                    .destroy(&agent, Some(node.deployment_name()))
                    .await;

                // Cancellation is a shutdown, not a template fault.
                if !matches!(error, ProvisionError::Cancelled) {
                    self.retry_gate.record_failure(&template.name);
                }
                Err(error)
            }
        }
    }

    async fn try_provision(
        &self,
        template: &ContainerTemplate,
        node: &Arc<AgentNode>,
    ) -> ProvisionResult<()> {
        // Registered before the container exists, so planned capacity is
        // visible to the scheduler immediately.
        self.registry.register(Arc::clone(node)).await?;

        let identity = node.identity().clone();
        let clock = AttemptClock::start(template.timeout());
        let attempt = Attempt::begin(Arc::clone(node), clock);

        let channel = self.channels.channel(&identity);
        let document = self.descriptor.build(template, &identity, &*channel).await?;
        let attempt = attempt.submitted();

        self.deployment_waiter
            .deploy(&identity, &document, clock, &self.cancel)
            .await?;

        let address = self.resolve_address(node).await?;

        match template.launch_method {
            LaunchMethod::Handshake => {
                let attempt = attempt.await_handshake();
                self.connectivity_waiter
                    .wait(node, clock, &self.cancel)
                    .await?;
                let _online = attempt.online();
            }
            LaunchMethod::Shell => {
                let attempt = attempt.await_connect();
                if self.registry.lookup(node.name()).await.is_none() {
                    return Err(ProvisionError::NodeRemoved {
                        agent: node.name().to_owned(),
                    });
                }
                let address = address.ok_or_else(|| {
                    ProvisionError::internal(format!(
                        "no address assigned to container group {}",
                        node.name()
                    ))
                })?;
                channel.connect(&address).await?;
                node.mark_online();
                let _online = attempt.connected();
            }
        }

        Ok(())
    }

    /// Fetch the group's assigned address and record it on the node.
    async fn resolve_address(&self, node: &Arc<AgentNode>) -> ProvisionResult<Option<String>> {
        let group = self
            .cloud
            .get_container_group(&self.profile.resource_group, node.name())
            .await?;

        if let Some(address) = &group.ip_address {
            node.set_host(address.clone());
            node.push_env("IP", address.clone());
        }
        Ok(group.ip_address)
    }

    fn base_properties(
        &self,
        template: &ContainerTemplate,
        node: &Arc<AgentNode>,
    ) -> HashMap<String, String> {
        let mut properties = HashMap::new();
        properties.insert("profile".to_owned(), self.profile.name.clone());
        properties.insert("agent".to_owned(), node.name().to_owned());
        properties.insert("cpu".to_owned(), template.cpu.clone());
        properties
    }
}
