//! Agent node handles and the host node registry seam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::{ContainerTemplate, EnvVar, LaunchMethod};
use crate::error::ProvisionResult;
use crate::types::AgentIdentity;

/// A provisioned (or provisioning) agent node.
///
/// Created at the start of an attempt and registered with the host registry
/// before the backing container exists, so the scheduler can see the planned
/// capacity. The attempt owns the node exclusively until registration; after
/// that the registry is the authority for removal.
#[derive(Debug)]
pub struct AgentNode {
    identity: AgentIdentity,
    template_name: String,
    launch_method: LaunchMethod,
    created_at: DateTime<Utc>,
    host: RwLock<Option<String>>,
    online: AtomicBool,
    env: RwLock<Vec<EnvVar>>,
}

impl AgentNode {
    /// Create a node for an attempt against the given template.
    #[must_use]
    pub fn new(identity: AgentIdentity, template: &ContainerTemplate) -> Self {
        Self {
            identity,
            template_name: template.name.clone(),
            launch_method: template.launch_method,
            created_at: Utc::now(),
            host: RwLock::new(None),
            online: AtomicBool::new(false),
            env: RwLock::new(Vec::new()),
        }
    }

    /// The agent's identity.
    #[must_use]
    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// The node name (also the container-group name).
    #[must_use]
    pub fn name(&self) -> &str {
        self.identity.node_name()
    }

    /// The deployment name backing this node.
    #[must_use]
    pub fn deployment_name(&self) -> &str {
        self.identity.deployment_name()
    }

    /// Name of the template this node was provisioned from.
    #[must_use]
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    /// How this agent joins the controller.
    #[must_use]
    pub const fn launch_method(&self) -> LaunchMethod {
        self.launch_method
    }

    /// When the node record was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Record the assigned network address.
    pub fn set_host(&self, host: impl Into<String>) {
        *self.host.write().unwrap_or_else(PoisonError::into_inner) = Some(host.into());
    }

    /// The assigned network address, if resolved.
    #[must_use]
    pub fn host(&self) -> Option<String> {
        self.host
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mark the agent as online. Called when the agent's connection to the
    /// controller is established.
    pub fn mark_online(&self) {
        self.online.store(true, Ordering::SeqCst);
    }

    /// Whether the agent has connected to the controller.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Append an environment entry to the node record.
    pub fn push_env(&self, key: impl Into<String>, value: impl Into<String>) {
        self.env
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(EnvVar {
                key: key.into(),
                value: value.into(),
            });
    }

    /// Environment entries recorded on the node.
    #[must_use]
    pub fn env(&self) -> Vec<EnvVar> {
        self.env
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The host's node registry.
///
/// The registry is an external collaborator: the orchestrator registers
/// nodes as soon as an attempt starts and removes them during cleanup, but
/// the host may remove a node at any time (e.g. an operator deleting it).
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Register a node. Visible to the scheduler immediately, before the
    /// agent is reachable.
    async fn register(&self, node: Arc<AgentNode>) -> ProvisionResult<()>;

    /// Look up a node by name.
    async fn lookup(&self, name: &str) -> Option<Arc<AgentNode>>;

    /// Remove a node by name. Removing an unknown name is a no-op.
    async fn remove(&self, name: &str);
}

/// In-memory [`NodeRegistry`] for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    nodes: DashMap<String, Arc<AgentNode>>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of all registered nodes.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.nodes.iter().map(|e| e.key().clone()).collect()
    }
}

#[async_trait]
impl NodeRegistry for InMemoryRegistry {
    async fn register(&self, node: Arc<AgentNode>) -> ProvisionResult<()> {
        self.nodes.insert(node.name().to_owned(), node);
        Ok(())
    }

    async fn lookup(&self, name: &str) -> Option<Arc<AgentNode>> {
        self.nodes.get(name).map(|e| Arc::clone(e.value()))
    }

    async fn remove(&self, name: &str) {
        self.nodes.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CloudProfile;

    fn template() -> ContainerTemplate {
        CloudProfile::from_toml(
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
        .unwrap()
        .templates
        .remove(0)
    }

    #[test]
    fn node_state_mutation() {
        let node = AgentNode::new(AgentIdentity::generate("linux"), &template());

        assert!(node.host().is_none());
        assert!(!node.is_online());

        node.set_host("10.0.0.4");
        node.mark_online();
        node.push_env("IP", "10.0.0.4");

        assert_eq!(node.host().as_deref(), Some("10.0.0.4"));
        assert!(node.is_online());
        assert_eq!(node.env().len(), 1);
        assert_eq!(node.env()[0].key, "IP");
    }

    #[tokio::test]
    async fn registry_lifecycle() {
        let registry = InMemoryRegistry::new();
        let node = Arc::new(AgentNode::new(AgentIdentity::generate("linux"), &template()));
        let name = node.name().to_owned();

        registry.register(Arc::clone(&node)).await.unwrap();
        assert!(registry.lookup(&name).await.is_some());
        assert_eq!(registry.len(), 1);

        registry.remove(&name).await;
        assert!(registry.lookup(&name).await.is_none());
        assert!(registry.is_empty());

        // Removing again is a no-op.
        registry.remove(&name).await;
    }
}
