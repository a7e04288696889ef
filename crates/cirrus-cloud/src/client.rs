//! Cloud control-plane client trait and in-memory mock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::document::DeploymentDocument;
use crate::types::{ContainerGroupInfo, ContainerState, ContainerView, DeploymentInfo, ProvisioningState};

/// Result type alias using [`CloudError`].
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors reported by the cloud control plane.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// Transport-level failure talking to the control plane.
    #[error("transport error: {0}")]
    Transport(String),

    /// The named deployment does not exist.
    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    /// The named container group does not exist.
    #[error("container group not found: {0}")]
    GroupNotFound(String),

    /// The control plane rejected the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl CloudError {
    /// Create a transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Client for the cloud control plane.
///
/// A concrete implementation wraps the provider SDK; constructing and
/// authenticating that client is the host's responsibility. All operations
/// act within a single subscription; the resource group is passed per call.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Submit a deployment in incremental mode.
    ///
    /// Incremental mode never removes pre-existing resources in the group.
    /// The call returns as soon as the control plane accepts the request;
    /// the deployment itself completes asynchronously and is observed via
    /// [`CloudClient::get_deployment`].
    async fn create_deployment(
        &self,
        resource_group: &str,
        name: &str,
        document: &DeploymentDocument,
    ) -> CloudResult<()>;

    /// Fetch the current status of a deployment.
    async fn get_deployment(&self, resource_group: &str, name: &str) -> CloudResult<DeploymentInfo>;

    /// Fetch the runtime view of a container group.
    async fn get_container_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> CloudResult<ContainerGroupInfo>;

    /// Fetch the current log content of a container in a group.
    async fn container_logs(
        &self,
        resource_group: &str,
        group: &str,
        container: &str,
    ) -> CloudResult<String>;

    /// Delete a container group.
    async fn delete_container_group(&self, resource_group: &str, name: &str) -> CloudResult<()>;

    /// Delete a deployment record.
    async fn delete_deployment(&self, resource_group: &str, name: &str) -> CloudResult<()>;
}

#[derive(Debug)]
struct MockDeployment {
    states: VecDeque<ProvisioningState>,
}

#[derive(Debug)]
struct Inner {
    plans: VecDeque<Vec<ProvisioningState>>,
    deployments: HashMap<String, MockDeployment>,
    groups: HashMap<String, ContainerGroupInfo>,
    logs: HashMap<String, String>,
    default_ip: Option<String>,
    default_container_state: ContainerState,
    default_logs: String,
    created: Vec<(String, DeploymentDocument)>,
    log_fetches: Vec<String>,
    deleted_groups: Vec<String>,
    deleted_deployments: Vec<String>,
    fail_creates: VecDeque<String>,
    fail_get_deployments: VecDeque<String>,
    fail_delete_group: bool,
    fail_delete_deployment: bool,
}

/// In-memory [`CloudClient`] for tests and local development.
///
/// Each created deployment consumes the next scripted state plan (default:
/// immediately `Succeeded`); `get_deployment` walks the plan one state per
/// poll and repeats the final state thereafter. Creating a deployment also
/// materialises a container group named after the document's `containerName`
/// variable, so connectivity checks observe a running container with an
/// assigned address.
#[derive(Debug)]
pub struct MockCloudClient {
    inner: Mutex<Inner>,
}

impl Default for MockCloudClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloudClient {
    /// Create a mock with default behaviour: deployments succeed on the
    /// first poll and groups come up running at `10.0.0.4`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                plans: VecDeque::new(),
                deployments: HashMap::new(),
                groups: HashMap::new(),
                logs: HashMap::new(),
                default_ip: Some("10.0.0.4".to_owned()),
                default_container_state: ContainerState::Running,
                default_logs: "agent starting\n".to_owned(),
                created: Vec::new(),
                log_fetches: Vec::new(),
                deleted_groups: Vec::new(),
                deleted_deployments: Vec::new(),
                fail_creates: VecDeque::new(),
                fail_get_deployments: VecDeque::new(),
                fail_delete_group: false,
                fail_delete_deployment: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a state plan for the next created deployment.
    ///
    /// Plans are consumed in creation order; a deployment created with no
    /// queued plan succeeds on the first poll.
    pub fn push_deployment_plan(&self, states: Vec<ProvisioningState>) {
        self.lock().plans.push_back(states);
    }

    /// Override the view returned for a specific container group.
    pub fn set_container_group(&self, name: impl Into<String>, info: ContainerGroupInfo) {
        self.lock().groups.insert(name.into(), info);
    }

    /// Set the container state used for auto-materialised groups.
    pub fn set_default_container_state(&self, state: ContainerState) {
        self.lock().default_container_state = state;
    }

    /// Set the address assigned to auto-materialised groups.
    pub fn set_default_ip(&self, ip: Option<String>) {
        self.lock().default_ip = ip;
    }

    /// Set the log content returned for a specific group.
    pub fn set_logs(&self, group: impl Into<String>, content: impl Into<String>) {
        self.lock().logs.insert(group.into(), content.into());
    }

    /// Make the next `create_deployment` call fail with a transport error.
    pub fn fail_next_create(&self, msg: impl Into<String>) {
        self.lock().fail_creates.push_back(msg.into());
    }

    /// Make the next `get_deployment` call fail with a transport error.
    pub fn fail_next_get_deployment(&self, msg: impl Into<String>) {
        self.lock().fail_get_deployments.push_back(msg.into());
    }

    /// Make all container-group deletions fail.
    pub fn fail_delete_group(&self) {
        self.lock().fail_delete_group = true;
    }

    /// Make all deployment-record deletions fail.
    pub fn fail_delete_deployment(&self) {
        self.lock().fail_delete_deployment = true;
    }

    /// Deployments submitted so far, in creation order.
    #[must_use]
    pub fn created_deployments(&self) -> Vec<(String, DeploymentDocument)> {
        self.lock().created.clone()
    }

    /// Groups whose logs were fetched, in fetch order.
    #[must_use]
    pub fn log_fetches(&self) -> Vec<String> {
        self.lock().log_fetches.clone()
    }

    /// Container groups deleted so far.
    #[must_use]
    pub fn deleted_groups(&self) -> Vec<String> {
        self.lock().deleted_groups.clone()
    }

    /// Deployment records deleted so far.
    #[must_use]
    pub fn deleted_deployments(&self) -> Vec<String> {
        self.lock().deleted_deployments.clone()
    }
}

#[async_trait]
impl CloudClient for MockCloudClient {
    async fn create_deployment(
        &self,
        _resource_group: &str,
        name: &str,
        document: &DeploymentDocument,
    ) -> CloudResult<()> {
        let mut inner = self.lock();

        if let Some(msg) = inner.fail_creates.pop_front() {
            return Err(CloudError::Transport(msg));
        }

        let states = inner
            .plans
            .pop_front()
            .unwrap_or_else(|| vec![ProvisioningState::Succeeded]);

        inner.created.push((name.to_owned(), document.clone()));
        inner.deployments.insert(
            name.to_owned(),
            MockDeployment {
                states: states.into(),
            },
        );

        let group_name = document.variables().container_name.clone();
        if !group_name.is_empty() && !inner.groups.contains_key(&group_name) {
            let info = ContainerGroupInfo::single(
                group_name.clone(),
                inner.default_container_state.clone(),
                inner.default_ip.clone(),
            );
            inner.groups.insert(group_name, info);
        }

        Ok(())
    }

    async fn get_deployment(&self, _resource_group: &str, name: &str) -> CloudResult<DeploymentInfo> {
        let mut inner = self.lock();

        if let Some(msg) = inner.fail_get_deployments.pop_front() {
            return Err(CloudError::Transport(msg));
        }

        let deployment = inner
            .deployments
            .get_mut(name)
            .ok_or_else(|| CloudError::DeploymentNotFound(name.to_owned()))?;

        let state = if deployment.states.len() > 1 {
            deployment
                .states
                .pop_front()
                .unwrap_or(ProvisioningState::Succeeded)
        } else {
            deployment
                .states
                .front()
                .cloned()
                .unwrap_or(ProvisioningState::Succeeded)
        };

        Ok(DeploymentInfo {
            provisioning_state: state,
        })
    }

    async fn get_container_group(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> CloudResult<ContainerGroupInfo> {
        let inner = self.lock();
        inner
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::GroupNotFound(name.to_owned()))
    }

    async fn container_logs(
        &self,
        _resource_group: &str,
        group: &str,
        _container: &str,
    ) -> CloudResult<String> {
        let mut inner = self.lock();
        inner.log_fetches.push(group.to_owned());
        let content = inner
            .logs
            .get(group)
            .cloned()
            .unwrap_or_else(|| inner.default_logs.clone());
        Ok(content)
    }

    async fn delete_container_group(&self, _resource_group: &str, name: &str) -> CloudResult<()> {
        let mut inner = self.lock();
        if inner.fail_delete_group {
            return Err(CloudError::transport("delete container group refused"));
        }
        inner.groups.remove(name);
        inner.deleted_groups.push(name.to_owned());
        Ok(())
    }

    async fn delete_deployment(&self, _resource_group: &str, name: &str) -> CloudResult<()> {
        let mut inner = self.lock();
        if inner.fail_delete_deployment {
            return Err(CloudError::transport("delete deployment refused"));
        }
        inner.deployments.remove(name);
        inner.deleted_deployments.push(name.to_owned());
        Ok(())
    }
}
