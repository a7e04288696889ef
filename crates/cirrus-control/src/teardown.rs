//! Best-effort agent teardown.

use std::collections::HashMap;
use std::sync::Arc;

use cirrus_cloud::{CloudClient, ProvisioningState};
use tracing::{info, warn};

use crate::telemetry::{events, TelemetrySink, CATEGORY_CONTAINER_AGENT};

/// Removes an agent's cloud resources.
///
/// Every step is best-effort: failures are logged and telemetered but never
/// propagated, so teardown can run from cleanup paths that are themselves
/// handling an error. The container group is always deleted; the deployment
/// record is deleted only when its last observed state is `Succeeded`, so
/// failed deployments stay inspectable in the cloud account.
pub struct TeardownService {
    cloud: Arc<dyn CloudClient>,
    telemetry: Arc<dyn TelemetrySink>,
    resource_group: String,
}

impl TeardownService {
    /// Create a teardown service for the given resource group.
    #[must_use]
    pub fn new(
        cloud: Arc<dyn CloudClient>,
        telemetry: Arc<dyn TelemetrySink>,
        resource_group: impl Into<String>,
    ) -> Self {
        Self {
            cloud,
            telemetry,
            resource_group: resource_group.into(),
        }
    }

    /// Destroy the agent's container group and, when safe, its deployment
    /// record.
    pub async fn destroy(&self, group_name: &str, deployment_name: Option<&str>) {
        self.delete_group(group_name).await;
        if let Some(deployment) = deployment_name {
            self.delete_deployment_record(deployment).await;
        }
    }

    async fn delete_group(&self, group_name: &str) {
        match self
            .cloud
            .delete_container_group(&self.resource_group, group_name)
            .await
        {
            Ok(()) => {
                info!(agent = group_name, "container group deleted");
                self.emit(events::DELETED, group_name);
            }
            Err(error) => {
                warn!(agent = group_name, %error, "container group deletion failed");
                self.emit(events::DELETE_FAILED, group_name);
            }
        }
    }

    async fn delete_deployment_record(&self, deployment: &str) {
        let state = match self
            .cloud
            .get_deployment(&self.resource_group, deployment)
            .await
        {
            Ok(info) => info.provisioning_state,
            Err(error) => {
                warn!(deployment, %error, "deployment state lookup failed, keeping record");
                return;
            }
        };

        if state != ProvisioningState::Succeeded {
            info!(deployment, %state, "keeping deployment record for inspection");
            return;
        }

        match self
            .cloud
            .delete_deployment(&self.resource_group, deployment)
            .await
        {
            Ok(()) => {
                info!(deployment, "deployment record deleted");
                self.emit(events::DEPLOYMENT_DELETED, deployment);
            }
            Err(error) => {
                warn!(deployment, %error, "deployment record deletion failed");
                self.emit(events::DEPLOYMENT_DELETE_FAILED, deployment);
            }
        }
    }

    fn emit(&self, event: &str, name: &str) {
        let mut properties = HashMap::new();
        properties.insert("name".to_owned(), name.to_owned());
        self.telemetry
            .emit(CATEGORY_CONTAINER_AGENT, event, &properties);
    }
}
