//! Deployment-descriptor assembly.
//!
//! One [`DescriptorBuilder`] per profile; [`DescriptorBuilder::build`] turns
//! a template plus a fresh agent identity into the submittable document.
//! Entries declared on the template come first, profile-level defaults are
//! appended after them, and malformed or unresolvable entries are skipped
//! rather than failing the attempt.

use std::sync::Arc;

use cirrus_cloud::{DeploymentDocument, FileShare};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::channel::AgentChannel;
use crate::config::{CloudProfile, ContainerTemplate, EnvVar, LaunchMethod, RegistryRef, VolumeSpec};
use crate::error::ProvisionResult;
use crate::secrets::CredentialStore;
use crate::types::{generate_volume_name, AgentIdentity};

const PUBLIC_REGISTRY_SERVER: &str = "index.docker.io";

/// Builds deployment descriptors for one cloud profile.
pub struct DescriptorBuilder {
    profile: Arc<CloudProfile>,
    credentials: Arc<dyn CredentialStore>,
}

impl DescriptorBuilder {
    /// Create a builder over the given profile and credential store.
    #[must_use]
    pub fn new(profile: Arc<CloudProfile>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            profile,
            credentials,
        }
    }

    /// Assemble the descriptor for one provisioning attempt.
    pub async fn build(
        &self,
        template: &ContainerTemplate,
        identity: &AgentIdentity,
        channel: &dyn AgentChannel,
    ) -> ProvisionResult<DeploymentDocument> {
        let mut doc = if template.public_ip {
            DeploymentDocument::public_ip()
        } else {
            DeploymentDocument::private_ip()
        };

        self.fill_variables(&mut doc, template, identity);
        self.fill_command(&mut doc, template, identity, channel);
        fill_ports(&mut doc, template);
        self.fill_environment(&mut doc, template);
        self.fill_registry_credentials(&mut doc, template).await;
        self.fill_volumes(&mut doc, template).await;

        Ok(doc)
    }

    fn fill_variables(
        &self,
        doc: &mut DeploymentDocument,
        template: &ContainerTemplate,
        identity: &AgentIdentity,
    ) {
        let vars = doc.variables_mut();
        vars.container_name = identity.node_name().to_owned();
        vars.container_image = template.image.clone();
        vars.os_type = template.os_type.as_str().to_owned();
        vars.cpu = template.cpu.clone();
        vars.memory = template.memory.clone();
        vars.controller_instance = self.profile.controller.instance_id.clone();

        if !template.public_ip {
            // Validated at load time: private-IP templates carry both names.
            let network = template.network_name.clone().unwrap_or_default();
            let subnet = template.subnet_name.clone().unwrap_or_default();
            vars.network_profile_name = Some(format!("profile_{network}_{subnet}"));
            vars.interface_config_name = Some(format!("icn_{network}_{subnet}"));
            vars.network_name = Some(network);
            vars.sub_net_name = Some(subnet);
        }
    }

    fn fill_command(
        &self,
        doc: &mut DeploymentDocument,
        template: &ContainerTemplate,
        identity: &AgentIdentity,
        channel: &dyn AgentChannel,
    ) {
        let Some(command) = template.command.as_deref() else {
            return;
        };

        let command = match template.launch_method {
            LaunchMethod::Handshake => command
                .replace("${rootUrl}", &self.profile.controller.url)
                .replace("${nodeName}", identity.node_name())
                .replace("${secret}", channel.handshake_secret().expose_secret()),
            LaunchMethod::Shell => command.to_owned(),
        };

        for token in command.split_whitespace() {
            doc.push_command(token);
        }
    }

    fn fill_environment(&self, doc: &mut DeploymentDocument, template: &ContainerTemplate) {
        let entries = template.env_vars.iter().chain(&self.profile.default_env_vars);
        for EnvVar { key, value } in entries {
            if key.trim().is_empty() {
                continue;
            }
            doc.push_env(key.clone(), value.clone());
        }
    }

    async fn fill_registry_credentials(
        &self,
        doc: &mut DeploymentDocument,
        template: &ContainerTemplate,
    ) {
        let refs = template
            .registry_credentials
            .iter()
            .chain(&self.profile.default_registry_credentials);

        for RegistryRef { url, credentials_id } in refs {
            if credentials_id.trim().is_empty() {
                continue;
            }
            let Some(creds) = self.credentials.username_password(credentials_id).await else {
                debug!(
                    credentials_id = %credentials_id,
                    "registry credential reference did not resolve, skipping"
                );
                continue;
            };
            doc.push_registry_credential(
                registry_server(url.as_deref()),
                creds.username,
                creds.password.expose_secret(),
            );
        }
    }

    async fn fill_volumes(&self, doc: &mut DeploymentDocument, template: &ContainerTemplate) {
        let specs = template.volumes.iter().chain(&self.profile.default_volumes);

        for spec in specs {
            if !spec.is_complete() {
                continue;
            }
            let VolumeSpec {
                mount_path,
                share_name,
                credentials_id,
            } = spec;
            let Some(creds) = self.credentials.file_share(credentials_id).await else {
                debug!(
                    credentials_id = %credentials_id,
                    "file-share credential reference did not resolve, skipping volume"
                );
                continue;
            };
            doc.push_volume(
                generate_volume_name(),
                mount_path.clone(),
                FileShare {
                    share_name: share_name.clone(),
                    storage_account_name: creds.storage_account_name,
                    storage_account_key: creds.storage_account_key.expose_secret().to_owned(),
                },
            );
        }
    }
}

fn fill_ports(doc: &mut DeploymentDocument, template: &ContainerTemplate) {
    for port in &template.ports {
        if port.trim().is_empty() {
            continue;
        }
        doc.push_port(port.trim());
    }
    if template.launch_method == LaunchMethod::Shell {
        doc.push_port(&template.ssh_port.to_string());
    }
}

fn registry_server(url: Option<&str>) -> String {
    match url.map(str::trim) {
        None | Some("") => PUBLIC_REGISTRY_SERVER.to_owned(),
        Some(url) => url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url)
            .to_owned(),
    }
}
