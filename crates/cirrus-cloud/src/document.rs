//! Typed deployment-descriptor documents.
//!
//! A [`DeploymentDocument`] is the descriptor submitted to the control plane
//! to materialise one container group. Two base variants exist: a public-IP
//! document that exposes endpoint ports, and a private-IP document that
//! attaches the group to a virtual-network profile instead.
//!
//! The document is assembled field-by-field: scalar values land in the
//! `variables` section (which the resource definitions reference), while the
//! repeated sections (command tokens, ports, environment variables, registry
//! credentials and volumes) are exposed through push-only methods. Entries
//! are never removed or overwritten once appended.

use serde::Serialize;

const SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#";
const CONTENT_VERSION: &str = "1.0.0.0";
const CONTAINER_GROUP_TYPE: &str = "Microsoft.ContainerInstance/containerGroups";
const CONTAINER_GROUP_API_VERSION: &str = "2018-10-01";
const NETWORK_PROFILE_TYPE: &str = "Microsoft.Network/networkProfiles";
const NETWORK_PROFILE_API_VERSION: &str = "2018-07-01";

/// Scalar variables substituted into the document before submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variables {
    /// Container (and container group) name.
    pub container_name: String,
    /// Container image reference.
    pub container_image: String,
    /// Operating system type of the container.
    pub os_type: String,
    /// Requested CPU cores.
    pub cpu: String,
    /// Requested memory in GB.
    pub memory: String,
    /// Correlation id of the controller instance that owns the agent.
    pub controller_instance: String,
    /// Virtual network name (private-IP documents only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,
    /// Subnet name (private-IP documents only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_net_name: Option<String>,
    /// Derived network-profile identifier (private-IP documents only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_profile_name: Option<String>,
    /// Derived interface-configuration identifier (private-IP documents only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_config_name: Option<String>,
}

/// A container port entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerPort {
    /// Port number.
    pub port: String,
}

/// A public endpoint port entry. Protocol is fixed to TCP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointPort {
    /// Endpoint protocol, always `tcp`.
    pub protocol: &'static str,
    /// Port number.
    pub port: String,
}

/// An environment variable entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentEntry {
    /// Variable name.
    pub name: String,
    /// Variable value; blank values are allowed.
    pub value: String,
}

/// A registry credential entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryCredentialEntry {
    /// Registry server, without a protocol prefix.
    pub server: String,
    /// Registry username.
    pub username: String,
    /// Registry password, submitted verbatim.
    pub password: String,
}

/// A volume mount entry on the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Generated volume name, matching a [`VolumeEntry`].
    pub name: String,
    /// Mount path inside the container.
    pub mount_path: String,
}

/// Backing file share for a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileShare {
    /// File share name.
    pub share_name: String,
    /// Storage account owning the share.
    pub storage_account_name: String,
    /// Storage account key, submitted verbatim.
    pub storage_account_key: String,
}

/// A volume definition entry on the container group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeEntry {
    /// Generated volume name, matching a [`VolumeMount`].
    pub name: String,
    /// Backing file share.
    pub azure_file: FileShare,
}

/// Resource requests for the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequests {
    /// CPU request, referencing the `cpu` variable.
    pub cpu: &'static str,
    /// Memory request in GB, referencing the `memory` variable.
    pub memory_in_gb: &'static str,
}

/// Resource requirements wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRequirements {
    /// Requested resources.
    pub requests: ResourceRequests,
}

/// Properties of the single container in the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProperties {
    /// Image reference, via the `containerImage` variable.
    pub image: &'static str,
    /// Launch command as a token list.
    pub command: Vec<String>,
    /// Exposed container ports.
    pub ports: Vec<ContainerPort>,
    /// Environment variables.
    pub environment_variables: Vec<EnvironmentEntry>,
    /// Volume mounts.
    pub volume_mounts: Vec<VolumeMount>,
    /// Resource requests.
    pub resources: ResourceRequirements,
}

/// The single container in the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    /// Container name, via the `containerName` variable.
    pub name: &'static str,
    /// Container properties.
    pub properties: ContainerProperties,
}

/// Public IP address block with endpoint ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpAddress {
    /// Address type, always `Public`.
    #[serde(rename = "type")]
    pub address_type: &'static str,
    /// Exposed endpoint ports.
    pub ports: Vec<EndpointPort>,
}

/// Reference from the container group to its network profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkProfileRef {
    /// Resource id expression resolving the profile.
    pub id: &'static str,
}

/// Group-level tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tags {
    /// Controller instance that provisioned the group.
    pub provisioned_by: &'static str,
}

/// Properties of the container group resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerGroupProperties {
    /// Containers in the group; always exactly one for agents.
    pub containers: Vec<Container>,
    /// OS type, via the `osType` variable.
    pub os_type: &'static str,
    /// Restart policy; agents are never restarted in place.
    pub restart_policy: &'static str,
    /// Public address block (public-IP documents only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddress>,
    /// Registry credentials for private images.
    pub image_registry_credentials: Vec<RegistryCredentialEntry>,
    /// Volume definitions.
    pub volumes: Vec<VolumeEntry>,
    /// Network profile reference (private-IP documents only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_profile: Option<NetworkProfileRef>,
}

/// The container group resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerGroupResource {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: &'static str,
    /// API version.
    pub api_version: &'static str,
    /// Group name, via the `containerName` variable.
    pub name: &'static str,
    /// Deployment location expression.
    pub location: &'static str,
    /// Resources this group depends on.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<&'static str>,
    /// Group tags.
    pub tags: Tags,
    /// Group properties.
    pub properties: ContainerGroupProperties,
}

/// Subnet reference inside the network profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetRef {
    /// Resource id expression resolving the subnet.
    pub id: &'static str,
}

/// IP configuration properties inside the network profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpConfigurationProperties {
    /// Target subnet.
    pub subnet: SubnetRef,
}

/// IP configuration inside the network profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpConfiguration {
    /// Configuration name.
    pub name: &'static str,
    /// Configuration properties.
    pub properties: IpConfigurationProperties,
}

/// Container network interface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceConfiguration {
    /// Configuration name, via the `interfaceConfigName` variable.
    pub name: &'static str,
    /// Configuration properties.
    pub properties: InterfaceConfigurationProperties,
}

/// Properties of the interface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceConfigurationProperties {
    /// IP configurations.
    pub ip_configurations: Vec<IpConfiguration>,
}

/// Properties of the network profile resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfileProperties {
    /// Interface configurations.
    pub container_network_interface_configurations: Vec<InterfaceConfiguration>,
}

/// The network profile resource (private-IP documents only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfileResource {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: &'static str,
    /// API version.
    pub api_version: &'static str,
    /// Profile name, via the `networkProfileName` variable.
    pub name: &'static str,
    /// Deployment location expression.
    pub location: &'static str,
    /// Profile properties.
    pub properties: NetworkProfileProperties,
}

/// A resource in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    /// The container group hosting the agent.
    ContainerGroup(ContainerGroupResource),
    /// The network profile attaching the group to a subnet.
    NetworkProfile(NetworkProfileResource),
}

/// A complete deployment descriptor.
///
/// Built once per provisioning attempt, submitted verbatim, never mutated
/// after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDocument {
    #[serde(rename = "$schema")]
    schema: &'static str,
    content_version: &'static str,
    variables: Variables,
    // Container group is always at index 0; private fields keep it that way.
    resources: Vec<Resource>,
}

impl DeploymentDocument {
    fn base_container_group(public_ip: bool) -> ContainerGroupResource {
        ContainerGroupResource {
            resource_type: CONTAINER_GROUP_TYPE,
            api_version: CONTAINER_GROUP_API_VERSION,
            name: "[variables('containerName')]",
            location: "[resourceGroup().location]",
            depends_on: if public_ip {
                Vec::new()
            } else {
                vec!["[resourceId('Microsoft.Network/networkProfiles', variables('networkProfileName'))]"]
            },
            tags: Tags {
                provisioned_by: "[variables('controllerInstance')]",
            },
            properties: ContainerGroupProperties {
                containers: vec![Container {
                    name: "[variables('containerName')]",
                    properties: ContainerProperties {
                        image: "[variables('containerImage')]",
                        command: Vec::new(),
                        ports: Vec::new(),
                        environment_variables: Vec::new(),
                        volume_mounts: Vec::new(),
                        resources: ResourceRequirements {
                            requests: ResourceRequests {
                                cpu: "[variables('cpu')]",
                                memory_in_gb: "[variables('memory')]",
                            },
                        },
                    },
                }],
                os_type: "[variables('osType')]",
                restart_policy: "Never",
                ip_address: public_ip.then(|| IpAddress {
                    address_type: "Public",
                    ports: Vec::new(),
                }),
                image_registry_credentials: Vec::new(),
                volumes: Vec::new(),
                network_profile: (!public_ip).then(|| NetworkProfileRef {
                    id: "[resourceId('Microsoft.Network/networkProfiles', variables('networkProfileName'))]",
                }),
            },
        }
    }

    /// Base document for agents with a public endpoint address.
    #[must_use]
    pub fn public_ip() -> Self {
        Self {
            schema: SCHEMA,
            content_version: CONTENT_VERSION,
            variables: Variables::default(),
            resources: vec![Resource::ContainerGroup(Self::base_container_group(true))],
        }
    }

    /// Base document for agents attached to a private subnet.
    #[must_use]
    pub fn private_ip() -> Self {
        Self {
            schema: SCHEMA,
            content_version: CONTENT_VERSION,
            variables: Variables::default(),
            resources: vec![
                Resource::ContainerGroup(Self::base_container_group(false)),
                Resource::NetworkProfile(NetworkProfileResource {
                    resource_type: NETWORK_PROFILE_TYPE,
                    api_version: NETWORK_PROFILE_API_VERSION,
                    name: "[variables('networkProfileName')]",
                    location: "[resourceGroup().location]",
                    properties: NetworkProfileProperties {
                        container_network_interface_configurations: vec![InterfaceConfiguration {
                            name: "[variables('interfaceConfigName')]",
                            properties: InterfaceConfigurationProperties {
                                ip_configurations: vec![IpConfiguration {
                                    name: "ipconfig",
                                    properties: IpConfigurationProperties {
                                        subnet: SubnetRef {
                                            id: "[resourceId('Microsoft.Network/virtualNetworks/subnets', variables('networkName'), variables('subNetName'))]",
                                        },
                                    },
                                }],
                            },
                        }],
                    },
                }),
            ],
        }
    }

    /// Whether this document exposes a public endpoint address.
    #[must_use]
    pub fn is_public_ip(&self) -> bool {
        self.group().properties.ip_address.is_some()
    }

    /// The scalar variables.
    #[must_use]
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Mutable access to the scalar variables.
    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    /// Number of resources in the document.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    fn group(&self) -> &ContainerGroupResource {
        match &self.resources[0] {
            Resource::ContainerGroup(group) => group,
            Resource::NetworkProfile(_) => unreachable!("container group is always resource 0"),
        }
    }

    fn group_mut(&mut self) -> &mut ContainerGroupResource {
        match &mut self.resources[0] {
            Resource::ContainerGroup(group) => group,
            Resource::NetworkProfile(_) => unreachable!("container group is always resource 0"),
        }
    }

    fn container_mut(&mut self) -> &mut ContainerProperties {
        &mut self.group_mut().properties.containers[0].properties
    }

    /// Append one launch-command token.
    pub fn push_command(&mut self, token: impl Into<String>) {
        self.container_mut().command.push(token.into());
    }

    /// Append a container port. For public-IP documents a matching TCP
    /// endpoint port is appended as well.
    pub fn push_port(&mut self, port: &str) {
        self.container_mut().ports.push(ContainerPort {
            port: port.to_owned(),
        });
        if let Some(ip) = &mut self.group_mut().properties.ip_address {
            ip.ports.push(EndpointPort {
                protocol: "tcp",
                port: port.to_owned(),
            });
        }
    }

    /// Append an environment variable entry.
    pub fn push_env(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.container_mut().environment_variables.push(EnvironmentEntry {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Append a registry credential entry.
    pub fn push_registry_credential(
        &mut self,
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) {
        self.group_mut()
            .properties
            .image_registry_credentials
            .push(RegistryCredentialEntry {
                server: server.into(),
                username: username.into(),
                password: password.into(),
            });
    }

    /// Append a volume mount and its matching volume definition.
    pub fn push_volume(&mut self, name: impl Into<String>, mount_path: impl Into<String>, share: FileShare) {
        let name = name.into();
        self.container_mut().volume_mounts.push(VolumeMount {
            name: name.clone(),
            mount_path: mount_path.into(),
        });
        self.group_mut().properties.volumes.push(VolumeEntry {
            name,
            azure_file: share,
        });
    }

    /// Command tokens appended so far.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.group().properties.containers[0].properties.command
    }

    /// Container ports appended so far.
    #[must_use]
    pub fn container_ports(&self) -> &[ContainerPort] {
        &self.group().properties.containers[0].properties.ports
    }

    /// Public endpoint ports appended so far (empty for private-IP documents).
    #[must_use]
    pub fn endpoint_ports(&self) -> &[EndpointPort] {
        self.group()
            .properties
            .ip_address
            .as_ref()
            .map_or(&[], |ip| ip.ports.as_slice())
    }

    /// Environment entries appended so far.
    #[must_use]
    pub fn environment(&self) -> &[EnvironmentEntry] {
        &self.group().properties.containers[0]
            .properties
            .environment_variables
    }

    /// Registry credential entries appended so far.
    #[must_use]
    pub fn registry_credentials(&self) -> &[RegistryCredentialEntry] {
        &self.group().properties.image_registry_credentials
    }

    /// Volume mount entries appended so far.
    #[must_use]
    pub fn volume_mounts(&self) -> &[VolumeMount] {
        &self.group().properties.containers[0].properties.volume_mounts
    }

    /// Volume definition entries appended so far.
    #[must_use]
    pub fn volumes(&self) -> &[VolumeEntry] {
        &self.group().properties.volumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_document_field_paths() {
        let mut doc = DeploymentDocument::public_ip();
        doc.variables_mut().container_name = "agent-1".to_owned();
        doc.push_command("run");
        doc.push_port("8080");
        doc.push_env("KEY", "value");

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["variables"]["containerName"], "agent-1");
        assert_eq!(
            json["resources"][0]["properties"]["containers"][0]["properties"]["command"][0],
            "run"
        );
        assert_eq!(
            json["resources"][0]["properties"]["containers"][0]["properties"]["ports"][0]["port"],
            "8080"
        );
        assert_eq!(
            json["resources"][0]["properties"]["ipAddress"]["ports"][0]["protocol"],
            "tcp"
        );
        assert_eq!(
            json["resources"][0]["properties"]["containers"][0]["properties"]
                ["environmentVariables"][0]["name"],
            "KEY"
        );
    }

    #[test]
    fn private_document_has_network_profile() {
        let doc = DeploymentDocument::private_ip();
        assert!(!doc.is_public_ip());
        assert_eq!(doc.resource_count(), 2);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["resources"][1]["type"], NETWORK_PROFILE_TYPE);
        assert!(json["resources"][0]["properties"]["ipAddress"].is_null());
        assert_eq!(
            json["resources"][0]["properties"]["networkProfile"]["id"],
            "[resourceId('Microsoft.Network/networkProfiles', variables('networkProfileName'))]"
        );
    }

    #[test]
    fn private_document_ports_have_no_endpoint_mirror() {
        let mut doc = DeploymentDocument::private_ip();
        doc.push_port("8080");
        assert_eq!(doc.container_ports().len(), 1);
        assert!(doc.endpoint_ports().is_empty());
    }

    #[test]
    fn appends_are_additive() {
        let mut doc = DeploymentDocument::public_ip();
        doc.push_port("1");
        doc.push_port("2");
        doc.push_env("A", "1");
        doc.push_env("B", "");
        doc.push_registry_credential("registry.example.com", "user", "pass");
        doc.push_volume(
            "volume-a",
            "/mnt/a",
            FileShare {
                share_name: "share".to_owned(),
                storage_account_name: "account".to_owned(),
                storage_account_key: "key".to_owned(),
            },
        );

        assert_eq!(doc.container_ports().len(), 2);
        assert_eq!(doc.endpoint_ports().len(), 2);
        assert_eq!(doc.environment().len(), 2);
        assert_eq!(doc.registry_credentials().len(), 1);
        assert_eq!(doc.volume_mounts().len(), 1);
        assert_eq!(doc.volumes().len(), 1);
        assert_eq!(doc.volume_mounts()[0].name, doc.volumes()[0].name);
    }

    #[test]
    fn blank_value_env_is_serialised() {
        let mut doc = DeploymentDocument::public_ip();
        doc.push_env("EMPTY", "");
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json["resources"][0]["properties"]["containers"][0]["properties"]
                ["environmentVariables"][0]["value"],
            ""
        );
    }
}
