//! Cloud profile and container template configuration.
//!
//! A [`CloudProfile`] is read from persisted configuration and is immutable
//! for the lifetime of a provisioning cycle. The per-template retry gate is
//! deliberately not part of the profile: it is transient state reconstructed
//! on every process start.

use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ProvisionError, ProvisionResult};

/// A cloud profile: one account-level provisioning target.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudProfile {
    /// Profile name.
    pub name: String,

    /// Reference to the credentials used to build the cloud client.
    pub credentials_id: String,

    /// Resource group all agent deployments land in.
    pub resource_group: String,

    /// Controller endpoint agents connect back to.
    pub controller: ControllerConfig,

    /// Container templates owned by this profile, in declared order.
    #[serde(default)]
    pub templates: Vec<ContainerTemplate>,

    /// Environment variables applied to every template.
    #[serde(default)]
    pub default_env_vars: Vec<EnvVar>,

    /// Registry credentials applied to every template.
    #[serde(default)]
    pub default_registry_credentials: Vec<RegistryRef>,

    /// Volumes applied to every template.
    #[serde(default)]
    pub default_volumes: Vec<VolumeSpec>,
}

impl CloudProfile {
    /// Load the profile from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override
    /// earlier): `cirrus.toml` in the current directory, then environment
    /// variables with a `CIRRUS_` prefix.
    pub fn load() -> ProvisionResult<Self> {
        Figment::new()
            .merge(Toml::file("cirrus.toml"))
            .merge(Env::prefixed("CIRRUS_").split("__"))
            .extract::<Self>()
            .map_err(|e| ProvisionError::Config(e.to_string()))
            .and_then(Self::validated)
    }

    /// Load the profile from a TOML string. Primarily for tests.
    pub fn from_toml(toml: &str) -> ProvisionResult<Self> {
        Figment::new()
            .merge(Toml::string(toml))
            .extract::<Self>()
            .map_err(|e| ProvisionError::Config(e.to_string()))
            .and_then(Self::validated)
    }

    fn validated(self) -> ProvisionResult<Self> {
        for template in &self.templates {
            template.validate()?;
        }
        Ok(self)
    }
}

/// Controller endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// URL agents use to reach the controller.
    pub url: String,

    /// Correlation id identifying this controller instance in the cloud
    /// account (attached to every container group it provisions).
    pub instance_id: String,
}

/// Operating system type of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    /// Linux containers.
    #[default]
    Linux,
    /// Windows containers.
    Windows,
}

impl OsType {
    /// The control-plane representation of this OS type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Windows => "Windows",
        }
    }
}

/// How an agent joins the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMethod {
    /// The agent initiates a handshake against the controller URL, using a
    /// one-time secret baked into its launch command.
    #[default]
    Handshake,
    /// The controller initiates a shell connection to the agent's address.
    Shell,
}

/// An environment variable declared on a template or profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvVar {
    /// Variable name. Blank keys are skipped at build time.
    pub key: String,
    /// Variable value. Blank values are allowed.
    #[serde(default)]
    pub value: String,
}

/// A reference to registry credentials held by the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryRef {
    /// Registry URL. When absent the public registry host is assumed.
    #[serde(default)]
    pub url: Option<String>,
    /// Credential-store reference. Blank references are skipped at build
    /// time; references that resolve to nothing are silently skipped too.
    pub credentials_id: String,
}

/// A file-share volume declared on a template or profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VolumeSpec {
    /// Mount path inside the container.
    pub mount_path: String,
    /// File share name.
    pub share_name: String,
    /// Credential-store reference resolving the storage account name/key.
    pub credentials_id: String,
}

impl VolumeSpec {
    /// Whether all fields required to mount the volume are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.mount_path.trim().is_empty()
            && !self.share_name.trim().is_empty()
            && !self.credentials_id.trim().is_empty()
    }
}

/// A declarative container template.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerTemplate {
    /// Template name; agent and deployment names derive from it.
    pub name: String,

    /// Space-separated label set this template serves. Absent means the
    /// template only serves unlabelled requests.
    #[serde(default)]
    pub label: Option<String>,

    /// Container image reference.
    pub image: String,

    /// Operating system type.
    #[serde(default)]
    pub os_type: OsType,

    /// Requested CPU cores.
    #[serde(default = "default_cpu")]
    pub cpu: String,

    /// Requested memory in GB.
    #[serde(default = "default_memory")]
    pub memory: String,

    /// Declared container ports. Blank entries are skipped at build time.
    #[serde(default)]
    pub ports: Vec<String>,

    /// How the agent joins the controller.
    #[serde(default)]
    pub launch_method: LaunchMethod,

    /// Port appended unconditionally for the shell launch method.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Startup command. For the handshake launch method the placeholders
    /// `${rootUrl}`, `${nodeName}` and `${secret}` are substituted before
    /// submission.
    #[serde(default)]
    pub command: Option<String>,

    /// Template environment variables.
    #[serde(default)]
    pub env_vars: Vec<EnvVar>,

    /// Template registry credentials.
    #[serde(default)]
    pub registry_credentials: Vec<RegistryRef>,

    /// Template volumes.
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,

    /// Wall-clock budget for one provisioning attempt, in seconds. Shared
    /// between the deployment and connectivity phases.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Whether the agent gets a public endpoint address.
    #[serde(default = "default_public_ip")]
    pub public_ip: bool,

    /// Virtual network name. Required for private-IP templates.
    #[serde(default)]
    pub network_name: Option<String>,

    /// Subnet name. Required for private-IP templates.
    #[serde(default)]
    pub subnet_name: Option<String>,
}

fn default_cpu() -> String {
    "1".to_owned()
}

fn default_memory() -> String {
    "1.5".to_owned()
}

const fn default_ssh_port() -> u16 {
    22
}

const fn default_timeout_secs() -> u64 {
    600
}

const fn default_public_ip() -> bool {
    true
}

impl ContainerTemplate {
    /// Whether this template serves the requested label.
    ///
    /// A `None` label is a wildcard request satisfied by any template; a
    /// concrete label must appear in the template's label set.
    #[must_use]
    pub fn matches(&self, label: Option<&str>) -> bool {
        match label {
            None => true,
            Some(requested) => self
                .label
                .as_deref()
                .map(|set| set.split_whitespace().any(|l| l == requested))
                .unwrap_or(false),
        }
    }

    /// The attempt's wall-clock budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> ProvisionResult<()> {
        if self.name.trim().is_empty() {
            return Err(ProvisionError::config("template name must not be blank"));
        }
        if self.image.trim().is_empty() {
            return Err(ProvisionError::config(format!(
                "template {}: image must not be blank",
                self.name
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ProvisionError::config(format!(
                "template {}: timeout must be positive",
                self.name
            )));
        }
        if !self.public_ip && (self.network_name.is_none() || self.subnet_name.is_none()) {
            return Err(ProvisionError::config(format!(
                "template {}: private-IP templates need network_name and subnet_name",
                self.name
            )));
        }
        Ok(())
    }
}
