//! Core identity types for provisioned agents.

use std::fmt;

/// Identity of one agent attempt.
///
/// The node name doubles as the container-group and container name in the
/// cloud account; the deployment name is generated separately. Both carry a
/// random suffix so names are never reused, even across concurrent attempts
/// for the same template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    node_name: String,
    deployment_name: String,
}

impl AgentIdentity {
    /// Generate a fresh identity for an attempt against the named template.
    #[must_use]
    pub fn generate(template_name: &str) -> Self {
        let prefix = sanitize_name(template_name);
        Self {
            node_name: format!("{prefix}-{}", random_suffix()),
            deployment_name: format!("{prefix}-{}", random_suffix()),
        }
    }

    /// The agent node name, also the container-group and container name.
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// The deployment name in the cloud account.
    #[must_use]
    pub fn deployment_name(&self) -> &str {
        &self.deployment_name
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_name)
    }
}

fn random_suffix() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// Sanitize a template name into a cloud-safe name prefix.
///
/// Lowercases, maps anything outside `[a-z0-9-]` to `-`, and truncates so
/// the generated names stay within the provider's 63-character limit.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    const MAX_PREFIX: usize = 24;

    let mut out: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    out.truncate(MAX_PREFIX);
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "agent".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Generate a unique volume name for a descriptor volume entry.
#[must_use]
pub fn generate_volume_name() -> String {
    format!("volume-{}", random_suffix())
}
