//! Cloud control-plane surface for container-instance deployments.
//!
//! This crate defines the contract between the provisioning orchestrator and
//! the cloud account it deploys into:
//!
//! - **Deployment documents**: the typed descriptor submitted to the control
//!   plane to materialise a container group ([`DeploymentDocument`]). The
//!   document is assembled field-by-field and its repeated sections (ports,
//!   environment variables, registry credentials, volumes) are append-only.
//! - **Remote state**: the asynchronous deployment state machine
//!   ([`ProvisioningState`]) and the runtime view of a deployed container
//!   group ([`ContainerGroupInfo`]).
//! - **Client trait**: [`CloudClient`], the seam behind which a concrete SDK
//!   client lives. Authentication and transport construction are the host's
//!   concern; this crate ships [`MockCloudClient`] for tests and local
//!   development.

#![forbid(unsafe_code)]

pub mod client;
pub mod document;
pub mod types;

pub use client::{CloudClient, CloudError, CloudResult, MockCloudClient};
pub use document::{DeploymentDocument, FileShare};
pub use types::{
    ContainerGroupInfo, ContainerState, ContainerView, DeploymentInfo, ProvisioningState,
};
