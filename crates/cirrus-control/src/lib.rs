//! Cirrus Control
//!
//! This crate provisions ephemeral build agents as cloud container instances
//! on behalf of a host CI controller. It turns a capacity request ("N agents
//! for label L") into running, connected agents, and compensates fully when
//! anything along the way fails.
//!
//! # Architecture
//!
//! The orchestrator coordinates four host-provided collaborators, each a
//! trait seam:
//!
//! - **[`CloudClient`]** (from `cirrus-cloud`): submits deployments and
//!   observes container groups
//! - **[`NodeRegistry`]**: the controller's node table; nodes are registered
//!   before their container exists
//! - **[`CredentialStore`]**: resolves registry and file-share credential
//!   references found in templates
//! - **[`AgentChannels`]**: hands out the per-agent handshake secret, or
//!   dials the agent for shell launches
//!
//! # State machine
//!
//! Each provisioning attempt follows a strict state machine enforced at
//! compile time using the typestate pattern:
//!
//! ```text
//! Created ──▶ Deploying ──▶ WaitingOnline ───▶ Online
//!                  │                            ▲
//!                  └──────▶ WaitingConnect ─────┘
//! ```
//!
//! The deployment and connectivity waits share one wall-clock budget per
//! attempt; any failure deregisters the node and tears down whatever cloud
//! resources the attempt created.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cirrus_cloud::MockCloudClient;
//! use cirrus_control::{
//!     CloudProfile, InMemoryRegistry, NullTelemetry, ProvisionOrchestrator,
//!     StaticChannels, StaticCredentialStore,
//! };
//!
//! let profile = CloudProfile::load()?;
//! let orchestrator = ProvisionOrchestrator::new(
//!     profile,
//!     Arc::new(MockCloudClient::new()),
//!     Arc::new(InMemoryRegistry::new()),
//!     Arc::new(StaticCredentialStore::new()),
//!     Arc::new(StaticChannels::new("secret")),
//!     Arc::new(NullTelemetry),
//! );
//!
//! for handle in orchestrator.provision(Some("linux"), 2) {
//!     handle.finished().await?;
//! }
//! ```

#![forbid(unsafe_code)]

pub mod catalog;
pub mod channel;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod secrets;
pub mod state;
pub mod teardown;
pub mod telemetry;
pub mod types;
pub mod waiter;

pub use catalog::TemplateCatalog;
pub use channel::{AgentChannel, AgentChannels, StaticChannels};
pub use cirrus_cloud::CloudClient;
pub use config::{
    CloudProfile, ContainerTemplate, ControllerConfig, EnvVar, LaunchMethod, OsType, RegistryRef,
    VolumeSpec,
};
pub use descriptor::DescriptorBuilder;
pub use error::{Phase, ProvisionError, ProvisionResult};
pub use orchestrator::{ProvisionHandle, ProvisionOrchestrator};
pub use registry::{AgentNode, InMemoryRegistry, NodeRegistry};
pub use retry::RetryGate;
pub use secrets::{CredentialStore, FileShareCredentials, StaticCredentialStore, UsernamePassword};
pub use state::{Attempt, AttemptState, Created, Deploying, Online, WaitingConnect, WaitingOnline};
pub use teardown::TeardownService;
pub use telemetry::{NullTelemetry, RecordingTelemetry, TelemetrySink};
pub use types::AgentIdentity;
pub use waiter::{AttemptClock, ConnectivityWaiter, DeploymentWaiter};
