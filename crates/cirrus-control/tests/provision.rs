//! End-to-end provisioning tests against the in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use cirrus_cloud::{ContainerState, MockCloudClient, ProvisioningState};
use cirrus_control::telemetry::events;
use cirrus_control::{
    AgentNode, CloudProfile, InMemoryRegistry, NodeRegistry, Phase, ProvisionError,
    ProvisionOrchestrator, ProvisionResult, RecordingTelemetry, StaticChannels,
    StaticCredentialStore,
};

const PROFILE: &str = r#"
    name = "aci-profile"
    credentials_id = "cloud-sp"
    resource_group = "build-agents"

    [controller]
    url = "https://ci.example.com/"
    instance_id = "controller-1"

    [[templates]]
    name = "linux"
    label = "linux docker"
    image = "example.azurecr.io/agent:latest"
    cpu = "2"
    command = "agent --url ${rootUrl} --name ${nodeName} --secret ${secret}"
    timeout_secs = 60

    [[templates]]
    name = "windows"
    label = "windows"
    image = "example.azurecr.io/agent-win:latest"
    os_type = "windows"

    [[templates]]
    name = "shell"
    label = "shell"
    image = "example.azurecr.io/agent-ssh:latest"
    launch_method = "shell"
    ssh_port = 2222
"#;

struct Harness {
    cloud: Arc<MockCloudClient>,
    registry: Arc<InMemoryRegistry>,
    channels: StaticChannels,
    telemetry: Arc<RecordingTelemetry>,
    orchestrator: Arc<ProvisionOrchestrator>,
}

impl Harness {
    fn new() -> Self {
        let cloud = Arc::new(MockCloudClient::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let channels = StaticChannels::new("s3cret");
        let telemetry = Arc::new(RecordingTelemetry::new());
        let orchestrator = ProvisionOrchestrator::new(
            CloudProfile::from_toml(PROFILE).unwrap(),
            cloud.clone(),
            registry.clone(),
            Arc::new(StaticCredentialStore::new()),
            Arc::new(channels.clone()),
            telemetry.clone(),
        );
        Self {
            cloud,
            registry,
            channels,
            telemetry,
            orchestrator,
        }
    }

    /// Simulate agents handshaking in: every registered node is marked
    /// online shortly after it appears.
    fn auto_online(&self) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            loop {
                for name in registry.names() {
                    if let Some(node) = registry.lookup(&name).await {
                        node.mark_online();
                    }
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        })
    }
}

#[tokio::test(start_paused = true)]
async fn handshake_agent_provisions_end_to_end() {
    let harness = Harness::new();
    let marker = harness.auto_online();

    let handles = harness.orchestrator.provision(Some("linux"), 1);
    assert_eq!(handles.len(), 1);
    let handle = handles.into_iter().next().unwrap();
    let agent = handle.node().name().to_owned();

    handle.finished().await.unwrap();
    marker.abort();

    // The node stayed registered and picked up its address.
    let node = harness.registry.lookup(&agent).await.unwrap();
    assert_eq!(node.host().as_deref(), Some("10.0.0.4"));
    assert!(node.env().iter().any(|e| e.key == "IP" && e.value == "10.0.0.4"));

    // The submitted document carried the substituted command.
    let created = harness.cloud.created_deployments();
    assert_eq!(created.len(), 1);
    let command = created[0].1.command();
    assert!(command.contains(&"https://ci.example.com/".to_owned()));
    assert!(command.contains(&agent));
    assert!(command.contains(&"s3cret".to_owned()));

    // Success telemetry with the attempt's property map.
    let provisioned = harness.telemetry.named(events::PROVISIONED);
    assert_eq!(provisioned.len(), 1);
    assert_eq!(provisioned[0].properties["profile"], "aci-profile");
    assert_eq!(provisioned[0].properties["agent"], agent);
    assert_eq!(provisioned[0].properties["cpu"], "2");

    // Nothing was torn down.
    assert!(harness.cloud.deleted_groups().is_empty());
    assert!(harness.orchestrator.can_admit(Some("linux")));
}

#[tokio::test(start_paused = true)]
async fn shell_agent_connects_out() {
    let harness = Harness::new();

    let handle = harness
        .orchestrator
        .provision(Some("shell"), 1)
        .into_iter()
        .next()
        .unwrap();
    handle.finished().await.unwrap();

    // The controller dialled the group's address.
    assert_eq!(harness.channels.connected_hosts(), vec!["10.0.0.4".to_owned()]);

    // The ssh port was appended to the document unconditionally.
    let created = harness.cloud.created_deployments();
    assert!(created[0]
        .1
        .container_ports()
        .iter()
        .any(|p| p.port == "2222"));
}

#[tokio::test(start_paused = true)]
async fn deployment_failure_cleans_up_and_trips_the_gate() {
    let harness = Harness::new();
    harness
        .cloud
        .push_deployment_plan(vec![ProvisioningState::Failed]);

    let handle = harness
        .orchestrator
        .provision(Some("linux"), 1)
        .into_iter()
        .next()
        .unwrap();
    let agent = handle.node().name().to_owned();

    let err = handle.finished().await.unwrap_err();
    assert!(matches!(err, ProvisionError::DeploymentFailed { .. }));

    // Compensation: node deregistered, group deleted, failed deployment
    // record kept for inspection.
    assert!(harness.registry.is_empty());
    assert_eq!(harness.cloud.deleted_groups(), vec![agent.clone()]);
    assert!(harness.cloud.deleted_deployments().is_empty());

    let failed = harness.telemetry.named(events::PROVISION_FAILED);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].properties.contains_key("message"));

    // The template cools down; its siblings are unaffected.
    assert!(!harness.orchestrator.can_admit(Some("linux")));
    assert!(harness.orchestrator.can_admit(Some("windows")));
    assert!(harness.orchestrator.provision(Some("linux"), 1).is_empty());
}

#[tokio::test(start_paused = true)]
async fn stuck_deployment_times_out_with_one_log_fetch() {
    let harness = Harness::new();
    harness
        .cloud
        .push_deployment_plan(vec![ProvisioningState::Pending]);

    let handle = harness
        .orchestrator
        .provision(Some("linux"), 1)
        .into_iter()
        .next()
        .unwrap();
    let agent = handle.node().name().to_owned();

    let err = handle.finished().await.unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::Timeout {
            phase: Phase::Deployment,
            ..
        }
    ));

    // Exactly one diagnostic fetch, at half the 60s budget.
    assert_eq!(harness.cloud.log_fetches(), vec![agent]);
    assert!(harness.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn terminated_container_fails_the_connectivity_wait() {
    let harness = Harness::new();
    harness
        .cloud
        .set_default_container_state(ContainerState::Terminated);

    let handle = harness
        .orchestrator
        .provision(Some("linux"), 1)
        .into_iter()
        .next()
        .unwrap();

    let err = handle.finished().await.unwrap_err();
    assert!(matches!(err, ProvisionError::ContainerTerminated { .. }));
    assert!(harness.registry.is_empty());
    // Terminated-container diagnostics were fetched.
    assert!(!harness.cloud.log_fetches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_units_fail_independently() {
    let harness = Harness::new();
    let marker = harness.auto_online();
    harness.cloud.fail_next_create("quota exceeded");

    let handles = harness.orchestrator.provision(Some("linux"), 2);
    assert_eq!(handles.len(), 2);

    let mut ok = 0;
    let mut failed = 0;
    let mut survivor = None;
    for handle in handles {
        let agent = handle.node().name().to_owned();
        match handle.finished().await {
            Ok(()) => {
                ok += 1;
                survivor = Some(agent);
            }
            Err(_) => failed += 1,
        }
    }
    marker.abort();

    assert_eq!(ok, 1);
    assert_eq!(failed, 1);

    // The surviving unit's node is untouched by its sibling's cleanup.
    let survivor = survivor.unwrap();
    assert_eq!(harness.registry.len(), 1);
    assert!(harness.registry.lookup(&survivor).await.is_some());
    assert!(!harness.cloud.deleted_groups().contains(&survivor));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_attempts() {
    let harness = Harness::new();
    harness
        .cloud
        .push_deployment_plan(vec![ProvisioningState::Pending]);

    let handle = harness
        .orchestrator
        .provision(Some("linux"), 1)
        .into_iter()
        .next()
        .unwrap();

    // Let the attempt reach its first deployment poll, then shut down.
    tokio::time::sleep(Duration::from_secs(1)).await;
    harness.orchestrator.shutdown();

    let err = handle.finished().await.unwrap_err();
    assert!(matches!(err, ProvisionError::Cancelled));

    // Cancellation still compensates, but does not trip the gate.
    assert!(harness.registry.is_empty());
    assert!(!harness.cloud.deleted_groups().is_empty());
    assert!(harness.orchestrator.can_admit(Some("linux")));
}

/// Registry that refuses every registration, as a controller under an
/// admission freeze would.
struct RejectingRegistry;

#[async_trait::async_trait]
impl NodeRegistry for RejectingRegistry {
    async fn register(&self, _node: Arc<AgentNode>) -> ProvisionResult<()> {
        Err(ProvisionError::internal("node table rejected the registration"))
    }

    async fn lookup(&self, _name: &str) -> Option<Arc<AgentNode>> {
        None
    }

    async fn remove(&self, _name: &str) {}
}

#[tokio::test(start_paused = true)]
async fn registration_failure_takes_the_failure_branch() {
    let cloud = Arc::new(MockCloudClient::new());
    let telemetry = Arc::new(RecordingTelemetry::new());
    let orchestrator = ProvisionOrchestrator::new(
        CloudProfile::from_toml(PROFILE).unwrap(),
        cloud.clone(),
        Arc::new(RejectingRegistry),
        Arc::new(StaticCredentialStore::new()),
        Arc::new(StaticChannels::new("s3cret")),
        telemetry.clone(),
    );

    let handle = orchestrator
        .provision(Some("linux"), 1)
        .into_iter()
        .next()
        .unwrap();

    let err = handle.finished().await.unwrap_err();
    assert!(matches!(err, ProvisionError::Internal(_)));

    // A failed registration is an attempt failure like any other: the
    // failure event fires and the template cools down.
    let failed = telemetry.named(events::PROVISION_FAILED);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].properties.contains_key("message"));
    assert!(!orchestrator.can_admit(Some("linux")));

    // Nothing was ever submitted to the cloud account.
    assert!(cloud.created_deployments().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_label_starts_nothing() {
    let harness = Harness::new();
    assert!(harness.orchestrator.provision(Some("macos"), 3).is_empty());
    assert!(!harness.orchestrator.can_admit(Some("macos")));
    assert!(harness.registry.is_empty());
}
