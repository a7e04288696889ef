//! Telemetry sink seam.
//!
//! Emission is fire-and-forget: sinks must never block or fail the caller.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Event category for container-agent provisioning events.
pub const CATEGORY_CONTAINER_AGENT: &str = "container-agent";

/// Event names emitted by the orchestrator and teardown service.
pub mod events {
    /// An agent was provisioned and came online.
    pub const PROVISIONED: &str = "Provision";
    /// A provisioning attempt failed.
    pub const PROVISION_FAILED: &str = "ProvisionFailed";
    /// A container group was deleted.
    pub const DELETED: &str = "Deleted";
    /// A container-group deletion failed.
    pub const DELETE_FAILED: &str = "DeletedFailed";
    /// A deployment record was deleted.
    pub const DEPLOYMENT_DELETED: &str = "DeploymentDeleted";
    /// A deployment-record deletion failed.
    pub const DEPLOYMENT_DELETE_FAILED: &str = "DeploymentDeletedFailed";
}

/// Host-provided telemetry sink.
pub trait TelemetrySink: Send + Sync {
    /// Emit one event. Must not block and must not fail.
    fn emit(&self, category: &str, event: &str, properties: &HashMap<String, String>);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn emit(&self, _category: &str, _event: &str, _properties: &HashMap<String, String>) {}
}

/// One recorded telemetry event.
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    /// Event category.
    pub category: String,
    /// Event name.
    pub event: String,
    /// Event properties.
    pub properties: HashMap<String, String>,
}

/// Sink that records events in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TelemetryEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All recorded events, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.lock().clone()
    }

    /// Recorded events with the given name.
    #[must_use]
    pub fn named(&self, event: &str) -> Vec<TelemetryEvent> {
        self.lock()
            .iter()
            .filter(|e| e.event == event)
            .cloned()
            .collect()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn emit(&self, category: &str, event: &str, properties: &HashMap<String, String>) {
        self.lock().push(TelemetryEvent {
            category: category.to_owned(),
            event: event.to_owned(),
            properties: properties.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order_and_properties() {
        let sink = RecordingTelemetry::new();
        let mut props = HashMap::new();
        props.insert("agent".to_owned(), "linux-abc".to_owned());

        sink.emit(CATEGORY_CONTAINER_AGENT, events::PROVISIONED, &props);
        sink.emit(CATEGORY_CONTAINER_AGENT, events::DELETED, &HashMap::new());

        let recorded = sink.events();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].event, events::PROVISIONED);
        assert_eq!(recorded[0].properties["agent"], "linux-abc");
        assert_eq!(sink.named(events::DELETED).len(), 1);
    }
}
