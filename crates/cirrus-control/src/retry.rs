//! Per-template provisioning circuit breaker.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

const DEFAULT_BASE_COOLDOWN: Duration = Duration::from_secs(5);
const DEFAULT_MAX_COOLDOWN: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct RetryState {
    consecutive_failures: u32,
    next_attempt_at: Instant,
}

/// Admission gate that disables templates after provisioning failures.
///
/// Policy: every recorded failure disables the template for a cool-down that
/// starts at 5 seconds and doubles with each consecutive failure, capped at
/// 10 minutes. A recorded success clears the state entirely. The gate is
/// keyed by template name so concurrent attempts for one template share one
/// breaker.
///
/// State is process-lifetime only: it is never persisted, and a freshly
/// constructed gate considers every template eligible.
#[derive(Debug)]
pub struct RetryGate {
    states: DashMap<String, RetryState>,
    base_cooldown: Duration,
    max_cooldown: Duration,
}

impl Default for RetryGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryGate {
    /// Create a gate with the default cool-down policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(DEFAULT_BASE_COOLDOWN, DEFAULT_MAX_COOLDOWN)
    }

    /// Create a gate with a custom cool-down policy.
    #[must_use]
    pub fn with_policy(base_cooldown: Duration, max_cooldown: Duration) -> Self {
        Self {
            states: DashMap::new(),
            base_cooldown,
            max_cooldown,
        }
    }

    /// Whether new provisioning attempts for the template are admissible.
    #[must_use]
    pub fn is_eligible(&self, template_name: &str) -> bool {
        self.states
            .get(template_name)
            .map(|state| Instant::now() >= state.next_attempt_at)
            .unwrap_or(true)
    }

    /// Record a successful attempt, restoring eligibility.
    pub fn record_success(&self, template_name: &str) {
        self.states.remove(template_name);
    }

    /// Record a failed attempt, disabling the template for a cool-down.
    pub fn record_failure(&self, template_name: &str) {
        let mut entry = self
            .states
            .entry(template_name.to_owned())
            .or_insert_with(|| RetryState {
                consecutive_failures: 0,
                next_attempt_at: Instant::now(),
            });

        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        let cooldown = self
            .base_cooldown
            .saturating_mul(1_u32 << (entry.consecutive_failures - 1).min(16))
            .min(self.max_cooldown);
        entry.next_attempt_at = Instant::now() + cooldown;

        debug!(
            template = template_name,
            failures = entry.consecutive_failures,
            cooldown_secs = cooldown.as_secs(),
            "template disabled after provisioning failure"
        );
    }
}
