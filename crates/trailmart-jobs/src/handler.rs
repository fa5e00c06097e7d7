//! Handlers for integration events.

use async_trait::async_trait;

use trailmart_core::IntegrationEvent;

/// Outcome of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResult {
    /// The event was applied.
    Success,
    /// The event was understood but deliberately not applied.
    Skipped(String),
    /// The handler could not apply the event. The consumer redelivers it.
    Failed(String),
}

impl HandlerResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, HandlerResult::Failed(_))
    }
}

/// Trait for integration event handlers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Event type discriminators this handler subscribes to.
    fn event_types(&self) -> &[&'static str];

    /// Lane this handler runs in. Handlers sharing a lane see events in
    /// publish order on one task; separate lanes never wait on each other.
    fn lane(&self) -> &str {
        self.name()
    }

    /// Handle one event. Must tolerate replays.
    async fn handle(&self, event: &IntegrationEvent) -> HandlerResult;

    /// Check if this handler wants the given event.
    fn handles(&self, event: &IntegrationEvent) -> bool {
        self.event_types().contains(&event.event_type())
    }
}

/// Handler that accepts events and does nothing, for wiring tests.
pub struct NoOpHandler {
    name: String,
    event_types: Vec<&'static str>,
}

impl NoOpHandler {
    pub fn new(name: impl Into<String>, event_types: Vec<&'static str>) -> Self {
        Self {
            name: name.into(),
            event_types,
        }
    }
}

#[async_trait]
impl EventHandler for NoOpHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn event_types(&self) -> &[&'static str] {
        &self.event_types
    }

    async fn handle(&self, _event: &IntegrationEvent) -> HandlerResult {
        HandlerResult::Success
    }
}
