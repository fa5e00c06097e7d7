//! Event consumer that fans integration events out to registered handlers.
//!
//! Handlers are grouped into lanes by [`EventHandler::lane`]. Each lane owns
//! a lossless bus queue and its own task, so a slow enrichment never delays
//! basket or identity handlers. Within a lane events are handled in publish
//! order. A failed handler is retried with exponential backoff before the
//! event is dead-lettered for that handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use trailmart_core::defaults::{
    CONSUMER_HANDLER_TIMEOUT_SECS, CONSUMER_MAX_RETRIES, CONSUMER_RETRY_BACKOFF_MS,
    EVENT_BUS_CAPACITY,
};
use trailmart_core::{EventBus, IntegrationEvent, Result};

use crate::handler::{EventHandler, HandlerResult};

/// Configuration for the event consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Whether to consume events at all.
    pub enabled: bool,
    /// Upper bound on one handler invocation, in seconds.
    pub handler_timeout_secs: u64,
    /// Redeliveries after a failed invocation.
    pub max_retries: u32,
    /// Delay before the first redelivery, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            handler_timeout_secs: CONSUMER_HANDLER_TIMEOUT_SECS,
            max_retries: CONSUMER_MAX_RETRIES,
            retry_backoff_ms: CONSUMER_RETRY_BACKOFF_MS,
        }
    }
}

impl ConsumerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CONSUMER_ENABLED` | `true` | Enable/disable event consumption |
    /// | `CONSUMER_HANDLER_TIMEOUT_SECS` | `300` | Per-handler time limit |
    /// | `CONSUMER_MAX_RETRIES` | `3` | Redeliveries of a failed event |
    /// | `CONSUMER_RETRY_BACKOFF_MS` | `500` | First retry delay, doubled per attempt |
    pub fn from_env() -> Self {
        let enabled = std::env::var("CONSUMER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let handler_timeout_secs = std::env::var("CONSUMER_HANDLER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(CONSUMER_HANDLER_TIMEOUT_SECS)
            .max(1);

        let max_retries = std::env::var("CONSUMER_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(CONSUMER_MAX_RETRIES);

        let retry_backoff_ms = std::env::var("CONSUMER_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(CONSUMER_RETRY_BACKOFF_MS);

        Self {
            enabled,
            handler_timeout_secs,
            max_retries,
            retry_backoff_ms,
        }
    }

    /// Enable or disable consumption.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the per-handler time limit.
    pub fn with_handler_timeout(mut self, secs: u64) -> Self {
        self.handler_timeout_secs = secs;
        self
    }

    /// Set how many times a failed event is redelivered.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the first retry delay.
    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    /// Delay before redelivery number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Lifecycle notification emitted by the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerEvent {
    /// Consumer lanes started.
    ConsumerStarted,
    /// A handler applied an event.
    EventHandled {
        event_id: Uuid,
        event_type: &'static str,
        handler: String,
    },
    /// A handler deliberately did not apply an event.
    EventSkipped {
        event_id: Uuid,
        event_type: &'static str,
        handler: String,
        reason: String,
    },
    /// A handler failed and the event will be redelivered to it.
    HandlerRetrying {
        event_id: Uuid,
        event_type: &'static str,
        handler: String,
        attempt: u32,
        error: String,
    },
    /// A handler failed on every attempt; the event is dead-lettered for it.
    HandlerFailed {
        event_id: Uuid,
        event_type: &'static str,
        handler: String,
        attempts: u32,
        error: String,
    },
    /// Every lane stopped.
    ConsumerStopped,
}

/// Handle for controlling a running consumer.
pub struct ConsumerHandle {
    shutdown_tx: watch::Sender<bool>,
    event_rx: broadcast::Receiver<ConsumerEvent>,
}

impl ConsumerHandle {
    /// Signal every lane to stop. In-flight handlers are cancelled.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(true).map_err(|_| {
            trailmart_core::Error::Internal("Failed to send shutdown signal".into())
        })?;
        Ok(())
    }

    /// Get a receiver for consumer events.
    pub fn events(&self) -> broadcast::Receiver<ConsumerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Runs handlers with timeout and retry, reporting outcomes.
struct Dispatcher {
    config: ConsumerConfig,
    event_tx: broadcast::Sender<ConsumerEvent>,
}

impl Dispatcher {
    async fn dispatch(&self, handlers: &[Arc<dyn EventHandler>], event: &IntegrationEvent) -> usize {
        let mut invoked = 0;
        for handler in handlers.iter().filter(|h| h.handles(event)) {
            invoked += 1;
            self.deliver(handler.as_ref(), event).await;
        }
        invoked
    }

    async fn deliver(&self, handler: &dyn EventHandler, event: &IntegrationEvent) {
        let event_id = event.event_id;
        let event_type = event.event_type();
        let limit = Duration::from_secs(self.config.handler_timeout_secs);
        let name = handler.name().to_string();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let start = Instant::now();
            let result = match tokio::time::timeout(limit, handler.handle(event)).await {
                Ok(result) => result,
                Err(_) => HandlerResult::Failed(format!(
                    "Handler exceeded timeout of {}s",
                    self.config.handler_timeout_secs
                )),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            let notification = match result {
                HandlerResult::Success => {
                    debug!(%event_id, event_type, handler = %name, attempt, duration_ms, "Event handled");
                    ConsumerEvent::EventHandled {
                        event_id,
                        event_type,
                        handler: name,
                    }
                }
                HandlerResult::Skipped(reason) => {
                    debug!(%event_id, event_type, handler = %name, %reason, "Event skipped");
                    ConsumerEvent::EventSkipped {
                        event_id,
                        event_type,
                        handler: name,
                        reason,
                    }
                }
                HandlerResult::Failed(error) if attempt <= self.config.max_retries => {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        %event_id,
                        event_type,
                        handler = %name,
                        %error,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        "Event handler failed, retrying"
                    );
                    let _ = self.event_tx.send(ConsumerEvent::HandlerRetrying {
                        event_id,
                        event_type,
                        handler: name.clone(),
                        attempt,
                        error,
                    });
                    tokio::time::sleep(delay).await;
                    continue;
                }
                HandlerResult::Failed(error) => {
                    error!(
                        %event_id,
                        event_type,
                        handler = %name,
                        %error,
                        attempts = attempt,
                        duration_ms,
                        "Event handler failed, retries exhausted"
                    );
                    ConsumerEvent::HandlerFailed {
                        event_id,
                        event_type,
                        handler: name,
                        attempts: attempt,
                        error,
                    }
                }
            };
            let _ = self.event_tx.send(notification);
            return;
        }
    }
}

/// Handlers sharing one ordered queue and task.
struct Lane {
    name: String,
    handlers: Vec<Arc<dyn EventHandler>>,
    queue: mpsc::UnboundedReceiver<IntegrationEvent>,
}

impl Lane {
    #[instrument(skip_all, fields(subsystem = "consumer", lane = %self.name))]
    async fn run(mut self, dispatcher: Arc<Dispatcher>, mut shutdown: watch::Receiver<bool>) {
        debug!("Consumer lane started");
        loop {
            let event = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.queue.recv() => match received {
                    Some(event) => event,
                    None => {
                        info!("Event bus closed");
                        break;
                    }
                },
            };

            tokio::select! {
                _ = shutdown.changed() => {
                    info!(
                        event_id = %event.event_id,
                        event_type = event.event_type(),
                        "Shutdown during dispatch, cancelling handler"
                    );
                    break;
                }
                invoked = dispatcher.dispatch(&self.handlers, &event) => {
                    if invoked == 0 {
                        debug!(event_id = %event.event_id, event_type = event.event_type(), "No handler in lane subscribed to event");
                    }
                }
            }
        }
        debug!("Consumer lane stopped");
    }
}

/// Consumer of integration events with a fixed handler list.
///
/// Bus queues are taken when the consumer is built, so events published
/// between `build()` and `start()` are still delivered.
pub struct EventConsumer {
    handlers: Vec<Arc<dyn EventHandler>>,
    lanes: Vec<Lane>,
    dispatcher: Arc<Dispatcher>,
}

impl EventConsumer {
    fn new(bus: &EventBus, config: ConsumerConfig, handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        let mut lanes: Vec<Lane> = Vec::new();
        for handler in &handlers {
            match lanes.iter_mut().find(|lane| lane.name == handler.lane()) {
                Some(lane) => lane.handlers.push(handler.clone()),
                None => lanes.push(Lane {
                    name: handler.lane().to_string(),
                    handlers: vec![handler.clone()],
                    queue: bus.subscribe_queue(),
                }),
            }
        }

        Self {
            handlers,
            lanes,
            dispatcher: Arc::new(Dispatcher { config, event_tx }),
        }
    }

    /// Names of the registered handlers, in registration order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Names of the lanes, in order of first registration.
    pub fn lane_names(&self) -> Vec<&str> {
        self.lanes.iter().map(|l| l.name.as_str()).collect()
    }

    /// Get a receiver for consumer events.
    pub fn events(&self) -> broadcast::Receiver<ConsumerEvent> {
        self.dispatcher.event_tx.subscribe()
    }

    /// Start one task per lane and return a handle for control.
    pub fn start(self) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let event_rx = self.dispatcher.event_tx.subscribe();

        tokio::spawn(self.run(shutdown_rx));

        ConsumerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    #[instrument(skip_all, fields(subsystem = "consumer"))]
    async fn run(self, shutdown_rx: watch::Receiver<bool>) {
        let config = &self.dispatcher.config;
        if !config.enabled {
            info!("Event consumer is disabled, not starting");
            return;
        }

        info!(
            handlers = ?self.handler_names(),
            lanes = ?self.lane_names(),
            handler_timeout_secs = config.handler_timeout_secs,
            max_retries = config.max_retries,
            "Event consumer started"
        );
        let _ = self.dispatcher.event_tx.send(ConsumerEvent::ConsumerStarted);

        let mut tasks = JoinSet::new();
        for lane in self.lanes {
            tasks.spawn(lane.run(self.dispatcher.clone(), shutdown_rx.clone()));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Consumer lane task failed");
            }
        }

        let _ = self.dispatcher.event_tx.send(ConsumerEvent::ConsumerStopped);
        info!("Event consumer stopped");
    }

    /// Run every subscribed handler on `event`, sequentially in registration
    /// order, retrying failures per the configuration.
    ///
    /// Failures never stop later handlers. Returns the number of handlers invoked.
    pub async fn dispatch(&self, event: &IntegrationEvent) -> usize {
        let invoked = self.dispatcher.dispatch(&self.handlers, event).await;
        if invoked == 0 {
            debug!(event_id = %event.event_id, event_type = event.event_type(), "No handler subscribed to event");
        }
        invoked
    }
}

/// Builder for creating an event consumer with handlers.
pub struct ConsumerBuilder {
    bus: EventBus,
    config: ConsumerConfig,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl ConsumerBuilder {
    /// Create a new consumer builder over `bus`.
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            config: ConsumerConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Set the consumer configuration.
    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a handler. Handlers in one lane run in the order they are added.
    pub fn with_handler<H: EventHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Append a shared handler.
    pub fn with_shared_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Build the consumer and subscribe one queue per lane to the bus.
    pub fn build(self) -> EventConsumer {
        EventConsumer::new(&self.bus, self.config, self.handlers)
    }
}
