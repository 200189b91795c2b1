//! Lifecycle events and the synchronous event bus.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::mutant::{Mutant, VerdictCounts};
use super::process::ProcessOutcome;

/// Lifecycle event emitted during a mutation run.
///
/// Order within a run: `BaselineStarted`, `BaselineFinished`, then, when the
/// baseline passed, `MutationTestingStarted`, one `MutantTested` per mutant in
/// completion order, and `MutationTestingFinished`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MutationEvent {
    /// The unmodified test suite is about to run.
    BaselineStarted,
    /// The unmodified test suite finished.
    BaselineFinished {
        /// Whether mutation testing may proceed.
        successful: bool,
        /// Baseline process outcome.
        outcome: ProcessOutcome,
    },
    /// Mutant verification starts.
    MutationTestingStarted {
        /// Workload size.
        total: usize,
    },
    /// One mutant was executed and classified.
    MutantTested {
        /// The classified mutant.
        mutant: Mutant,
        /// Mutants completed so far, this one included.
        completed: usize,
        /// Workload size.
        total: usize,
        /// Verdict counts so far, this one included.
        counts: VerdictCounts,
    },
    /// Every mutant has been executed and classified.
    MutationTestingFinished {
        /// Final verdict counts.
        counts: VerdictCounts,
    },
}

impl MutationEvent {
    /// Stable snake_case event name.
    pub fn name(&self) -> &'static str {
        match self {
            MutationEvent::BaselineStarted => "baseline_started",
            MutationEvent::BaselineFinished { .. } => "baseline_finished",
            MutationEvent::MutationTestingStarted { .. } => "mutation_testing_started",
            MutationEvent::MutantTested { .. } => "mutant_tested",
            MutationEvent::MutationTestingFinished { .. } => "mutation_testing_finished",
        }
    }
}

/// Errors raised by a subscriber while handling an event.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Any other handler failure.
    #[error("{0}")]
    Failed(String),
}

/// A subscriber failed to handle one published event.
#[derive(Debug, Error)]
#[error("subscriber `{subscriber}` failed on {event}: {source}")]
pub struct DeliveryError {
    /// Name of the failing subscriber.
    pub subscriber: String,
    /// Name of the event being delivered.
    pub event: &'static str,
    /// Subscriber error.
    #[source]
    pub source: SubscriberError,
}

/// Receives lifecycle events.
///
/// Handlers run synchronously on the publishing thread, which is a scheduler
/// worker for `MutantTested`, so they must be `Send + Sync`.
pub trait EventSubscriber: Send + Sync {
    /// Name used in delivery errors and logs.
    fn name(&self) -> &str {
        "subscriber"
    }

    /// Handle one event.
    fn on_event(&self, event: &MutationEvent) -> Result<(), SubscriberError>;
}

impl<T> EventSubscriber for Arc<T>
where
    T: EventSubscriber + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn on_event(&self, event: &MutationEvent) -> Result<(), SubscriberError> {
        (**self).on_event(event)
    }
}

/// Publish/subscribe channel for lifecycle events.
///
/// Subscribing needs `&mut self`; a run only holds the bus behind a shared
/// reference, so the subscriber list is fixed for the whole run.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Box<dyn EventSubscriber>>,
}

impl EventBus {
    /// Bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Delivery follows registration order.
    pub fn subscribe<S>(&mut self, subscriber: S)
    where
        S: EventSubscriber + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Builder-style [`EventBus::subscribe`].
    pub fn with_subscriber<S>(mut self, subscriber: S) -> Self
    where
        S: EventSubscriber + 'static,
    {
        self.subscribe(subscriber);
        self
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// True without subscribers.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver `event` to every subscriber in order.
    ///
    /// Stops at the first failing subscriber and returns its error; later
    /// subscribers do not see this event.
    pub fn publish(&self, event: &MutationEvent) -> Result<(), DeliveryError> {
        for subscriber in &self.subscribers {
            subscriber
                .on_event(event)
                .map_err(|source| DeliveryError {
                    subscriber: subscriber.name().to_string(),
                    event: event.name(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "subscribers",
                &self
                    .subscribers
                    .iter()
                    .map(|subscriber| subscriber.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Current unix timestamp in milliseconds.
pub fn now_timestamp_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0));
    (duration.as_secs() as i64)
        .saturating_mul(1000)
        .saturating_add(duration.subsec_millis() as i64)
}
