//! Bounded worker pool executing the mutant workload.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::adapter::TestFrameworkAdapter;
use super::classify::ResultClassifier;
use super::events::{EventBus, MutationEvent};
use super::mutant::{Mutant, Mutation, VerdictCounts};
use super::process::{ProcessExecutor, ProcessFactory, execute_or_record};

/// A `MutantTested` event that a subscriber failed to handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    /// Mutation whose event failed.
    pub mutation_id: String,
    /// Delivery error message.
    pub message: String,
}

/// Everything a scheduler run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRun {
    /// One mutant per mutation, in completion order.
    pub mutants: Vec<Mutant>,
    /// Event deliveries that failed in workers.
    pub delivery_failures: Vec<DeliveryFailure>,
}

/// Shared queue handing out each item exactly once.
struct WorkQueue<T> {
    slots: Vec<Mutex<Option<T>>>,
    cursor: AtomicUsize,
}

impl<T> WorkQueue<T> {
    fn new(items: Vec<T>) -> Self {
        Self {
            slots: items.into_iter().map(|item| Mutex::new(Some(item))).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Option<T> {
        loop {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed);
            let slot = self.slots.get(index)?;
            let item = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if item.is_some() {
                return item;
            }
        }
    }
}

/// Completed mutants and running counts, appended under one lock.
///
/// The lock is held while `MutantTested` is published, so `completed` numbers
/// reach subscribers as 1, 2, 3 and so on.
#[derive(Default)]
struct CompletionLog {
    mutants: Vec<Mutant>,
    counts: VerdictCounts,
}

/// Executes a workload with at most `concurrency` test processes in flight.
///
/// Each worker takes the next mutation from a shared queue, builds its
/// invocation, waits for the process, classifies the outcome, records the mutant
/// and publishes `MutantTested`. Individual errors or timeouts never stop the run.
/// A scheduler is consumed by [`Scheduler::run`]; build a new one per run.
pub struct Scheduler {
    factory: ProcessFactory,
    adapter: Arc<dyn TestFrameworkAdapter>,
    executor: Arc<dyn ProcessExecutor>,
    classifier: ResultClassifier,
    events: Arc<EventBus>,
}

impl Scheduler {
    /// Scheduler classifying with `adapter`'s exit-code convention.
    pub fn new(
        factory: ProcessFactory,
        adapter: Arc<dyn TestFrameworkAdapter>,
        executor: Arc<dyn ProcessExecutor>,
        events: Arc<EventBus>,
    ) -> Self {
        let classifier = ResultClassifier::new(adapter.exit_codes().clone());
        Self {
            factory,
            adapter,
            executor,
            classifier,
            events,
        }
    }

    /// Test every mutation in `workload` and return once all are classified.
    pub fn run(self, workload: Vec<Mutation>, concurrency: NonZeroUsize) -> ScheduledRun {
        let total = workload.len();
        let workers = concurrency.get().min(total);
        info!(total, workers, "testing mutants");

        let queue = WorkQueue::new(workload);
        let log = Mutex::new(CompletionLog {
            mutants: Vec::with_capacity(total),
            counts: VerdictCounts::default(),
        });
        let failures = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for worker in 0..workers {
                let this = &self;
                let queue = &queue;
                let log = &log;
                let failures = &failures;
                scope.spawn(move || this.work(worker, queue, log, failures, total));
            }
        });

        let log = log.into_inner().unwrap_or_else(PoisonError::into_inner);
        let delivery_failures = failures
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        info!(
            killed = log.counts.killed,
            escaped = log.counts.escaped,
            timeout = log.counts.timeout,
            error = log.counts.error,
            "all mutants tested"
        );

        ScheduledRun {
            mutants: log.mutants,
            delivery_failures,
        }
    }

    fn work(
        &self,
        worker: usize,
        queue: &WorkQueue<Mutation>,
        log: &Mutex<CompletionLog>,
        failures: &Mutex<Vec<DeliveryFailure>>,
        total: usize,
    ) {
        while let Some(mutation) = queue.next() {
            let invocation = self.factory.build(&mutation, self.adapter.as_ref());
            debug!(
                worker,
                mutation = %mutation.id,
                command = %invocation.display_command(),
                "testing mutant"
            );

            let outcome = execute_or_record(self.executor.as_ref(), &invocation);
            let verdict = self.classifier.classify(&outcome);
            let mutant = Mutant::new(mutation, outcome, verdict);
            let mutation_id = mutant.id().to_string();
            debug!(worker, mutation = %mutation_id, %verdict, "mutant classified");

            // Record and publish under one lock: deliveries follow completion order and a
            // failing subscriber cannot lose the mutant.
            let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
            log.counts.record(verdict);
            log.mutants.push(mutant.clone());
            let event = MutationEvent::MutantTested {
                mutant,
                completed: log.mutants.len(),
                total,
                counts: log.counts,
            };
            let delivered = self.events.publish(&event);
            drop(log);

            if let Err(err) = delivered {
                warn!(worker, mutation = %mutation_id, error = %err, "event delivery failed");
                failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(DeliveryFailure {
                        mutation_id,
                        message: err.to_string(),
                    });
            }
        }
    }
}
