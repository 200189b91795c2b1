//! Mutation run orchestration: baseline gate, workload, aggregation.

use std::num::NonZeroUsize;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::adapter::{AdapterError, adapter_for};
use super::baseline::BaselineGate;
use super::config::{ConfigError, MutationConfig};
use super::events::{DeliveryError, EventBus, MutationEvent};
use super::generator::{GeneratorError, ManifestGenerator, MutationGenerator};
use super::process::{CommandExecutor, ProcessExecutor, ProcessFactory, ProcessOutcome};
use super::report::RunReport;
use super::scheduler::Scheduler;

/// Run orchestration errors.
#[derive(Debug, Error)]
pub enum MutationRunError {
    /// Thread count was zero.
    #[error("thread count must be at least 1")]
    InvalidThreadCount,
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Framework adapter could not be resolved.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
    /// The workload could not be produced.
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),
    /// A subscriber failed on a run-level event.
    #[error("event delivery failed: {0}")]
    Subscriber(#[from] DeliveryError),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The baseline did not pass; no mutant was tested.
    Aborted {
        /// Baseline process outcome, verbatim.
        baseline: ProcessOutcome,
    },
    /// Every mutant was tested and classified.
    Completed(RunReport),
}

/// Drives one mutation run.
///
/// Collaborators are supplied at construction and consumed by [`Orchestrator::run`].
/// The baseline gate and the scheduler should share the event bus passed here.
pub struct Orchestrator {
    baseline: BaselineGate,
    scheduler: Scheduler,
    events: Arc<EventBus>,
    generator: Box<dyn MutationGenerator>,
}

impl Orchestrator {
    /// Orchestrator over explicit collaborators.
    pub fn new(
        baseline: BaselineGate,
        scheduler: Scheduler,
        events: Arc<EventBus>,
        generator: Box<dyn MutationGenerator>,
    ) -> Self {
        Self {
            baseline,
            scheduler,
            events,
            generator,
        }
    }

    /// Wire an orchestrator from `config`, running processes through `executor`.
    ///
    /// Fails before anything runs when the config or the framework is invalid.
    pub fn from_config(
        config: &MutationConfig,
        events: EventBus,
        executor: Arc<dyn ProcessExecutor>,
    ) -> Result<Self, MutationRunError> {
        config.validate()?;
        let adapter = adapter_for(config)?;
        let factory = ProcessFactory::new(config.project_dir.clone())
            .with_mutant_timeout(config.mutant_timeout());
        let events = Arc::new(events);
        let generator =
            ManifestGenerator::new(config.manifest_path()).with_filter(config.filter.clone());

        Ok(Self::new(
            BaselineGate::new(factory.clone(), adapter.clone(), executor.clone()),
            Scheduler::new(factory, adapter, executor, events.clone()),
            events,
            Box::new(generator),
        ))
    }

    /// [`Orchestrator::from_config`] with a [`CommandExecutor`].
    pub fn with_command_executor(
        config: &MutationConfig,
        events: EventBus,
    ) -> Result<Self, MutationRunError> {
        Self::from_config(config, events, Arc::new(CommandExecutor))
    }

    /// Run the baseline, then test every mutation with at most `thread_count`
    /// processes in flight.
    pub fn run(self, thread_count: usize) -> Result<RunOutcome, MutationRunError> {
        let concurrency =
            NonZeroUsize::new(thread_count).ok_or(MutationRunError::InvalidThreadCount)?;
        let Self {
            baseline,
            scheduler,
            events,
            mut generator,
        } = self;

        events.publish(&MutationEvent::BaselineStarted)?;
        let baseline = baseline.run();
        events.publish(&MutationEvent::BaselineFinished {
            successful: baseline.successful,
            outcome: baseline.outcome.clone(),
        })?;
        if !baseline.successful {
            warn!("baseline failed, skipping mutation testing");
            return Ok(RunOutcome::Aborted {
                baseline: baseline.outcome,
            });
        }

        let workload = generator.generate()?;
        let total = workload.len();
        info!(total, threads = concurrency.get(), "starting mutation testing");
        events.publish(&MutationEvent::MutationTestingStarted { total })?;

        let report = RunReport::new(baseline.outcome, scheduler.run(workload, concurrency));
        events.publish(&MutationEvent::MutationTestingFinished {
            counts: report.counts,
        })?;
        Ok(RunOutcome::Completed(report))
    }
}
