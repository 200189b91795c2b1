//! Mutation testing orchestration.

pub mod adapter;
pub mod baseline;
pub mod classify;
pub mod config;
pub mod events;
pub mod generator;
pub mod mutant;
pub mod process;
/// Human-readable and machine-friendly report generation.
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod subscribers;

#[cfg(test)]
mod testing;

pub use adapter::{
    AdapterError, CargoTestAdapter, CommandLine, CustomCommandAdapter, ExitCodeConvention,
    FailedExitCodes, NextestAdapter, TestFrameworkAdapter, adapter_for,
};
pub use baseline::{BaselineGate, BaselineResult, failure_message};
pub use classify::ResultClassifier;
pub use config::{ConfigError, MutationConfig};
pub use events::{DeliveryError, EventBus, EventSubscriber, MutationEvent, SubscriberError};
pub use generator::{GeneratorError, ManifestGenerator, MutationGenerator};
pub use mutant::{Mutant, Mutation, SourceLocation, Verdict, VerdictCounts};
pub use process::{
    CommandExecutor, ExecutionError, ProcessExecutor, ProcessFactory, ProcessInvocation,
    ProcessOutcome, exit_code_text, truncate_preview,
};
pub use report::{GateStatus, QualityGate, ReportFormat, RunReport, render_report};
pub use runner::{MutationRunError, Orchestrator, RunOutcome};
pub use scheduler::{DeliveryFailure, ScheduledRun, Scheduler};
pub use subscribers::{ArtifactWriter, EventRecorder, JsonlEventLog, TracingProgress, event_bus_for};
