//! Prelude module for convenient imports.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mutation_harness::prelude::*;
//!
//! let config = MutationConfig::default().with_threads(4);
//! let events = EventBus::new().with_subscriber(TracingProgress);
//! let outcome = Orchestrator::from_config(&config, events, Arc::new(CommandExecutor))?
//!     .run(config.threads)?;
//! # Ok::<(), MutationRunError>(())
//! ```

pub use crate::mutation::{
    BaselineGate, CommandExecutor, EventBus, EventSubscriber, Mutation, MutationConfig,
    MutationEvent, MutationGenerator, MutationRunError, Orchestrator, ProcessExecutor,
    ProcessFactory, QualityGate, ReportFormat, RunOutcome, RunReport, Scheduler,
    TestFrameworkAdapter, TracingProgress, Verdict, render_report,
};
