//! Scripted process executor shared by unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::adapter::MUTATION_ENV_VAR;
use super::process::{ExecutionError, ProcessExecutor, ProcessInvocation, ProcessOutcome};

/// Returns canned outcomes keyed by the mutation selector found in the environment.
pub(crate) struct ScriptedExecutor {
    baseline: ProcessOutcome,
    mutants: BTreeMap<String, ProcessOutcome>,
    default_mutant: ProcessOutcome,
    delay: Duration,
    spawn_fails: bool,
    calls: Mutex<Vec<ProcessInvocation>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub(crate) fn new(baseline: ProcessOutcome) -> Self {
        Self {
            baseline,
            mutants: BTreeMap::new(),
            default_mutant: ProcessOutcome::exited(101),
            delay: Duration::ZERO,
            spawn_fails: false,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_mutant(mut self, selector: &str, outcome: ProcessOutcome) -> Self {
        self.mutants.insert(selector.to_string(), outcome);
        self
    }

    pub(crate) fn with_default_mutant(mut self, outcome: ProcessOutcome) -> Self {
        self.default_mutant = outcome;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn failing_spawn(mut self) -> Self {
        self.spawn_fails = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<ProcessInvocation> {
        self.calls.lock().expect("calls mutex should lock").clone()
    }

    pub(crate) fn mutant_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.env().contains_key(MUTATION_ENV_VAR))
            .count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ProcessExecutor for ScriptedExecutor {
    fn execute(&self, invocation: &ProcessInvocation) -> Result<ProcessOutcome, ExecutionError> {
        self.calls
            .lock()
            .expect("calls mutex should lock")
            .push(invocation.clone());
        if self.spawn_fails {
            return Err(ExecutionError::Spawn {
                program: invocation.program().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = match invocation.env().get(MUTATION_ENV_VAR) {
            Some(selector) => self
                .mutants
                .get(selector)
                .unwrap_or(&self.default_mutant)
                .clone(),
            None => self.baseline.clone(),
        };
        Ok(outcome)
    }
}
