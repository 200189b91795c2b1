//! Baseline gate: the unmodified test suite must pass before any mutant runs.

use std::sync::Arc;

use tracing::{info, warn};

use super::adapter::TestFrameworkAdapter;
use super::process::{ProcessExecutor, ProcessFactory, ProcessOutcome, execute_or_record};

/// Result of the baseline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineResult {
    /// Baseline process outcome, verbatim.
    pub outcome: ProcessOutcome,
    /// True when the adapter's "tests passed" condition was met.
    pub successful: bool,
}

/// Runs the unmodified test suite once, synchronously, without retries.
pub struct BaselineGate {
    factory: ProcessFactory,
    adapter: Arc<dyn TestFrameworkAdapter>,
    executor: Arc<dyn ProcessExecutor>,
}

impl BaselineGate {
    /// Gate running `adapter`'s baseline command through `executor`.
    pub fn new(
        factory: ProcessFactory,
        adapter: Arc<dyn TestFrameworkAdapter>,
        executor: Arc<dyn ProcessExecutor>,
    ) -> Self {
        Self {
            factory,
            adapter,
            executor,
        }
    }

    /// Run the baseline and decide whether mutation testing may proceed.
    pub fn run(&self) -> BaselineResult {
        let invocation = self.factory.build_baseline(self.adapter.as_ref());
        info!(
            framework = self.adapter.name(),
            command = %invocation.display_command(),
            "running baseline test suite"
        );

        let outcome = execute_or_record(self.executor.as_ref(), &invocation);
        let exit_codes = self.adapter.exit_codes();
        let successful =
            !outcome.timed_out && outcome.exit_code.is_some_and(|code| exit_codes.is_passed(code));

        if successful {
            info!(duration_ms = outcome.duration.as_millis() as u64, "baseline passed");
        } else {
            warn!(
                exit_code = ?outcome.exit_code,
                timed_out = outcome.timed_out,
                "baseline failed"
            );
        }

        BaselineResult {
            outcome,
            successful,
        }
    }
}

/// One-line description of a failed baseline, including its stderr.
pub fn failure_message(outcome: &ProcessOutcome) -> String {
    let code = outcome
        .exit_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "none".to_string());
    format!(
        "Tests do not pass. Error code {code}. \"{}\". STDERR: {}",
        outcome.exit_code_text(),
        outcome.stderr.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::adapter::CargoTestAdapter;
    use crate::mutation::testing::ScriptedExecutor;

    fn gate(executor: Arc<ScriptedExecutor>) -> BaselineGate {
        BaselineGate::new(
            ProcessFactory::new("/project"),
            Arc::new(CargoTestAdapter::new(Vec::new())),
            executor,
        )
    }

    #[test]
    fn passing_suite_opens_the_gate() {
        let executor = Arc::new(ScriptedExecutor::new(ProcessOutcome::exited(0)));
        let result = gate(executor.clone()).run();
        assert!(result.successful);
        assert_eq!(executor.calls().len(), 1);
        assert!(executor.calls()[0].env().is_empty());
    }

    #[test]
    fn failing_suite_keeps_outcome_verbatim() {
        let baseline = ProcessOutcome::exited(2).with_output("", "error[E0425]: cannot find value");
        let executor = Arc::new(ScriptedExecutor::new(baseline.clone()));
        let result = gate(executor).run();
        assert!(!result.successful);
        assert_eq!(result.outcome, baseline);
        assert_eq!(
            failure_message(&result.outcome),
            "Tests do not pass. Error code 2. \"Misuse of shell builtins\". STDERR: error[E0425]: cannot find value"
        );
    }

    #[test]
    fn killed_tests_or_timeouts_do_not_pass() {
        let executor = Arc::new(ScriptedExecutor::new(ProcessOutcome::exited(101)));
        assert!(!gate(executor).run().successful);

        let mut timed_out = ProcessOutcome::exited(0);
        timed_out.timed_out = true;
        let executor = Arc::new(ScriptedExecutor::new(timed_out));
        assert!(!gate(executor).run().successful);
    }

    #[test]
    fn spawn_failure_is_an_unsuccessful_baseline() {
        let executor = Arc::new(ScriptedExecutor::new(ProcessOutcome::exited(0)).failing_spawn());
        let result = gate(executor).run();
        assert!(!result.successful);
        assert_eq!(result.outcome.exit_code, None);
        assert!(failure_message(&result.outcome).contains("Error code none"));
    }
}
