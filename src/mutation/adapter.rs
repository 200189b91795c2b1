//! Test framework adapters: command lines and exit-code conventions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::MutationConfig;
use super::mutant::Mutation;

/// Environment variable carrying the selector of the active mutation.
pub const MUTATION_ENV_VAR: &str = "MUTATION_ID";

/// Placeholder replaced by the mutation selector in `command` framework arguments.
pub const MUTATION_PLACEHOLDER: &str = "{mutation}";

/// Exit code every built-in convention reads as "tests passed".
pub const PASSED_EXIT_CODE: i32 = 0;

/// Framework used when none is configured.
pub const DEFAULT_FRAMEWORK: &str = "cargo";

/// Every framework name understood by [`adapter_for`].
pub const FRAMEWORKS: [&str; 3] = ["cargo", "nextest", "command"];

/// Program, arguments and environment produced by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Program to execute.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl CommandLine {
    /// Command line running `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Which exit codes, besides the passing ones, mean "tests failed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedExitCodes {
    /// Only these codes mean failing tests.
    Only(Vec<i32>),
    /// Every non-passing code except these malfunction codes.
    AnyExcept(Vec<i32>),
}

/// Exit-code convention distinguishing passed, failed and malfunctioning test runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCodeConvention {
    passed: Vec<i32>,
    failed: FailedExitCodes,
}

impl ExitCodeConvention {
    /// Convention from explicit passing codes and a failing-code rule.
    pub fn new(passed: Vec<i32>, failed: FailedExitCodes) -> Self {
        Self { passed, failed }
    }

    /// libtest via `cargo test`: 0 passed, 101 failed.
    pub fn cargo() -> Self {
        Self::new(vec![PASSED_EXIT_CODE], FailedExitCodes::Only(vec![101]))
    }

    /// `cargo nextest run`: 0 passed, 100 failed. 101 (build failure) is a malfunction.
    pub fn nextest() -> Self {
        Self::new(vec![PASSED_EXIT_CODE], FailedExitCodes::Only(vec![100]))
    }

    /// Generic commands: 0 passed, anything else failed except "cannot execute"/"not found".
    pub fn generic() -> Self {
        Self::new(vec![PASSED_EXIT_CODE], FailedExitCodes::AnyExcept(vec![126, 127]))
    }

    /// Same passing codes, with `codes` as the only failing ones.
    pub fn with_failed_codes(mut self, codes: Vec<i32>) -> Self {
        self.failed = FailedExitCodes::Only(codes);
        self
    }

    /// First failing code that is also a passing code, if any.
    pub fn overlapping_code(&self) -> Option<i32> {
        match &self.failed {
            FailedExitCodes::Only(codes) => codes.iter().copied().find(|code| self.is_passed(*code)),
            FailedExitCodes::AnyExcept(_) => None,
        }
    }

    /// Does `code` mean the tests passed?
    pub fn is_passed(&self, code: i32) -> bool {
        self.passed.contains(&code)
    }

    /// Does `code` mean the tests failed?
    pub fn is_failed(&self, code: i32) -> bool {
        match &self.failed {
            FailedExitCodes::Only(codes) => codes.contains(&code),
            FailedExitCodes::AnyExcept(errors) => !self.is_passed(code) && !errors.contains(&code),
        }
    }
}

/// How a test framework is invoked and how its exit codes read.
pub trait TestFrameworkAdapter: Send + Sync {
    /// Framework name as used in configuration.
    fn name(&self) -> &str;

    /// Command running the unmodified test suite.
    fn baseline_command(&self) -> CommandLine;

    /// Command running the test suite with `mutation` active.
    fn mutant_command(&self, mutation: &Mutation) -> CommandLine;

    /// Exit-code convention of this framework.
    fn exit_codes(&self) -> &ExitCodeConvention;
}

/// `cargo test`, selecting the mutation through [`MUTATION_ENV_VAR`].
#[derive(Debug, Clone)]
pub struct CargoTestAdapter {
    test_args: Vec<String>,
    exit_codes: ExitCodeConvention,
}

impl CargoTestAdapter {
    /// Adapter appending `test_args` to `cargo test`.
    pub fn new(test_args: Vec<String>) -> Self {
        Self {
            test_args,
            exit_codes: ExitCodeConvention::cargo(),
        }
    }

    /// Replace the exit-code convention.
    pub fn with_exit_codes(mut self, exit_codes: ExitCodeConvention) -> Self {
        self.exit_codes = exit_codes;
        self
    }
}

impl TestFrameworkAdapter for CargoTestAdapter {
    fn name(&self) -> &str {
        "cargo"
    }

    fn baseline_command(&self) -> CommandLine {
        CommandLine::new("cargo")
            .arg("test")
            .args(self.test_args.iter().cloned())
    }

    fn mutant_command(&self, mutation: &Mutation) -> CommandLine {
        self.baseline_command()
            .env(MUTATION_ENV_VAR, mutation.selector())
    }

    fn exit_codes(&self) -> &ExitCodeConvention {
        &self.exit_codes
    }
}

/// `cargo nextest run --no-fail-fast`, selecting the mutation through [`MUTATION_ENV_VAR`].
#[derive(Debug, Clone)]
pub struct NextestAdapter {
    test_args: Vec<String>,
    exit_codes: ExitCodeConvention,
}

impl NextestAdapter {
    /// Adapter appending `test_args` to `cargo nextest run`.
    pub fn new(test_args: Vec<String>) -> Self {
        Self {
            test_args,
            exit_codes: ExitCodeConvention::nextest(),
        }
    }

    /// Replace the exit-code convention.
    pub fn with_exit_codes(mut self, exit_codes: ExitCodeConvention) -> Self {
        self.exit_codes = exit_codes;
        self
    }
}

impl TestFrameworkAdapter for NextestAdapter {
    fn name(&self) -> &str {
        "nextest"
    }

    fn baseline_command(&self) -> CommandLine {
        CommandLine::new("cargo")
            .args(["nextest", "run", "--no-fail-fast"])
            .args(self.test_args.iter().cloned())
    }

    fn mutant_command(&self, mutation: &Mutation) -> CommandLine {
        self.baseline_command()
            .env(MUTATION_ENV_VAR, mutation.selector())
    }

    fn exit_codes(&self) -> &ExitCodeConvention {
        &self.exit_codes
    }
}

/// Arbitrary program.
///
/// Arguments containing [`MUTATION_PLACEHOLDER`] are only passed to mutant runs,
/// with the placeholder replaced by the selector. Mutant runs also get [`MUTATION_ENV_VAR`].
#[derive(Debug, Clone)]
pub struct CustomCommandAdapter {
    program: String,
    args: Vec<String>,
    exit_codes: ExitCodeConvention,
}

impl CustomCommandAdapter {
    /// Adapter running `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            exit_codes: ExitCodeConvention::generic(),
        }
    }

    /// Replace the exit-code convention.
    pub fn with_exit_codes(mut self, exit_codes: ExitCodeConvention) -> Self {
        self.exit_codes = exit_codes;
        self
    }
}

impl TestFrameworkAdapter for CustomCommandAdapter {
    fn name(&self) -> &str {
        "command"
    }

    fn baseline_command(&self) -> CommandLine {
        CommandLine::new(&self.program).args(
            self.args
                .iter()
                .filter(|arg| !arg.contains(MUTATION_PLACEHOLDER))
                .cloned(),
        )
    }

    fn mutant_command(&self, mutation: &Mutation) -> CommandLine {
        let selector = mutation.selector();
        CommandLine::new(&self.program)
            .args(
                self.args
                    .iter()
                    .map(|arg| arg.replace(MUTATION_PLACEHOLDER, selector)),
            )
            .env(MUTATION_ENV_VAR, selector)
    }

    fn exit_codes(&self) -> &ExitCodeConvention {
        &self.exit_codes
    }
}

/// Adapter resolution errors. Fatal before the baseline runs.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Framework name is not known.
    #[error("unknown test framework `{0}` (expected one of: cargo, nextest, command)")]
    UnknownFramework(String),
    /// `command` framework configured without a program.
    #[error("the `command` framework needs a program to run")]
    MissingCommand,
    /// A failing exit code override also reads as passing.
    #[error("exit code {0} cannot mean both passed and failed")]
    FailedCodeIsPassing(i32),
}

/// Resolve the adapter named by `config.framework`.
pub fn adapter_for(
    config: &MutationConfig,
) -> Result<Arc<dyn TestFrameworkAdapter>, AdapterError> {
    let with_overrides = |convention: ExitCodeConvention| {
        let convention = match &config.failed_exit_codes {
            Some(codes) => convention.with_failed_codes(codes.clone()),
            None => convention,
        };
        match convention.overlapping_code() {
            Some(code) => Err(AdapterError::FailedCodeIsPassing(code)),
            None => Ok(convention),
        }
    };

    let adapter: Arc<dyn TestFrameworkAdapter> = match config.framework.as_str() {
        "cargo" => Arc::new(
            CargoTestAdapter::new(config.test_args.clone())
                .with_exit_codes(with_overrides(ExitCodeConvention::cargo())?),
        ),
        "nextest" => Arc::new(
            NextestAdapter::new(config.test_args.clone())
                .with_exit_codes(with_overrides(ExitCodeConvention::nextest())?),
        ),
        "command" => {
            let (program, args) = config
                .command
                .split_first()
                .ok_or(AdapterError::MissingCommand)?;
            let mut args = args.to_vec();
            args.extend(config.test_args.iter().cloned());
            Arc::new(
                CustomCommandAdapter::new(program.clone(), args)
                    .with_exit_codes(with_overrides(ExitCodeConvention::generic())?),
            )
        }
        other => return Err(AdapterError::UnknownFramework(other.to_string())),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cargo_adapter_selects_mutation_through_env() {
        let adapter = CargoTestAdapter::new(vec!["--lib".to_string()]);
        let baseline = adapter.baseline_command();
        assert_eq!(baseline.program, "cargo");
        assert_eq!(baseline.args, vec!["test", "--lib"]);
        assert!(baseline.env.is_empty());

        let mutant = adapter.mutant_command(&Mutation::new("m1", "").with_selector("7"));
        assert_eq!(mutant.args, baseline.args);
        assert_eq!(mutant.env.get(MUTATION_ENV_VAR).map(String::as_str), Some("7"));
    }

    #[test]
    fn nextest_adapter_runs_without_fail_fast() {
        let adapter = NextestAdapter::new(Vec::new());
        assert_eq!(
            adapter.baseline_command().args,
            vec!["nextest", "run", "--no-fail-fast"]
        );
        assert!(adapter.exit_codes().is_failed(100));
        assert!(!adapter.exit_codes().is_failed(101));
    }

    #[test]
    fn custom_adapter_substitutes_placeholder_only_for_mutants() {
        let adapter = CustomCommandAdapter::new(
            "./run.sh",
            vec!["--fast".to_string(), "--mutant={mutation}".to_string()],
        );
        assert_eq!(adapter.baseline_command().args, vec!["--fast"]);
        let mutant = adapter.mutant_command(&Mutation::new("m3", ""));
        assert_eq!(mutant.args, vec!["--fast", "--mutant=m3"]);
        assert_eq!(mutant.env.get(MUTATION_ENV_VAR).map(String::as_str), Some("m3"));
    }

    #[test]
    fn conventions_separate_passed_failed_and_malfunction() {
        let cargo = ExitCodeConvention::cargo();
        assert!(cargo.is_passed(0));
        assert!(cargo.is_failed(101));
        assert!(!cargo.is_failed(1) && !cargo.is_passed(1));

        let generic = ExitCodeConvention::generic();
        assert!(generic.is_failed(1));
        assert!(generic.is_failed(2));
        assert!(!generic.is_failed(0));
        assert!(!generic.is_failed(127));

        let overridden = generic.with_failed_codes(vec![3]);
        assert!(overridden.is_failed(3));
        assert!(!overridden.is_failed(1));
    }

    #[test]
    fn adapter_for_resolves_known_names() {
        for name in FRAMEWORKS {
            let config = MutationConfig::default()
                .with_framework(name)
                .with_command(vec!["./run.sh".to_string()]);
            let adapter = adapter_for(&config).expect("known framework should resolve");
            assert_eq!(adapter.name(), name);
        }
    }

    #[test]
    fn adapter_for_applies_exit_code_override() {
        let config = MutationConfig::default().with_failed_exit_codes(vec![1]);
        let adapter = adapter_for(&config).expect("cargo should resolve");
        assert!(adapter.exit_codes().is_failed(1));
        assert!(!adapter.exit_codes().is_failed(101));
    }

    #[test]
    fn adapter_for_rejects_unknown_and_incomplete_configs() {
        let unknown = MutationConfig::default().with_framework("phpunit");
        match adapter_for(&unknown) {
            Err(AdapterError::UnknownFramework(name)) => assert_eq!(name, "phpunit"),
            Err(other) => panic!("expected unknown framework, got {other:?}"),
            Ok(_) => panic!("unknown framework should not resolve"),
        }

        let no_command = MutationConfig::default().with_framework("command");
        assert!(matches!(
            adapter_for(&no_command),
            Err(AdapterError::MissingCommand)
        ));
    }

    #[test]
    fn failing_override_cannot_include_a_passing_code() {
        let convention = ExitCodeConvention::cargo().with_failed_codes(vec![1, 0]);
        assert_eq!(convention.overlapping_code(), Some(0));
        assert_eq!(ExitCodeConvention::cargo().overlapping_code(), None);
        assert_eq!(ExitCodeConvention::generic().overlapping_code(), None);

        let config = MutationConfig::default().with_failed_exit_codes(vec![0]);
        assert!(matches!(
            adapter_for(&config),
            Err(AdapterError::FailedCodeIsPassing(0))
        ));
    }
}
