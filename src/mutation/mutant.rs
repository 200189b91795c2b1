//! Mutations, verdicts and classified mutants.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::process::ProcessOutcome;

/// Source position a mutation applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file path, relative to the project directory.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
}

/// One candidate alteration of the source, as produced by a generator.
///
/// The orchestration layer never looks inside a mutation: it hands it to the
/// framework adapter to build an invocation and copies it into the resulting [`Mutant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    /// Stable identifier, unique within a workload.
    pub id: String,
    /// Human-readable description.
    #[serde(default)]
    pub label: String,
    /// Adapter-specific token that activates this mutation. Defaults to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Where the mutation applies, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl Mutation {
    /// Create a mutation with an id and label.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            selector: None,
            location: None,
        }
    }

    /// Set the activation selector.
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Set the source location.
    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.location = Some(SourceLocation {
            file: file.into(),
            line,
        });
        self
    }

    /// Token used to activate this mutation in the test process.
    pub fn selector(&self) -> &str {
        self.selector.as_deref().unwrap_or(&self.id)
    }
}

/// Classification of one mutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Tests failed: the mutation was detected.
    Killed,
    /// Tests still passed: the mutation went undetected.
    Escaped,
    /// The test process exceeded its time limit.
    Timeout,
    /// The test process malfunctioned for reasons unrelated to test results.
    Error,
}

impl Verdict {
    /// Every verdict, in report order.
    pub const ALL: [Verdict; 4] = [
        Verdict::Killed,
        Verdict::Escaped,
        Verdict::Timeout,
        Verdict::Error,
    ];

    /// Lowercase name used in reports and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Killed => "killed",
            Verdict::Escaped => "escaped",
            Verdict::Timeout => "timeout",
            Verdict::Error => "error",
        }
    }

    /// True unless the mutation escaped the test suite.
    pub fn is_detected(self) -> bool {
        !matches!(self, Verdict::Escaped)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation paired with the outcome of testing it and the derived verdict.
///
/// Only the scheduler creates mutants; they are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mutant {
    mutation: Mutation,
    outcome: ProcessOutcome,
    verdict: Verdict,
}

impl Mutant {
    pub(crate) fn new(mutation: Mutation, outcome: ProcessOutcome, verdict: Verdict) -> Self {
        Self {
            mutation,
            outcome,
            verdict,
        }
    }

    /// The tested mutation.
    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    /// Outcome of the test process.
    pub fn outcome(&self) -> &ProcessOutcome {
        &self.outcome
    }

    /// Verdict derived from the outcome.
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Shorthand for `mutation().id`.
    pub fn id(&self) -> &str {
        &self.mutation.id
    }
}

/// Number of mutants per verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    /// Killed mutants.
    pub killed: usize,
    /// Escaped mutants.
    pub escaped: usize,
    /// Timed out mutants.
    pub timeout: usize,
    /// Errored mutants.
    pub error: usize,
}

impl VerdictCounts {
    /// Count one more mutant with `verdict`.
    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Killed => self.killed += 1,
            Verdict::Escaped => self.escaped += 1,
            Verdict::Timeout => self.timeout += 1,
            Verdict::Error => self.error += 1,
        }
    }

    /// Count for one verdict.
    pub fn get(&self, verdict: Verdict) -> usize {
        match verdict {
            Verdict::Killed => self.killed,
            Verdict::Escaped => self.escaped,
            Verdict::Timeout => self.timeout,
            Verdict::Error => self.error,
        }
    }

    /// Sum over all verdicts.
    pub fn total(&self) -> usize {
        self.killed + self.escaped + self.timeout + self.error
    }

    /// Mutants detected by the suite in any way (everything except escaped).
    pub fn detected(&self) -> usize {
        self.total() - self.escaped
    }
}

impl FromIterator<Verdict> for VerdictCounts {
    fn from_iter<I: IntoIterator<Item = Verdict>>(iter: I) -> Self {
        let mut counts = Self::default();
        for verdict in iter {
            counts.record(verdict);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_defaults_to_id() {
        let plain = Mutation::new("m1", "replace + with -");
        assert_eq!(plain.selector(), "m1");

        let selected = plain.clone().with_selector("lib.rs:3");
        assert_eq!(selected.selector(), "lib.rs:3");
    }

    #[test]
    fn manifest_entries_only_need_an_id() {
        let mutation: Mutation =
            serde_json::from_str(r#"{"id":"m7"}"#).expect("minimal mutation should parse");
        assert_eq!(mutation.id, "m7");
        assert!(mutation.label.is_empty());
        assert!(mutation.location.is_none());
    }

    #[test]
    fn counts_track_every_verdict() {
        let counts: VerdictCounts = [
            Verdict::Killed,
            Verdict::Killed,
            Verdict::Escaped,
            Verdict::Timeout,
            Verdict::Error,
        ]
        .into_iter()
        .collect();

        assert_eq!(counts.killed, 2);
        assert_eq!(counts.get(Verdict::Escaped), 1);
        assert_eq!(counts.total(), 5);
        assert_eq!(counts.detected(), 4);
        for verdict in Verdict::ALL {
            assert!(counts.get(verdict) >= 1, "{verdict} should be counted");
        }
    }
}
