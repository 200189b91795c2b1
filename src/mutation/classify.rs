//! Process outcome to verdict classification.

use super::adapter::ExitCodeConvention;
use super::mutant::Verdict;
use super::process::ProcessOutcome;

/// Maps a [`ProcessOutcome`] to a [`Verdict`] under one exit-code convention.
///
/// The mapping is total and depends on nothing but the outcome:
/// timeout flag first, then "tests failed", then "tests passed", everything else is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultClassifier {
    exit_codes: ExitCodeConvention,
}

impl ResultClassifier {
    /// Classifier using `exit_codes`.
    pub fn new(exit_codes: ExitCodeConvention) -> Self {
        Self { exit_codes }
    }

    /// Classify one outcome.
    pub fn classify(&self, outcome: &ProcessOutcome) -> Verdict {
        if outcome.timed_out {
            return Verdict::Timeout;
        }
        match outcome.exit_code {
            Some(code) if self.exit_codes.is_failed(code) => Verdict::Killed,
            Some(code) if self.exit_codes.is_passed(code) => Verdict::Escaped,
            _ => Verdict::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn cargo() -> ResultClassifier {
        ResultClassifier::new(ExitCodeConvention::cargo())
    }

    #[test]
    fn exit_codes_map_to_verdicts() {
        let classifier = cargo();
        assert_eq!(classifier.classify(&ProcessOutcome::exited(101)), Verdict::Killed);
        assert_eq!(classifier.classify(&ProcessOutcome::exited(0)), Verdict::Escaped);
        assert_eq!(classifier.classify(&ProcessOutcome::exited(1)), Verdict::Error);
        assert_eq!(
            classifier.classify(&ProcessOutcome::failed_to_start("no such file")),
            Verdict::Error
        );
    }

    #[test]
    fn timeout_flag_wins_over_exit_code() {
        let classifier = cargo();
        for code in [0, 101, 1] {
            let mut outcome = ProcessOutcome::exited(code);
            outcome.timed_out = true;
            assert_eq!(classifier.classify(&outcome), Verdict::Timeout);
        }
        assert_eq!(classifier.classify(&ProcessOutcome::timed_out()), Verdict::Timeout);
    }

    #[test]
    fn generic_convention_treats_nonzero_as_killed() {
        let classifier = ResultClassifier::new(ExitCodeConvention::generic());
        assert_eq!(classifier.classify(&ProcessOutcome::exited(1)), Verdict::Killed);
        assert_eq!(classifier.classify(&ProcessOutcome::exited(2)), Verdict::Killed);
        assert_eq!(classifier.classify(&ProcessOutcome::exited(0)), Verdict::Escaped);
        assert_eq!(classifier.classify(&ProcessOutcome::exited(127)), Verdict::Error);
    }

    proptest! {
        #[test]
        fn classification_is_pure(
            code in proptest::option::of(-5i32..300),
            timed_out in any::<bool>(),
            stdout in ".{0,16}",
        ) {
            let outcome = ProcessOutcome {
                exit_code: code,
                stdout,
                stderr: String::new(),
                duration: std::time::Duration::from_millis(5),
                timed_out,
            };
            let classifier = cargo();
            let first = classifier.classify(&outcome);
            let second = classifier.classify(&outcome.clone());
            prop_assert_eq!(first, second);
            if timed_out {
                prop_assert_eq!(first, Verdict::Timeout);
            }
        }
    }
}
