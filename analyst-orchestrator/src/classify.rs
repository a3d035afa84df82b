//! Outcome classification for unstructured process output
//!
//! Generated scripts often catch exceptions per section and still exit 0, so
//! the exit code alone does not say whether a run did what it was asked to.
//! [`KeywordHeuristic`] is the default policy and is deliberately lossy: a
//! successful run whose normal output mentions "error" (a column named
//! `Error Rate`, say) is classified as a failure. [`StrictPolicy`] trusts only
//! the failure sentinel and the exit code.

use crate::ClassifierKind;
use crate::sandbox::FAILURE_SENTINEL;

/// Keywords that mark output as failed under the heuristic
pub const FAILURE_KEYWORDS: [&str; 4] = ["error", "exception", "failed", "traceback"];

/// Verdict on one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The full raw output
    Success(String),
    /// Diagnostic text for the repair loop
    Failure(String),
}

impl Classification {
    pub fn is_success(&self) -> bool {
        matches!(self, Classification::Success(_))
    }
}

/// A pure decision rule over `(raw_output, exit_code)`
pub trait ClassifierPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, raw_output: &str, exit_code: Option<i32>) -> Classification;
}

/// Text after the failure sentinel, if the output starts with it
fn sentinel_diagnostic(raw_output: &str) -> Option<String> {
    raw_output
        .trim_start()
        .strip_prefix(FAILURE_SENTINEL)
        .map(|rest| rest.trim().to_string())
}

/// Failure sentinel first, then case-insensitive keyword sniffing over a
/// leading window of the output. Ignores the exit code.
#[derive(Debug, Clone)]
pub struct KeywordHeuristic {
    window: usize,
}

impl KeywordHeuristic {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Default for KeywordHeuristic {
    fn default() -> Self {
        Self::new(3000)
    }
}

impl ClassifierPolicy for KeywordHeuristic {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn classify(&self, raw_output: &str, _exit_code: Option<i32>) -> Classification {
        if let Some(diagnostic) = sentinel_diagnostic(raw_output) {
            return Classification::Failure(diagnostic);
        }

        let head: String = raw_output.chars().take(self.window).collect();
        let head = head.to_lowercase();
        if FAILURE_KEYWORDS.iter().any(|k| head.contains(k)) {
            return Classification::Failure(format!(
                "Potential error detected based on keywords in output. Full output: {}",
                raw_output
            ));
        }

        Classification::Success(raw_output.to_string())
    }
}

/// Failure sentinel or a non-zero exit code. An absent exit code defers to
/// the sentinel.
#[derive(Debug, Clone, Default)]
pub struct StrictPolicy;

impl ClassifierPolicy for StrictPolicy {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn classify(&self, raw_output: &str, exit_code: Option<i32>) -> Classification {
        if let Some(diagnostic) = sentinel_diagnostic(raw_output) {
            return Classification::Failure(diagnostic);
        }
        match exit_code {
            Some(code) if code != 0 => Classification::Failure(format!(
                "Process exited with status {}. Output: {}",
                code, raw_output
            )),
            _ => Classification::Success(raw_output.to_string()),
        }
    }
}

/// Build the configured policy
pub fn policy_for(kind: ClassifierKind, keyword_window: usize) -> Box<dyn ClassifierPolicy> {
    match kind {
        ClassifierKind::Keyword => Box::new(KeywordHeuristic::new(keyword_window)),
        ClassifierKind::Strict => Box::new(StrictPolicy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_prefix_extracts_diagnostic() {
        let policy = KeywordHeuristic::default();
        let verdict = policy.classify(
            "Execution Error: Code execution timed out after 300 seconds.",
            None,
        );
        assert_eq!(
            verdict,
            Classification::Failure("Code execution timed out after 300 seconds.".to_string())
        );
    }

    #[test]
    fn test_traceback_with_exit_zero_is_failure() {
        let policy = KeywordHeuristic::default();
        let raw = "Execution successful. Output:\nTraceback (most recent call last):\n  File \"x.py\"";
        match policy.classify(raw, Some(0)) {
            Classification::Failure(diagnostic) => {
                assert!(diagnostic.starts_with("Potential error detected based on keywords"));
                assert!(diagnostic.ends_with(raw));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_output_is_success_with_full_payload() {
        let policy = KeywordHeuristic::default();
        let raw = "Execution successful. Output:\nrows: 120\ncolumns: 8\n";
        assert_eq!(
            policy.classify(raw, Some(0)),
            Classification::Success(raw.to_string())
        );
    }

    #[test]
    fn test_keyword_outside_window_is_ignored() {
        let policy = KeywordHeuristic::new(10);
        let raw = format!("{}error", "a".repeat(10));
        assert!(policy.classify(&raw, Some(0)).is_success());
        assert!(!KeywordHeuristic::new(15).classify(&raw, Some(0)).is_success());
    }

    #[test]
    fn test_keyword_heuristic_flags_benign_column_name() {
        // Known false positive of the heuristic
        let raw = "Execution successful. Output:\nmean Error Rate: 0.02";
        assert!(!KeywordHeuristic::default().classify(raw, Some(0)).is_success());
        assert!(StrictPolicy.classify(raw, Some(0)).is_success());
    }

    #[test]
    fn test_strict_policy_uses_exit_code() {
        assert!(!StrictPolicy.classify("partial output", Some(2)).is_success());
        assert!(StrictPolicy.classify("partial output", None).is_success());
        assert!(!StrictPolicy
            .classify("Execution Error: Failed to execute code via subprocess.", None)
            .is_success());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let policies: [Box<dyn ClassifierPolicy>; 2] = [
            policy_for(ClassifierKind::Keyword, 3000),
            policy_for(ClassifierKind::Strict, 3000),
        ];
        let inputs = [
            ("Execution successful. Output:\nok", Some(0)),
            ("Execution Error: boom", Some(1)),
            ("An exception occurred", Some(0)),
            ("", None),
        ];
        for policy in &policies {
            for (raw, code) in inputs {
                assert_eq!(policy.classify(raw, code), policy.classify(raw, code));
            }
        }
    }
}
