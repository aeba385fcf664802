//! Expectation gates.
//!
//! Both gates compare an operator-declared count per subject with what was
//! actually observed. Subjects that were observed but never declared count
//! as declared-zero, so an unreviewed violation type or an unreviewed domain
//! always fails the gate. All mismatches are collected before failing.

use crate::error::GovernError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Violations,
    Calls,
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Violations => f.write_str("violations"),
            Gate::Calls => f.write_str("calls"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mismatch {
    pub subject: String,
    pub expected: usize,
    pub actual: usize,
    /// False when the subject was observed without being declared.
    pub declared: bool,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.declared {
            write!(
                f,
                "{}: expected {}, found {}",
                self.subject, self.expected, self.actual
            )
        } else {
            write!(f, "{}: undeclared, found {}", self.subject, self.actual)
        }
    }
}

/// Raised when observed counts diverge from the operator's declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectationError {
    pub gate: Gate,
    pub mismatches: Vec<Mismatch>,
}

impl ExpectationError {
    /// Whether `subject` is among the mismatches.
    pub fn mentions(&self, subject: &str) -> bool {
        self.mismatches.iter().any(|m| m.subject == subject)
    }
}

impl fmt::Display for ExpectationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected {}: ", self.gate)?;
        for (i, mismatch) in self.mismatches.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{mismatch}")?;
        }
        Ok(())
    }
}

impl Error for ExpectationError {}

/// Compare declared `(subjects[i], counts[i])` pairs against `observed`.
///
/// Mismatches are reported in declaration order, then undeclared subjects in
/// their natural order.
pub(crate) fn compare_counts<K>(
    gate: Gate,
    subjects: &[K],
    counts: &[usize],
    observed: &BTreeMap<K, usize>,
) -> Result<(), GovernError>
where
    K: Ord + fmt::Display,
{
    if subjects.len() != counts.len() {
        return Err(GovernError::InvalidExpectation(format!(
            "{gate} gate got {} subjects but {} counts",
            subjects.len(),
            counts.len()
        )));
    }

    let mut declared = BTreeSet::new();
    let mut mismatches = Vec::new();
    for (subject, expected) in subjects.iter().zip(counts) {
        if !declared.insert(subject) {
            return Err(GovernError::InvalidExpectation(format!(
                "{gate} gate declares {subject} more than once"
            )));
        }
        let actual = observed.get(subject).copied().unwrap_or(0);
        if actual != *expected {
            mismatches.push(Mismatch {
                subject: subject.to_string(),
                expected: *expected,
                actual,
                declared: true,
            });
        }
    }

    for (subject, actual) in observed {
        if *actual > 0 && !declared.contains(subject) {
            mismatches.push(Mismatch {
                subject: subject.to_string(),
                expected: 0,
                actual: *actual,
                declared: false,
            });
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(ExpectationError { gate, mismatches }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(pairs: &[(&'static str, usize)]) -> BTreeMap<&'static str, usize> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn exact_counts_pass() {
        let seen = observed(&[("a", 2), ("b", 1)]);
        assert!(compare_counts(Gate::Calls, &["a", "b"], &[2, 1], &seen).is_ok());
    }

    #[test]
    fn declared_zero_matches_absent_subject() {
        let seen = observed(&[("a", 2)]);
        assert!(compare_counts(Gate::Calls, &["a", "z"], &[2, 0], &seen).is_ok());
    }

    #[test]
    fn every_mismatch_is_reported() {
        let seen = observed(&[("a", 3), ("b", 1), ("c", 4)]);
        let err = compare_counts(Gate::Violations, &["a", "b"], &[2, 1], &seen).unwrap_err();
        let err = match err {
            GovernError::Expectation(err) => err,
            other => panic!("expected an expectation error, got {other:?}"),
        };
        assert_eq!(err.gate, Gate::Violations);
        assert_eq!(
            err.mismatches,
            vec![
                Mismatch {
                    subject: "a".to_string(),
                    expected: 2,
                    actual: 3,
                    declared: true,
                },
                Mismatch {
                    subject: "c".to_string(),
                    expected: 0,
                    actual: 4,
                    declared: false,
                },
            ]
        );
        assert_eq!(
            err.to_string(),
            "unexpected violations: a: expected 2, found 3; c: undeclared, found 4"
        );
    }

    #[test]
    fn arity_and_duplicates_are_invalid_expectations() {
        let seen = observed(&[]);
        assert!(matches!(
            compare_counts(Gate::Calls, &["a"], &[1, 2], &seen),
            Err(GovernError::InvalidExpectation(_))
        ));
        assert!(matches!(
            compare_counts(Gate::Calls, &["a", "a"], &[1, 1], &seen),
            Err(GovernError::InvalidExpectation(_))
        ));
    }
}
