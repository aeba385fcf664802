//! Error types for checking, batching, and gating.
//!
//! Domain-scoped failures (read errors while checking, submission errors
//! while executing) are not errors of this type: they are recorded in the
//! check and execution reports so that one broken domain never hides the
//! state of the others.

use crate::domain::Domain;
use crate::verify::ExpectationError;
use crate::violation::ViolationType;

/// Batch-scoped failures. Every variant halts the current phase.
#[derive(Debug, thiserror::Error)]
pub enum GovernError {
    /// Malformed or incomplete deploy configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Violation or failure accessors were used before `check_deploys`.
    #[error("invariant checks have not run; call check_deploys first")]
    NotChecked,

    /// Observed counts diverge from what the operator declared.
    #[error(transparent)]
    Expectation(#[from] ExpectationError),

    /// The declared expectation itself is malformed.
    #[error("invalid expectation: {0}")]
    InvalidExpectation(String),

    /// A violation has no registered remediation strategy.
    #[error("no remediation strategy for {kind} violation on domain {domain}")]
    RemediationUnsupported { domain: Domain, kind: ViolationType },

    /// A violation does not line up with the deploy it was reported against.
    #[error("cannot remediate {kind} violation on domain {domain}: {message}")]
    Remediation {
        domain: Domain,
        kind: ViolationType,
        message: String,
    },

    /// A call was pushed for a domain outside the registry, or to the wrong queue.
    #[error("invalid call for domain {domain}: {message}")]
    InvalidCall { domain: Domain, message: String },

    /// A lifecycle operation was attempted in the wrong batch phase.
    #[error("cannot {operation} while the batch is {phase}")]
    Phase {
        operation: &'static str,
        phase: &'static str,
    },

    /// Execution was requested for a batch whose call counts were never confirmed.
    #[error("batch {digest} has not passed expect_calls; refusing to execute")]
    Unverified { digest: String },

    /// Building a domain's transactions failed.
    #[error("failed to populate call {index} on domain {domain}: {message}")]
    Populate {
        domain: Domain,
        index: usize,
        message: String,
    },

    /// A per-domain worker task panicked or was cancelled.
    #[error("{operation} worker failed: {message}")]
    Task {
        operation: &'static str,
        message: String,
    },
}
