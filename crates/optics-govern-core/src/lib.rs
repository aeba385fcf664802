//! # Optics Govern
//!
//! Cross-domain governance for an Optics deployment: find where deployed
//! state has drifted from its expected configuration, turn every drift into
//! a governance call on the right domain, and execute the resulting batch
//! only after the operator has confirmed its exact shape.
//!
//! The crate never signs or talks JSON-RPC itself. Every chain interaction
//! goes through [`ChainAccess`], one instance per domain.
//!
//! ## Architecture
//!
//! ```text
//! GovernConfig (TOML)        ← Operator-declared deploys and expectations
//!     │
//! DomainRegistry             ← Validated, read-only, shared behind Arc
//!     │
//! InvariantChecker           ← Per-domain probes → Violations + CheckFailures
//!     │   expect_violations  ← Gate: declared count per ViolationType
//!     │
//! GovernanceCallBatchBuilder ← RemediationPlan seeds calls, operator pushes more
//!     │   build              ← Populate + freeze
//!     │   expect_calls       ← Gate: declared count per Domain
//!     │   estimate_gas
//!     │
//! execute                    ← Per-domain ordered submission → ExecutionReport
//! ```

pub mod batch;
pub mod chain;
pub mod checker;
pub mod config;
pub mod domain;
pub mod error;
pub mod fixture;
pub mod method;
pub mod registry;
pub mod remediation;
pub mod report;
pub mod verify;
pub mod violation;

pub use batch::{
    BuiltBatch, Call, CallBatch, CallOutcome, ExecutionReport, GasOutcome, GasReport,
    GovernanceCallBatchBuilder, expect_calls, transfer_replica_ownership_calls,
};
pub use chain::{
    ChainAccess, ChainError, ChainSet, GasEstimate, Receipt, StateQuery, UnsignedTx, with_timeout,
};
pub use checker::{CHECK_FAILURE_SUBJECT, CheckReport, InvariantChecker};
pub use config::{GovernConfig, RunOptions};
pub use domain::{ContractRole, Domain};
pub use error::GovernError;
pub use fixture::{FixtureChain, FixtureNetwork, FixtureSnapshot};
pub use method::GovernanceMethod;
pub use registry::{Deploy, DomainRegistry};
pub use remediation::RemediationPlan;
pub use report::AuditReport;
pub use verify::{ExpectationError, Gate, Mismatch};
pub use violation::{CheckFailure, Violation, ViolationType};
