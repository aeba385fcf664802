//! Typed drift facts produced by the invariant checker.

use crate::domain::{ContractRole, Domain};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of drift categories the checker can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ViolationType {
    /// A beacon points at an implementation other than the expected one.
    UpgradeBeacon,
    /// A governable contract is owned by someone other than the expected owner.
    Owner,
    /// An expected remote has no replica (or a different one) enrolled.
    ReplicaMissing,
    /// A replica is enrolled for a remote outside the expected set.
    ReplicaUnexpected,
    /// Home's updater differs from the expected updater.
    HomeUpdater,
    /// A replica's updater differs from its remote home's updater.
    ReplicaUpdater,
}

impl ViolationType {
    pub const ALL: [ViolationType; 6] = [
        ViolationType::UpgradeBeacon,
        ViolationType::Owner,
        ViolationType::ReplicaMissing,
        ViolationType::ReplicaUnexpected,
        ViolationType::HomeUpdater,
        ViolationType::ReplicaUpdater,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationType::UpgradeBeacon => "UpgradeBeacon",
            ViolationType::Owner => "Owner",
            ViolationType::ReplicaMissing => "ReplicaMissing",
            ViolationType::ReplicaUnexpected => "ReplicaUnexpected",
            ViolationType::HomeUpdater => "HomeUpdater",
            ViolationType::ReplicaUpdater => "ReplicaUpdater",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        ViolationType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                let known: Vec<&str> = ViolationType::ALL.iter().map(|k| k.as_str()).collect();
                format!(
                    "unknown violation type `{trimmed}` (expected one of: {})",
                    known.join(", ")
                )
            })
    }
}

/// One detected mismatch between expected and on-chain state.
///
/// A violation is a fact: it records what was read and what was expected,
/// never how to fix it. The zero address stands for "unset".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub domain: Domain,
    #[serde(rename = "type")]
    pub kind: ViolationType,
    pub contract: ContractRole,
    pub actual: Address,
    pub expected: Address,
}

impl Violation {
    /// The remote domain this violation is scoped to, if any.
    pub fn remote(&self) -> Option<Domain> {
        match self.contract {
            ContractRole::Replica { remote } => Some(remote),
            _ => None,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} on {}: expected {}, actual {}",
            self.domain, self.kind, self.contract, self.expected, self.actual
        )
    }
}

/// A read error that stopped one domain's checks before they completed.
///
/// Never interpreted as "no violation": an incomplete domain blocks
/// `expect_violations` until the read succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckFailure {
    pub domain: Domain,
    pub invariant: String,
    pub contract: Address,
    pub error: String,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} read at {} failed: {}",
            self.domain, self.invariant, self.contract, self.error
        )
    }
}
