//! Violation -> governance call strategies.
//!
//! [`RemediationPlan::standard`] is built from an exhaustive `match`, so a new
//! [`ViolationType`] does not compile until it has a strategy. A plan can be
//! narrowed with [`RemediationPlan::only`] to restrict what a run is allowed
//! to fix; the builder then refuses violations outside that set.

use crate::batch::Call;
use crate::domain::{ContractRole, Domain};
use crate::error::GovernError;
use crate::method::GovernanceMethod;
use crate::registry::Deploy;
use crate::violation::{Violation, ViolationType};
use std::collections::BTreeMap;

/// Synthesizes the single call that remediates one violation.
pub type Strategy = fn(&Deploy, &Violation) -> Result<Call, GovernError>;

#[derive(Debug, Clone)]
pub struct RemediationPlan {
    strategies: BTreeMap<ViolationType, Strategy>,
}

impl RemediationPlan {
    /// One strategy for every violation type.
    pub fn standard() -> Self {
        Self {
            strategies: ViolationType::ALL
                .into_iter()
                .map(|kind| (kind, standard_strategy(kind)))
                .collect(),
        }
    }

    /// Standard strategies restricted to `kinds`.
    pub fn only(kinds: &[ViolationType]) -> Self {
        Self {
            strategies: kinds
                .iter()
                .map(|kind| (*kind, standard_strategy(*kind)))
                .collect(),
        }
    }

    pub fn covers(&self, kind: ViolationType) -> bool {
        self.strategies.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ViolationType> {
        self.strategies.keys().copied().collect()
    }

    pub fn remediate(&self, deploy: &Deploy, violation: &Violation) -> Result<Call, GovernError> {
        let strategy =
            self.strategies
                .get(&violation.kind)
                .ok_or(GovernError::RemediationUnsupported {
                    domain: violation.domain,
                    kind: violation.kind,
                })?;
        strategy(deploy, violation)
    }
}

impl Default for RemediationPlan {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_strategy(kind: ViolationType) -> Strategy {
    match kind {
        ViolationType::UpgradeBeacon => upgrade_beacon,
        ViolationType::Owner => transfer_ownership,
        ViolationType::ReplicaMissing => enroll_replica,
        ViolationType::ReplicaUnexpected => unenroll_replica,
        ViolationType::HomeUpdater => set_home_updater,
        ViolationType::ReplicaUpdater => set_replica_updater,
    }
}

fn mismatch(violation: &Violation, message: String) -> GovernError {
    GovernError::Remediation {
        domain: violation.domain,
        kind: violation.kind,
        message,
    }
}

fn replica_remote(violation: &Violation) -> Result<Domain, GovernError> {
    violation
        .remote()
        .ok_or_else(|| mismatch(violation, format!("{} is not replica-scoped", violation.contract)))
}

fn upgrade_beacon(deploy: &Deploy, violation: &Violation) -> Result<Call, GovernError> {
    let beacon = deploy.beacon_for(violation.contract).ok_or_else(|| {
        mismatch(
            violation,
            format!("{} is not deployed behind a beacon", violation.contract),
        )
    })?;
    let method = GovernanceMethod::Upgrade {
        beacon,
        implementation: violation.expected,
    };
    Ok(Call::from_method(
        deploy.domain,
        deploy.contracts.upgrade_beacon_controller,
        &method,
        format!(
            "{}: upgrade {} beacon {beacon} to implementation {}",
            deploy.name(),
            violation.contract,
            violation.expected
        ),
    ))
}

fn transfer_ownership(deploy: &Deploy, violation: &Violation) -> Result<Call, GovernError> {
    let target = deploy.contract_address(violation.contract).ok_or_else(|| {
        mismatch(
            violation,
            format!("no address on file for {}", violation.contract),
        )
    })?;
    let method = GovernanceMethod::TransferOwnership {
        new_owner: violation.expected,
    };
    Ok(Call::from_method(
        deploy.domain,
        target,
        &method,
        format!(
            "{}: transfer ownership of {} ({target}) to {}",
            deploy.name(),
            violation.contract,
            violation.expected
        ),
    ))
}

fn enroll_replica(deploy: &Deploy, violation: &Violation) -> Result<Call, GovernError> {
    let remote = replica_remote(violation)?;
    let method = GovernanceMethod::OwnerEnrollReplica {
        replica: violation.expected,
        domain: remote,
    };
    Ok(Call::from_method(
        deploy.domain,
        deploy.contracts.xapp_connection_manager,
        &method,
        format!(
            "{}: enroll replica {} for remote {remote}",
            deploy.name(),
            violation.expected
        ),
    ))
}

fn unenroll_replica(deploy: &Deploy, violation: &Violation) -> Result<Call, GovernError> {
    let remote = replica_remote(violation)?;
    let method = GovernanceMethod::OwnerUnenrollReplica {
        replica: violation.actual,
    };
    Ok(Call::from_method(
        deploy.domain,
        deploy.contracts.xapp_connection_manager,
        &method,
        format!(
            "{}: unenroll replica {} for remote {remote}",
            deploy.name(),
            violation.actual
        ),
    ))
}

/// The home only accepts `setUpdater` from its updater manager.
fn set_home_updater(deploy: &Deploy, violation: &Violation) -> Result<Call, GovernError> {
    if violation.contract != ContractRole::Home {
        return Err(mismatch(
            violation,
            format!("expected home, got {}", violation.contract),
        ));
    }
    let method = GovernanceMethod::SetUpdater {
        updater: violation.expected,
    };
    Ok(Call::from_method(
        deploy.domain,
        deploy.contracts.updater_manager,
        &method,
        format!(
            "{}: set home updater to {} via updater manager",
            deploy.name(),
            violation.expected
        ),
    ))
}

fn set_replica_updater(deploy: &Deploy, violation: &Violation) -> Result<Call, GovernError> {
    let remote = replica_remote(violation)?;
    let replica = deploy
        .replica(remote)
        .ok_or_else(|| mismatch(violation, format!("no replica on file for remote {remote}")))?;
    let method = GovernanceMethod::SetUpdater {
        updater: violation.expected,
    };
    Ok(Call::from_method(
        deploy.domain,
        replica,
        &method,
        format!(
            "{}: set updater of {} to {}",
            deploy.name(),
            violation.contract,
            violation.expected
        ),
    ))
}
