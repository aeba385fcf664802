//! Domain registry: the immutable per-domain deploy snapshot.
//!
//! Every other component receives the registry read-only (usually behind an
//! `Arc`). Validation happens once, here, so that a malformed deploy fails
//! before any chain interaction.

use crate::domain::{ContractRole, Domain};
use crate::error::GovernError;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Connection parameters for a domain's chain. Carried, never dialed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConnection {
    pub name: String,
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

/// A beacon proxy: the stable external address plus the beacon behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconProxy {
    pub proxy: Address,
    pub beacon: Address,
}

/// Deployed contract addresses for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreContracts {
    pub home: BeaconProxy,
    pub governance_router: BeaconProxy,
    /// Only this contract may call `setUpdater` on the home.
    pub updater_manager: Address,
    pub xapp_connection_manager: Address,
    pub upgrade_beacon_controller: Address,
    /// Shared by every replica on this domain.
    pub replica_beacon: Address,
    /// Replica proxy per remote domain.
    pub replicas: BTreeMap<Domain, Address>,
}

/// Implementations each beacon is expected to point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementations {
    pub home: Address,
    pub replica: Address,
    pub governance_router: Address,
}

/// The intended state of one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedConfig {
    pub updater: Address,
    pub owner: Address,
    pub implementations: Implementations,
    pub remotes: BTreeSet<Domain>,
}

/// One domain's deploy record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deploy {
    pub domain: Domain,
    pub chain: ChainConnection,
    pub contracts: CoreContracts,
    pub expected: ExpectedConfig,
}

impl Deploy {
    pub fn name(&self) -> &str {
        &self.chain.name
    }

    pub fn replica(&self, remote: Domain) -> Option<Address> {
        self.contracts.replicas.get(&remote).copied()
    }

    /// Address that receives calls made to `role`.
    pub fn contract_address(&self, role: ContractRole) -> Option<Address> {
        match role {
            ContractRole::Home => Some(self.contracts.home.proxy),
            ContractRole::UpdaterManager => Some(self.contracts.updater_manager),
            ContractRole::GovernanceRouter => Some(self.contracts.governance_router.proxy),
            ContractRole::XAppConnectionManager => Some(self.contracts.xapp_connection_manager),
            ContractRole::UpgradeBeaconController => Some(self.contracts.upgrade_beacon_controller),
            ContractRole::Replica { remote } => self.replica(remote),
            ContractRole::Replicas => None,
        }
    }

    /// Upgrade beacon behind `role`, for roles deployed behind one.
    pub fn beacon_for(&self, role: ContractRole) -> Option<Address> {
        match role {
            ContractRole::Home => Some(self.contracts.home.beacon),
            ContractRole::GovernanceRouter => Some(self.contracts.governance_router.beacon),
            ContractRole::Replicas | ContractRole::Replica { .. } => {
                Some(self.contracts.replica_beacon)
            }
            ContractRole::UpdaterManager
            | ContractRole::XAppConnectionManager
            | ContractRole::UpgradeBeaconController => None,
        }
    }

    pub fn expected_implementation(&self, role: ContractRole) -> Option<Address> {
        let implementations = &self.expected.implementations;
        match role {
            ContractRole::Home => Some(implementations.home),
            ContractRole::GovernanceRouter => Some(implementations.governance_router),
            ContractRole::Replicas | ContractRole::Replica { .. } => Some(implementations.replica),
            ContractRole::UpdaterManager
            | ContractRole::XAppConnectionManager
            | ContractRole::UpgradeBeaconController => None,
        }
    }

    /// Contracts whose owner must equal the expected owner, in check order.
    pub fn governable_contracts(&self) -> Vec<(ContractRole, Address)> {
        let mut contracts = vec![
            (ContractRole::Home, self.contracts.home.proxy),
            (ContractRole::UpdaterManager, self.contracts.updater_manager),
        ];
        for remote in &self.expected.remotes {
            if let Some(replica) = self.replica(*remote) {
                contracts.push((ContractRole::Replica { remote: *remote }, replica));
            }
        }
        contracts.push((
            ContractRole::XAppConnectionManager,
            self.contracts.xapp_connection_manager,
        ));
        contracts.push((
            ContractRole::UpgradeBeaconController,
            self.contracts.upgrade_beacon_controller,
        ));
        contracts
    }
}

/// Read-only mapping from domain to deploy, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRegistry {
    deploys: Vec<Deploy>,
}

impl DomainRegistry {
    /// Validate and freeze a set of deploys.
    pub fn new(deploys: Vec<Deploy>) -> Result<Self, GovernError> {
        let issues = validate_deploys(&deploys);
        if !issues.is_empty() {
            return Err(GovernError::Configuration(issues.join("; ")));
        }
        Ok(Self { deploys })
    }

    pub fn deploys(&self) -> &[Deploy] {
        &self.deploys
    }

    pub fn get(&self, domain: Domain) -> Option<&Deploy> {
        self.deploys.iter().find(|deploy| deploy.domain == domain)
    }

    pub fn contains(&self, domain: Domain) -> bool {
        self.get(domain).is_some()
    }

    /// Domains in configuration order.
    pub fn domains(&self) -> Vec<Domain> {
        self.deploys.iter().map(|deploy| deploy.domain).collect()
    }

    /// Updater a replica of `remote` must accept: the remote home's updater.
    pub fn replica_updater(&self, remote: Domain) -> Option<Address> {
        self.get(remote).map(|deploy| deploy.expected.updater)
    }

    pub fn by_name(&self, name: &str) -> Option<&Deploy> {
        self.deploys.iter().find(|deploy| deploy.name() == name)
    }

    pub fn len(&self) -> usize {
        self.deploys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deploys.is_empty()
    }
}

fn validate_deploys(deploys: &[Deploy]) -> Vec<String> {
    let mut issues = Vec::new();
    if deploys.is_empty() {
        issues.push("registry has no domains".to_string());
        return issues;
    }

    let mut domains = BTreeSet::new();
    let mut names = BTreeSet::new();
    for deploy in deploys {
        if !domains.insert(deploy.domain) {
            issues.push(format!("domain {} is configured twice", deploy.domain));
        }
        if deploy.name().trim().is_empty() {
            issues.push(format!("domain {} has an empty name", deploy.domain));
        } else if !names.insert(deploy.name()) {
            issues.push(format!("network name `{}` is used twice", deploy.name()));
        }
    }

    for deploy in deploys {
        let domain = deploy.domain;
        let contracts = &deploy.contracts;
        let expected = &deploy.expected;
        let required = [
            ("home.proxy", contracts.home.proxy),
            ("home.beacon", contracts.home.beacon),
            ("governance_router.proxy", contracts.governance_router.proxy),
            ("governance_router.beacon", contracts.governance_router.beacon),
            ("updater_manager", contracts.updater_manager),
            ("xapp_connection_manager", contracts.xapp_connection_manager),
            ("upgrade_beacon_controller", contracts.upgrade_beacon_controller),
            ("replica_beacon", contracts.replica_beacon),
            ("expected.updater", expected.updater),
            ("expected.owner", expected.owner),
            ("expected.implementations.home", expected.implementations.home),
            (
                "expected.implementations.replica",
                expected.implementations.replica,
            ),
            (
                "expected.implementations.governance_router",
                expected.implementations.governance_router,
            ),
        ];
        for (field, address) in required {
            if address.is_zero() {
                issues.push(format!("domain {domain}: {field} is the zero address"));
            }
        }

        for (remote, replica) in &contracts.replicas {
            if *remote == domain {
                issues.push(format!("domain {domain}: replica configured for itself"));
            }
            if replica.is_zero() {
                issues.push(format!(
                    "domain {domain}: replica for remote {remote} is the zero address"
                ));
            }
        }

        for remote in &expected.remotes {
            if *remote == domain {
                issues.push(format!("domain {domain}: lists itself as a remote"));
                continue;
            }
            if !domains.contains(remote) {
                issues.push(format!(
                    "domain {domain}: expected remote {remote} is not in the registry"
                ));
            }
            if !contracts.replicas.contains_key(remote) {
                issues.push(format!(
                    "domain {domain}: no replica address for expected remote {remote}"
                ));
            }
        }
    }
    issues
}
