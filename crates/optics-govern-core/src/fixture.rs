//! In-memory chains for tests and dry runs.
//!
//! A [`FixtureChain`] answers state reads from a table, applies the
//! governance methods it understands when a transaction is submitted, and
//! supports failure injection (read errors, reverted estimates, failed or
//! reverted submissions, latency). [`FixtureNetwork`] holds one per domain.
//!
//! Snapshots let an operator describe observed state as JSON:
//!
//! ```json
//! {
//!   "domains": [
//!     {
//!       "domain": 1000,
//!       "seedExpected": true,
//!       "state": [
//!         { "contract": "0x…", "query": { "kind": "beacon_implementation" }, "value": "0x…" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::batch::Call;
use crate::chain::{ChainAccess, ChainError, ChainSet, GasEstimate, Receipt, StateQuery, UnsignedTx};
use crate::domain::Domain;
use crate::error::GovernError;
use crate::method::GovernanceMethod;
use crate::registry::{Deploy, DomainRegistry};
use alloy_primitives::{Address, keccak256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const BASE_GAS: u64 = 21_000;
const GAS_PER_CALLDATA_BYTE: u64 = 16;
const CALL_OVERHEAD_GAS: u64 = 30_000;

#[derive(Debug, Default)]
struct FixtureState {
    values: BTreeMap<(Address, StateQuery), Address>,
    /// Updater manager -> the home whose updater it rotates.
    updater_managers: BTreeMap<Address, Address>,
    read_failure: Option<String>,
    estimate_reverts: BTreeMap<Address, String>,
    submission_failures: BTreeMap<usize, String>,
    submission_reverts: BTreeSet<usize>,
    latency: Option<Duration>,
    submitted: Vec<UnsignedTx>,
    attempts: usize,
    reads: usize,
}

/// One domain's in-memory chain.
#[derive(Debug)]
pub struct FixtureChain {
    domain: Domain,
    chain_id: u64,
    state: Mutex<FixtureState>,
}

impl FixtureChain {
    /// An empty chain: every read answers the zero address.
    pub fn new(domain: Domain, chain_id: u64) -> Self {
        Self {
            domain,
            chain_id,
            state: Mutex::new(FixtureState::default()),
        }
    }

    /// An empty chain wired to `deploy`'s updater manager.
    pub fn for_deploy(deploy: &Deploy) -> Self {
        let chain = Self::new(deploy.domain, deploy.chain.chain_id);
        chain.link_updater_manager(deploy.contracts.updater_manager, deploy.contracts.home.proxy);
        chain
    }

    /// A chain whose state already matches `deploy`'s expected configuration.
    pub fn seeded(registry: &DomainRegistry, deploy: &Deploy) -> Self {
        let chain = Self::for_deploy(deploy);
        chain.seed_expected(registry, deploy);
        chain
    }

    fn lock(&self) -> MutexGuard<'_, FixtureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replicas are seeded with their remote home's updater.
    pub fn seed_expected(&self, registry: &DomainRegistry, deploy: &Deploy) {
        let contracts = &deploy.contracts;
        let expected = &deploy.expected;
        self.set(
            contracts.home.beacon,
            StateQuery::BeaconImplementation,
            expected.implementations.home,
        );
        self.set(
            contracts.replica_beacon,
            StateQuery::BeaconImplementation,
            expected.implementations.replica,
        );
        self.set(
            contracts.governance_router.beacon,
            StateQuery::BeaconImplementation,
            expected.implementations.governance_router,
        );
        self.set(contracts.home.proxy, StateQuery::Updater, expected.updater);
        self.set(contracts.updater_manager, StateQuery::Updater, expected.updater);
        for (_, contract) in deploy.governable_contracts() {
            self.set(contract, StateQuery::Owner, expected.owner);
        }
        for remote in &expected.remotes {
            if let Some(replica) = deploy.replica(*remote) {
                if let Some(updater) = registry.replica_updater(*remote) {
                    self.set(replica, StateQuery::Updater, updater);
                }
                self.set(
                    contracts.xapp_connection_manager,
                    StateQuery::EnrolledReplica { remote: *remote },
                    replica,
                );
            }
        }
    }

    /// `setUpdater` on `manager` also rotates `home`'s updater.
    pub fn link_updater_manager(&self, manager: Address, home: Address) {
        self.lock().updater_managers.insert(manager, home);
    }

    pub fn set(&self, contract: Address, query: StateQuery, value: Address) {
        self.lock().values.insert((contract, query), value);
    }

    pub fn get(&self, contract: Address, query: StateQuery) -> Address {
        self.lock()
            .values
            .get(&(contract, query))
            .copied()
            .unwrap_or(Address::ZERO)
    }

    /// Every subsequent read fails with `message`.
    pub fn fail_reads(&self, message: impl Into<String>) {
        self.lock().read_failure = Some(message.into());
    }

    /// Gas estimates for transactions sent to `to` revert with `reason`.
    pub fn revert_estimates_to(&self, to: Address, reason: impl Into<String>) {
        self.lock().estimate_reverts.insert(to, reason.into());
    }

    /// The `nth` submission attempt (0-based) fails before reaching the chain.
    pub fn fail_submission(&self, nth: usize, message: impl Into<String>) {
        self.lock().submission_failures.insert(nth, message.into());
    }

    /// The `nth` submission attempt (0-based) is mined but reverts.
    pub fn revert_submission(&self, nth: usize) {
        self.lock().submission_reverts.insert(nth);
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Successfully mined transactions, in submission order.
    pub fn submitted(&self) -> Vec<UnsignedTx> {
        self.lock().submitted.clone()
    }

    pub fn submission_attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn apply(state: &mut FixtureState, tx: &UnsignedTx) {
        let Some(method) = GovernanceMethod::decode(&tx.data) else {
            return;
        };
        match method {
            GovernanceMethod::Upgrade {
                beacon,
                implementation,
            } => {
                state
                    .values
                    .insert((beacon, StateQuery::BeaconImplementation), implementation);
            }
            GovernanceMethod::TransferOwnership { new_owner } => {
                state.values.insert((tx.to, StateQuery::Owner), new_owner);
            }
            GovernanceMethod::SetUpdater { updater } => {
                state.values.insert((tx.to, StateQuery::Updater), updater);
                if let Some(home) = state.updater_managers.get(&tx.to).copied() {
                    state.values.insert((home, StateQuery::Updater), updater);
                }
            }
            GovernanceMethod::OwnerEnrollReplica { replica, domain } => {
                state.values.insert(
                    (tx.to, StateQuery::EnrolledReplica { remote: domain }),
                    replica,
                );
            }
            GovernanceMethod::OwnerUnenrollReplica { replica } => {
                for ((contract, query), value) in state.values.iter_mut() {
                    if *contract == tx.to
                        && matches!(query, StateQuery::EnrolledReplica { .. })
                        && *value == replica
                    {
                        *value = Address::ZERO;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ChainAccess for FixtureChain {
    fn domain(&self) -> Domain {
        self.domain
    }

    async fn read_state(&self, contract: Address, query: StateQuery) -> Result<Address, ChainError> {
        self.delay().await;
        let mut state = self.lock();
        state.reads += 1;
        if let Some(message) = &state.read_failure {
            return Err(ChainError::rpc(message.clone()));
        }
        Ok(state
            .values
            .get(&(contract, query))
            .copied()
            .unwrap_or(Address::ZERO))
    }

    async fn populate_transaction(&self, call: &Call) -> Result<UnsignedTx, ChainError> {
        self.delay().await;
        if call.domain != self.domain {
            return Err(ChainError::Unsupported {
                message: format!(
                    "call for domain {} populated on domain {}",
                    call.domain, self.domain
                ),
            });
        }
        Ok(UnsignedTx {
            domain: self.domain,
            chain_id: self.chain_id,
            from: None,
            to: call.to,
            data: call.data.clone(),
            nonce: None,
            gas_limit: None,
        })
    }

    async fn estimate_gas(&self, tx: &UnsignedTx) -> Result<GasEstimate, ChainError> {
        self.delay().await;
        let state = self.lock();
        if let Some(reason) = state.estimate_reverts.get(&tx.to) {
            return Err(ChainError::reverted(reason.clone()));
        }
        let calldata = u64::try_from(tx.data.len()).unwrap_or(u64::MAX);
        Ok(GasEstimate {
            gas: BASE_GAS + CALL_OVERHEAD_GAS + calldata * GAS_PER_CALLDATA_BYTE,
        })
    }

    async fn submit(&self, tx: &UnsignedTx) -> Result<Receipt, ChainError> {
        self.delay().await;
        let mut state = self.lock();
        let attempt = state.attempts;
        state.attempts += 1;
        if let Some(message) = state.submission_failures.get(&attempt) {
            return Err(ChainError::rpc(message.clone()));
        }

        let mut preimage = Vec::with_capacity(16 + tx.data.len());
        preimage.extend_from_slice(&self.chain_id.to_be_bytes());
        preimage.extend_from_slice(&(attempt as u64).to_be_bytes());
        preimage.extend_from_slice(&tx.data);
        let calldata = u64::try_from(tx.data.len()).unwrap_or(u64::MAX);
        let receipt = Receipt {
            tx_hash: keccak256(&preimage),
            block_number: 1 + attempt as u64,
            gas_used: BASE_GAS + calldata * GAS_PER_CALLDATA_BYTE,
            success: !state.submission_reverts.contains(&attempt),
        };
        if receipt.success {
            Self::apply(&mut state, tx);
            state.submitted.push(tx.clone());
        }
        Ok(receipt)
    }
}

/// One fixture chain per registry domain.
#[derive(Debug, Clone, Default)]
pub struct FixtureNetwork {
    chains: BTreeMap<Domain, Arc<FixtureChain>>,
}

impl FixtureNetwork {
    /// Every domain starts consistent with its expected configuration.
    pub fn seeded(registry: &DomainRegistry) -> Self {
        let chains = registry
            .deploys()
            .iter()
            .map(|deploy| (deploy.domain, Arc::new(FixtureChain::seeded(registry, deploy))))
            .collect();
        Self { chains }
    }

    /// Build from a JSON snapshot. Every registry domain must be described.
    pub fn from_snapshot(
        registry: &DomainRegistry,
        snapshot: &FixtureSnapshot,
    ) -> Result<Self, GovernError> {
        let mut described = BTreeMap::new();
        for entry in &snapshot.domains {
            if described.insert(entry.domain, entry).is_some() {
                return Err(GovernError::Configuration(format!(
                    "snapshot describes domain {} twice",
                    entry.domain
                )));
            }
            if !registry.contains(entry.domain) {
                return Err(GovernError::Configuration(format!(
                    "snapshot describes unknown domain {}",
                    entry.domain
                )));
            }
        }

        let mut chains = BTreeMap::new();
        for deploy in registry.deploys() {
            let entry = described.get(&deploy.domain).ok_or_else(|| {
                GovernError::Configuration(format!(
                    "snapshot has no state for domain {} ({})",
                    deploy.domain,
                    deploy.name()
                ))
            })?;
            let chain = FixtureChain::for_deploy(deploy);
            if entry.seed_expected {
                chain.seed_expected(registry, deploy);
            }
            for row in &entry.state {
                chain.set(row.contract, row.query, row.value);
            }
            if let Some(message) = &entry.fail_reads {
                chain.fail_reads(message.clone());
            }
            for (nth, message) in &entry.fail_submissions {
                chain.fail_submission(*nth, message.clone());
            }
            chains.insert(deploy.domain, Arc::new(chain));
        }
        Ok(Self { chains })
    }

    pub fn chain(&self, domain: Domain) -> Option<&Arc<FixtureChain>> {
        self.chains.get(&domain)
    }

    pub fn chain_set(&self) -> ChainSet {
        self.chains
            .iter()
            .map(|(domain, chain)| (*domain, Arc::clone(chain) as Arc<dyn ChainAccess>))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FixtureSnapshot {
    pub domains: Vec<DomainSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DomainSnapshot {
    pub domain: Domain,
    /// Start from the deploy's expected state before applying `state`.
    #[serde(default)]
    pub seed_expected: bool,
    #[serde(default)]
    pub state: Vec<StateRow>,
    #[serde(default)]
    pub fail_reads: Option<String>,
    /// Submission attempt index -> failure message.
    #[serde(default)]
    pub fail_submissions: BTreeMap<usize, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateRow {
    pub contract: Address,
    pub query: StateQuery,
    pub value: Address,
}

impl FixtureSnapshot {
    pub fn from_json_str(input: &str) -> Result<Self, GovernError> {
        serde_json::from_str(input)
            .map_err(|e| GovernError::Configuration(format!("invalid state snapshot: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GovernError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| GovernError::Configuration(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw).map_err(|e| {
            GovernError::Configuration(format!(
                "{}: invalid state snapshot: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{addr, registry};

    #[tokio::test]
    async fn seeded_chain_answers_expected_state() {
        let registry = registry(&[1, 2]);
        let deploy = registry.get(Domain(1)).expect("deploy");
        let chain = FixtureChain::seeded(&registry, deploy);

        let beacon = chain
            .read_state(deploy.contracts.replica_beacon, StateQuery::BeaconImplementation)
            .await
            .expect("read");
        assert_eq!(beacon, deploy.expected.implementations.replica);
        let unknown = chain
            .read_state(addr(9, 9), StateQuery::Owner)
            .await
            .expect("read");
        assert_eq!(unknown, Address::ZERO);
        assert_eq!(chain.read_count(), 2);
    }

    #[tokio::test]
    async fn submitting_an_upgrade_repoints_the_beacon() {
        let chain = FixtureChain::new(Domain(1), 101);
        let beacon = addr(1, 0x02);
        let call = Call::from_method(
            Domain(1),
            addr(1, 0x06),
            &GovernanceMethod::Upgrade {
                beacon,
                implementation: addr(1, 0x11),
            },
            "upgrade home",
        );
        let tx = chain.populate_transaction(&call).await.expect("populate");
        let receipt = chain.submit(&tx).await.expect("submit");
        assert!(receipt.success);
        assert_eq!(chain.get(beacon, StateQuery::BeaconImplementation), addr(1, 0x11));
        assert_eq!(chain.submitted(), vec![tx]);
    }

    #[tokio::test]
    async fn reverted_submission_leaves_state_untouched() {
        let chain = FixtureChain::new(Domain(1), 101);
        chain.revert_submission(0);
        let call = Call::from_method(
            Domain(1),
            addr(1, 0x01),
            &GovernanceMethod::SetUpdater {
                updater: addr(1, 0x10),
            },
            "set updater",
        );
        let tx = chain.populate_transaction(&call).await.expect("populate");
        let receipt = chain.submit(&tx).await.expect("mined");
        assert!(!receipt.success);
        assert_eq!(chain.get(addr(1, 0x01), StateQuery::Updater), Address::ZERO);
        assert!(chain.submitted().is_empty());
        assert_eq!(chain.submission_attempts(), 1);
    }

    #[test]
    fn seeded_replicas_carry_their_remote_updater() {
        let registry = registry(&[1, 2, 3]);
        let deploy = registry.get(Domain(1)).expect("deploy");
        let chain = FixtureChain::seeded(&registry, deploy);
        for remote in [2u32, 3] {
            let replica = deploy.replica(Domain(remote)).expect("replica");
            assert_eq!(
                chain.get(replica, StateQuery::Updater),
                addr(remote as u8, 0x10)
            );
        }
    }

    #[tokio::test]
    async fn updater_manager_rotates_the_home_updater() {
        let registry = registry(&[1, 2]);
        let deploy = registry.get(Domain(1)).expect("deploy");
        let chain = FixtureChain::for_deploy(deploy);
        let call = Call::from_method(
            Domain(1),
            deploy.contracts.updater_manager,
            &GovernanceMethod::SetUpdater {
                updater: addr(1, 0x44),
            },
            "rotate updater",
        );
        let tx = chain.populate_transaction(&call).await.expect("populate");
        chain.submit(&tx).await.expect("submit");
        assert_eq!(
            chain.get(deploy.contracts.home.proxy, StateQuery::Updater),
            addr(1, 0x44)
        );
    }

    #[tokio::test]
    async fn unenroll_clears_matching_enrollment() {
        let chain = FixtureChain::new(Domain(1), 101);
        let manager = addr(1, 0x05);
        let replica = addr(1, 0x33);
        chain.set(manager, StateQuery::EnrolledReplica { remote: Domain(3) }, replica);
        let call = Call::from_method(
            Domain(1),
            manager,
            &GovernanceMethod::OwnerUnenrollReplica { replica },
            "unenroll",
        );
        let tx = chain.populate_transaction(&call).await.expect("populate");
        chain.submit(&tx).await.expect("submit");
        assert_eq!(
            chain.get(manager, StateQuery::EnrolledReplica { remote: Domain(3) }),
            Address::ZERO
        );
    }

    #[test]
    fn snapshot_must_cover_every_domain() {
        let registry = registry(&[1, 2]);
        let snapshot = FixtureSnapshot::from_json_str(
            r#"{"domains": [{"domain": 1, "seedExpected": true}]}"#,
        )
        .expect("snapshot parses");
        let err = FixtureNetwork::from_snapshot(&registry, &snapshot).unwrap_err();
        assert!(err.to_string().contains("no state for domain 2"), "{err}");
    }

    #[test]
    fn snapshot_rows_override_seeded_state() {
        let registry = registry(&[1, 2]);
        let json = format!(
            r#"{{"domains": [
                {{"domain": 1, "seedExpected": true, "state": [
                    {{"contract": "{beacon}", "query": {{"kind": "beacon_implementation"}}, "value": "{value}"}}
                ]}},
                {{"domain": 2, "seedExpected": true, "failReads": "rpc down"}}
            ]}}"#,
            beacon = addr(1, 0x07),
            value = addr(1, 0x99),
        );
        let snapshot = FixtureSnapshot::from_json_str(&json).expect("snapshot parses");
        let network = FixtureNetwork::from_snapshot(&registry, &snapshot).expect("network");
        let chain = network.chain(Domain(1)).expect("chain");
        assert_eq!(
            chain.get(addr(1, 0x07), StateQuery::BeaconImplementation),
            addr(1, 0x99)
        );
        assert_eq!(
            chain.get(addr(1, 0x01), StateQuery::Updater),
            addr(1, 0x10)
        );
        assert_eq!(network.chain_set().len(), 2);
    }
}
