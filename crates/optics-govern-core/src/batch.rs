//! Governance call batch: per-domain ordered calls and their lifecycle.
//!
//! ```text
//!   new(violations) ──► push* ──► build ──► expect_calls ──► execute
//!        Building          Building    Built     Built(verified)   Executed
//! ```
//!
//! `build` freezes the batch. `expect_calls` records the digest it verified,
//! and `execute` refuses any batch whose current digest was not verified.
//! Within a domain calls are submitted strictly in order; a failure abandons
//! the rest of that domain's queue while other domains continue.

use crate::chain::{ChainAccess, ChainError, ChainSet, Receipt, UnsignedTx, with_timeout};
use crate::checker::ensure_chain_coverage;
use crate::config::RunOptions;
use crate::domain::Domain;
use crate::error::GovernError;
use crate::method::GovernanceMethod;
use crate::registry::DomainRegistry;
use crate::remediation::RemediationPlan;
use crate::verify::{Gate, compare_counts};
use crate::violation::Violation;
use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// One governance transaction destined for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub domain: Domain,
    pub to: Address,
    pub data: Bytes,
    pub description: String,
}

impl Call {
    pub fn new(
        domain: Domain,
        to: Address,
        data: impl Into<Bytes>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            to,
            data: data.into(),
            description: description.into(),
        }
    }

    pub fn from_method(
        domain: Domain,
        to: Address,
        method: &GovernanceMethod,
        description: impl Into<String>,
    ) -> Self {
        Self::new(domain, to, method.encode(), description)
    }

    /// The governance method this call encodes, if it is one we know.
    pub fn method(&self) -> Option<GovernanceMethod> {
        GovernanceMethod::decode(&self.data)
    }
}

/// Ordered calls keyed by domain. Every registry domain has an entry, even
/// when its queue is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallBatch {
    calls: BTreeMap<Domain, Vec<Call>>,
}

impl CallBatch {
    pub fn for_domains(domains: impl IntoIterator<Item = Domain>) -> Self {
        Self {
            calls: domains.into_iter().map(|d| (d, Vec::new())).collect(),
        }
    }

    pub(crate) fn append(&mut self, call: Call) {
        self.calls.entry(call.domain).or_default().push(call);
    }

    pub fn calls(&self, domain: Domain) -> &[Call] {
        self.calls.get(&domain).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Domain, &[Call])> {
        self.calls.iter().map(|(d, calls)| (*d, calls.as_slice()))
    }

    pub fn counts(&self) -> BTreeMap<Domain, usize> {
        self.calls.iter().map(|(d, calls)| (*d, calls.len())).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content digest over every domain's targets and calldata, in order.
    /// Descriptions are not part of the digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (domain, calls) in &self.calls {
            hasher.update(domain.id().to_be_bytes());
            hasher.update((calls.len() as u64).to_be_bytes());
            for call in calls {
                hasher.update(call.to.as_slice());
                hasher.update((call.data.len() as u64).to_be_bytes());
                hasher.update(&call.data);
            }
        }
        format!("batch1_{:x}", hasher.finalize())
    }
}

/// Populated transactions, per domain, in call order.
pub type BuiltBatch = BTreeMap<Domain, Vec<UnsignedTx>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GasOutcome {
    Estimated { gas: u64 },
    Failed { error: ChainError },
}

/// Per-position gas estimates. A failed estimate does not stop the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GasReport {
    pub domains: BTreeMap<Domain, Vec<GasOutcome>>,
}

impl GasReport {
    /// Sum of successful estimates on `domain`.
    pub fn total(&self, domain: Domain) -> u64 {
        self.domains
            .get(&domain)
            .into_iter()
            .flatten()
            .map(|outcome| match outcome {
                GasOutcome::Estimated { gas } => *gas,
                GasOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// `(domain, position, error)` for every failed estimate.
    pub fn failures(&self) -> Vec<(Domain, usize, &ChainError)> {
        let mut failures = Vec::new();
        for (domain, outcomes) in &self.domains {
            for (index, outcome) in outcomes.iter().enumerate() {
                if let GasOutcome::Failed { error } = outcome {
                    failures.push((*domain, index, error));
                }
            }
        }
        failures
    }

    pub fn is_complete(&self) -> bool {
        self.failures().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallOutcome {
    Confirmed { receipt: Receipt },
    /// Submission failed, timed out, or the receipt reports a revert.
    Failed { error: ChainError },
    /// Not attempted because an earlier call on the same domain failed.
    Abandoned,
}

impl CallOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, CallOutcome::Confirmed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionReport {
    pub domains: BTreeMap<Domain, Vec<CallOutcome>>,
}

impl ExecutionReport {
    pub fn outcomes(&self, domain: Domain) -> &[CallOutcome] {
        self.domains.get(&domain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every call on every domain confirmed.
    pub fn is_complete(&self) -> bool {
        self.domains
            .values()
            .all(|outcomes| outcomes.iter().all(CallOutcome::is_confirmed))
    }

    pub fn succeeded_domains(&self) -> Vec<Domain> {
        self.domains
            .iter()
            .filter(|(_, outcomes)| outcomes.iter().all(CallOutcome::is_confirmed))
            .map(|(domain, _)| *domain)
            .collect()
    }

    pub fn failed_domains(&self) -> Vec<Domain> {
        self.domains
            .iter()
            .filter(|(_, outcomes)| !outcomes.iter().all(CallOutcome::is_confirmed))
            .map(|(domain, _)| *domain)
            .collect()
    }
}

#[derive(Debug)]
enum BatchPhase {
    Building,
    Built(BuiltBatch),
    Executed(ExecutionReport),
}

impl BatchPhase {
    fn name(&self) -> &'static str {
        match self {
            BatchPhase::Building => "building",
            BatchPhase::Built(_) => "built",
            BatchPhase::Executed(_) => "executed",
        }
    }
}

pub struct GovernanceCallBatchBuilder {
    registry: Arc<DomainRegistry>,
    chains: ChainSet,
    options: RunOptions,
    batch: CallBatch,
    phase: BatchPhase,
    verified: Option<String>,
}

impl GovernanceCallBatchBuilder {
    /// Seed one call per violation with the standard remediation plan.
    pub fn new(
        registry: Arc<DomainRegistry>,
        chains: ChainSet,
        violations: &[Violation],
    ) -> Result<Self, GovernError> {
        Self::with_plan(registry, chains, violations, &RemediationPlan::standard())
    }

    /// Seed with a restricted plan. Any violation the plan does not cover
    /// rejects the whole construction.
    pub fn with_plan(
        registry: Arc<DomainRegistry>,
        chains: ChainSet,
        violations: &[Violation],
        plan: &RemediationPlan,
    ) -> Result<Self, GovernError> {
        ensure_chain_coverage(&registry, &chains)?;
        if let Some(uncovered) = violations.iter().find(|v| !plan.covers(v.kind)) {
            return Err(GovernError::RemediationUnsupported {
                domain: uncovered.domain,
                kind: uncovered.kind,
            });
        }

        let mut batch = CallBatch::for_domains(registry.domains());
        for violation in violations {
            let deploy = registry.get(violation.domain).ok_or_else(|| {
                GovernError::Configuration(format!(
                    "violation reported for unknown domain {}",
                    violation.domain
                ))
            })?;
            let call = plan.remediate(deploy, violation)?;
            debug!(domain = %call.domain, to = %call.to, description = %call.description, "seeded call");
            batch.append(call);
        }
        info!(
            violations = violations.len(),
            calls = batch.len(),
            "seeded remediation batch"
        );

        Ok(Self {
            registry,
            chains,
            options: RunOptions::default(),
            batch,
            phase: BatchPhase::Building,
            verified: None,
        })
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    pub fn batch(&self) -> &CallBatch {
        &self.batch
    }

    pub fn calls(&self, domain: Domain) -> &[Call] {
        self.batch.calls(domain)
    }

    pub fn call_counts(&self) -> BTreeMap<Domain, usize> {
        self.batch.counts()
    }

    pub fn digest(&self) -> String {
        self.batch.digest()
    }

    pub fn phase(&self) -> &'static str {
        self.phase.name()
    }

    /// Whether `expect_calls` passed for the current contents.
    pub fn is_verified(&self) -> bool {
        self.verified.as_deref() == Some(self.digest().as_str())
    }

    pub fn built(&self) -> Option<&BuiltBatch> {
        match &self.phase {
            BatchPhase::Built(built) => Some(built),
            _ => None,
        }
    }

    pub fn execution_report(&self) -> Option<&ExecutionReport> {
        match &self.phase {
            BatchPhase::Executed(report) => Some(report),
            _ => None,
        }
    }

    fn phase_error(&self, operation: &'static str) -> GovernError {
        GovernError::Phase {
            operation,
            phase: self.phase.name(),
        }
    }

    fn chain(&self, domain: Domain) -> Result<Arc<dyn ChainAccess>, GovernError> {
        self.chains.get(&domain).cloned().ok_or_else(|| {
            GovernError::Configuration(format!("no chain access for domain {domain}"))
        })
    }

    /// Append `call` to `domain`'s queue.
    pub fn push(&mut self, domain: Domain, call: Call) -> Result<(), GovernError> {
        if !matches!(self.phase, BatchPhase::Building) {
            return Err(self.phase_error("push"));
        }
        if !self.registry.contains(domain) {
            return Err(GovernError::InvalidCall {
                domain,
                message: "domain is not in the registry".to_string(),
            });
        }
        if call.domain != domain {
            return Err(GovernError::InvalidCall {
                domain,
                message: format!("call targets domain {}", call.domain),
            });
        }
        debug!(%domain, to = %call.to, description = %call.description, "pushed call");
        self.batch.append(call);
        Ok(())
    }

    /// Populate every call into an unsigned transaction and freeze the batch.
    /// Calling it again returns the cached result.
    pub async fn build(&mut self) -> Result<BuiltBatch, GovernError> {
        match &self.phase {
            BatchPhase::Building => {}
            BatchPhase::Built(built) => return Ok(built.clone()),
            BatchPhase::Executed(_) => return Err(self.phase_error("build")),
        }

        let mut tasks = JoinSet::new();
        for (domain, calls) in self.batch.iter() {
            let chain = self.chain(domain)?;
            let calls = calls.to_vec();
            let limit = self.options.call_timeout;
            tasks.spawn(populate_domain(domain, chain, calls, limit));
        }

        let mut built = BuiltBatch::new();
        while let Some(joined) = tasks.join_next().await {
            let (domain, txs) = joined.map_err(|e| GovernError::Task {
                operation: "build",
                message: e.to_string(),
            })??;
            built.insert(domain, txs);
        }
        info!(
            transactions = self.batch.len(),
            digest = %self.digest(),
            "batch built"
        );
        self.phase = BatchPhase::Built(built.clone());
        Ok(built)
    }

    pub async fn estimate_gas(&self) -> Result<GasReport, GovernError> {
        let BatchPhase::Built(built) = &self.phase else {
            return Err(self.phase_error("estimate gas"));
        };

        let mut tasks = JoinSet::new();
        for (domain, txs) in built {
            let chain = self.chain(*domain)?;
            let txs = txs.clone();
            let limit = self.options.call_timeout;
            tasks.spawn(estimate_domain(*domain, chain, txs, limit));
        }

        let mut report = GasReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (domain, outcomes) = joined.map_err(|e| GovernError::Task {
                operation: "estimate gas",
                message: e.to_string(),
            })?;
            report.domains.insert(domain, outcomes);
        }
        let failed = report.failures().len();
        if failed > 0 {
            warn!(failed, "gas estimation failed for some calls");
        } else {
            info!("gas estimated for every call");
        }
        Ok(report)
    }

    /// Gate: `domains[i]` must hold exactly `counts[i]` calls, and every
    /// domain not listed must hold none. Success verifies the current digest;
    /// any failure withdraws an earlier verification.
    pub fn expect_calls(&mut self, domains: &[Domain], counts: &[usize]) -> Result<(), GovernError> {
        self.verified = None;
        for domain in domains {
            if !self.registry.contains(*domain) {
                return Err(GovernError::InvalidExpectation(format!(
                    "domain {domain} is not in the registry"
                )));
            }
        }
        compare_counts(Gate::Calls, domains, counts, &self.batch.counts())?;
        let digest = self.digest();
        info!(%digest, "call counts verified");
        self.verified = Some(digest);
        Ok(())
    }

    /// Submit every transaction. Requires a built and verified batch.
    pub async fn execute(&mut self) -> Result<ExecutionReport, GovernError> {
        let built = match &self.phase {
            BatchPhase::Built(built) => built.clone(),
            _ => return Err(self.phase_error("execute")),
        };
        if !self.is_verified() {
            return Err(GovernError::Unverified {
                digest: self.digest(),
            });
        }

        info!(transactions = self.batch.len(), "executing batch");
        let mut tasks = JoinSet::new();
        for (domain, txs) in built {
            let chain = self.chain(domain)?;
            let limit = self.options.call_timeout;
            tasks.spawn(execute_domain(domain, chain, txs, limit));
        }

        let mut report = ExecutionReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (domain, outcomes) = joined.map_err(|e| GovernError::Task {
                operation: "execute",
                message: e.to_string(),
            })?;
            report.domains.insert(domain, outcomes);
        }
        if report.is_complete() {
            info!("batch executed");
        } else {
            warn!(failed = ?report.failed_domains(), "batch executed with failures");
        }
        self.phase = BatchPhase::Executed(report.clone());
        Ok(report)
    }
}

/// Free-function form of [`GovernanceCallBatchBuilder::expect_calls`].
pub fn expect_calls(
    builder: &mut GovernanceCallBatchBuilder,
    domains: &[Domain],
    counts: &[usize],
) -> Result<(), GovernError> {
    builder.expect_calls(domains, counts)
}

/// For every ordered pair of distinct domains `(home, remote)`, transfer
/// ownership of `remote`'s replica of `home` to `remote`'s governance router.
pub fn transfer_replica_ownership_calls(registry: &DomainRegistry) -> Vec<Call> {
    let mut calls = Vec::new();
    for home in registry.deploys() {
        for remote in registry.deploys() {
            if home.domain == remote.domain {
                continue;
            }
            let Some(replica) = remote.replica(home.domain) else {
                continue;
            };
            let new_owner = remote.contracts.governance_router.proxy;
            calls.push(Call::from_method(
                remote.domain,
                replica,
                &GovernanceMethod::TransferOwnership { new_owner },
                format!(
                    "{}: transfer ownership of replica[{}] to governance router {new_owner}",
                    remote.name(),
                    home.domain
                ),
            ));
        }
    }
    calls
}

#[instrument(skip_all, fields(%domain, calls = calls.len()))]
async fn populate_domain(
    domain: Domain,
    chain: Arc<dyn ChainAccess>,
    calls: Vec<Call>,
    limit: Duration,
) -> Result<(Domain, Vec<UnsignedTx>), GovernError> {
    let mut txs = Vec::with_capacity(calls.len());
    for (index, call) in calls.iter().enumerate() {
        let tx = with_timeout(limit, "populate", chain.populate_transaction(call))
            .await
            .map_err(|e| GovernError::Populate {
                domain,
                index,
                message: e.to_string(),
            })?;
        if tx.domain != domain {
            return Err(GovernError::Populate {
                domain,
                index,
                message: format!("populated for domain {}", tx.domain),
            });
        }
        txs.push(tx);
    }
    Ok((domain, txs))
}

#[instrument(skip_all, fields(%domain))]
async fn estimate_domain(
    domain: Domain,
    chain: Arc<dyn ChainAccess>,
    txs: Vec<UnsignedTx>,
    limit: Duration,
) -> (Domain, Vec<GasOutcome>) {
    let mut outcomes = Vec::with_capacity(txs.len());
    for (index, tx) in txs.iter().enumerate() {
        let outcome = match with_timeout(limit, "estimate_gas", chain.estimate_gas(tx)).await {
            Ok(estimate) => GasOutcome::Estimated { gas: estimate.gas },
            Err(error) => {
                warn!(index, %error, "gas estimate failed");
                GasOutcome::Failed { error }
            }
        };
        outcomes.push(outcome);
    }
    (domain, outcomes)
}

#[instrument(skip_all, fields(%domain, calls = txs.len()))]
async fn execute_domain(
    domain: Domain,
    chain: Arc<dyn ChainAccess>,
    txs: Vec<UnsignedTx>,
    limit: Duration,
) -> (Domain, Vec<CallOutcome>) {
    let mut outcomes = Vec::with_capacity(txs.len());
    let mut halted = false;
    for (index, tx) in txs.iter().enumerate() {
        if halted {
            outcomes.push(CallOutcome::Abandoned);
            continue;
        }
        let outcome = match with_timeout(limit, "submit", chain.submit(tx)).await {
            Ok(receipt) if receipt.success => {
                debug!(index, tx_hash = %receipt.tx_hash, "confirmed");
                CallOutcome::Confirmed { receipt }
            }
            Ok(receipt) => CallOutcome::Failed {
                error: ChainError::reverted(format!(
                    "transaction {} reverted in block {}",
                    receipt.tx_hash, receipt.block_number
                )),
            },
            Err(error) => CallOutcome::Failed { error },
        };
        if let CallOutcome::Failed { error } = &outcome {
            warn!(index, %error, remaining = txs.len() - index - 1, "call failed; abandoning domain");
            halted = true;
        }
        outcomes.push(outcome);
    }
    (domain, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StateQuery;
    use crate::checker::InvariantChecker;
    use crate::domain::ContractRole;
    use crate::fixture::FixtureNetwork;
    use crate::registry::tests::{addr, registry};
    use crate::verify::Mismatch;
    use crate::violation::ViolationType;

    const DOMAINS: [u32; 4] = [1, 2, 3, 4];

    fn domains() -> Vec<Domain> {
        DOMAINS.iter().copied().map(Domain).collect()
    }

    /// Four domains, each with its replica beacon pointing at a stale implementation.
    fn drifted() -> (Arc<DomainRegistry>, FixtureNetwork) {
        let registry = Arc::new(registry(&DOMAINS));
        let network = FixtureNetwork::seeded(&registry);
        for deploy in registry.deploys() {
            network.chain(deploy.domain).expect("chain").set(
                deploy.contracts.replica_beacon,
                StateQuery::BeaconImplementation,
                addr(deploy.domain.id() as u8, 0x99),
            );
        }
        (registry, network)
    }

    async fn violations(registry: &Arc<DomainRegistry>, network: &FixtureNetwork) -> Vec<Violation> {
        let mut checker =
            InvariantChecker::new(Arc::clone(registry), network.chain_set()).expect("checker");
        checker.check_deploys().await.expect("check runs");
        checker.violations().expect("checked").to_vec()
    }

    async fn remediation_batch() -> (Arc<DomainRegistry>, FixtureNetwork, GovernanceCallBatchBuilder) {
        let (registry, network) = drifted();
        let violations = violations(&registry, &network).await;
        let mut builder =
            GovernanceCallBatchBuilder::new(Arc::clone(&registry), network.chain_set(), &violations)
                .expect("builder");
        for call in transfer_replica_ownership_calls(&registry) {
            builder.push(call.domain, call).expect("push");
        }
        (registry, network, builder)
    }

    #[tokio::test]
    async fn seeds_one_call_per_violation_and_an_entry_per_domain() {
        let registry = Arc::new(registry(&DOMAINS));
        let network = FixtureNetwork::seeded(&registry);
        let builder = GovernanceCallBatchBuilder::new(Arc::clone(&registry), network.chain_set(), &[])
            .expect("builder");
        assert_eq!(builder.call_counts().len(), 4);
        assert!(builder.batch().is_empty());

        let (registry, network) = drifted();
        let violations = violations(&registry, &network).await;
        assert_eq!(violations.len(), 4);
        let builder = GovernanceCallBatchBuilder::new(Arc::clone(&registry), network.chain_set(), &violations)
            .expect("builder");
        for domain in domains() {
            let calls = builder.calls(domain);
            assert_eq!(calls.len(), 1);
            let deploy = registry.get(domain).expect("deploy");
            assert_eq!(calls[0].to, deploy.contracts.upgrade_beacon_controller);
            assert_eq!(
                calls[0].method(),
                Some(GovernanceMethod::Upgrade {
                    beacon: deploy.contracts.replica_beacon,
                    implementation: deploy.expected.implementations.replica,
                })
            );
        }
    }

    #[tokio::test]
    async fn unsupported_violation_rejects_construction() {
        let (registry, network) = drifted();
        let mut violations = violations(&registry, &network).await;
        violations.push(Violation {
            domain: Domain(2),
            kind: ViolationType::HomeUpdater,
            contract: ContractRole::Home,
            actual: addr(2, 0x98),
            expected: addr(2, 0x10),
        });
        let plan = RemediationPlan::only(&[ViolationType::UpgradeBeacon]);
        let err = GovernanceCallBatchBuilder::with_plan(registry, network.chain_set(), &violations, &plan)
            .err()
            .expect("construction fails");
        assert!(matches!(
            err,
            GovernError::RemediationUnsupported {
                domain: Domain(2),
                kind: ViolationType::HomeUpdater,
            }
        ));
    }

    #[tokio::test]
    async fn push_validates_domain_and_target() {
        let (registry, network) = drifted();
        let mut builder = GovernanceCallBatchBuilder::new(registry, network.chain_set(), &[])
            .expect("builder");
        let call = Call::new(Domain(2), addr(2, 0x01), Bytes::new(), "noop");
        assert!(matches!(
            builder.push(Domain(9), call.clone()),
            Err(GovernError::InvalidCall { domain: Domain(9), .. })
        ));
        assert!(matches!(
            builder.push(Domain(1), call.clone()),
            Err(GovernError::InvalidCall { domain: Domain(1), .. })
        ));
        builder.push(Domain(2), call).expect("matching domain");
        assert_eq!(builder.calls(Domain(2)).len(), 1);
    }

    #[tokio::test]
    async fn build_preserves_order_and_is_idempotent() {
        let (registry, _network, mut builder) = remediation_batch().await;
        let before: Vec<Call> = builder.calls(Domain(3)).to_vec();

        let first = builder.build().await.expect("build");
        let second = builder.build().await.expect("second build");
        assert_eq!(first, second);
        assert_eq!(builder.phase(), "built");
        assert_eq!(first.len(), registry.len());

        let txs = &first[&Domain(3)];
        assert_eq!(txs.len(), before.len());
        for (tx, call) in txs.iter().zip(&before) {
            assert_eq!(tx.to, call.to);
            assert_eq!(tx.data, call.data);
            assert_eq!(tx.chain_id, 103);
        }
    }

    #[tokio::test]
    async fn push_after_build_is_a_phase_error() {
        let (_registry, _network, mut builder) = remediation_batch().await;
        builder.build().await.expect("build");
        let err = builder
            .push(Domain(1), Call::new(Domain(1), addr(1, 0x01), Bytes::new(), "late"))
            .unwrap_err();
        assert!(matches!(
            err,
            GovernError::Phase {
                operation: "push",
                phase: "built",
            }
        ));
    }

    #[tokio::test]
    async fn expected_call_counts_gate_every_domain() {
        let (_registry, _network, mut builder) = remediation_batch().await;
        // One beacon upgrade plus three replica ownership transfers each.
        builder
            .expect_calls(&domains(), &[4, 4, 4, 4])
            .expect("counts match");
        assert!(builder.is_verified());

        let err = expect_calls(&mut builder, &domains(), &[4, 4, 4, 3]).unwrap_err();
        let GovernError::Expectation(err) = err else {
            panic!("expected an expectation error");
        };
        assert_eq!(err.gate, Gate::Calls);
        assert_eq!(
            err.mismatches,
            vec![Mismatch {
                subject: "4".to_string(),
                expected: 3,
                actual: 4,
                declared: true,
            }]
        );
    }

    #[tokio::test]
    async fn short_queue_fails_only_its_domain() {
        let (registry, network) = drifted();
        let violations = violations(&registry, &network).await;
        let mut builder =
            GovernanceCallBatchBuilder::new(Arc::clone(&registry), network.chain_set(), &violations)
                .expect("builder");
        let transfers = transfer_replica_ownership_calls(&registry);
        assert_eq!(transfers.len(), 12);
        for call in transfers {
            // Domain 3 only gets two of its three transfers.
            if call.domain == Domain(3) && builder.calls(Domain(3)).len() == 3 {
                continue;
            }
            builder.push(call.domain, call).expect("push");
        }

        let err = builder.expect_calls(&domains(), &[4, 4, 4, 4]).unwrap_err();
        let GovernError::Expectation(err) = err else {
            panic!("expected an expectation error");
        };
        assert_eq!(err.mismatches.len(), 1);
        assert!(err.mentions("3"));
        assert!(!builder.is_verified());
    }

    #[tokio::test]
    async fn unlisted_domain_with_calls_fails_the_gate() {
        let (_registry, _network, mut builder) = remediation_batch().await;
        let err = builder
            .expect_calls(&[Domain(1), Domain(2), Domain(3)], &[4, 4, 4])
            .unwrap_err();
        let GovernError::Expectation(err) = err else {
            panic!("expected an expectation error");
        };
        assert_eq!(
            err.mismatches,
            vec![Mismatch {
                subject: "4".to_string(),
                expected: 0,
                actual: 4,
                declared: false,
            }]
        );
        assert!(matches!(
            builder.expect_calls(&[Domain(7)], &[0]),
            Err(GovernError::InvalidExpectation(_))
        ));
    }

    #[tokio::test]
    async fn execute_requires_build_and_verification() {
        let (_registry, network, mut builder) = remediation_batch().await;
        assert!(matches!(
            builder.execute().await,
            Err(GovernError::Phase {
                operation: "execute",
                phase: "building",
            })
        ));

        builder.build().await.expect("build");
        assert!(matches!(
            builder.execute().await,
            Err(GovernError::Unverified { .. })
        ));
        assert!(builder.expect_calls(&domains(), &[1, 1, 1, 1]).is_err());
        assert!(matches!(
            builder.execute().await,
            Err(GovernError::Unverified { .. })
        ));
        for domain in domains() {
            assert_eq!(network.chain(domain).expect("chain").submission_attempts(), 0);
        }
    }

    #[tokio::test]
    async fn rejected_gate_withdraws_earlier_verification() {
        let (_registry, network, mut builder) = remediation_batch().await;
        builder.build().await.expect("build");
        builder
            .expect_calls(&domains(), &[4, 4, 4, 4])
            .expect("counts match");
        assert!(builder.is_verified());

        assert!(builder.expect_calls(&domains(), &[5, 5, 5, 5]).is_err());
        assert!(!builder.is_verified());
        assert!(matches!(
            builder.execute().await,
            Err(GovernError::Unverified { .. })
        ));

        builder
            .expect_calls(&domains(), &[4, 4, 4, 4])
            .expect("counts match");
        assert!(builder.expect_calls(&[Domain(9)], &[0]).is_err());
        assert!(!builder.is_verified());
        for domain in domains() {
            assert_eq!(network.chain(domain).expect("chain").submission_attempts(), 0);
        }
    }

    #[tokio::test]
    async fn home_updater_drift_is_fixed_through_the_updater_manager() {
        let registry = Arc::new(registry(&[1, 2]));
        let network = FixtureNetwork::seeded(&registry);
        let deploy = registry.get(Domain(1)).expect("deploy");
        let chain = network.chain(Domain(1)).expect("chain");
        chain.set(deploy.contracts.home.proxy, StateQuery::Updater, addr(1, 0x66));
        chain.set(deploy.contracts.updater_manager, StateQuery::Updater, addr(1, 0x66));

        let drift = violations(&registry, &network).await;
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].kind, ViolationType::HomeUpdater);
        let mut builder =
            GovernanceCallBatchBuilder::new(Arc::clone(&registry), network.chain_set(), &drift)
                .expect("builder");
        assert_eq!(builder.calls(Domain(1))[0].to, deploy.contracts.updater_manager);
        builder.build().await.expect("build");
        builder
            .expect_calls(&[Domain(1), Domain(2)], &[1, 0])
            .expect("counts match");
        assert!(builder.execute().await.expect("execute").is_complete());

        assert!(violations(&registry, &network).await.is_empty());
    }

    #[tokio::test]
    async fn estimate_failure_is_reported_at_its_position() {
        let (registry, network, mut builder) = remediation_batch().await;
        assert!(matches!(
            builder.estimate_gas().await,
            Err(GovernError::Phase { .. })
        ));
        let failing = builder.calls(Domain(2))[2].to;
        network
            .chain(Domain(2))
            .expect("chain")
            .revert_estimates_to(failing, "Ownable: caller is not the owner");
        builder.build().await.expect("build");

        let report = builder.estimate_gas().await.expect("estimates");
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, Domain(2));
        assert_eq!(failures[0].1, 2);
        assert_eq!(failures[0].2, &ChainError::reverted("Ownable: caller is not the owner"));
        assert!(!report.is_complete());
        for domain in registry.domains() {
            assert_eq!(report.domains[&domain].len(), 4);
        }
        assert!(report.total(Domain(1)) > 4 * 51_000);
    }

    #[tokio::test]
    async fn executed_batch_clears_beacon_drift() {
        let (registry, network, mut builder) = remediation_batch().await;
        builder.build().await.expect("build");
        builder
            .expect_calls(&domains(), &[4, 4, 4, 4])
            .expect("counts match");
        let report = builder.execute().await.expect("execute");
        assert!(report.is_complete());
        assert_eq!(report.succeeded_domains(), domains());
        assert_eq!(builder.execution_report(), Some(&report));
        for domain in domains() {
            let chain = network.chain(domain).expect("chain");
            let sent: Vec<Bytes> = chain.submitted().into_iter().map(|tx| tx.data).collect();
            let queued: Vec<Bytes> = builder.calls(domain).iter().map(|c| c.data.clone()).collect();
            assert_eq!(sent, queued);
        }

        let remaining = violations(&registry, &network).await;
        assert!(
            remaining
                .iter()
                .all(|v| v.kind != ViolationType::UpgradeBeacon),
            "{remaining:?}"
        );

        assert!(matches!(
            builder.execute().await,
            Err(GovernError::Phase {
                operation: "execute",
                phase: "executed",
            })
        ));
        assert!(matches!(
            builder.build().await,
            Err(GovernError::Phase { .. })
        ));
    }

    #[tokio::test]
    async fn failed_submission_abandons_only_its_domain() {
        let (_registry, network, mut builder) = remediation_batch().await;
        network
            .chain(Domain(4))
            .expect("chain")
            .fail_submission(1, "nonce too low");
        builder.build().await.expect("build");
        builder
            .expect_calls(&domains(), &[4, 4, 4, 4])
            .expect("counts match");

        let report = builder.execute().await.expect("execute");
        assert!(!report.is_complete());
        assert_eq!(report.failed_domains(), vec![Domain(4)]);
        assert_eq!(
            report.succeeded_domains(),
            vec![Domain(1), Domain(2), Domain(3)]
        );

        let outcomes = report.outcomes(Domain(4));
        assert!(outcomes[0].is_confirmed());
        assert_eq!(
            outcomes[1],
            CallOutcome::Failed {
                error: ChainError::rpc("nonce too low"),
            }
        );
        assert_eq!(outcomes[2], CallOutcome::Abandoned);
        assert_eq!(outcomes[3], CallOutcome::Abandoned);
        assert_eq!(network.chain(Domain(4)).expect("chain").submission_attempts(), 2);
        assert_eq!(network.chain(Domain(1)).expect("chain").submission_attempts(), 4);
    }

    #[tokio::test]
    async fn reverted_receipt_counts_as_failure() {
        let (_registry, network, mut builder) = remediation_batch().await;
        network.chain(Domain(1)).expect("chain").revert_submission(0);
        builder.build().await.expect("build");
        builder
            .expect_calls(&domains(), &[4, 4, 4, 4])
            .expect("counts match");

        let report = builder.execute().await.expect("execute");
        let outcomes = report.outcomes(Domain(1));
        assert!(matches!(
            &outcomes[0],
            CallOutcome::Failed {
                error: ChainError::Reverted { .. }
            }
        ));
        assert!(outcomes[1..].iter().all(|o| *o == CallOutcome::Abandoned));
        assert_eq!(report.failed_domains(), vec![Domain(1)]);
    }

    #[test]
    fn digest_tracks_calldata_not_descriptions() {
        let mut batch = CallBatch::for_domains([Domain(1), Domain(2)]);
        let call = Call::from_method(
            Domain(1),
            addr(1, 0x01),
            &GovernanceMethod::SetUpdater {
                updater: addr(1, 0x10),
            },
            "set updater",
        );
        batch.append(call.clone());
        let digest = batch.digest();
        assert!(digest.starts_with("batch1_"));

        let mut relabeled = CallBatch::for_domains([Domain(1), Domain(2)]);
        relabeled.append(Call {
            description: "other words".to_string(),
            ..call.clone()
        });
        assert_eq!(relabeled.digest(), digest);

        let mut moved = CallBatch::for_domains([Domain(1), Domain(2)]);
        moved.append(Call {
            domain: Domain(2),
            ..call
        });
        assert_ne!(moved.digest(), digest);
    }

    #[test]
    fn transfer_helper_covers_every_ordered_pair() {
        let registry = registry(&[1, 2, 3]);
        let calls = transfer_replica_ownership_calls(&registry);
        assert_eq!(calls.len(), 6);
        let first = &calls[0];
        let remote = registry.get(Domain(2)).expect("deploy");
        assert_eq!(first.domain, Domain(2));
        assert_eq!(first.to, remote.replica(Domain(1)).expect("replica"));
        assert_eq!(
            first.method(),
            Some(GovernanceMethod::TransferOwnership {
                new_owner: remote.contracts.governance_router.proxy,
            })
        );
    }
}
