//! Invariant checker: cross-domain drift detection.
//!
//! Each domain is probed in its own task; within a domain the reads run in a
//! fixed order (beacons, updaters, owners, replica enrollment) so that the
//! merged violation list is deterministic: registry order × check order.
//!
//! A read error stops only the affected domain. It is recorded as a
//! [`CheckFailure`] and blocks [`InvariantChecker::expect_violations`], so a
//! domain that could not be read is never mistaken for a clean one.

use crate::chain::{ChainAccess, ChainSet, StateQuery, with_timeout};
use crate::config::RunOptions;
use crate::domain::ContractRole;
use crate::error::GovernError;
use crate::registry::{Deploy, DomainRegistry};
use crate::verify::{Gate, compare_counts};
use crate::violation::{CheckFailure, Violation, ViolationType};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Subject name under which check failures appear in the violations gate.
pub const CHECK_FAILURE_SUBJECT: &str = "CheckFailure";

/// Outcome of one check pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub violations: Vec<Violation>,
    pub failures: Vec<CheckFailure>,
}

impl CheckReport {
    /// No drift found and every domain was fully read.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.failures.is_empty()
    }

    pub fn counts_by_type(&self) -> BTreeMap<ViolationType, usize> {
        let mut counts = BTreeMap::new();
        for violation in &self.violations {
            *counts.entry(violation.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn of_type(&self, kind: ViolationType) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }
}

#[derive(Debug)]
enum CheckState {
    Unchecked,
    Checked(CheckReport),
}

pub struct InvariantChecker {
    registry: Arc<DomainRegistry>,
    chains: ChainSet,
    options: RunOptions,
    state: CheckState,
}

impl InvariantChecker {
    /// Fails with a configuration error if any domain lacks a chain capability.
    pub fn new(registry: Arc<DomainRegistry>, chains: ChainSet) -> Result<Self, GovernError> {
        ensure_chain_coverage(&registry, &chains)?;
        Ok(Self {
            registry,
            chains,
            options: RunOptions::default(),
            state: CheckState::Unchecked,
        })
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    pub fn is_checked(&self) -> bool {
        matches!(self.state, CheckState::Checked(_))
    }

    /// Run every invariant on every domain. Re-running replaces prior results.
    pub async fn check_deploys(&mut self) -> Result<(), GovernError> {
        let deploy_count = self.registry.len();
        info!(domains = deploy_count, "checking deploys");

        let mut tasks = JoinSet::new();
        for (index, deploy) in self.registry.deploys().iter().enumerate() {
            let chain = self
                .chains
                .get(&deploy.domain)
                .cloned()
                .ok_or_else(|| missing_chain(deploy))?;
            let registry = Arc::clone(&self.registry);
            let limit = self.options.call_timeout;
            tasks.spawn(async move {
                let deploy = &registry.deploys()[index];
                (index, check_domain(&registry, deploy, chain, limit).await)
            });
        }

        let mut per_domain: Vec<Option<CheckReport>> = vec![None; deploy_count];
        while let Some(joined) = tasks.join_next().await {
            let (index, report) = joined.map_err(|e| GovernError::Task {
                operation: "check",
                message: e.to_string(),
            })?;
            per_domain[index] = Some(report);
        }

        let mut report = CheckReport::default();
        for domain_report in per_domain.into_iter().flatten() {
            report.violations.extend(domain_report.violations);
            report.failures.extend(domain_report.failures);
        }
        info!(
            violations = report.violations.len(),
            failures = report.failures.len(),
            "invariant check complete"
        );
        self.state = CheckState::Checked(report);
        Ok(())
    }

    pub fn report(&self) -> Result<&CheckReport, GovernError> {
        match &self.state {
            CheckState::Checked(report) => Ok(report),
            CheckState::Unchecked => Err(GovernError::NotChecked),
        }
    }

    /// Violations in discovery order.
    pub fn violations(&self) -> Result<&[Violation], GovernError> {
        Ok(&self.report()?.violations)
    }

    pub fn failures(&self) -> Result<&[CheckFailure], GovernError> {
        Ok(&self.report()?.failures)
    }

    /// Gate: observed violation counts must equal `counts[i]` for `types[i]`,
    /// no undeclared type may appear, and no domain may have failed to read.
    pub fn expect_violations(
        &self,
        types: &[ViolationType],
        counts: &[usize],
    ) -> Result<(), GovernError> {
        let report = self.report()?;
        let subjects: Vec<String> = types.iter().map(|kind| kind.to_string()).collect();
        let mut observed: BTreeMap<String, usize> = report
            .counts_by_type()
            .into_iter()
            .map(|(kind, count)| (kind.to_string(), count))
            .collect();
        if !report.failures.is_empty() {
            observed.insert(CHECK_FAILURE_SUBJECT.to_string(), report.failures.len());
        }
        compare_counts(Gate::Violations, &subjects, counts, &observed)
    }
}

pub(crate) fn ensure_chain_coverage(
    registry: &DomainRegistry,
    chains: &ChainSet,
) -> Result<(), GovernError> {
    for deploy in registry.deploys() {
        let chain = chains.get(&deploy.domain).ok_or_else(|| missing_chain(deploy))?;
        if chain.domain() != deploy.domain {
            return Err(GovernError::Configuration(format!(
                "chain registered for domain {} is connected to domain {}",
                deploy.domain,
                chain.domain()
            )));
        }
    }
    Ok(())
}

fn missing_chain(deploy: &Deploy) -> GovernError {
    GovernError::Configuration(format!(
        "no chain access for domain {} ({})",
        deploy.domain,
        deploy.name()
    ))
}

#[instrument(skip_all, fields(domain = %deploy.domain, network = deploy.name()))]
async fn check_domain(
    registry: &DomainRegistry,
    deploy: &Deploy,
    chain: Arc<dyn ChainAccess>,
    limit: Duration,
) -> CheckReport {
    let mut probe = DomainProbe {
        registry,
        deploy,
        chain: chain.as_ref(),
        limit,
        violations: Vec::new(),
    };
    let failure = probe.run().await.err();
    if let Some(failure) = &failure {
        warn!(
            invariant = %failure.invariant,
            error = %failure.error,
            "domain check aborted"
        );
    }
    debug!(violations = probe.violations.len(), "domain checked");
    CheckReport {
        violations: probe.violations,
        failures: failure.into_iter().collect(),
    }
}

struct DomainProbe<'a> {
    registry: &'a DomainRegistry,
    deploy: &'a Deploy,
    chain: &'a dyn ChainAccess,
    limit: Duration,
    violations: Vec<Violation>,
}

impl DomainProbe<'_> {
    async fn run(&mut self) -> Result<(), CheckFailure> {
        self.check_beacons().await?;
        self.check_updaters().await?;
        self.check_owners().await?;
        self.check_enrollment().await
    }

    async fn read(
        &self,
        invariant: &str,
        contract: Address,
        query: StateQuery,
    ) -> Result<Address, CheckFailure> {
        with_timeout(self.limit, invariant, self.chain.read_state(contract, query))
            .await
            .map_err(|e| CheckFailure {
                domain: self.deploy.domain,
                invariant: invariant.to_string(),
                contract,
                error: e.to_string(),
            })
    }

    fn compare(&mut self, kind: ViolationType, contract: ContractRole, actual: Address, expected: Address) {
        if actual == expected {
            return;
        }
        debug!(%kind, %contract, %actual, %expected, "violation");
        self.violations.push(Violation {
            domain: self.deploy.domain,
            kind,
            contract,
            actual,
            expected,
        });
    }

    async fn check_beacons(&mut self) -> Result<(), CheckFailure> {
        let deploy = self.deploy;
        for role in [
            ContractRole::Home,
            ContractRole::Replicas,
            ContractRole::GovernanceRouter,
        ] {
            let (Some(beacon), Some(expected)) =
                (deploy.beacon_for(role), deploy.expected_implementation(role))
            else {
                continue;
            };
            let actual = self
                .read("upgrade_beacon", beacon, StateQuery::BeaconImplementation)
                .await?;
            self.compare(ViolationType::UpgradeBeacon, role, actual, expected);
        }
        Ok(())
    }

    /// A replica accepts updates signed by its remote home's updater.
    async fn check_updaters(&mut self) -> Result<(), CheckFailure> {
        let deploy = self.deploy;
        let actual = self
            .read("home_updater", deploy.contracts.home.proxy, StateQuery::Updater)
            .await?;
        self.compare(
            ViolationType::HomeUpdater,
            ContractRole::Home,
            actual,
            deploy.expected.updater,
        );

        for remote in &deploy.expected.remotes {
            let (Some(replica), Some(expected)) =
                (deploy.replica(*remote), self.registry.replica_updater(*remote))
            else {
                continue;
            };
            let actual = self
                .read("replica_updater", replica, StateQuery::Updater)
                .await?;
            self.compare(
                ViolationType::ReplicaUpdater,
                ContractRole::Replica { remote: *remote },
                actual,
                expected,
            );
        }
        Ok(())
    }

    async fn check_owners(&mut self) -> Result<(), CheckFailure> {
        let deploy = self.deploy;
        let expected = deploy.expected.owner;
        for (role, contract) in deploy.governable_contracts() {
            let actual = self.read("owner", contract, StateQuery::Owner).await?;
            self.compare(ViolationType::Owner, role, actual, expected);
        }
        Ok(())
    }

    async fn check_enrollment(&mut self) -> Result<(), CheckFailure> {
        let deploy = self.deploy;
        let manager = deploy.contracts.xapp_connection_manager;
        for remote in &deploy.expected.remotes {
            let Some(replica) = deploy.replica(*remote) else {
                continue;
            };
            let actual = self
                .read(
                    "replica_enrollment",
                    manager,
                    StateQuery::EnrolledReplica { remote: *remote },
                )
                .await?;
            self.compare(
                ViolationType::ReplicaMissing,
                ContractRole::Replica { remote: *remote },
                actual,
                replica,
            );
        }

        for remote in deploy.contracts.replicas.keys() {
            if deploy.expected.remotes.contains(remote) {
                continue;
            }
            let actual = self
                .read(
                    "replica_enrollment",
                    manager,
                    StateQuery::EnrolledReplica { remote: *remote },
                )
                .await?;
            if !actual.is_zero() {
                self.compare(
                    ViolationType::ReplicaUnexpected,
                    ContractRole::Replica { remote: *remote },
                    actual,
                    Address::ZERO,
                );
            }
        }
        Ok(())
    }
}
