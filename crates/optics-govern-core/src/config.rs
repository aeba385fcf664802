//! Operator configuration: a TOML file describing every domain's deploy.
//!
//! ```toml
//! [settings]
//! call_timeout_secs = 30
//!
//! [[domains]]
//! name = "ethereum"
//! domain = 6648936
//! chain_id = 1
//!
//! [domains.contracts]
//! home = { proxy = "0x…", beacon = "0x…" }
//! governance_router = { proxy = "0x…", beacon = "0x…" }
//! updater_manager = "0x…"
//! xapp_connection_manager = "0x…"
//! upgrade_beacon_controller = "0x…"
//! replica_beacon = "0x…"
//! replicas = [{ domain = 1667591279, address = "0x…" }]
//!
//! [domains.expected]
//! updater = "0x…"
//! implementations = { home = "0x…", replica = "0x…", governance_router = "0x…" }
//! ```
//!
//! `expected.owner` defaults to the domain's governance router proxy and
//! `expected.remotes` defaults to every other configured domain.

use crate::domain::Domain;
use crate::error::GovernError;
use crate::registry::{
    BeaconProxy, ChainConnection, CoreContracts, Deploy, DomainRegistry, ExpectedConfig,
    Implementations,
};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovernConfig {
    #[serde(default)]
    pub settings: Settings,
    pub domains: Vec<DomainConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainConfig {
    pub name: String,
    pub domain: Domain,
    pub chain_id: u64,
    #[serde(default)]
    pub rpc_url: Option<String>,
    pub contracts: ContractsConfig,
    pub expected: ExpectedConfigInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractsConfig {
    pub home: BeaconProxy,
    pub governance_router: BeaconProxy,
    pub updater_manager: Address,
    pub xapp_connection_manager: Address,
    pub upgrade_beacon_controller: Address,
    pub replica_beacon: Address,
    #[serde(default)]
    pub replicas: Vec<ReplicaEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicaEntry {
    pub domain: Domain,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedConfigInput {
    pub updater: Address,
    #[serde(default)]
    pub owner: Option<Address>,
    pub implementations: Implementations,
    #[serde(default)]
    pub remotes: Option<Vec<Domain>>,
}

/// Per-run knobs derived from [`Settings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Upper bound on any single chain read, population, estimate, or submission.
    pub call_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

impl GovernConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, GovernError> {
        let config: GovernConfig = toml::from_str(input)
            .map_err(|e| GovernError::Configuration(format!("invalid TOML: {e}")))?;
        if config.settings.call_timeout_secs == 0 {
            return Err(GovernError::Configuration(
                "settings.call_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GovernError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| GovernError::Configuration(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            GovernError::Configuration(message) => {
                GovernError::Configuration(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Resolve defaults and validate into an immutable registry.
    pub fn into_registry(self) -> Result<DomainRegistry, GovernError> {
        let all_domains: Vec<Domain> = self.domains.iter().map(|d| d.domain).collect();
        let mut deploys = Vec::with_capacity(self.domains.len());
        for domain_config in self.domains {
            deploys.push(domain_config.into_deploy(&all_domains)?);
        }
        DomainRegistry::new(deploys)
    }
}

impl DomainConfig {
    fn into_deploy(self, all_domains: &[Domain]) -> Result<Deploy, GovernError> {
        let domain = self.domain;
        let mut replicas = BTreeMap::new();
        for entry in &self.contracts.replicas {
            if replicas.insert(entry.domain, entry.address).is_some() {
                return Err(GovernError::Configuration(format!(
                    "domain {domain}: replica for remote {} is listed twice",
                    entry.domain
                )));
            }
        }

        let remotes = match self.expected.remotes {
            Some(remotes) => remotes.into_iter().collect(),
            None => all_domains
                .iter()
                .copied()
                .filter(|remote| *remote != domain)
                .collect(),
        };

        Ok(Deploy {
            domain,
            chain: ChainConnection {
                name: self.name,
                chain_id: self.chain_id,
                rpc_url: self.rpc_url,
            },
            expected: ExpectedConfig {
                updater: self.expected.updater,
                owner: self
                    .expected
                    .owner
                    .unwrap_or(self.contracts.governance_router.proxy),
                implementations: self.expected.implementations,
                remotes,
            },
            contracts: CoreContracts {
                home: self.contracts.home,
                governance_router: self.contracts.governance_router,
                updater_manager: self.contracts.updater_manager,
                xapp_connection_manager: self.contracts.xapp_connection_manager,
                upgrade_beacon_controller: self.contracts.upgrade_beacon_controller,
                replica_beacon: self.contracts.replica_beacon,
                replicas,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_DOMAINS: &str = r#"
[settings]
call_timeout_secs = 5

[[domains]]
name = "alpha"
domain = 1000
chain_id = 1

[domains.contracts]
home = { proxy = "0x0000000000000000000000000000000000000101", beacon = "0x0000000000000000000000000000000000000102" }
governance_router = { proxy = "0x0000000000000000000000000000000000000103", beacon = "0x0000000000000000000000000000000000000104" }
updater_manager = "0x0000000000000000000000000000000000000108"
xapp_connection_manager = "0x0000000000000000000000000000000000000105"
upgrade_beacon_controller = "0x0000000000000000000000000000000000000106"
replica_beacon = "0x0000000000000000000000000000000000000107"
replicas = [{ domain = 2000, address = "0x0000000000000000000000000000000000000120" }]

[domains.expected]
updater = "0x0000000000000000000000000000000000000110"
implementations = { home = "0x0000000000000000000000000000000000000111", replica = "0x0000000000000000000000000000000000000112", governance_router = "0x0000000000000000000000000000000000000113" }

[[domains]]
name = "beta"
domain = 2000
chain_id = 2
rpc_url = "http://localhost:8545"

[domains.contracts]
home = { proxy = "0x0000000000000000000000000000000000000201", beacon = "0x0000000000000000000000000000000000000202" }
governance_router = { proxy = "0x0000000000000000000000000000000000000203", beacon = "0x0000000000000000000000000000000000000204" }
updater_manager = "0x0000000000000000000000000000000000000208"
xapp_connection_manager = "0x0000000000000000000000000000000000000205"
upgrade_beacon_controller = "0x0000000000000000000000000000000000000206"
replica_beacon = "0x0000000000000000000000000000000000000207"
replicas = [{ domain = 1000, address = "0x0000000000000000000000000000000000000210" }]

[domains.expected]
updater = "0x0000000000000000000000000000000000000210"
owner = "0x0000000000000000000000000000000000000299"
implementations = { home = "0x0000000000000000000000000000000000000211", replica = "0x0000000000000000000000000000000000000212", governance_router = "0x0000000000000000000000000000000000000213" }
"#;

    #[test]
    fn config_resolves_defaults_into_registry() {
        let config = GovernConfig::from_toml_str(TWO_DOMAINS).expect("config should parse");
        assert_eq!(
            config.settings.run_options().call_timeout,
            Duration::from_secs(5)
        );
        let registry = config.into_registry().expect("registry should validate");

        let alpha = registry.get(Domain(1000)).expect("alpha present");
        assert_eq!(alpha.expected.owner, alpha.contracts.governance_router.proxy);
        assert_eq!(
            alpha.expected.remotes.iter().copied().collect::<Vec<_>>(),
            vec![Domain(2000)]
        );

        let beta = registry.get(Domain(2000)).expect("beta present");
        assert_eq!(
            beta.expected.owner,
            "0x0000000000000000000000000000000000000299"
                .parse::<Address>()
                .expect("address literal")
        );
        assert_eq!(beta.chain.rpc_url.as_deref(), Some("http://localhost:8545"));
        assert_eq!(
            beta.contracts.updater_manager,
            "0x0000000000000000000000000000000000000208"
                .parse::<Address>()
                .expect("address literal")
        );
    }

    #[test]
    fn updater_manager_is_required() {
        let input = TWO_DOMAINS.replace(
            "updater_manager = \"0x0000000000000000000000000000000000000108\"\n",
            "",
        );
        let err = GovernConfig::from_toml_str(&input).unwrap_err().to_string();
        assert!(err.contains("updater_manager"), "{err}");
    }

    #[test]
    fn unknown_fields_are_configuration_errors() {
        let input = TWO_DOMAINS.replace("chain_id = 2", "chain_id = 2\ncolour = \"blue\"");
        let err = GovernConfig::from_toml_str(&input).unwrap_err();
        assert!(matches!(err, GovernError::Configuration(_)));
    }

    #[test]
    fn duplicate_replica_entries_are_rejected() {
        let input = TWO_DOMAINS.replace(
            r#"replicas = [{ domain = 2000, address = "0x0000000000000000000000000000000000000120" }]"#,
            r#"replicas = [{ domain = 2000, address = "0x0000000000000000000000000000000000000120" }, { domain = 2000, address = "0x0000000000000000000000000000000000000121" }]"#,
        );
        let config = GovernConfig::from_toml_str(&input).expect("toml parses");
        let err = config.into_registry().unwrap_err().to_string();
        assert!(err.contains("listed twice"), "{err}");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let input = TWO_DOMAINS.replace("call_timeout_secs = 5", "call_timeout_secs = 0");
        assert!(GovernConfig::from_toml_str(&input).is_err());
    }
}
