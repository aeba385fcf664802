//! Domain identifiers and contract roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of one chain running the protocol core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(pub u32);

impl Domain {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }
}

impl From<u32> for Domain {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Domain)
            .map_err(|e| format!("invalid domain id `{s}`: {e}"))
    }
}

/// A governable contract (or contract family) within one domain's deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ContractRole {
    Home,
    /// Holds the authority to rotate the home's updater.
    UpdaterManager,
    GovernanceRouter,
    XAppConnectionManager,
    UpgradeBeaconController,
    /// The replica for one remote domain.
    Replica { remote: Domain },
    /// Every replica on the domain, addressed through their shared beacon.
    Replicas,
}

impl fmt::Display for ContractRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractRole::Home => f.write_str("home"),
            ContractRole::UpdaterManager => f.write_str("updater_manager"),
            ContractRole::GovernanceRouter => f.write_str("governance_router"),
            ContractRole::XAppConnectionManager => f.write_str("xapp_connection_manager"),
            ContractRole::UpgradeBeaconController => f.write_str("upgrade_beacon_controller"),
            ContractRole::Replica { remote } => write!(f, "replica[{remote}]"),
            ContractRole::Replicas => f.write_str("replicas"),
        }
    }
}
