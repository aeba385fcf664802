//! Governance methods the batch builder knows how to encode.
//!
//! Calldata comes from the `sol!` interface below. Decoding is strict: the
//! bytes must re-encode to exactly the input, so a report never shows a
//! readable signature for calldata that would not round-trip.

use crate::domain::Domain;
use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{SolCall, SolInterface, sol};
use serde::{Deserialize, Serialize};
use std::fmt;

sol! {
    /// Every call a governance batch may carry, across the core contracts.
    interface IGovernable {
        /// UpgradeBeaconController
        function upgrade(address beacon, address implementation) external;
        /// Ownable
        function transferOwnership(address newOwner) external;
        /// UpdaterManager and Replica
        function setUpdater(address updater) external;
        /// XAppConnectionManager
        function ownerEnrollReplica(address replica, uint32 domain) external;
        function ownerUnenrollReplica(address replica) external;
    }
}

use IGovernable::IGovernableCalls;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum GovernanceMethod {
    /// `UpgradeBeaconController.upgrade(beacon, implementation)`
    #[serde(rename_all = "camelCase")]
    Upgrade {
        beacon: Address,
        implementation: Address,
    },
    /// `Ownable.transferOwnership(newOwner)`
    #[serde(rename_all = "camelCase")]
    TransferOwnership { new_owner: Address },
    /// `setUpdater(updater)` on an updater manager or a replica.
    SetUpdater { updater: Address },
    /// `XAppConnectionManager.ownerEnrollReplica(replica, domain)`
    OwnerEnrollReplica { replica: Address, domain: Domain },
    /// `XAppConnectionManager.ownerUnenrollReplica(replica)`
    OwnerUnenrollReplica { replica: Address },
}

impl GovernanceMethod {
    pub fn signature(&self) -> &'static str {
        match self {
            GovernanceMethod::Upgrade { .. } => IGovernable::upgradeCall::SIGNATURE,
            GovernanceMethod::TransferOwnership { .. } => {
                IGovernable::transferOwnershipCall::SIGNATURE
            }
            GovernanceMethod::SetUpdater { .. } => IGovernable::setUpdaterCall::SIGNATURE,
            GovernanceMethod::OwnerEnrollReplica { .. } => {
                IGovernable::ownerEnrollReplicaCall::SIGNATURE
            }
            GovernanceMethod::OwnerUnenrollReplica { .. } => {
                IGovernable::ownerUnenrollReplicaCall::SIGNATURE
            }
        }
    }

    pub fn selector(&self) -> [u8; 4] {
        match self {
            GovernanceMethod::Upgrade { .. } => IGovernable::upgradeCall::SELECTOR,
            GovernanceMethod::TransferOwnership { .. } => {
                IGovernable::transferOwnershipCall::SELECTOR
            }
            GovernanceMethod::SetUpdater { .. } => IGovernable::setUpdaterCall::SELECTOR,
            GovernanceMethod::OwnerEnrollReplica { .. } => {
                IGovernable::ownerEnrollReplicaCall::SELECTOR
            }
            GovernanceMethod::OwnerUnenrollReplica { .. } => {
                IGovernable::ownerUnenrollReplicaCall::SELECTOR
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let data = match *self {
            GovernanceMethod::Upgrade {
                beacon,
                implementation,
            } => IGovernable::upgradeCall {
                beacon,
                implementation,
            }
            .abi_encode(),
            GovernanceMethod::TransferOwnership { new_owner } => {
                IGovernable::transferOwnershipCall {
                    newOwner: new_owner,
                }
                .abi_encode()
            }
            GovernanceMethod::SetUpdater { updater } => {
                IGovernable::setUpdaterCall { updater }.abi_encode()
            }
            GovernanceMethod::OwnerEnrollReplica { replica, domain } => {
                IGovernable::ownerEnrollReplicaCall {
                    replica,
                    domain: domain.id(),
                }
                .abi_encode()
            }
            GovernanceMethod::OwnerUnenrollReplica { replica } => {
                IGovernable::ownerUnenrollReplicaCall { replica }.abi_encode()
            }
        };
        Bytes::from(data)
    }

    /// Decode calldata produced by [`GovernanceMethod::encode`].
    ///
    /// Returns `None` for unknown selectors, wrong lengths, or dirty padding.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let method = match IGovernableCalls::abi_decode(data).ok()? {
            IGovernableCalls::upgrade(call) => GovernanceMethod::Upgrade {
                beacon: call.beacon,
                implementation: call.implementation,
            },
            IGovernableCalls::transferOwnership(call) => GovernanceMethod::TransferOwnership {
                new_owner: call.newOwner,
            },
            IGovernableCalls::setUpdater(call) => GovernanceMethod::SetUpdater {
                updater: call.updater,
            },
            IGovernableCalls::ownerEnrollReplica(call) => GovernanceMethod::OwnerEnrollReplica {
                replica: call.replica,
                domain: Domain(call.domain),
            },
            IGovernableCalls::ownerUnenrollReplica(call) => {
                GovernanceMethod::OwnerUnenrollReplica {
                    replica: call.replica,
                }
            }
        };
        (method.encode().as_ref() == data).then_some(method)
    }
}

impl fmt::Display for GovernanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GovernanceMethod::Upgrade {
                beacon,
                implementation,
            } => write!(f, "upgrade({beacon}, {implementation})"),
            GovernanceMethod::TransferOwnership { new_owner } => {
                write!(f, "transferOwnership({new_owner})")
            }
            GovernanceMethod::SetUpdater { updater } => write!(f, "setUpdater({updater})"),
            GovernanceMethod::OwnerEnrollReplica { replica, domain } => {
                write!(f, "ownerEnrollReplica({replica}, {domain})")
            }
            GovernanceMethod::OwnerUnenrollReplica { replica } => {
                write!(f, "ownerUnenrollReplica({replica})")
            }
        }
    }
}
