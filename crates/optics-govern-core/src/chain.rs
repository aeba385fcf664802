//! The chain capability the core consumes, one instance per domain.
//!
//! Provider setup, signing, and nonce management live behind this trait.
//! The core only reads state and hands over unsigned transactions.

use crate::batch::Call;
use crate::domain::Domain;
use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// State the checker knows how to read. Every query answers with an address;
/// the zero address means unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateQuery {
    /// `owner()` on an Ownable contract.
    Owner,
    /// `updater()` on home, an updater manager, or a replica.
    Updater,
    /// The implementation an upgrade beacon currently points at.
    BeaconImplementation,
    /// `domainToReplica(remote)` on the xApp connection manager.
    EnrolledReplica { remote: Domain },
}

/// A transaction ready for an external signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTx {
    pub domain: Domain,
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasEstimate {
    pub gas: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    /// False when the transaction was mined but reverted.
    pub success: bool,
}

/// Errors surfaced by a [`ChainAccess`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainError {
    #[error("rpc error: {message}")]
    Rpc { message: String },

    #[error("execution reverted: {reason}")]
    Reverted { reason: String },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: String,
        after_ms: u64,
    },

    #[error("unsupported: {message}")]
    Unsupported { message: String },
}

impl ChainError {
    pub fn rpc(message: impl Into<String>) -> Self {
        ChainError::Rpc {
            message: message.into(),
        }
    }

    pub fn reverted(reason: impl Into<String>) -> Self {
        ChainError::Reverted {
            reason: reason.into(),
        }
    }
}

/// Per-domain chain capability.
#[async_trait]
pub trait ChainAccess: Send + Sync {
    /// Domain this capability is connected to.
    fn domain(&self) -> Domain;

    async fn read_state(&self, contract: Address, query: StateQuery)
    -> Result<Address, ChainError>;

    /// Turn a call into an unsigned transaction. Must not submit anything.
    async fn populate_transaction(&self, call: &Call) -> Result<UnsignedTx, ChainError>;

    async fn estimate_gas(&self, tx: &UnsignedTx) -> Result<GasEstimate, ChainError>;

    /// Sign and submit, waiting for the receipt.
    async fn submit(&self, tx: &UnsignedTx) -> Result<Receipt, ChainError>;
}

/// Chain capabilities keyed by domain.
pub type ChainSet = BTreeMap<Domain, Arc<dyn ChainAccess>>;

/// Bound one chain operation by `limit`, mapping expiry to [`ChainError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T, ChainError>
where
    F: Future<Output = Result<T, ChainError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout {
            operation: operation.to_string(),
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
