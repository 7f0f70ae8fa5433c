//! Chain-client seam used by every mutating component.
//!
//! Adapters classify failures into [`ChainError`] so callers branch on a discriminant
//! rather than on message text.

mod account;

use std::future::Future;

use starknet::core::types::{Call, Felt};
use thiserror::Error;

pub use account::{FINALITY_TIMEOUT, StarknetChain};
use crate::artifacts::PreparedClass;

/// Typed failure of a chain operation.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The class (or other content-addressed object) is already registered.
    #[error("Already exists on chain")]
    AlreadyExists,

    /// The queried object is not known to the chain.
    #[error("Not found on chain")]
    NotFound,

    /// The transaction was included but its execution reverted.
    #[error("Transaction {tx_hash:#066x} reverted: {reason}")]
    Reverted { tx_hash: Felt, reason: String },

    /// The transaction did not reach finality within the adapter's budget.
    #[error("Timed out waiting for transaction {tx_hash:#066x}")]
    Timeout { tx_hash: Felt },

    /// Any other failure: fees, malformed bytecode, transport errors.
    #[error("{0}")]
    Fatal(String),
}

impl ChainError {
    pub fn fatal(err: impl std::fmt::Display) -> Self {
        Self::Fatal(err.to_string())
    }
}

/// Result of a deploy transaction submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedInstance {
    pub address: Felt,
    pub tx_hash: Felt,
}

/// Signing connection to a chain.
///
/// Every method except [`ChainClient::wait_for_finality`] returns once the request has
/// been accepted by the node; callers wait for finality explicitly.
pub trait ChainClient: Send + Sync {
    /// Address of the signing account.
    fn account_address(&self) -> Felt;

    /// Chain id reported by the node. Doubles as the liveness probe.
    fn chain_id(&self) -> impl Future<Output = Result<Felt, ChainError>> + Send;

    /// Look up a declared class. Returns [`ChainError::NotFound`] when absent.
    fn lookup_class(&self, class_hash: Felt)
    -> impl Future<Output = Result<(), ChainError>> + Send;

    /// Submit a declare transaction and return its hash.
    ///
    /// Returns [`ChainError::AlreadyExists`] when the class is already declared.
    fn declare(
        &self,
        class: &PreparedClass,
    ) -> impl Future<Output = Result<Felt, ChainError>> + Send;

    /// Submit a deploy transaction for an already-declared class.
    fn deploy(
        &self,
        class_hash: Felt,
        constructor_calldata: &[Felt],
        salt: Felt,
    ) -> impl Future<Output = Result<DeployedInstance, ChainError>> + Send;

    /// Submit an invoke transaction carrying `calls` and return its hash.
    fn invoke(&self, calls: Vec<Call>) -> impl Future<Output = Result<Felt, ChainError>> + Send;

    /// Run a read-only call against the latest block.
    fn call(
        &self,
        contract: Felt,
        selector: Felt,
        calldata: Vec<Felt>,
    ) -> impl Future<Output = Result<Vec<Felt>, ChainError>> + Send;

    /// Block until `tx_hash` is accepted, failing with [`ChainError::Reverted`] on revert.
    fn wait_for_finality(&self, tx_hash: Felt)
    -> impl Future<Output = Result<(), ChainError>> + Send;
}
