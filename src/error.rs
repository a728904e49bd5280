//! Error types for the gateway, price resolver and claim flow

use alloy_primitives::{Address, TxHash};
use thiserror::Error;

/// Failures surfaced by a [`ContractGateway`](crate::gateway::ContractGateway)
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Failed to decode {call} result: {reason}")]
    Decode { call: &'static str, reason: String },

    #[error("Contract call {call} failed on {target:?}")]
    Contract { call: &'static str, target: Address },

    #[error("Transaction {0:?} reverted")]
    Reverted(TxHash),

    #[error("No signer configured for write calls")]
    MissingSigner,

    #[error("Block subscription failed: {0}")]
    Subscription(String),
}

impl From<alloy_transport::TransportError> for GatewayError {
    fn from(err: alloy_transport::TransportError) -> Self {
        GatewayError::Rpc(err.to_string())
    }
}

impl From<alloy_provider::PendingTransactionError> for GatewayError {
    fn from(err: alloy_provider::PendingTransactionError) -> Self {
        GatewayError::Rpc(err.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Why a price could not be resolved.
///
/// `Clone` because one in-flight read fans its outcome out to every caller
/// waiting on the same key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("RPC failure: {0}")]
    Rpc(String),

    #[error("No token metadata for {0:?}")]
    MissingTokenData(Address),

    #[error("Zero liquidity in pair {0:?}")]
    ZeroLiquidity(Address),

    #[error("Pair {0:?} has no supported token on chain {1}")]
    Unresolvable(Address, u64),

    #[error("Resolution cancelled by network change")]
    Cancelled,

    #[error("Price arithmetic overflow for pair {0:?}")]
    Overflow(Address),
}

impl From<GatewayError> for PriceError {
    fn from(err: GatewayError) -> Self {
        PriceError::Rpc(err.to_string())
    }
}

/// Failures of the fund-moving distribute + claim sequence
#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Distribution failed, claim not attempted: {0}")]
    DistributeFailed(GatewayError),

    #[error("Claim failed: {0}")]
    ClaimFailed(GatewayError),
}
