//! Contract Gateway
//!
//! Typed async access to the on-chain state the dashboard is built from:
//! - AMM pair reserves and ERC-20 metadata (prices)
//! - Solo / LP staking pools and the shared split-staking distributor (rewards)
//! - `distribute` / `claim` writes, returned as pending transactions
//!
//! `RpcGateway` talks to a node over HTTP; `MockGateway` backs the tests.

mod rpc;
#[cfg(test)]
pub(crate) mod mock;

pub use rpc::{RpcGateway, StakingContracts};

use alloy_primitives::{Address, TxHash, B256, U256};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::GatewayResult;

// ============================================
// DATA MODEL
// ============================================

/// Raw reserves of an AMM pair, token-decimal scaled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPoolSnapshot {
    /// Pair contract the reserves were read from
    pub pair: Address,
    pub token0: Address,
    pub token1: Address,
    pub balance0: U256,
    pub balance1: U256,
}

impl LiquidityPoolSnapshot {
    /// Balance held for `token`, if it is one of the two sides
    pub fn balance_of(&self, token: &Address) -> Option<U256> {
        if *token == self.token0 {
            Some(self.balance0)
        } else if *token == self.token1 {
            Some(self.balance1)
        } else {
            None
        }
    }

    /// The side that is not `token`
    pub fn other_side(&self, token: &Address) -> Option<Address> {
        if *token == self.token0 {
            Some(self.token1)
        } else if *token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
}

/// Which of the two split-staking pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakingPoolId {
    /// Single-token staking
    Solo,
    /// Liquidity-provider token staking
    Lp,
}

impl std::fmt::Display for StakingPoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StakingPoolId::Solo => write!(f, "Solo"),
            StakingPoolId::Lp => write!(f, "LP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingPoolState {
    pub contract_address: Address,
    pub staking_type: StakingPoolId,
    pub staked_token: Address,
    pub decimals: u8,
    pub total_staked: U256,
    pub total_rewards: U256,
    pub total_claimed: U256,
}

/// One account's position in one pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStakeLocal {
    pub amount: U256,
    pub last_claimed_block: u64,
    /// Unix seconds
    pub last_claimed_at: u64,
    pub pending_rewards: U256,
    pub total_claimed: U256,
}

/// The shared, not-yet-distributed reward bucket and its split
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRewardsState {
    pub combined_rewards: U256,
    pub solo_staking_rewards: U256,
    pub lp_staking_rewards: U256,
    pub distributor_reward: U256,
    pub total_rewards: U256,
    pub waiting_rewards: U256,
    /// Unix seconds
    pub last_distribution_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllRewardsForAddress {
    pub pending: U256,
    pub claimed: U256,
}

// ============================================
// PENDING TRANSACTIONS
// ============================================

/// Final state of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    pub hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// A submitted transaction whose inclusion has not been observed yet.
///
/// Nothing is final until [`PendingTx::confirm`] resolves.
pub struct PendingTx {
    hash: TxHash,
    confirmation: BoxFuture<'static, GatewayResult<TxOutcome>>,
}

impl PendingTx {
    pub fn new(hash: TxHash, confirmation: BoxFuture<'static, GatewayResult<TxOutcome>>) -> Self {
        Self { hash, confirmation }
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Wait for inclusion
    pub async fn confirm(self) -> GatewayResult<TxOutcome> {
        self.confirmation.await
    }
}

impl std::fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTx").field("hash", &self.hash).finish()
    }
}

/// New-block notifications (block hashes)
pub type BlockStream = Pin<Box<dyn Stream<Item = B256> + Send>>;

// ============================================
// GATEWAY PORT
// ============================================

#[async_trait]
pub trait ContractGateway: Send + Sync {
    /// Reserves of an AMM pair
    async fn get_lp_data(&self, pair: Address) -> GatewayResult<LiquidityPoolSnapshot>;

    /// ERC-20 metadata
    async fn get_token_data(&self, token: Address) -> GatewayResult<TokenMetadata>;

    async fn get_staking_data(&self, pool: StakingPoolId) -> GatewayResult<StakingPoolState>;

    async fn get_account_stake(
        &self,
        pool: StakingPoolId,
        account: Address,
    ) -> GatewayResult<AccountStakeLocal>;

    async fn get_global_staking_data(&self) -> GatewayResult<GlobalRewardsState>;

    async fn get_split_staking_rewards_for_address(
        &self,
        account: Address,
    ) -> GatewayResult<AllRewardsForAddress>;

    /// Push `waiting_rewards` into the two pools' buckets
    async fn distribute(&self) -> GatewayResult<PendingTx>;

    /// Claim the caller's share from both pools in one transaction
    async fn claim_split_staking(&self) -> GatewayResult<PendingTx>;

    async fn subscribe_blocks(&self) -> GatewayResult<BlockStream>;
}
