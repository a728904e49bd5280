//! Staking Rewards Aggregator
//!
//! Combines the Solo pool, the LP pool and the split-staking distributor into
//! one per-account view:
//! - rewards already credited (`pending_rewards` on each pool)
//! - the account's share of rewards still waiting in the distributor buckets
//!
//! Claiming is a two-step write. If anything is waiting to be distributed
//! (and the cooldown allows it) `distribute()` must be mined successfully
//! before `claim()` is sent.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ClaimError, GatewayError};
use crate::gateway::{
    AccountStakeLocal, AllRewardsForAddress, ContractGateway, GlobalRewardsState, StakingPoolId,
    StakingPoolState, TxOutcome,
};

/// Rewards an account can expect from both pools, in reward-token wei
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEstimate {
    /// Already credited by the pools
    pub pending: U256,
    /// Share of the undistributed buckets
    pub estimated: U256,
}

impl RewardEstimate {
    pub fn total(&self) -> U256 {
        self.pending.saturating_add(self.estimated)
    }
}

/// `amount * bucket / total_staked`, multiplying first
pub fn estimate_share(amount: U256, bucket: U256, total_staked: U256) -> U256 {
    if amount.is_zero() || total_staked.is_zero() {
        return U256::ZERO;
    }
    match amount.checked_mul(bucket) {
        Some(product) => product / total_staked,
        // Only reachable with absurd balances; lose precision instead
        None => (amount / total_staked).saturating_mul(bucket),
    }
}

pub fn estimate_account_pending_rewards(
    solo_pool: &StakingPoolState,
    lp_pool: &StakingPoolState,
    global: &GlobalRewardsState,
    solo_account: &AccountStakeLocal,
    lp_account: &AccountStakeLocal,
) -> RewardEstimate {
    let estimated_solo = estimate_share(
        solo_account.amount,
        global.solo_staking_rewards,
        solo_pool.total_staked,
    );
    let estimated_lp = estimate_share(
        lp_account.amount,
        global.lp_staking_rewards,
        lp_pool.total_staked,
    );

    RewardEstimate {
        pending: solo_account
            .pending_rewards
            .saturating_add(lp_account.pending_rewards),
        estimated: estimated_solo.saturating_add(estimated_lp),
    }
}

/// Whether the distribution cooldown has elapsed
pub fn can_distribute(global: &GlobalRewardsState, cooldown_secs: u64, now_secs: u64) -> bool {
    now_secs.saturating_sub(global.last_distribution_at) >= cooldown_secs
}

/// Whether `claim_all` would send `distribute()` first
pub fn needs_distribution(global: &GlobalRewardsState, can_distribute: bool) -> bool {
    !global.combined_rewards.is_zero() && can_distribute
}

/// Everything the dashboard shows for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRewardsView {
    pub account: Address,
    pub solo_pool: StakingPoolState,
    pub lp_pool: StakingPoolState,
    pub global: GlobalRewardsState,
    pub solo_stake: AccountStakeLocal,
    pub lp_stake: AccountStakeLocal,
    /// Distributor-side totals for the account
    pub totals: AllRewardsForAddress,
    pub estimate: RewardEstimate,
}

/// What a completed claim sequence did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReport {
    /// `None` when distribution was not needed or not allowed
    pub distribute: Option<TxOutcome>,
    pub claim: TxOutcome,
}

pub struct StakingRewardsAggregator {
    gateway: Arc<dyn ContractGateway>,
}

impl StakingRewardsAggregator {
    pub fn new(gateway: Arc<dyn ContractGateway>) -> Self {
        Self { gateway }
    }

    pub async fn global_state(&self) -> Result<GlobalRewardsState, ClaimError> {
        Ok(self.gateway.get_global_staking_data().await?)
    }

    /// Read both pools, the distributor and the account's stakes concurrently
    pub async fn load_account_view(&self, account: Address) -> Result<AccountRewardsView, ClaimError> {
        let gw = &self.gateway;
        let (solo_pool, lp_pool, global, solo_stake, lp_stake, totals) = futures::try_join!(
            gw.get_staking_data(StakingPoolId::Solo),
            gw.get_staking_data(StakingPoolId::Lp),
            gw.get_global_staking_data(),
            gw.get_account_stake(StakingPoolId::Solo, account),
            gw.get_account_stake(StakingPoolId::Lp, account),
            gw.get_split_staking_rewards_for_address(account),
        )?;

        let estimate =
            estimate_account_pending_rewards(&solo_pool, &lp_pool, &global, &solo_stake, &lp_stake);
        debug!(
            "Rewards for {:?}: pending {} + estimated {}",
            account, estimate.pending, estimate.estimated
        );

        Ok(AccountRewardsView {
            account,
            solo_pool,
            lp_pool,
            global,
            solo_stake,
            lp_stake,
            totals,
            estimate,
        })
    }

    /// Distribute (when needed and allowed) then claim.
    ///
    /// The claim is only sent once the distribute transaction has been mined
    /// successfully. A distribute failure of any kind aborts the sequence.
    pub async fn claim_all(
        &self,
        global: &GlobalRewardsState,
        can_distribute: bool,
    ) -> Result<ClaimReport, ClaimError> {
        let distribute = if needs_distribution(global, can_distribute) {
            info!("📦 Distributing {} wei of waiting rewards", global.combined_rewards);
            let pending = self
                .gateway
                .distribute()
                .await
                .map_err(ClaimError::DistributeFailed)?;
            debug!("   distribute tx {:?}", pending.hash());

            let outcome = pending.confirm().await.map_err(ClaimError::DistributeFailed)?;
            if !outcome.success {
                warn!("❌ distribute reverted in {:?}", outcome.hash);
                return Err(ClaimError::DistributeFailed(GatewayError::Reverted(outcome.hash)));
            }
            Some(outcome)
        } else {
            None
        };

        info!("💰 Claiming split-staking rewards");
        let pending = self
            .gateway
            .claim_split_staking()
            .await
            .map_err(ClaimError::ClaimFailed)?;
        let claim = pending.confirm().await.map_err(ClaimError::ClaimFailed)?;
        if !claim.success {
            warn!("❌ claim reverted in {:?}", claim.hash);
            return Err(ClaimError::ClaimFailed(GatewayError::Reverted(claim.hash)));
        }

        info!("✅ Claimed in block {:?}", claim.block_number);
        Ok(ClaimReport { distribute, claim })
    }
}
