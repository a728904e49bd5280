//! Split-staking rewards: estimation, claiming and live refresh

pub mod aggregator;
pub mod refresh;

pub use aggregator::{
    can_distribute, estimate_account_pending_rewards, estimate_share, needs_distribution,
    AccountRewardsView, ClaimReport, RewardEstimate, StakingRewardsAggregator,
};
pub use refresh::{RewardsRefresher, DEFAULT_REFRESH_DEBOUNCE};
