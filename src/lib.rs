//! StakeLens - DeFi dashboard data layer
//!
//! Token prices from AMM reserves and split-staking rewards for an account,
//! read from EVM contracts through a [`gateway::ContractGateway`].

pub mod config;
pub mod dashboard;
pub mod error;
pub mod gateway;
pub mod pricing;
pub mod scope;
pub mod staking;
pub mod tokens;

pub use config::{Config, ExecutionMode};
pub use dashboard::{Dashboard, DashboardEvent, PriceMap};
pub use error::{ClaimError, GatewayError, PriceError};
pub use gateway::{ContractGateway, RpcGateway, StakingContracts};
pub use pricing::{PriceCache, PriceResolver};
pub use staking::{RewardsRefresher, StakingRewardsAggregator};
pub use tokens::TokenRegistry;
