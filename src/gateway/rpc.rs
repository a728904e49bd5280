//! RPC Gateway - MULTICALL3 Edition
//!
//! Every multi-field read (pair reserves, token metadata, pool totals,
//! the distributor's seven reward counters) is one `aggregate3` round trip.
//! Writes go through a local `PrivateKeySigner` wallet.

use alloy_network::{EthereumWallet, ReceiptResponse};
use alloy_primitives::{address, Address, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall};
use alloy_transport_http::reqwest::Url;
use async_trait::async_trait;
use futures::StreamExt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::{
    AccountStakeLocal, AllRewardsForAddress, BlockStream, ContractGateway, GlobalRewardsState,
    LiquidityPoolSnapshot, PendingTx, StakingPoolId, StakingPoolState, TokenMetadata, TxOutcome,
};
use crate::error::{GatewayError, GatewayResult};

// ============================================
// MULTICALL3 INTERFACE
// ============================================

sol! {
    /// Multicall3 - deployed at same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

// ============================================
// CONTRACT INTERFACES
// ============================================

sol! {
    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }

    interface IERC20Metadata {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
    }

    interface IStakingPool {
        function stakedToken() external view returns (address);
        function totalStaked() external view returns (uint256);
        function totalRewards() external view returns (uint256);
        function totalClaimed() external view returns (uint256);
        function stakes(address account) external view returns (
            uint256 amount, uint256 lastClaimedBlock, uint256 lastClaimedAt, uint256 totalClaimed
        );
        function pendingRewards(address account) external view returns (uint256);
    }

    interface ISplitStaking {
        function combinedRewards() external view returns (uint256);
        function soloStakingRewards() external view returns (uint256);
        function lpStakingRewards() external view returns (uint256);
        function distributorReward() external view returns (uint256);
        function totalRewards() external view returns (uint256);
        function waitingRewards() external view returns (uint256);
        function lastDistributionAt() external view returns (uint256);
        function getRewardsForAddress(address account) external view returns (uint256 pending, uint256 claimed);
        function distribute() external;
        function claim() external;
    }
}

// ============================================
// CONSTANTS
// ============================================

/// Multicall3 address (same on all EVM chains)
const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// How often the HTTP block poller asks for new blocks
const BLOCK_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ============================================
// TYPES
// ============================================

/// Addresses of the three staking contracts on the active network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakingContracts {
    pub solo: Address,
    pub lp: Address,
    /// The distributor holding the shared reward bucket
    pub split: Address,
}

impl StakingContracts {
    pub fn pool(&self, id: StakingPoolId) -> Address {
        match id {
            StakingPoolId::Solo => self.solo,
            StakingPoolId::Lp => self.lp,
        }
    }
}

pub struct RpcGateway {
    rpc_url: Url,
    provider: RootProvider,
    contracts: StakingContracts,
    signer: Option<PrivateKeySigner>,
}

impl RpcGateway {
    pub fn new(rpc_url: &str, contracts: StakingContracts) -> GatewayResult<Self> {
        let rpc_url: Url = rpc_url
            .parse()
            .map_err(|e| GatewayError::Rpc(format!("invalid RPC URL {}: {}", rpc_url, e)))?;
        let provider = RootProvider::new_http(rpc_url.clone());

        Ok(Self {
            rpc_url,
            provider,
            contracts,
            signer: None,
        })
    }

    /// Attach a signing key for `distribute` / `claim`
    pub fn with_signer(mut self, key: &str, chain_id: u64) -> GatewayResult<Self> {
        let signer = PrivateKeySigner::from_str(key.trim_start_matches("0x"))
            .map_err(|e| GatewayError::Rpc(format!("failed to parse signer key: {}", e)))?
            .with_chain_id(Some(chain_id));
        info!("✓ Signer loaded: {:?}", signer.address());
        self.signer = Some(signer);
        Ok(self)
    }

    pub fn signer_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    /// Execute a Multicall3 batch
    async fn execute_multicall(&self, calls: Vec<IMulticall3::Call3>) -> GatewayResult<Vec<IMulticall3::Result>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let expected = calls.len();
        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();

        let tx = TransactionRequest::default()
            .to(MULTICALL3)
            .input(calldata.into());

        let result = self.provider.call(tx).await
            .map_err(|e| GatewayError::Rpc(format!("Multicall3 failed: {}", e)))?;

        let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&result)
            .map_err(|e| GatewayError::Decode { call: "aggregate3", reason: e.to_string() })?;

        if decoded.len() != expected {
            return Err(GatewayError::Decode {
                call: "aggregate3",
                reason: format!("expected {} results, got {}", expected, decoded.len()),
            });
        }

        trace!("Multicall3: {} calls in one round trip", expected);
        Ok(decoded)
    }

    /// Send a state-changing call and hand back the pending transaction
    async fn send(&self, to: Address, calldata: Vec<u8>) -> GatewayResult<PendingTx> {
        let signer = self.signer.clone().ok_or(GatewayError::MissingSigner)?;
        let from = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url.clone());

        let tx = TransactionRequest::default()
            .from(from)
            .to(to)
            .input(calldata.into());

        let pending = provider.send_transaction(tx).await?;
        let hash = *pending.tx_hash();
        debug!("Submitted transaction {:?} to {:?}", hash, to);

        let confirmation = Box::pin(async move {
            let receipt = pending.get_receipt().await?;
            Ok::<_, GatewayError>(TxOutcome {
                hash: receipt.transaction_hash(),
                block_number: receipt.block_number(),
                success: receipt.status(),
            })
        });

        Ok(PendingTx::new(hash, confirmation))
    }
}

fn call3<C: SolCall>(target: Address, call: C, allow_failure: bool) -> IMulticall3::Call3 {
    IMulticall3::Call3 {
        target,
        allowFailure: allow_failure,
        callData: call.abi_encode().into(),
    }
}

/// Decode one multicall result, failing if the inner call reverted
fn decode<C: SolCall>(result: &IMulticall3::Result, target: Address) -> GatewayResult<C::Return> {
    if !result.success {
        return Err(GatewayError::Contract { call: C::SIGNATURE, target });
    }
    C::abi_decode_returns(&result.returnData)
        .map_err(|e| GatewayError::Decode { call: C::SIGNATURE, reason: e.to_string() })
}

fn to_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

// ============================================
// GATEWAY IMPLEMENTATION
// ============================================

#[async_trait]
impl ContractGateway for RpcGateway {
    async fn get_lp_data(&self, pair: Address) -> GatewayResult<LiquidityPoolSnapshot> {
        let results = self.execute_multicall(vec![
            call3(pair, IUniswapV2Pair::getReservesCall {}, true),
            call3(pair, IUniswapV2Pair::token0Call {}, true),
            call3(pair, IUniswapV2Pair::token1Call {}, true),
        ]).await?;

        let reserves = decode::<IUniswapV2Pair::getReservesCall>(&results[0], pair)?;
        let token0 = decode::<IUniswapV2Pair::token0Call>(&results[1], pair)?;
        let token1 = decode::<IUniswapV2Pair::token1Call>(&results[2], pair)?;

        Ok(LiquidityPoolSnapshot {
            pair,
            token0,
            token1,
            balance0: U256::from(reserves.reserve0.to::<u128>()),
            balance1: U256::from(reserves.reserve1.to::<u128>()),
        })
    }

    async fn get_token_data(&self, token: Address) -> GatewayResult<TokenMetadata> {
        let results = self.execute_multicall(vec![
            call3(token, IERC20Metadata::decimalsCall {}, true),
            call3(token, IERC20Metadata::symbolCall {}, true),
            call3(token, IERC20Metadata::nameCall {}, true),
        ]).await?;

        let decimals = decode::<IERC20Metadata::decimalsCall>(&results[0], token)?;

        // Some older tokens return bytes32 here - not worth failing over
        let symbol = decode::<IERC20Metadata::symbolCall>(&results[1], token)
            .unwrap_or_else(|_| "???".to_string());
        let name = decode::<IERC20Metadata::nameCall>(&results[2], token)
            .unwrap_or_default();

        Ok(TokenMetadata { address: token, decimals, symbol, name })
    }

    async fn get_staking_data(&self, pool: StakingPoolId) -> GatewayResult<StakingPoolState> {
        let target = self.contracts.pool(pool);
        let results = self.execute_multicall(vec![
            call3(target, IStakingPool::stakedTokenCall {}, true),
            call3(target, IStakingPool::totalStakedCall {}, true),
            call3(target, IStakingPool::totalRewardsCall {}, true),
            call3(target, IStakingPool::totalClaimedCall {}, true),
        ]).await?;

        let staked_token = decode::<IStakingPool::stakedTokenCall>(&results[0], target)?;
        let total_staked = decode::<IStakingPool::totalStakedCall>(&results[1], target)?;
        let total_rewards = decode::<IStakingPool::totalRewardsCall>(&results[2], target)?;
        let total_claimed = decode::<IStakingPool::totalClaimedCall>(&results[3], target)?;

        let decimals = match self.get_token_data(staked_token).await {
            Ok(meta) => meta.decimals,
            Err(e) => {
                warn!("No metadata for staked token {:?} ({}), assuming 18 decimals", staked_token, e);
                18
            }
        };

        Ok(StakingPoolState {
            contract_address: target,
            staking_type: pool,
            staked_token,
            decimals,
            total_staked,
            total_rewards,
            total_claimed,
        })
    }

    async fn get_account_stake(
        &self,
        pool: StakingPoolId,
        account: Address,
    ) -> GatewayResult<AccountStakeLocal> {
        let target = self.contracts.pool(pool);
        let results = self.execute_multicall(vec![
            call3(target, IStakingPool::stakesCall { account }, true),
            call3(target, IStakingPool::pendingRewardsCall { account }, true),
        ]).await?;

        let stake = decode::<IStakingPool::stakesCall>(&results[0], target)?;
        let pending_rewards = decode::<IStakingPool::pendingRewardsCall>(&results[1], target)?;

        Ok(AccountStakeLocal {
            amount: stake.amount,
            last_claimed_block: to_u64(stake.lastClaimedBlock),
            last_claimed_at: to_u64(stake.lastClaimedAt),
            pending_rewards,
            total_claimed: stake.totalClaimed,
        })
    }

    async fn get_global_staking_data(&self) -> GatewayResult<GlobalRewardsState> {
        let split = self.contracts.split;
        let results = self.execute_multicall(vec![
            call3(split, ISplitStaking::combinedRewardsCall {}, true),
            call3(split, ISplitStaking::soloStakingRewardsCall {}, true),
            call3(split, ISplitStaking::lpStakingRewardsCall {}, true),
            call3(split, ISplitStaking::distributorRewardCall {}, true),
            call3(split, ISplitStaking::totalRewardsCall {}, true),
            call3(split, ISplitStaking::waitingRewardsCall {}, true),
            call3(split, ISplitStaking::lastDistributionAtCall {}, true),
        ]).await?;

        Ok(GlobalRewardsState {
            combined_rewards: decode::<ISplitStaking::combinedRewardsCall>(&results[0], split)?,
            solo_staking_rewards: decode::<ISplitStaking::soloStakingRewardsCall>(&results[1], split)?,
            lp_staking_rewards: decode::<ISplitStaking::lpStakingRewardsCall>(&results[2], split)?,
            distributor_reward: decode::<ISplitStaking::distributorRewardCall>(&results[3], split)?,
            total_rewards: decode::<ISplitStaking::totalRewardsCall>(&results[4], split)?,
            waiting_rewards: decode::<ISplitStaking::waitingRewardsCall>(&results[5], split)?,
            last_distribution_at: to_u64(decode::<ISplitStaking::lastDistributionAtCall>(&results[6], split)?),
        })
    }

    async fn get_split_staking_rewards_for_address(
        &self,
        account: Address,
    ) -> GatewayResult<AllRewardsForAddress> {
        let split = self.contracts.split;
        let calldata = ISplitStaking::getRewardsForAddressCall { account }.abi_encode();
        let tx = TransactionRequest::default()
            .to(split)
            .input(calldata.into());

        let result = self.provider.call(tx).await?;
        let rewards = ISplitStaking::getRewardsForAddressCall::abi_decode_returns(&result)
            .map_err(|e| GatewayError::Decode {
                call: ISplitStaking::getRewardsForAddressCall::SIGNATURE,
                reason: e.to_string(),
            })?;

        Ok(AllRewardsForAddress {
            pending: rewards.pending,
            claimed: rewards.claimed,
        })
    }

    async fn distribute(&self) -> GatewayResult<PendingTx> {
        info!("📤 Sending distribute() to {:?}", self.contracts.split);
        self.send(self.contracts.split, ISplitStaking::distributeCall {}.abi_encode()).await
    }

    async fn claim_split_staking(&self) -> GatewayResult<PendingTx> {
        info!("📤 Sending claim() to {:?}", self.contracts.split);
        self.send(self.contracts.split, ISplitStaking::claimCall {}.abi_encode()).await
    }

    async fn subscribe_blocks(&self) -> GatewayResult<BlockStream> {
        let poller = self.provider.watch_blocks().await
            .map_err(|e| GatewayError::Subscription(e.to_string()))?
            .with_poll_interval(BLOCK_POLL_INTERVAL);

        debug!("Subscribed to new blocks (poll every {:?})", BLOCK_POLL_INTERVAL);
        Ok(Box::pin(poller.into_stream().flat_map(futures::stream::iter)))
    }
}
