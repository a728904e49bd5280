//! In-memory gateway for tests: canned state, call counters, failure injection

use alloy_primitives::{Address, TxHash, B256, U256};
use async_trait::async_trait;
use futures::channel::mpsc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{
    AccountStakeLocal, AllRewardsForAddress, BlockStream, ContractGateway, GlobalRewardsState,
    LiquidityPoolSnapshot, PendingTx, StakingPoolId, StakingPoolState, TokenMetadata, TxOutcome,
};
use crate::error::{GatewayError, GatewayResult};

/// How a mocked write behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxBehavior {
    /// Mined successfully
    Succeed,
    /// Mined but reverted
    Revert,
    /// Rejected before submission (RPC error)
    Reject,
}

pub struct MockGateway {
    pairs: Mutex<HashMap<Address, LiquidityPoolSnapshot>>,
    tokens: Mutex<HashMap<Address, TokenMetadata>>,
    pools: Mutex<HashMap<StakingPoolId, StakingPoolState>>,
    stakes: Mutex<HashMap<(StakingPoolId, Address), AccountStakeLocal>>,
    global: Mutex<GlobalRewardsState>,

    pub lp_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
    pub global_calls: AtomicUsize,
    pub fail_reads: AtomicBool,
    latency: Mutex<Duration>,

    distribute_behavior: Mutex<TxBehavior>,
    claim_behavior: Mutex<TxBehavior>,
    /// Ordered record of write-side events
    log: std::sync::Arc<Mutex<Vec<String>>>,

    block_senders: Mutex<Vec<mpsc::UnboundedSender<B256>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            pairs: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
            stakes: Mutex::new(HashMap::new()),
            global: Mutex::new(GlobalRewardsState::default()),
            lp_calls: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
            global_calls: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            distribute_behavior: Mutex::new(TxBehavior::Succeed),
            claim_behavior: Mutex::new(TxBehavior::Succeed),
            log: Default::default(),
            block_senders: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pair(self, snapshot: LiquidityPoolSnapshot) -> Self {
        self.pairs.lock().unwrap().insert(snapshot.pair, snapshot);
        self
    }

    pub fn with_token(self, address: Address, symbol: &str, decimals: u8) -> Self {
        self.tokens.lock().unwrap().insert(
            address,
            TokenMetadata {
                address,
                decimals,
                symbol: symbol.to_string(),
                name: symbol.to_string(),
            },
        );
        self
    }

    pub fn with_pool(self, pool: StakingPoolState) -> Self {
        self.pools.lock().unwrap().insert(pool.staking_type, pool);
        self
    }

    pub fn with_stake(self, pool: StakingPoolId, account: Address, stake: AccountStakeLocal) -> Self {
        self.stakes.lock().unwrap().insert((pool, account), stake);
        self
    }

    pub fn with_global(self, global: GlobalRewardsState) -> Self {
        *self.global.lock().unwrap() = global;
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = latency;
        self
    }

    pub fn set_pair(&self, snapshot: LiquidityPoolSnapshot) {
        self.pairs.lock().unwrap().insert(snapshot.pair, snapshot);
    }

    pub fn set_distribute(&self, behavior: TxBehavior) {
        *self.distribute_behavior.lock().unwrap() = behavior;
    }

    pub fn set_claim(&self, behavior: TxBehavior) {
        *self.claim_behavior.lock().unwrap() = behavior;
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn lp_calls(&self) -> usize {
        self.lp_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn global_calls(&self) -> usize {
        self.global_calls.load(Ordering::SeqCst)
    }

    /// Announce a new block to every live subscriber
    pub fn push_block(&self, n: u8) {
        let mut senders = self.block_senders.lock().unwrap();
        senders.retain(|tx| tx.unbounded_send(B256::repeat_byte(n)).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        let mut senders = self.block_senders.lock().unwrap();
        senders.retain(|tx| !tx.is_closed());
        senders.len()
    }

    async fn read_delay(&self) -> GatewayResult<()> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GatewayError::Rpc("connection refused".to_string()));
        }
        Ok(())
    }

    fn write(&self, name: &'static str, behavior: TxBehavior, tag: u8) -> GatewayResult<PendingTx> {
        if behavior == TxBehavior::Reject {
            self.log.lock().unwrap().push(format!("{}:rejected", name));
            return Err(GatewayError::Rpc(format!("{} rejected", name)));
        }

        self.log.lock().unwrap().push(format!("{}:sent", name));
        let hash = TxHash::repeat_byte(tag);
        let log = self.log.clone();
        let latency = *self.latency.lock().unwrap();

        Ok(PendingTx::new(
            hash,
            Box::pin(async move {
                tokio::time::sleep(latency).await;
                let success = behavior == TxBehavior::Succeed;
                log.lock().unwrap().push(format!("{}:mined", name));
                Ok(TxOutcome { hash, block_number: Some(1), success })
            }),
        ))
    }
}

#[async_trait]
impl ContractGateway for MockGateway {
    async fn get_lp_data(&self, pair: Address) -> GatewayResult<LiquidityPoolSnapshot> {
        self.lp_calls.fetch_add(1, Ordering::SeqCst);
        self.read_delay().await?;
        self.pairs
            .lock()
            .unwrap()
            .get(&pair)
            .cloned()
            .ok_or(GatewayError::Contract { call: "getReserves()", target: pair })
    }

    async fn get_token_data(&self, token: Address) -> GatewayResult<TokenMetadata> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.read_delay().await?;
        self.tokens
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .ok_or(GatewayError::Contract { call: "decimals()", target: token })
    }

    async fn get_staking_data(&self, pool: StakingPoolId) -> GatewayResult<StakingPoolState> {
        self.read_delay().await?;
        self.pools
            .lock()
            .unwrap()
            .get(&pool)
            .cloned()
            .ok_or(GatewayError::Contract { call: "totalStaked()", target: Address::ZERO })
    }

    async fn get_account_stake(
        &self,
        pool: StakingPoolId,
        account: Address,
    ) -> GatewayResult<AccountStakeLocal> {
        self.read_delay().await?;
        Ok(self
            .stakes
            .lock()
            .unwrap()
            .get(&(pool, account))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_global_staking_data(&self) -> GatewayResult<GlobalRewardsState> {
        self.global_calls.fetch_add(1, Ordering::SeqCst);
        self.read_delay().await?;
        Ok(self.global.lock().unwrap().clone())
    }

    async fn get_split_staking_rewards_for_address(
        &self,
        account: Address,
    ) -> GatewayResult<AllRewardsForAddress> {
        self.read_delay().await?;
        let stakes = self.stakes.lock().unwrap();
        let mut rewards = AllRewardsForAddress::default();
        for ((_, owner), stake) in stakes.iter() {
            if *owner == account {
                rewards.pending += stake.pending_rewards;
                rewards.claimed += stake.total_claimed;
            }
        }
        Ok(rewards)
    }

    async fn distribute(&self) -> GatewayResult<PendingTx> {
        let behavior = *self.distribute_behavior.lock().unwrap();
        self.write("distribute", behavior, 0xd1)
    }

    async fn claim_split_staking(&self) -> GatewayResult<PendingTx> {
        let behavior = *self.claim_behavior.lock().unwrap();
        self.write("claim", behavior, 0xc1)
    }

    async fn subscribe_blocks(&self) -> GatewayResult<BlockStream> {
        let (tx, rx) = mpsc::unbounded();
        self.block_senders.lock().unwrap().push(tx);
        Ok(Box::pin(rx))
    }
}

pub fn snapshot(pair: Address, token0: Address, token1: Address, balance0: U256, balance1: U256) -> LiquidityPoolSnapshot {
    LiquidityPoolSnapshot { pair, token0, token1, balance0, balance1 }
}
