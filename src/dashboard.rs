//! Dashboard
//!
//! Reactive token prices and account rewards. Each event (new block, account
//! switch, network switch) starts a refresh in the background; results are
//! published on `watch` channels. A refresh started for an account or network
//! that has since been replaced is abandoned and never published.
//!
//! The dashboard also owns the block-driven [`RewardsRefresher`]. It follows
//! the active gateway across network switches and stops with the dashboard.

use alloy_primitives::Address;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::GatewayResult;
use crate::gateway::{ContractGateway, GlobalRewardsState};
use crate::pricing::PriceResolver;
use crate::scope::Scope;
use crate::staking::{
    estimate_account_pending_rewards, AccountRewardsView, RewardsRefresher, StakingRewardsAggregator,
};

pub type PriceMap = HashMap<Address, f64>;

pub enum DashboardEvent {
    NewBlock,
    AccountChanged(Option<Address>),
    ChainChanged {
        chain_id: u64,
        gateway: Arc<dyn ContractGateway>,
    },
    /// The refresher published a new distributor state
    GlobalRefreshed(GlobalRewardsState),
}

pub struct Dashboard {
    gateway: Arc<dyn ContractGateway>,
    resolver: Arc<PriceResolver>,
    aggregator: Arc<StakingRewardsAggregator>,
    watched_pairs: Arc<Vec<Address>>,
    account: Option<Address>,
    /// Owner of in-flight refreshes; replaced on account or network change
    session: Scope,
    prices: watch::Sender<PriceMap>,
    rewards: watch::Sender<Option<AccountRewardsView>>,
    global: watch::Sender<Option<GlobalRewardsState>>,
    refresher: Option<RewardsRefresher>,
    /// Set once the refresher is started; reused when it is respawned
    debounce: Option<Duration>,
}

impl Dashboard {
    pub fn new(
        gateway: Arc<dyn ContractGateway>,
        resolver: Arc<PriceResolver>,
        watched_pairs: Vec<Address>,
        account: Option<Address>,
    ) -> Self {
        let (prices, _) = watch::channel(PriceMap::new());
        let (rewards, _) = watch::channel(None);
        let (global, _) = watch::channel(None);
        Self {
            aggregator: Arc::new(StakingRewardsAggregator::new(gateway.clone())),
            gateway,
            resolver,
            watched_pairs: Arc::new(watched_pairs),
            account,
            session: Scope::new(),
            prices,
            rewards,
            global,
            refresher: None,
            debounce: None,
        }
    }

    /// Token address → price in its stable pair's reference units
    pub fn prices(&self) -> watch::Receiver<PriceMap> {
        self.prices.subscribe()
    }

    pub fn rewards(&self) -> watch::Receiver<Option<AccountRewardsView>> {
        self.rewards.subscribe()
    }

    /// Distributor state from the block-driven refresher
    pub fn global_updates(&self) -> watch::Receiver<Option<GlobalRewardsState>> {
        self.global.subscribe()
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn chain_id(&self) -> u64 {
        self.resolver.chain_id()
    }

    /// Follow new blocks on the active gateway, replacing any running refresher
    pub async fn start_refresher(&mut self, debounce: Duration) -> GatewayResult<()> {
        self.refresher = None;
        self.debounce = Some(debounce);
        let refresher =
            RewardsRefresher::spawn_with(self.gateway.clone(), debounce, self.global.clone()).await?;
        self.refresher = Some(refresher);
        Ok(())
    }

    /// Stop following blocks and wait for the refresher to finish
    pub async fn stop_refresher(&mut self) {
        self.debounce = None;
        if let Some(refresher) = self.refresher.take() {
            refresher.shutdown().await;
        }
    }

    /// Apply `event` and start the matching refresh
    pub async fn handle(&mut self, event: DashboardEvent) -> JoinHandle<()> {
        match event {
            DashboardEvent::NewBlock => self.refresh(),
            DashboardEvent::AccountChanged(account) => {
                info!("👤 Account changed: {:?}", account);
                self.session = Scope::new();
                self.account = account;
                self.rewards.send_replace(None);
                self.refresh()
            }
            DashboardEvent::ChainChanged { chain_id, gateway } => {
                self.session = Scope::new();
                // The old subscription belongs to the old gateway
                self.refresher = None;
                self.global.send_replace(None);
                self.resolver.switch_network(chain_id, gateway.clone()).await;
                self.aggregator = Arc::new(StakingRewardsAggregator::new(gateway.clone()));
                self.gateway = gateway;
                self.prices.send_replace(PriceMap::new());
                self.rewards.send_replace(None);

                if let Some(debounce) = self.debounce {
                    if let Err(e) = self.start_refresher(debounce).await {
                        warn!("Rewards refresher not restarted on chain {}: {}", chain_id, e);
                    }
                }
                self.refresh()
            }
            DashboardEvent::GlobalRefreshed(global) => self.apply_global(global),
        }
    }

    /// Re-estimate from a new distributor state. Pool balances only move when
    /// a distribution happens, so anything else needs no account reads.
    fn apply_global(&self, global: GlobalRewardsState) -> JoinHandle<()> {
        let current = self.rewards.borrow().clone();
        match current {
            Some(mut view)
                if Some(view.account) == self.account
                    && view.global.last_distribution_at == global.last_distribution_at =>
            {
                view.estimate = estimate_account_pending_rewards(
                    &view.solo_pool,
                    &view.lp_pool,
                    &global,
                    &view.solo_stake,
                    &view.lp_stake,
                );
                view.global = global;
                self.rewards.send_replace(Some(view));
                self.spawn_refresh(false)
            }
            _ => self.refresh(),
        }
    }

    /// Reload prices and rewards in the background
    pub fn refresh(&self) -> JoinHandle<()> {
        self.spawn_refresh(true)
    }

    fn spawn_refresh(&self, with_rewards: bool) -> JoinHandle<()> {
        let token = self.session.token();
        let gateway = self.gateway.clone();
        let resolver = self.resolver.clone();
        let aggregator = self.aggregator.clone();
        let pairs = self.watched_pairs.clone();
        let account = self.account.filter(|_| with_rewards);
        let prices = self.prices.clone();
        let rewards = self.rewards.clone();

        tokio::spawn(async move {
            let load_prices = load_prices(gateway, resolver, pairs);
            if let Some(map) = token.clone().run(load_prices).await {
                prices.send_replace(map);
            }

            let Some(account) = account else { return };
            match token.run(aggregator.load_account_view(account)).await {
                Some(Ok(view)) => {
                    rewards.send_replace(Some(view));
                }
                Some(Err(e)) => warn!("Rewards refresh for {:?} failed: {}", account, e),
                None => debug!("Rewards refresh for {:?} abandoned", account),
            }
        })
    }
}

/// Prices for both sides of every watched pair that has a supported token
async fn load_prices(
    gateway: Arc<dyn ContractGateway>,
    resolver: Arc<PriceResolver>,
    pairs: Arc<Vec<Address>>,
) -> PriceMap {
    let max_attempts = resolver.options().max_attempts;
    let per_pair = pairs.iter().map(|&pair| {
        let gateway = gateway.clone();
        let resolver = resolver.clone();
        async move {
            let snapshot = match gateway.get_lp_data(pair).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Skipping pair {:?}: {}", pair, e);
                    return Vec::new();
                }
            };
            let Some(paired) = resolver.token_from_pair(&snapshot) else {
                debug!("Pair {:?} has no supported token", pair);
                return Vec::new();
            };

            let mut prices = vec![(paired.address, resolver.resolve_price(&snapshot, max_attempts).await)];
            if let Some(base) = snapshot.other_side(&paired.address) {
                let base_price = resolver
                    .resolve_base_price(&snapshot, max_attempts)
                    .await
                    .unwrap_or_else(|e| {
                        debug!("No base price for {:?}: {}", base, e);
                        0.0
                    });
                prices.push((base, base_price));
            }
            prices
        }
    });

    join_all(per_pair).await.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{snapshot, MockGateway};
    use crate::gateway::{AccountStakeLocal, StakingPoolId, StakingPoolState};
    use crate::pricing::PriceCache;
    use crate::tokens::{NetworkTokens, SupportedPairToken, TokenRegistry};
    use alloy_primitives::U256;
    use std::time::Duration;

    fn dai() -> Address { Address::repeat_byte(0xda) }
    fn weth() -> Address { Address::repeat_byte(0xee) }
    fn xyz() -> Address { Address::repeat_byte(0x42) }
    fn stable_pair() -> Address { Address::repeat_byte(0x5a) }
    fn xyz_pair() -> Address { Address::repeat_byte(0x77) }
    fn alice() -> Address { Address::repeat_byte(0xa1) }
    fn bob() -> Address { Address::repeat_byte(0xb0) }

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
    }

    fn registry() -> Arc<TokenRegistry> {
        let network = |chain_id| NetworkTokens {
            chain_id,
            name: format!("test-{}", chain_id),
            supported_liquidity_pair_tokens: vec![SupportedPairToken {
                symbol: "WETH".to_string(),
                address: weth(),
                stable_pair: stable_pair(),
            }],
        };
        Arc::new(TokenRegistry::new(vec![network(1), network(56)]))
    }

    fn pool(kind: StakingPoolId) -> StakingPoolState {
        StakingPoolState {
            contract_address: Address::repeat_byte(0x50),
            staking_type: kind,
            staked_token: Address::repeat_byte(0x51),
            decimals: 18,
            total_staked: U256::from(100u64),
            total_rewards: U256::ZERO,
            total_claimed: U256::ZERO,
        }
    }

    /// WETH = 2 DAI, XYZ = 0.5 WETH
    fn gateway(dai_reserve: u64) -> MockGateway {
        MockGateway::new()
            .with_pair(snapshot(stable_pair(), dai(), weth(), e18(dai_reserve), e18(1000)))
            .with_pair(snapshot(xyz_pair(), xyz(), weth(), e18(200), e18(100)))
            .with_token(dai(), "DAI", 18)
            .with_token(weth(), "WETH", 18)
            .with_token(xyz(), "XYZ", 18)
            .with_pool(pool(StakingPoolId::Solo))
            .with_pool(pool(StakingPoolId::Lp))
            .with_global(GlobalRewardsState {
                solo_staking_rewards: U256::from(40u64),
                ..Default::default()
            })
    }

    fn with_stake(gw: MockGateway, account: Address, amount: u64) -> MockGateway {
        gw.with_stake(
            StakingPoolId::Solo,
            account,
            AccountStakeLocal { amount: U256::from(amount), ..Default::default() },
        )
    }

    fn dashboard(gw: Arc<MockGateway>, account: Option<Address>) -> Dashboard {
        let resolver = Arc::new(PriceResolver::new(
            gw.clone(),
            registry(),
            Arc::new(PriceCache::default()),
            1,
        ));
        Dashboard::new(gw, resolver, vec![xyz_pair()], account)
    }

    #[tokio::test]
    async fn test_new_block_publishes_prices_and_rewards() {
        let gw = Arc::new(with_stake(gateway(2000), alice(), 25));
        let mut dash = dashboard(gw, Some(alice()));
        let prices = dash.prices();
        let rewards = dash.rewards();

        dash.handle(DashboardEvent::NewBlock).await.await.unwrap();

        let prices = prices.borrow().clone();
        assert_eq!(prices.get(&weth()), Some(&2.0));
        assert_eq!(prices.get(&xyz()), Some(&1.0));

        let view = rewards.borrow().clone().unwrap();
        assert_eq!(view.account, alice());
        assert_eq!(view.estimate.estimated, U256::from(10u64));
    }

    #[tokio::test]
    async fn test_no_account_publishes_no_rewards() {
        let gw = Arc::new(gateway(2000));
        let mut dash = dashboard(gw, None);
        let rewards = dash.rewards();

        dash.handle(DashboardEvent::NewBlock).await.await.unwrap();
        assert!(rewards.borrow().is_none());
        assert!(!dash.prices().borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_switch_abandons_stale_refresh() {
        let gw = with_stake(with_stake(gateway(2000), alice(), 25), bob(), 50);
        let gw = Arc::new(gw.with_latency(Duration::from_millis(100)));
        let mut dash = dashboard(gw, Some(alice()));
        let rewards = dash.rewards();

        let stale = dash.handle(DashboardEvent::NewBlock).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let fresh = dash.handle(DashboardEvent::AccountChanged(Some(bob()))).await;

        stale.await.unwrap();
        fresh.await.unwrap();

        let view = rewards.borrow().clone().unwrap();
        assert_eq!(view.account, bob());
        assert_eq!(view.estimate.estimated, U256::from(20u64));
    }

    #[tokio::test]
    async fn test_chain_switch_resets_and_reprices() {
        let gw = Arc::new(gateway(2000));
        let mut dash = dashboard(gw, None);
        let prices = dash.prices();

        dash.handle(DashboardEvent::NewBlock).await.await.unwrap();
        assert_eq!(prices.borrow().get(&weth()), Some(&2.0));

        // Same addresses on the other chain, WETH = 4 DAI
        let other = Arc::new(gateway(4000));
        let refresh = dash
            .handle(DashboardEvent::ChainChanged { chain_id: 56, gateway: other.clone() })
            .await;
        assert!(prices.borrow().is_empty());

        refresh.await.unwrap();
        assert_eq!(dash.chain_id(), 56);
        assert_eq!(prices.borrow().get(&weth()), Some(&4.0));
        assert_eq!(other.lp_calls(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_chain_publishes_nothing() {
        let gw = Arc::new(gateway(2000));
        let mut dash = dashboard(gw, None);
        let prices = dash.prices();

        let other = Arc::new(gateway(2000));
        dash.handle(DashboardEvent::ChainChanged { chain_id: 137, gateway: other })
            .await
            .await
            .unwrap();
        assert!(prices.borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_switch_moves_block_subscription() {
        let gw = Arc::new(gateway(2000));
        let mut dash = dashboard(gw.clone(), None);
        let global = dash.global_updates();

        dash.start_refresher(Duration::from_millis(250)).await.unwrap();
        assert_eq!(gw.subscriber_count(), 1);

        let other = Arc::new(gateway(4000).with_global(GlobalRewardsState {
            combined_rewards: U256::from(7u64),
            ..Default::default()
        }));
        dash.handle(DashboardEvent::ChainChanged { chain_id: 56, gateway: other.clone() })
            .await
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(gw.subscriber_count(), 0);
        assert_eq!(other.subscriber_count(), 1);

        // Blocks on the new network reach the same channel
        other.push_block(1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(global.borrow().as_ref().map(|g| g.combined_rewards), Some(U256::from(7u64)));
        assert_eq!(gw.global_calls(), 0);

        dash.stop_refresher().await;
        assert_eq!(other.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_dashboard_releases_subscription() {
        let gw = Arc::new(gateway(2000));
        let mut dash = dashboard(gw.clone(), None);
        dash.start_refresher(Duration::from_millis(250)).await.unwrap();

        drop(dash);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gw.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_refreshed_global_reestimates_without_account_reads() {
        let gw = Arc::new(with_stake(gateway(2000), alice(), 25));
        let mut dash = dashboard(gw.clone(), Some(alice()));
        let rewards = dash.rewards();

        dash.handle(DashboardEvent::NewBlock).await.await.unwrap();
        assert_eq!(gw.global_calls(), 1);

        // Solo bucket doubled, no distribution since
        let global = GlobalRewardsState {
            solo_staking_rewards: U256::from(80u64),
            ..Default::default()
        };
        dash.handle(DashboardEvent::GlobalRefreshed(global)).await.await.unwrap();

        let view = rewards.borrow().clone().unwrap();
        assert_eq!(view.estimate.estimated, U256::from(20u64));
        assert_eq!(view.global.solo_staking_rewards, U256::from(80u64));
        assert_eq!(gw.global_calls(), 1);
    }

    #[tokio::test]
    async fn test_distribution_triggers_full_reload() {
        let gw = Arc::new(with_stake(gateway(2000), alice(), 25));
        let mut dash = dashboard(gw.clone(), Some(alice()));

        dash.handle(DashboardEvent::NewBlock).await.await.unwrap();
        assert_eq!(gw.global_calls(), 1);

        let global = GlobalRewardsState { last_distribution_at: 1_700_000_000, ..Default::default() };
        dash.handle(DashboardEvent::GlobalRefreshed(global)).await.await.unwrap();
        assert_eq!(gw.global_calls(), 2);
    }
}
