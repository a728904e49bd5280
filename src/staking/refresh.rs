//! Block-driven refresh of the distributor state.
//!
//! Every new block can change `GlobalRewardsState`, but blocks arrive in
//! bursts. Reads are throttled to one per debounce window: the first block of
//! a quiet period reads immediately, later blocks inside the window collapse
//! into one trailing read when the window closes.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::GatewayResult;
use crate::gateway::{BlockStream, ContractGateway, GlobalRewardsState};
use crate::scope::{Scope, ScopeToken};

pub const DEFAULT_REFRESH_DEBOUNCE: Duration = Duration::from_millis(250);

pub struct RewardsRefresher {
    state: watch::Receiver<Option<GlobalRewardsState>>,
    scope: Scope,
    task: Option<JoinHandle<()>>,
}

impl RewardsRefresher {
    /// Subscribe to new blocks and start refreshing in the background
    pub async fn spawn(gateway: Arc<dyn ContractGateway>, debounce: Duration) -> GatewayResult<Self> {
        let (tx, _) = watch::channel(None);
        Self::spawn_with(gateway, debounce, tx).await
    }

    /// Like [`spawn`](Self::spawn), publishing on a channel the caller owns.
    /// The channel outlives the refresher, so a replacement can reuse it.
    pub async fn spawn_with(
        gateway: Arc<dyn ContractGateway>,
        debounce: Duration,
        tx: watch::Sender<Option<GlobalRewardsState>>,
    ) -> GatewayResult<Self> {
        let blocks = gateway.subscribe_blocks().await?;
        let state = tx.subscribe();
        let scope = Scope::new();
        let task = tokio::spawn(refresh_loop(gateway, blocks, debounce, tx, scope.token()));

        info!("🔄 Rewards refresher started (debounce {:?})", debounce);
        Ok(Self {
            state,
            scope,
            task: Some(task),
        })
    }

    /// Latest distributor state; `None` until the first read lands
    pub fn subscribe(&self) -> watch::Receiver<Option<GlobalRewardsState>> {
        self.state.clone()
    }

    pub fn latest(&self) -> Option<GlobalRewardsState> {
        self.state.borrow().clone()
    }

    /// Stop reading and release the block subscription
    pub async fn shutdown(mut self) {
        self.scope.dispose();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!("Rewards refresher stopped");
    }
}

impl Drop for RewardsRefresher {
    fn drop(&mut self) {
        self.scope.dispose();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn refresh_loop(
    gateway: Arc<dyn ContractGateway>,
    mut blocks: BlockStream,
    debounce: Duration,
    tx: watch::Sender<Option<GlobalRewardsState>>,
    mut token: ScopeToken,
) {
    // Some(end) while a window is open
    let mut window_end: Option<Instant> = None;
    let mut trailing = false;

    loop {
        let deadline = window_end;
        tokio::select! {
            _ = token.disposed() => break,
            block = blocks.next() => match block {
                Some(hash) => {
                    if window_end.is_some() {
                        trailing = true;
                    } else {
                        debug!("Block {:?}, refreshing rewards", hash);
                        read_global(&gateway, &tx, &token).await;
                        window_end = Some(Instant::now() + debounce);
                    }
                }
                None => {
                    warn!("Block stream ended, rewards refresher stopping");
                    break;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if trailing {
                    trailing = false;
                    read_global(&gateway, &tx, &token).await;
                    window_end = Some(Instant::now() + debounce);
                } else {
                    window_end = None;
                }
            }
        }
    }
}

async fn read_global(
    gateway: &Arc<dyn ContractGateway>,
    tx: &watch::Sender<Option<GlobalRewardsState>>,
    token: &ScopeToken,
) {
    match token.clone().run(gateway.get_global_staking_data()).await {
        Some(Ok(state)) => {
            tx.send_replace(Some(state));
        }
        // Keep the last good value
        Some(Err(e)) => warn!("Rewards refresh failed: {}", e),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use alloy_primitives::U256;

    fn gateway() -> Arc<MockGateway> {
        Arc::new(MockGateway::new().with_global(GlobalRewardsState {
            combined_rewards: U256::from(40u64),
            ..Default::default()
        }))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_leading_and_trailing_read() {
        let gw = gateway();
        let refresher = RewardsRefresher::spawn(gw.clone(), Duration::from_millis(250))
            .await
            .unwrap();
        assert!(refresher.latest().is_none());

        gw.push_block(1);
        settle().await;
        assert_eq!(gw.global_calls(), 1);
        assert_eq!(
            refresher.latest().map(|g| g.combined_rewards),
            Some(U256::from(40u64))
        );

        for n in 2..6 {
            gw.push_block(n);
        }
        settle().await;
        assert_eq!(gw.global_calls(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(gw.global_calls(), 2);

        // Quiet period, then a fresh block reads right away
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(gw.global_calls(), 2);
        gw.push_block(9);
        settle().await;
        assert_eq!(gw.global_calls(), 3);

        refresher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_block_reads_once() {
        let gw = gateway();
        let refresher = RewardsRefresher::spawn(gw.clone(), Duration::from_millis(250))
            .await
            .unwrap();

        gw.push_block(1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gw.global_calls(), 1);

        refresher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_read_keeps_last_value() {
        let gw = gateway();
        let refresher = RewardsRefresher::spawn(gw.clone(), Duration::from_millis(250))
            .await
            .unwrap();

        gw.push_block(1);
        settle().await;
        assert!(refresher.latest().is_some());

        gw.fail_reads.store(true, std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        gw.push_block(2);
        settle().await;

        assert_eq!(gw.global_calls(), 2);
        assert!(refresher.latest().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_subscription() {
        let gw = gateway();
        let refresher = RewardsRefresher::spawn(gw.clone(), DEFAULT_REFRESH_DEBOUNCE)
            .await
            .unwrap();
        assert_eq!(gw.subscriber_count(), 1);

        refresher.shutdown().await;
        assert_eq!(gw.subscriber_count(), 0);

        gw.push_block(1);
        settle().await;
        assert_eq!(gw.global_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_subscription() {
        let gw = gateway();
        let refresher = RewardsRefresher::spawn(gw.clone(), DEFAULT_REFRESH_DEBOUNCE)
            .await
            .unwrap();
        let mut updates = refresher.subscribe();

        drop(refresher);
        settle().await;

        assert_eq!(gw.subscriber_count(), 0);
        assert!(updates.changed().await.is_err());
    }
}
