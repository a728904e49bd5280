//! Price Resolver
//!
//! Prices a pair's registry-supported ("paired") token against its stable
//! pair, with the fewest possible on-chain reads:
//! - fresh cache hit → no I/O
//! - read already in flight for the same paired token → await it
//! - otherwise one `get_lp_data` + two `get_token_data` calls
//!
//! price = reference_balance * 10^paired_decimals / paired_balance, in U256,
//! converted to f64 (reference units) only at the end.
//!
//! Chain id, gateway and cache generation are read together once per attempt.
//! A read planned on one network can neither launch nor memoize on another.

use alloy_primitives::Address;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::cache::{Lookup, PriceCache, QuoteResult};
use super::math::{base_price, quote_price, ScaledPrice};
use crate::error::{GatewayError, PriceError};
use crate::gateway::{ContractGateway, LiquidityPoolSnapshot, TokenMetadata};
use crate::tokens::{NetworkTokens, SupportedPairToken, TokenRegistry};

pub type PriceResult = Result<f64, PriceError>;

/// Default number of backoff periods a caller waits on someone else's read
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default backoff period
pub const DEFAULT_PENDING_BACKOFF: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub max_attempts: u32,
    pub pending_backoff: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            pending_backoff: DEFAULT_PENDING_BACKOFF,
        }
    }
}

/// Reverted metadata calls mean the token is missing; anything else is RPC
fn token_error(token: Address, err: GatewayError) -> PriceError {
    match err {
        GatewayError::Contract { .. } | GatewayError::Decode { .. } => PriceError::MissingTokenData(token),
        other => PriceError::from(other),
    }
}

/// The on-chain read behind one flight
fn read_price(
    gateway: Arc<dyn ContractGateway>,
    chain_id: u64,
    paired: Address,
    stable_pair: Address,
) -> impl Future<Output = QuoteResult> + Send + 'static {
    async move {
        let snapshot = gateway.get_lp_data(stable_pair).await?;
        let reference = snapshot
            .other_side(&paired)
            .ok_or(PriceError::Unresolvable(stable_pair, chain_id))?;

        let (paired_meta, reference_meta) = futures::try_join!(
            async { gateway.get_token_data(paired).await.map_err(|e| token_error(paired, e)) },
            async { gateway.get_token_data(reference).await.map_err(|e| token_error(reference, e)) },
        )?;

        let price = quote_price(&snapshot, &paired_meta, &reference_meta)?;
        debug!(
            "Resolved {} = {:.6} {} via {:?}",
            paired_meta.symbol,
            price.to_f64(),
            reference_meta.symbol,
            stable_pair
        );
        Ok(price)
    }
}

// ============================================
// RESOLVER
// ============================================

/// The network every read in one attempt is made against
#[derive(Clone)]
struct ActiveNetwork {
    chain_id: u64,
    gateway: Arc<dyn ContractGateway>,
}

pub struct PriceResolver {
    active: RwLock<ActiveNetwork>,
    /// Mirror of `active.chain_id` for the synchronous registry lookups
    chain_id: AtomicU64,
    registry: Arc<TokenRegistry>,
    cache: Arc<PriceCache>,
    options: ResolveOptions,
    /// Token metadata never changes on a given network
    token_meta: RwLock<HashMap<(u64, Address), TokenMetadata>>,
}

impl PriceResolver {
    pub fn new(
        gateway: Arc<dyn ContractGateway>,
        registry: Arc<TokenRegistry>,
        cache: Arc<PriceCache>,
        chain_id: u64,
    ) -> Self {
        Self {
            active: RwLock::new(ActiveNetwork { chain_id, gateway }),
            chain_id: AtomicU64::new(chain_id),
            registry,
            cache,
            options: ResolveOptions::default(),
            token_meta: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> ResolveOptions {
        self.options
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    /// Point at another network. Addresses are not unique across networks,
    /// so the whole cache goes, pending reads included.
    pub async fn switch_network(&self, chain_id: u64, gateway: Arc<dyn ContractGateway>) {
        let mut active = self.active.write().await;
        info!("🔀 Switching network {} → {}, clearing price cache", active.chain_id, chain_id);
        self.cache.clear().await;
        *active = ActiveNetwork { chain_id, gateway };
        self.chain_id.store(chain_id, Ordering::SeqCst);
        self.token_meta.write().await.clear();
    }

    fn network(&self) -> Option<&NetworkTokens> {
        self.registry.network(self.chain_id())
    }

    // ========== Registry lookups ==========

    pub fn is_supported_token(&self, token: &Address) -> bool {
        self.network().is_some_and(|n| n.is_supported_token(token))
    }

    pub fn is_supported_pair(&self, pair: &LiquidityPoolSnapshot) -> bool {
        self.network().is_some_and(|n| n.is_supported_pair(pair))
    }

    pub fn token_from_pair(&self, pair: &LiquidityPoolSnapshot) -> Option<SupportedPairToken> {
        self.network().and_then(|n| n.token_from_pair(pair)).cloned()
    }

    pub fn stable_pair_address(&self, pair: &LiquidityPoolSnapshot) -> Option<Address> {
        self.network().and_then(|n| n.stable_pair_address(pair))
    }

    // ========== Resolution ==========

    /// Price of the pair's supported token, with the default wait budget
    pub async fn resolve(&self, pair: &LiquidityPoolSnapshot) -> PriceResult {
        self.resolve_with(pair, self.options.max_attempts).await
    }

    /// Price of the pair's supported token.
    ///
    /// A caller that finds someone else's read in flight waits for it at most
    /// `max_attempts` backoff periods, then evicts it and reads itself.
    pub async fn resolve_with(&self, pair: &LiquidityPoolSnapshot, max_attempts: u32) -> PriceResult {
        let (_, _, price) = self.resolve_scaled(pair, max_attempts).await?;
        Ok(price.to_f64())
    }

    /// Integer price plus the network and paired token it was resolved on
    async fn resolve_scaled(
        &self,
        pair: &LiquidityPoolSnapshot,
        max_attempts: u32,
    ) -> Result<(ActiveNetwork, SupportedPairToken, ScaledPrice), PriceError> {
        let wait_budget = self.options.pending_backoff * max_attempts.max(1);
        let mut took_over = false;

        loop {
            // Held until the claim is placed, so a switch cannot land in between
            let active = self.active.read().await;
            let network = (*active).clone();
            let paired = self
                .registry
                .network(network.chain_id)
                .and_then(|n| n.token_from_pair(pair))
                .cloned()
                .ok_or(PriceError::Unresolvable(pair.pair, network.chain_id))?;
            let key = paired.address;
            let generation = self.cache.generation();

            let gateway = network.gateway.clone();
            let (chain_id, stable_pair) = (network.chain_id, paired.stable_pair);
            let lookup = self
                .cache
                .claim(key, generation, || read_price(gateway, chain_id, key, stable_pair))
                .await;
            drop(active);

            let (id, flight, started) = match lookup {
                Lookup::Hit(price) => return Ok((network, paired, price)),
                Lookup::InFlight { id, flight, started } => (id, flight, started),
                Lookup::Superseded => continue,
            };

            match tokio::time::timeout(wait_budget, flight).await {
                Ok(result) => return result.map(|price| (network, paired, price)),
                Err(_) if !started && !took_over => {
                    warn!(
                        "Price read for {} still pending after {:?}, taking over",
                        paired.symbol, wait_budget
                    );
                    self.cache.evict_flight(key, id).await;
                    took_over = true;
                }
                Err(_) => {
                    self.cache.evict_flight(key, id).await;
                    return Err(PriceError::Rpc(format!(
                        "price read for {:?} timed out after {:?}",
                        key, wait_budget
                    )));
                }
            }
        }
    }

    /// Sentinel form: any failure is logged and reported as `0.0`.
    ///
    /// Callers cannot tell a zero-liquidity pool from a failing lookup here;
    /// use [`resolve`](Self::resolve) when that matters.
    pub async fn resolve_price(&self, pair: &LiquidityPoolSnapshot, max_attempts: u32) -> f64 {
        match self.resolve_with(pair, max_attempts).await {
            Ok(price) => price,
            Err(PriceError::ZeroLiquidity(p)) => {
                debug!("Zero liquidity in {:?}, price 0", p);
                0.0
            }
            Err(e) => {
                warn!("Price resolution failed for pair {:?}: {}", pair.pair, e);
                0.0
            }
        }
    }

    /// Price of the pair's *other* (base) token in reference units, derived
    /// from the pair's own reserves and the paired token's price.
    pub async fn resolve_base_price(&self, pair: &LiquidityPoolSnapshot, max_attempts: u32) -> PriceResult {
        let (network, paired, quote) = self.resolve_scaled(pair, max_attempts).await?;
        let base = pair
            .other_side(&paired.address)
            .ok_or(PriceError::Unresolvable(pair.pair, network.chain_id))?;

        let (base_meta, paired_meta) = futures::try_join!(
            self.token_metadata(&network, base),
            self.token_metadata(&network, paired.address)
        )?;

        Ok(base_price(quote, pair, &base_meta, &paired_meta)?.to_f64())
    }

    async fn token_metadata(&self, network: &ActiveNetwork, token: Address) -> Result<TokenMetadata, PriceError> {
        let key = (network.chain_id, token);
        if let Some(meta) = self.token_meta.read().await.get(&key) {
            return Ok(meta.clone());
        }
        let meta = network
            .gateway
            .get_token_data(token)
            .await
            .map_err(|e| token_error(token, e))?;
        self.token_meta.write().await.insert(key, meta.clone());
        Ok(meta)
    }
}
