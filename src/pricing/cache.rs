//! Price cache with single-flight reads.
//!
//! One slot per paired-token address. A slot is either `Pending` (a read is in
//! flight and every caller awaits the same shared future) or `Resolved`
//! (a price and when it was fetched). Failed reads remove the slot entirely.
//!
//! `clear()` drops every slot and bumps the generation; in-flight reads from
//! the previous generation are cancelled and never write back. Callers pass
//! the generation they observed to `claim`, so a read planned against one
//! network is never launched after the cache moved on to another.

use alloy_primitives::Address;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::math::ScaledPrice;
use crate::error::PriceError;

/// Default time-to-live of a resolved price
pub const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(10);

pub type QuoteResult = Result<ScaledPrice, PriceError>;

/// A read every caller for the same key can await
pub type Flight = Shared<BoxFuture<'static, QuoteResult>>;

/// A resolved price for a paired token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPriceQuote {
    pub paired_token: Address,
    pub price: ScaledPrice,
    pub fetched_at: Instant,
}

impl TokenPriceQuote {
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

enum CacheSlot {
    Pending { id: u64, flight: Flight },
    Resolved(TokenPriceQuote),
}

struct CacheInner {
    slots: HashMap<Address, CacheSlot>,
    generation: u64,
    next_flight_id: u64,
}

/// Outcome of [`PriceCache::claim`]
pub enum Lookup {
    /// Fresh price, no I/O needed
    Hit(ScaledPrice),
    /// A read is in flight; `started` is true if this call launched it
    InFlight { id: u64, flight: Flight, started: bool },
    /// The cache was cleared since the caller read the generation
    Superseded,
}

pub struct PriceCache {
    ttl: Duration,
    inner: Arc<Mutex<CacheInner>>,
    generation: watch::Sender<u64>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            ttl,
            inner: Arc::new(Mutex::new(CacheInner {
                slots: HashMap::new(),
                generation: 0,
                next_flight_id: 0,
            })),
            generation,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `key`, launching `read` if there is neither a fresh price nor
    /// a read already in flight. Check-and-insert happens under one lock.
    ///
    /// Nothing is returned or launched unless the cache is still at `generation`.
    pub async fn claim<F, Fut>(&self, key: Address, generation: u64, read: F) -> Lookup
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QuoteResult> + Send + 'static,
    {
        let mut inner = self.inner.lock().await;

        if inner.generation != generation {
            debug!(
                "Price claim for {:?} from generation {} superseded by {}",
                key, generation, inner.generation
            );
            return Lookup::Superseded;
        }

        match inner.slots.get(&key) {
            Some(CacheSlot::Resolved(quote)) if !quote.is_expired(self.ttl) => {
                trace!("Price cache hit for {:?}: {}", key, quote.price.value);
                return Lookup::Hit(quote.price);
            }
            Some(CacheSlot::Pending { id, flight }) => {
                trace!("Joining in-flight price read #{} for {:?}", id, key);
                return Lookup::InFlight { id: *id, flight: flight.clone(), started: false };
            }
            Some(CacheSlot::Resolved(_)) => {
                debug!("Price for {:?} expired, refetching", key);
            }
            None => {}
        }

        let id = inner.next_flight_id;
        inner.next_flight_id += 1;
        let flight = self.launch(key, id, inner.generation, read());
        inner.slots.insert(key, CacheSlot::Pending { id, flight: flight.clone() });

        Lookup::InFlight { id, flight, started: true }
    }

    /// Spawn the read so it completes (and fills the cache) even if every
    /// caller stops waiting.
    fn launch<Fut>(&self, key: Address, id: u64, generation: u64, read: Fut) -> Flight
    where
        Fut: Future<Output = QuoteResult> + Send + 'static,
    {
        let inner = self.inner.clone();
        let mut generation_rx = self.generation.subscribe();

        let task = tokio::spawn(async move {
            let result = tokio::select! {
                result = read => result,
                _ = generation_rx.changed() => Err(PriceError::Cancelled),
            };

            let mut inner = inner.lock().await;
            let owns_slot = inner.generation == generation
                && matches!(inner.slots.get(&key), Some(CacheSlot::Pending { id: slot_id, .. }) if *slot_id == id);

            if owns_slot {
                match &result {
                    Ok(price) => {
                        inner.slots.insert(
                            key,
                            CacheSlot::Resolved(TokenPriceQuote {
                                paired_token: key,
                                price: *price,
                                fetched_at: Instant::now(),
                            }),
                        );
                    }
                    Err(_) => {
                        inner.slots.remove(&key);
                    }
                }
            }

            result
        });

        async move { task.await.unwrap_or(Err(PriceError::Cancelled)) }
            .boxed()
            .shared()
    }

    /// Drop an in-flight slot that is taking too long, if it is still `id`
    pub async fn evict_flight(&self, key: Address, id: u64) -> bool {
        let mut inner = self.inner.lock().await;
        let is_same = matches!(inner.slots.get(&key), Some(CacheSlot::Pending { id: slot_id, .. }) if *slot_id == id);
        if is_same {
            inner.slots.remove(&key);
        }
        is_same
    }

    /// Fresh resolved quote for `key`, if any
    pub async fn get(&self, key: &Address) -> Option<TokenPriceQuote> {
        let inner = self.inner.lock().await;
        match inner.slots.get(key) {
            Some(CacheSlot::Resolved(quote)) if !quote.is_expired(self.ttl) => Some(quote.clone()),
            _ => None,
        }
    }

    pub async fn is_pending(&self, key: &Address) -> bool {
        let inner = self.inner.lock().await;
        matches!(inner.slots.get(key), Some(CacheSlot::Pending { .. }))
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Discard everything and cancel in-flight reads
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        let dropped = inner.slots.len();
        inner.slots.clear();
        inner.generation += 1;
        self.generation.send_replace(inner.generation);
        debug!("Price cache cleared ({} entries, generation {})", dropped, inner.generation);
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new(DEFAULT_PRICE_TTL)
    }
}
