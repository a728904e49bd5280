//! Token pricing against per-network stable pairs

pub mod cache;
pub mod math;
pub mod resolver;

pub use cache::{PriceCache, QuoteResult, TokenPriceQuote, DEFAULT_PRICE_TTL};
pub use math::{base_price, quote_price, to_decimal, ScaledPrice};
pub use resolver::{
    PriceResolver, PriceResult, ResolveOptions, DEFAULT_MAX_ATTEMPTS, DEFAULT_PENDING_BACKOFF,
};
