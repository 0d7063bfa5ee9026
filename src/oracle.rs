//! Historical USD prices from per-asset price feeds

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::Address;
use bigdecimal::BigDecimal;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    chain::ChainSource,
    decimal,
    error::{LedgerError, Result},
};

/// Cached (feed, block) prices kept before the oldest blocks are dropped
pub const DEFAULT_PRICE_CACHE_CAPACITY: usize = 4096;

/// Resolves `latestAnswer / 10^decimals` of a feed as of a block.
///
/// Prices are cached by (feed, block): swaps sharing a block reuse one pair of
/// reads. Failed reads are not cached. Swaps are scanned in block order, so
/// once the cache is full the lowest block is evicted first.
pub struct PriceResolver<C: ?Sized> {
    chain: Arc<C>,
    cache: Mutex<HashMap<(Address, u64), BigDecimal>>,
    capacity: usize,
}

impl<C: ChainSource + ?Sized> PriceResolver<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self::with_capacity(chain, DEFAULT_PRICE_CACHE_CAPACITY)
    }

    pub fn with_capacity(chain: Arc<C>, capacity: usize) -> Self {
        Self {
            chain,
            cache: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// USD price reported by `feed` at `block`.
    ///
    /// Fails with `OracleUnavailable` if either read fails or the answer is not
    /// a positive number.
    pub async fn resolve(&self, feed: Address, block: u64) -> Result<BigDecimal> {
        if let Some(price) = self.cache.lock().await.get(&(feed, block)) {
            return Ok(price.clone());
        }

        let unavailable = |reason: String| LedgerError::OracleUnavailable { feed, block, reason };

        let (answer, decimals) = tokio::try_join!(
            self.chain.feed_answer(feed, block),
            self.chain.feed_decimals(feed, block),
        )
        .map_err(|e| unavailable(e.to_string()))?;

        let price = decimal::price_from_answer(answer, decimals)
            .ok_or_else(|| unavailable(format!("invalid answer {answer}")))?;

        debug!(%feed, block, price = %price, "resolved oracle price");
        let mut cache = self.cache.lock().await;
        while cache.len() >= self.capacity {
            let Some(oldest) = cache.keys().map(|(_, b)| *b).min() else {
                break;
            };
            cache.retain(|(_, b), _| *b != oldest);
        }
        cache.insert((feed, block), price.clone());
        drop(cache);

        Ok(price)
    }

    /// Number of cached (feed, block) prices.
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}
