//! Per-swap valuation
//!
//! Converts one Trade log into a `ValuationRecord`: direction, decimal amounts,
//! USD value of both legs, and the protocol fee taken from the outgoing leg.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use alloy_primitives::{Address, B256};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::{
    chain::ChainSource,
    decimal,
    error::{LedgerError, Result},
    fees::{FeeLocator, FeeQuery},
    oracle::PriceResolver,
    types::{AssetQuote, FeeRecord, PairQuotes, SwapEvent, TrackedAsset, TrackedAssets, ValuationRecord},
};

/// Which tracked asset the trader paid in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Stable in, volatile out
    OriginIsStable,
    /// Volatile in, stable out
    OriginIsVolatile,
}

impl SwapDirection {
    /// Classify a swap against the pool's two assets.
    ///
    /// Both legs must be tracked and distinct; anything else is rejected rather
    /// than valued against the wrong prices.
    pub fn detect(origin: Address, target: Address, assets: &TrackedAssets) -> Result<Self> {
        let (stable, volatile) = (assets.stable.token, assets.volatile.token);

        if origin == stable && target == volatile {
            Ok(Self::OriginIsStable)
        } else if origin == volatile && target == stable {
            Ok(Self::OriginIsVolatile)
        } else {
            Err(LedgerError::UntrackedPair { origin, target })
        }
    }

    pub fn origin<'a>(&self, assets: &'a TrackedAssets) -> &'a TrackedAsset {
        match self {
            Self::OriginIsStable => &assets.stable,
            Self::OriginIsVolatile => &assets.volatile,
        }
    }

    /// The asset the pool pays out, which also carries the fee
    pub fn target<'a>(&self, assets: &'a TrackedAssets) -> &'a TrackedAsset {
        match self {
            Self::OriginIsStable => &assets.volatile,
            Self::OriginIsVolatile => &assets.stable,
        }
    }

    pub fn origin_quote<'a>(&self, quotes: &'a PairQuotes) -> &'a AssetQuote {
        match self {
            Self::OriginIsStable => &quotes.stable,
            Self::OriginIsVolatile => &quotes.volatile,
        }
    }

    pub fn target_quote<'a>(&self, quotes: &'a PairQuotes) -> &'a AssetQuote {
        match self {
            Self::OriginIsStable => &quotes.volatile,
            Self::OriginIsVolatile => &quotes.stable,
        }
    }
}

/// Build the ledger row for a swap from already-resolved inputs.
pub fn value_swap(
    event: &SwapEvent,
    direction: SwapDirection,
    quotes: &PairQuotes,
    fee: Option<&FeeRecord>,
) -> ValuationRecord {
    let origin_quote = direction.origin_quote(quotes);
    let target_quote = direction.target_quote(quotes);

    let origin_amount = decimal::scale_down(event.origin_amount, origin_quote.decimals);
    let target_amount = decimal::scale_down(event.target_amount, target_quote.decimals);
    let origin_usd = &origin_amount * &origin_quote.price;
    let target_usd = &target_amount * &target_quote.price;

    ValuationRecord {
        block_number: event.block_number,
        block_hash: event.block_hash,
        transaction_hash: event
            .transaction_hash
            .or_else(|| fee.and_then(|f| f.transaction_hash)),
        log_index: event.log_index,
        trader: event.trader,
        origin: event.origin,
        target: event.target,
        origin_amount,
        origin_usd,
        target_amount,
        target_usd,
        fee_usd: fee.map(|f| f.usd_value.clone()),
        volatile_price: quotes.volatile.price.clone(),
        stable_price: quotes.stable.price.clone(),
    }
}

/// Values swaps against historical oracle prices and the pool's fee transfers
pub struct SwapValuator<C: ?Sized> {
    chain: Arc<C>,
    prices: PriceResolver<C>,
    fees: FeeLocator<C>,
    assets: TrackedAssets,
    pool: Address,
    treasury: Address,
    token_decimals: Mutex<HashMap<Address, u8>>,
    /// (token, block, tx, log index) of every fee transfer matched so far
    matched_fees: Mutex<HashSet<FeeKey>>,
    fee_reuses: AtomicUsize,
}

type FeeKey = (Address, u64, Option<B256>, Option<u64>);

impl<C: ChainSource + ?Sized> SwapValuator<C> {
    pub fn new(chain: Arc<C>, assets: TrackedAssets, pool: Address, treasury: Address) -> Self {
        Self {
            prices: PriceResolver::new(chain.clone()),
            fees: FeeLocator::new(chain.clone()),
            chain,
            assets,
            pool,
            treasury,
            token_decimals: Mutex::new(HashMap::new()),
            matched_fees: Mutex::new(HashSet::new()),
            fee_reuses: AtomicUsize::new(0),
        }
    }

    pub fn assets(&self) -> &TrackedAssets {
        &self.assets
    }

    /// Swaps that were matched to a fee transfer an earlier swap already used.
    pub fn fee_reuses(&self) -> usize {
        self.fee_reuses.load(Ordering::Relaxed)
    }

    /// Value one swap.
    ///
    /// Oracle and decimals reads for both assets run concurrently; the fee
    /// lookup follows once the target asset's quote is known.
    #[instrument(skip_all, fields(block = event.block_number, tx = ?event.transaction_hash))]
    pub async fn valuate(&self, event: &SwapEvent) -> Result<ValuationRecord> {
        let direction = SwapDirection::detect(event.origin, event.target, &self.assets)?;
        let block = event.block_number;

        let (stable_price, volatile_price, stable_decimals, volatile_decimals) = tokio::try_join!(
            self.prices.resolve(self.assets.stable.feed, block),
            self.prices.resolve(self.assets.volatile.feed, block),
            self.decimals_of(self.assets.stable.token),
            self.decimals_of(self.assets.volatile.token),
        )?;

        let quotes = PairQuotes {
            stable: AssetQuote {
                token: self.assets.stable.token,
                block_number: block,
                price: stable_price,
                decimals: stable_decimals,
            },
            volatile: AssetQuote {
                token: self.assets.volatile.token,
                block_number: block,
                price: volatile_price,
                decimals: volatile_decimals,
            },
        };

        let target = direction.target_quote(&quotes);
        let fee = self
            .fees
            .locate(FeeQuery {
                token: target.token,
                block,
                pool: self.pool,
                treasury: self.treasury,
                decimals: target.decimals,
                price: &target.price,
            })
            .await?;

        if let Some(fee) = &fee {
            self.note_fee_match(fee).await;
        }

        let record = value_swap(event, direction, &quotes, fee.as_ref());
        debug!(?direction, origin_usd = %record.origin_usd, fee_found = fee.is_some(), "valued swap");

        Ok(record)
    }

    /// Matching is per block, so swaps sharing a block and target asset all
    /// pick the same transfer and each add it to the total.
    async fn note_fee_match(&self, fee: &FeeRecord) {
        let key = (fee.token, fee.block_number, fee.transaction_hash, fee.log_index);
        if !self.matched_fees.lock().await.insert(key) {
            self.fee_reuses.fetch_add(1, Ordering::Relaxed);
            debug!(
                token = %fee.token,
                block = fee.block_number,
                fee_tx = ?fee.transaction_hash,
                log_index = ?fee.log_index,
                "fee transfer already matched to another swap in this block"
            );
        }
    }

    /// Token decimals are immutable, so a successful read is kept for the run.
    async fn decimals_of(&self, token: Address) -> Result<u8> {
        if let Some(decimals) = self.token_decimals.lock().await.get(&token) {
            return Ok(*decimals);
        }

        let decimals = self.chain.token_decimals(token).await?;
        self.token_decimals.lock().await.insert(token, decimals);
        Ok(decimals)
    }
}
