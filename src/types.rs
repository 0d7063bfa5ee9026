use alloy_primitives::{Address, B256, U256};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// One Trade log emitted by the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapEvent {
    pub block_number: u64,
    pub block_hash: Option<B256>,
    pub transaction_hash: Option<B256>,
    /// Position of the log within its block, used to order swaps sharing a block
    pub log_index: Option<u64>,
    pub trader: Address,
    pub origin: Address,
    pub target: Address,
    pub origin_amount: U256,
    pub target_amount: U256,
}

/// One ERC-20 Transfer log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

/// A token the pool trades together with the feed that prices it in USD
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAsset {
    pub token: Address,
    pub feed: Address,
    /// Label used in export column titles
    pub symbol: String,
}

/// The pool's two assets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAssets {
    /// USDC-class asset
    pub stable: TrackedAsset,
    pub volatile: TrackedAsset,
}

/// USD price and decimal precision of one asset at one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetQuote {
    pub token: Address,
    pub block_number: u64,
    pub price: BigDecimal,
    pub decimals: u8,
}

/// Quotes for both tracked assets at the same block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairQuotes {
    pub stable: AssetQuote,
    pub volatile: AssetQuote,
}

/// The protocol fee matched for a swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRecord {
    pub token: Address,
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
    /// Position of the matched transfer log within its block
    pub log_index: Option<u64>,
    /// Fee in token units
    pub amount: BigDecimal,
    pub usd_value: BigDecimal,
}

/// One exported ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRecord {
    pub block_number: u64,
    pub block_hash: Option<B256>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
    pub trader: Address,
    pub origin: Address,
    pub target: Address,
    pub origin_amount: BigDecimal,
    pub origin_usd: BigDecimal,
    pub target_amount: BigDecimal,
    pub target_usd: BigDecimal,
    /// `None` when no pool-to-treasury transfer was found in the block
    pub fee_usd: Option<BigDecimal>,
    pub volatile_price: BigDecimal,
    pub stable_price: BigDecimal,
}

impl ValuationRecord {
    /// Sort key keeping the ledger in block order and deterministic within a block
    pub fn ordering_key(&self) -> (u64, u64, Option<B256>) {
        (
            self.block_number,
            self.log_index.unwrap_or(u64::MAX),
            self.transaction_hash,
        )
    }
}
