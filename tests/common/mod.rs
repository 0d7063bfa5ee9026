//! Deterministic in-memory chain shared by the integration tests
#![allow(dead_code)]

use std::{collections::HashMap, path::PathBuf, time::Duration};

use alloy_primitives::{Address, B256, I256, U256};
use async_trait::async_trait;
use swap_ledger::{
    ChainSource, Config, LedgerError, LedgerSink, Result, RetryPolicy, SwapEvent, TrackedAsset,
    TrackedAssets, TransferEvent, ValuationRecord,
};

pub const STABLE_DECIMALS: u8 = 6;
pub const VOLATILE_DECIMALS: u8 = 18;
pub const FEED_DECIMALS: u8 = 8;

pub fn pool() -> Address {
    Address::repeat_byte(0x01)
}

pub fn treasury() -> Address {
    Address::repeat_byte(0x02)
}

pub fn trader() -> Address {
    Address::repeat_byte(0x77)
}

pub fn assets() -> TrackedAssets {
    TrackedAssets {
        stable: TrackedAsset {
            token: Address::repeat_byte(0x5a),
            feed: Address::repeat_byte(0x5f),
            symbol: "USDC".to_string(),
        },
        volatile: TrackedAsset {
            token: Address::repeat_byte(0xa0),
            feed: Address::repeat_byte(0xaf),
            symbol: "ARB".to_string(),
        },
    }
}

pub fn config(start_block: u64, end_block: u64, output_path: PathBuf) -> Config {
    Config {
        rpc_url: "http://localhost:8545".to_string(),
        pool: pool(),
        treasury: treasury(),
        assets: assets(),
        start_block,
        end_block: Some(end_block),
        output_path,
        concurrency: 8,
        log_chunk_size: 1,
        retry: RetryPolicy::default(),
    }
}

/// Token amount in base units, e.g. `units(25, 1, 18)` is 2.5 tokens
pub fn units(mantissa: u128, fraction_digits: u8, decimals: u8) -> U256 {
    U256::from(mantissa) * U256::from(10u64).pow(U256::from(decimals - fraction_digits))
}

/// Feed answer for a USD price given in cents
pub fn answer_cents(cents: i64) -> I256 {
    I256::try_from(cents * 1_000_000).unwrap()
}

pub fn swap(
    block: u64,
    log_index: u64,
    origin: Address,
    target: Address,
    origin_amount: U256,
    target_amount: U256,
) -> SwapEvent {
    SwapEvent {
        block_number: block,
        block_hash: Some(B256::left_padding_from(&block.to_be_bytes())),
        transaction_hash: Some(B256::left_padding_from(&(block * 100 + log_index).to_be_bytes())),
        log_index: Some(log_index),
        trader: trader(),
        origin,
        target,
        origin_amount,
        target_amount,
    }
}

pub fn fee_transfer(block: u64, log_index: u64, value: U256) -> TransferEvent {
    TransferEvent {
        block_number: block,
        transaction_hash: Some(B256::left_padding_from(&(block * 100 + log_index).to_be_bytes())),
        log_index: Some(log_index),
        from: pool(),
        to: treasury(),
        value,
    }
}

/// Chain backed by fixed tables; optional per-block delays shuffle the order
/// in which concurrent valuations complete.
#[derive(Debug, Default, Clone)]
pub struct FixtureChain {
    pub head: u64,
    pub swaps: Vec<SwapEvent>,
    pub transfers: HashMap<(Address, u64), Vec<TransferEvent>>,
    pub answers: HashMap<(Address, u64), I256>,
    pub decimals: HashMap<Address, u8>,
    pub delays: HashMap<u64, Duration>,
}

impl FixtureChain {
    pub fn new(head: u64) -> Self {
        let a = assets();
        let mut chain = Self {
            head,
            ..Default::default()
        };
        chain.decimals.insert(a.stable.token, STABLE_DECIMALS);
        chain.decimals.insert(a.volatile.token, VOLATILE_DECIMALS);
        chain.decimals.insert(a.stable.feed, FEED_DECIMALS);
        chain.decimals.insert(a.volatile.feed, FEED_DECIMALS);
        chain
    }

    /// Price both feeds at `block`
    pub fn price(&mut self, block: u64, stable_cents: i64, volatile_cents: i64) {
        let a = assets();
        self.answers.insert((a.stable.feed, block), answer_cents(stable_cents));
        self.answers.insert((a.volatile.feed, block), answer_cents(volatile_cents));
    }

    pub fn transfer(&mut self, token: Address, transfer: TransferEvent) {
        self.transfers
            .entry((token, transfer.block_number))
            .or_default()
            .push(transfer);
    }

    async fn pause(&self, block: u64) {
        if let Some(delay) = self.delays.get(&block) {
            tokio::time::sleep(*delay).await;
        }
    }

    fn decimals_of(&self, address: Address) -> Result<u8> {
        self.decimals
            .get(&address)
            .copied()
            .ok_or_else(|| LedgerError::RpcUnavailable {
                operation: "decimals".to_string(),
                reason: format!("no contract at {address}"),
            })
    }
}

#[async_trait]
impl ChainSource for FixtureChain {
    async fn latest_block(&self) -> Result<u64> {
        Ok(self.head)
    }

    async fn swap_events(&self, _pool: Address, from_block: u64, to_block: u64) -> Result<Vec<SwapEvent>> {
        let mut events: Vec<SwapEvent> = self
            .swaps
            .iter()
            .filter(|s| (from_block..=to_block).contains(&s.block_number))
            .cloned()
            .collect();
        events.sort_by_key(|s| (s.block_number, s.log_index));
        Ok(events)
    }

    async fn transfer_events(&self, token: Address, block: u64) -> Result<Vec<TransferEvent>> {
        self.pause(block).await;
        Ok(self.transfers.get(&(token, block)).cloned().unwrap_or_default())
    }

    async fn feed_answer(&self, feed: Address, block: u64) -> Result<I256> {
        self.pause(block).await;
        self.answers
            .get(&(feed, block))
            .copied()
            .ok_or_else(|| LedgerError::RpcUnavailable {
                operation: "latestAnswer".to_string(),
                reason: "execution reverted".to_string(),
            })
    }

    async fn feed_decimals(&self, feed: Address, _block: u64) -> Result<u8> {
        self.decimals_of(feed)
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        self.decimals_of(token)
    }
}

/// Sink keeping every snapshot in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<Vec<ValuationRecord>>,
}

impl LedgerSink for MemorySink {
    fn write_snapshot(&mut self, records: &[ValuationRecord]) -> Result<()> {
        self.snapshots.push(records.to_vec());
        Ok(())
    }
}

/// Four swaps over blocks 100..=102:
///
/// | block | log | direction       | fee                   |
/// |-------|-----|-----------------|-----------------------|
/// | 100   | 1   | 1 USDC -> 2.5 ARB | 0.01 ARB @ 1.50     |
/// | 101   | 5   | 10 ARB -> 11.9 USDC | 0.03 USDC @ 1.00  |
/// | 101   | 2   | 6 USDC -> 5 ARB   | none                |
/// | 102   | 0   | 2 USDC -> 1 ARB   | 0.002 ARB @ 2.00    |
pub fn scenario() -> FixtureChain {
    let a = assets();
    let (usdc, arb) = (a.stable.token, a.volatile.token);
    let mut chain = FixtureChain::new(200);

    chain.price(100, 100, 150);
    chain.price(101, 100, 120);
    chain.price(102, 100, 200);

    chain.swaps = vec![
        swap(101, 5, arb, usdc, units(10, 0, 18), units(119, 1, 6)),
        swap(100, 1, usdc, arb, units(1, 0, 6), units(25, 1, 18)),
        swap(102, 0, usdc, arb, units(2, 0, 6), units(1, 0, 18)),
        swap(101, 2, usdc, arb, units(6, 0, 6), units(5, 0, 18)),
    ];

    chain.transfer(arb, fee_transfer(100, 3, units(1, 2, 18)));
    chain.transfer(usdc, fee_transfer(101, 7, units(3, 2, 6)));
    chain.transfer(arb, fee_transfer(102, 1, units(2, 3, 18)));
    chain
}
