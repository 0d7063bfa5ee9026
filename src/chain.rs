//! Chain access for the ledger
//!
//! `ChainSource` is the seam between the valuation pipeline and the node: log
//! queries over a block range and contract reads pinned to a historical block.
//! `RpcChain` implements it over any Alloy provider; tests substitute an
//! in-memory chain.

use std::future::Future;

use alloy::{
    eips::BlockId,
    providers::Provider,
    rpc::types::{Filter, Log},
};
use alloy_primitives::{Address, I256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    config::RetryPolicy,
    contracts::{IPriceFeed, ITradingPool, IERC20},
    error::{LedgerError, Result},
    types::{SwapEvent, TransferEvent},
};

/// Everything the pipeline needs from a node
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Current head block number.
    async fn latest_block(&self) -> Result<u64>;

    /// Trade logs emitted by `pool` in `from_block..=to_block`, in chain order.
    async fn swap_events(&self, pool: Address, from_block: u64, to_block: u64)
        -> Result<Vec<SwapEvent>>;

    /// Transfer logs of `token` emitted in exactly one block, in log order.
    async fn transfer_events(&self, token: Address, block: u64) -> Result<Vec<TransferEvent>>;

    /// `latestAnswer()` of a price feed as of `block`.
    async fn feed_answer(&self, feed: Address, block: u64) -> Result<I256>;

    /// `decimals()` of a price feed as of `block`.
    async fn feed_decimals(&self, feed: Address, block: u64) -> Result<u8>;

    /// `decimals()` of an ERC-20 token.
    async fn token_decimals(&self, token: Address) -> Result<u8>;
}

/// `ChainSource` backed by a JSON-RPC provider
#[derive(Debug, Clone)]
pub struct RpcChain<P> {
    provider: P,
    retry: RetryPolicy,
}

impl<P: Provider> RpcChain<P> {
    pub fn new(provider: P, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let provider = &self.provider;
        with_retry(self.retry, "eth_getLogs", move || async move {
            provider.get_logs(filter).await
        })
        .await
    }
}

#[async_trait]
impl<P: Provider + 'static> ChainSource for RpcChain<P> {
    async fn latest_block(&self) -> Result<u64> {
        let provider = &self.provider;
        with_retry(self.retry, "eth_blockNumber", move || async move {
            provider.get_block_number().await
        })
        .await
    }

    async fn swap_events(
        &self,
        pool: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SwapEvent>> {
        let filter = Filter::new()
            .address(pool)
            .event_signature(ITradingPool::Trade::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.get_logs(&filter).await?;
        debug!(%pool, from_block, to_block, logs = logs.len(), "fetched trade logs");

        // Unlike transfers, every matching log here is a swap the ledger must
        // contain; an undecodable one fails the window instead of vanishing.
        logs.iter().map(decode_swap_log).collect()
    }

    async fn transfer_events(&self, token: Address, block: u64) -> Result<Vec<TransferEvent>> {
        let filter = Filter::new()
            .address(token)
            .event_signature(IERC20::Transfer::SIGNATURE_HASH)
            .from_block(block)
            .to_block(block);

        let logs = self.get_logs(&filter).await?;

        let mut transfers = Vec::with_capacity(logs.len());
        for log in &logs {
            match decode_transfer_log(log) {
                Ok(transfer) => transfers.push(transfer),
                // Non-standard Transfer shapes (e.g. indexed value) cannot be the fee leg
                Err(e) => warn!(%token, block, error = %e, "skipping undecodable transfer log"),
            }
        }
        Ok(transfers)
    }

    async fn feed_answer(&self, feed: Address, block: u64) -> Result<I256> {
        let contract = IPriceFeed::new(feed, &self.provider);
        let contract = &contract;
        with_retry(self.retry, "latestAnswer", move || async move {
            contract.latestAnswer().block(BlockId::number(block)).call().await
        })
        .await
    }

    async fn feed_decimals(&self, feed: Address, block: u64) -> Result<u8> {
        let contract = IPriceFeed::new(feed, &self.provider);
        let contract = &contract;
        with_retry(self.retry, "feed decimals", move || async move {
            contract.decimals().block(BlockId::number(block)).call().await
        })
        .await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        let contract = IERC20::new(token, &self.provider);
        let contract = &contract;
        with_retry(self.retry, "token decimals", move || async move {
            contract.decimals().call().await
        })
        .await
    }
}

/// Run an RPC request, retrying with exponential backoff.
///
/// After `policy.max_retries` failed retries the last error is returned as
/// `RpcUnavailable`.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0u32;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries => {
                attempt += 1;
                debug!(operation, attempt, error = %e, ?backoff, "rpc request failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => return Err(LedgerError::rpc(operation, e)),
        }
    }
}

/// Decode a pool Trade log with its block metadata.
pub fn decode_swap_log(log: &Log) -> Result<SwapEvent> {
    let block_number = log
        .block_number
        .ok_or_else(|| LedgerError::Decode("trade log without block number".to_string()))?;
    let trade = ITradingPool::Trade::decode_log(&log.inner)
        .map_err(|e| LedgerError::Decode(format!("trade log in block {block_number}: {e}")))?
        .data;

    Ok(SwapEvent {
        block_number,
        block_hash: log.block_hash,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
        trader: trade.trader,
        origin: trade.origin,
        target: trade.target,
        origin_amount: trade.originAmount,
        target_amount: trade.targetAmount,
    })
}

/// Decode an ERC-20 Transfer log with its block metadata.
pub fn decode_transfer_log(log: &Log) -> Result<TransferEvent> {
    let block_number = log
        .block_number
        .ok_or_else(|| LedgerError::Decode("transfer log without block number".to_string()))?;
    let transfer = IERC20::Transfer::decode_log(&log.inner)
        .map_err(|e| LedgerError::Decode(format!("transfer log in block {block_number}: {e}")))?
        .data;

    Ok(TransferEvent {
        block_number,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
        from: transfer.from,
        to: transfer.to,
        value: transfer.value,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, Log as PrimitiveLog, LogData, B256, U256};
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    fn rpc_log(inner: PrimitiveLog, block: Option<u64>) -> Log {
        Log {
            inner,
            block_hash: Some(B256::repeat_byte(0xbb)),
            block_number: block,
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(0xcc)),
            transaction_index: Some(3),
            log_index: Some(7),
            removed: false,
        }
    }

    fn no_wait(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::ZERO,
        }
    }

    #[test]
    fn test_decode_swap_log() {
        let pool = Address::repeat_byte(0xaa);
        let trade = ITradingPool::Trade {
            trader: Address::repeat_byte(0x01),
            origin: Address::repeat_byte(0x02),
            target: Address::repeat_byte(0x03),
            originAmount: U256::from(1_000_000u64),
            targetAmount: U256::from(42u64),
        };
        let log = rpc_log(
            PrimitiveLog {
                address: pool,
                data: trade.encode_log_data(),
            },
            Some(1000),
        );

        let swap = decode_swap_log(&log).unwrap();
        assert_eq!(swap.block_number, 1000);
        assert_eq!(swap.block_hash, Some(B256::repeat_byte(0xbb)));
        assert_eq!(swap.transaction_hash, Some(B256::repeat_byte(0xcc)));
        assert_eq!(swap.log_index, Some(7));
        assert_eq!(swap.trader, trade.trader);
        assert_eq!(swap.origin, trade.origin);
        assert_eq!(swap.target, trade.target);
        assert_eq!(swap.origin_amount, U256::from(1_000_000u64));
        assert_eq!(swap.target_amount, U256::from(42u64));
    }

    #[test]
    fn test_decode_swap_log_requires_block_number() {
        let trade = ITradingPool::Trade {
            trader: Address::ZERO,
            origin: Address::ZERO,
            target: Address::ZERO,
            originAmount: U256::ZERO,
            targetAmount: U256::ZERO,
        };
        let log = rpc_log(
            PrimitiveLog {
                address: Address::ZERO,
                data: trade.encode_log_data(),
            },
            None,
        );

        assert!(matches!(decode_swap_log(&log), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_decode_swap_log_rejects_truncated_data() {
        let trade = ITradingPool::Trade {
            trader: Address::ZERO,
            origin: Address::ZERO,
            target: Address::ZERO,
            originAmount: U256::ZERO,
            targetAmount: U256::ZERO,
        };
        let encoded = trade.encode_log_data();
        let truncated = LogData::new_unchecked(encoded.topics().to_vec(), Bytes::from(vec![0u8; 32]));
        let log = rpc_log(
            PrimitiveLog {
                address: Address::ZERO,
                data: truncated,
            },
            Some(5),
        );

        let err = decode_swap_log(&log).unwrap_err();
        assert!(matches!(err, LedgerError::Decode(_)));
        // a broken trade log must stop the run, not skip the swap
        assert!(!err.is_per_event());
    }

    #[test]
    fn test_decode_transfer_log_rejects_other_events() {
        let trade = ITradingPool::Trade {
            trader: Address::ZERO,
            origin: Address::ZERO,
            target: Address::ZERO,
            originAmount: U256::ZERO,
            targetAmount: U256::ZERO,
        };
        let log = rpc_log(
            PrimitiveLog {
                address: Address::ZERO,
                data: trade.encode_log_data(),
            },
            Some(5),
        );

        assert!(matches!(decode_transfer_log(&log), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_decode_transfer_log() {
        let transfer = IERC20::Transfer {
            from: Address::repeat_byte(0x0a),
            to: Address::repeat_byte(0x0b),
            value: U256::from(3_000u64),
        };
        let log = rpc_log(
            PrimitiveLog {
                address: Address::repeat_byte(0x0c),
                data: transfer.encode_log_data(),
            },
            Some(12),
        );

        let decoded = decode_transfer_log(&log).unwrap();
        assert_eq!(decoded.block_number, 12);
        assert_eq!(decoded.from, transfer.from);
        assert_eq!(decoded.to, transfer.to);
        assert_eq!(decoded.value, U256::from(3_000u64));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let value = with_retry(no_wait(3), "flaky", move || async move {
            if calls_ref.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("connection reset")
            } else {
                Ok(99u64)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_with_rpc_unavailable() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let result: Result<u64> = with_retry(no_wait(2), "eth_getLogs", move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err::<u64, _>("rate limited")
        })
        .await;

        match result {
            Err(LedgerError::RpcUnavailable { operation, reason }) => {
                assert_eq!(operation, "eth_getLogs");
                assert_eq!(reason, "rate limited");
            }
            other => panic!("expected RpcUnavailable, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
