//! Protocol fee detection
//!
//! The pool forwards its fee to the treasury as a plain ERC-20 transfer inside
//! the swap's own block, so the search window is exactly one block.

use std::sync::Arc;

use alloy_primitives::Address;
use bigdecimal::BigDecimal;
use tracing::debug;

use crate::{
    chain::ChainSource,
    decimal,
    error::Result,
    types::{FeeRecord, TransferEvent},
};

/// Parameters for one fee lookup
#[derive(Debug, Clone)]
pub struct FeeQuery<'a> {
    /// Asset the pool paid out
    pub token: Address,
    pub block: u64,
    pub pool: Address,
    pub treasury: Address,
    pub decimals: u8,
    pub price: &'a BigDecimal,
}

/// Pick the fee transfer out of one block's transfers.
///
/// The last transfer from `pool` to `treasury` wins. Address equality is
/// byte-wise, so checksum casing never matters.
pub fn last_fee_transfer<'a>(
    transfers: &'a [TransferEvent],
    pool: Address,
    treasury: Address,
) -> Option<&'a TransferEvent> {
    transfers
        .iter()
        .rev()
        .find(|t| t.from == pool && t.to == treasury)
}

pub struct FeeLocator<C: ?Sized> {
    chain: Arc<C>,
}

impl<C: ChainSource + ?Sized> FeeLocator<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    /// Locate the fee paid for a swap in `query.block`.
    ///
    /// `Ok(None)` means the block holds no pool-to-treasury transfer of the
    /// asset; RPC failures are returned as errors.
    pub async fn locate(&self, query: FeeQuery<'_>) -> Result<Option<FeeRecord>> {
        let transfers = self.chain.transfer_events(query.token, query.block).await?;

        let Some(transfer) = last_fee_transfer(&transfers, query.pool, query.treasury) else {
            debug!(
                token = %query.token,
                block = query.block,
                scanned = transfers.len(),
                "no fee transfer in block"
            );
            return Ok(None);
        };

        let amount = decimal::scale_down(transfer.value, query.decimals);
        let usd_value = &amount * query.price;

        Ok(Some(FeeRecord {
            token: query.token,
            block_number: query.block,
            transaction_hash: transfer.transaction_hash,
            log_index: transfer.log_index,
            amount,
            usd_value,
        }))
    }
}
