//! End-to-end ledger run over a closed block range

use std::sync::Arc;

use bigdecimal::BigDecimal;
use futures::{stream, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    chain::ChainSource,
    config::Config,
    error::{LedgerError, Result},
    export::LedgerSink,
    ledger::{Ledger, LedgerRecorder},
    types::SwapEvent,
    valuation::SwapValuator,
};

/// Counters reported at the end of a run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub from_block: u64,
    pub to_block: u64,
    pub swaps_seen: usize,
    pub recorded: usize,
    pub skipped: usize,
    pub fees_missing: usize,
    /// Swaps whose fee transfer was already counted for another swap in the block
    pub fees_reused: usize,
    pub total_fee_usd: BigDecimal,
}

/// Result of a completed run
pub struct LedgerRun<S> {
    pub summary: RunSummary,
    pub ledger: Ledger,
    pub sink: S,
}

/// Split `from..=to` into inclusive windows of at most `size` blocks.
pub fn block_chunks(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = from;

    while start <= to {
        let end = start.saturating_add(size - 1).min(to);
        chunks.push((start, end));
        match end.checked_add(1) {
            Some(next) => start = next,
            None => break,
        }
    }
    chunks
}

/// Fetch every swap the pool emitted in `from..=to`.
///
/// A failed window aborts the scan: a partial event set would silently drop
/// swaps from the ledger.
pub async fn scan_swaps<C>(chain: &C, config: &Config, from: u64, to: u64) -> Result<Vec<SwapEvent>>
where
    C: ChainSource + ?Sized,
{
    let mut swaps = Vec::new();
    for (chunk_from, chunk_to) in block_chunks(from, to, config.log_chunk_size) {
        let events = chain.swap_events(config.pool, chunk_from, chunk_to).await?;
        debug!(from = chunk_from, to = chunk_to, events = events.len(), "scanned swap logs");
        swaps.extend(events);
    }
    Ok(swaps)
}

/// Reconstruct the swap ledger for the configured range.
///
/// Swaps are valued concurrently; this function alone owns the ledger and
/// applies completed valuations one at a time. Swaps whose prices or fee
/// transfers cannot be read are skipped and logged, every other error aborts
/// the run.
pub async fn run_ledger<C, S>(chain: Arc<C>, config: &Config, sink: S) -> Result<LedgerRun<S>>
where
    C: ChainSource + ?Sized,
    S: LedgerSink,
{
    let from_block = config.start_block;
    let to_block = match config.end_block {
        Some(end) => end,
        None => chain.latest_block().await?,
    };
    if to_block < from_block {
        return Err(LedgerError::InvalidRange {
            from: from_block,
            to: to_block,
        });
    }

    let swaps = scan_swaps(chain.as_ref(), config, from_block, to_block).await?;
    info!(from_block, to_block, swaps = swaps.len(), "valuing swaps");

    let valuator = SwapValuator::new(chain, config.assets.clone(), config.pool, config.treasury);
    let valuator = &valuator;
    let mut recorder = LedgerRecorder::new(sink);
    let mut skipped = 0;

    let mut valuations = stream::iter(&swaps)
        .map(move |event| async move { (event, valuator.valuate(event).await) })
        .buffer_unordered(config.concurrency.max(1));

    while let Some((event, result)) = valuations.next().await {
        match result {
            Ok(record) => recorder.record(record),
            Err(e) if e.is_per_event() => {
                skipped += 1;
                warn!(
                    block = event.block_number,
                    tx = ?event.transaction_hash,
                    error = %e,
                    "skipping swap"
                );
            }
            Err(e) => return Err(e),
        }
    }
    drop(valuations);

    let (ledger, sink) = recorder.finish()?;
    let summary = RunSummary {
        from_block,
        to_block,
        swaps_seen: swaps.len(),
        recorded: ledger.len(),
        skipped,
        fees_missing: ledger.fees_missing(),
        fees_reused: valuator.fee_reuses(),
        total_fee_usd: ledger.total_fee_usd().clone(),
    };

    Ok(LedgerRun {
        summary,
        ledger,
        sink,
    })
}
