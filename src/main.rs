//! `swap-ledger`: value every swap of one pool over a block range and export
//! the ledger as CSV.
//!
//! Configuration comes from the environment (a `.env` file is honoured), see
//! [`swap_ledger::Config`].

use std::sync::Arc;

use alloy::providers::ProviderBuilder;
use eyre::Result;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use swap_ledger::{decimal::format_fixed, export_ledger, Config, RpcChain};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        pool = %config.pool,
        treasury = %config.treasury,
        start_block = config.start_block,
        end_block = ?config.end_block,
        output = %config.output_path.display(),
        "starting swap ledger"
    );

    let provider = ProviderBuilder::new().connect_http(config.rpc_url.parse()?);
    let chain = Arc::new(RpcChain::new(provider, config.retry));

    let run = export_ledger(chain, &config).await?;
    let summary = &run.summary;

    info!(
        from_block = summary.from_block,
        to_block = summary.to_block,
        swaps = summary.swaps_seen,
        recorded = summary.recorded,
        skipped = summary.skipped,
        fees_missing = summary.fees_missing,
        fees_reused = summary.fees_reused,
        "run finished"
    );
    info!(
        "total fee in USD: {}",
        format_fixed(&summary.total_fee_usd, 6)
    );

    Ok(())
}
