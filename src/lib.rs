pub mod chain;
pub mod config;
pub mod contracts;
pub mod decimal;
pub mod error;
pub mod export;
pub mod fees;
pub mod ledger;
pub mod oracle;
pub mod pipeline;
pub mod types;
pub mod valuation;

use std::sync::Arc;

pub use chain::{ChainSource, RpcChain};
pub use config::{Config, RetryPolicy};
pub use error::{LedgerError, Result};
pub use export::{CsvExporter, LedgerSink};
pub use ledger::{Ledger, LedgerRecorder};
pub use pipeline::{run_ledger, LedgerRun, RunSummary};
pub use types::{
    FeeRecord, SwapEvent, TrackedAsset, TrackedAssets, TransferEvent, ValuationRecord,
};
pub use valuation::{SwapDirection, SwapValuator};

/// Reconstruct the swap ledger for `config` and write it to `config.output_path`
///
/// The CSV is rewritten after every valued swap, so an interrupted run still
/// leaves a complete, sorted table of everything valued so far.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use alloy::providers::ProviderBuilder;
/// use swap_ledger::{export_ledger, Config, RpcChain};
///
/// # async fn run() -> eyre::Result<()> {
/// let config = Config::from_env()?;
/// let provider = ProviderBuilder::new().connect_http(config.rpc_url.parse()?);
/// let chain = Arc::new(RpcChain::new(provider, config.retry));
///
/// let run = export_ledger(chain, &config).await?;
/// println!("{} swaps recorded", run.summary.recorded);
/// # Ok(())
/// # }
/// ```
pub async fn export_ledger<C>(chain: Arc<C>, config: &Config) -> Result<LedgerRun<CsvExporter>>
where
    C: ChainSource + ?Sized,
{
    let exporter = CsvExporter::new(&config.output_path, &config.assets);
    run_ledger(chain, config, exporter).await
}
