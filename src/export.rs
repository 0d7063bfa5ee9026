//! Tabular export of the ledger

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    decimal::format_plain,
    error::{LedgerError, Result},
    types::{TrackedAssets, ValuationRecord},
};

/// Destination for full-ledger snapshots.
///
/// Every call receives the complete, sorted ledger and replaces whatever the
/// previous call wrote.
pub trait LedgerSink {
    fn write_snapshot(&mut self, records: &[ValuationRecord]) -> Result<()>;
}

/// Writes the ledger as CSV, replacing the file atomically on every snapshot
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: PathBuf,
    headers: Vec<String>,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>, assets: &TrackedAssets) -> Self {
        Self {
            path: path.into(),
            headers: column_headers(assets),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Serialize `records` as CSV into any writer.
    pub fn render<W: Write>(&self, writer: W, records: &[ValuationRecord]) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.headers).map_err(export_error)?;
        for record in records {
            csv.write_record(row(record)).map_err(export_error)?;
        }
        csv.flush().map_err(|e| LedgerError::ExportFailure(e.to_string()))
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl LedgerSink for CsvExporter {
    fn write_snapshot(&mut self, records: &[ValuationRecord]) -> Result<()> {
        let staging = self.staging_path();

        let file = fs::File::create(&staging).map_err(|e| {
            LedgerError::ExportFailure(format!("create {}: {e}", staging.display()))
        })?;
        self.render(file, records)?;
        fs::rename(&staging, &self.path).map_err(|e| {
            LedgerError::ExportFailure(format!("replace {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), rows = records.len(), "exported ledger snapshot");
        Ok(())
    }
}

/// Column titles; the two price columns are named after the tracked assets.
pub fn column_headers(assets: &TrackedAssets) -> Vec<String> {
    [
        "Block Number",
        "BlockHash",
        "Transaction Hash",
        "Trader",
        "Origin",
        "Target",
        "Origin Amount",
        "Origin USD Amount",
        "Target Amount",
        "Target USD Amount",
        "Fee In USD",
    ]
    .into_iter()
    .map(str::to_string)
    .chain([
        format!("{} Price", assets.volatile.symbol),
        format!("{} Price", assets.stable.symbol),
    ])
    .collect()
}

fn row(record: &ValuationRecord) -> [String; 13] {
    [
        record.block_number.to_string(),
        record.block_hash.map(|h| h.to_string()).unwrap_or_default(),
        record.transaction_hash.map(|h| h.to_string()).unwrap_or_default(),
        record.trader.to_string(),
        record.origin.to_string(),
        record.target.to_string(),
        format_plain(&record.origin_amount),
        format_plain(&record.origin_usd),
        format_plain(&record.target_amount),
        format_plain(&record.target_usd),
        record.fee_usd.as_ref().map(format_plain).unwrap_or_default(),
        format_plain(&record.volatile_price),
        format_plain(&record.stable_price),
    ]
}

fn export_error(e: csv::Error) -> LedgerError {
    LedgerError::ExportFailure(e.to_string())
}
