//! In-memory swap ledger and its snapshot recorder

use bigdecimal::BigDecimal;
use tracing::{error, info, warn};

use crate::{
    decimal::format_fixed,
    error::{LedgerError, Result},
    export::LedgerSink,
    types::ValuationRecord,
};

/// Valued swaps kept sorted by block, plus the running fee total.
///
/// Absent fees are counted separately and never contribute to the total.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    records: Vec<ValuationRecord>,
    total_fee_usd: BigDecimal,
    fees_missing: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ValuationRecord) {
        match &record.fee_usd {
            Some(fee) => self.total_fee_usd += fee,
            None => {
                self.fees_missing += 1;
                info!(
                    block = record.block_number,
                    tx = ?record.transaction_hash,
                    "no protocol fee found for swap"
                );
            }
        }

        // Records mostly arrive in order, so the insertion point is usually the end
        let key = record.ordering_key();
        let at = self.records.partition_point(|r| r.ordering_key() <= key);
        self.records.insert(at, record);
    }

    pub fn records(&self) -> &[ValuationRecord] {
        &self.records
    }

    pub fn total_fee_usd(&self) -> &BigDecimal {
        &self.total_fee_usd
    }

    pub fn fees_missing(&self) -> usize {
        self.fees_missing
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Owns the ledger and rewrites the sink after every accepted record.
///
/// A failed snapshot is logged and leaves the ledger untouched; the next
/// successful snapshot carries every row, and [`finish`](Self::finish) retries
/// once more if the latest one failed.
pub struct LedgerRecorder<S> {
    ledger: Ledger,
    sink: S,
    stale: bool,
    export_failures: usize,
}

impl<S: LedgerSink> LedgerRecorder<S> {
    pub fn new(sink: S) -> Self {
        Self {
            ledger: Ledger::new(),
            sink,
            stale: false,
            export_failures: 0,
        }
    }

    pub fn record(&mut self, record: ValuationRecord) {
        self.ledger.insert(record);
        self.snapshot();
    }

    fn snapshot(&mut self) -> bool {
        match self.sink.write_snapshot(self.ledger.records()) {
            Ok(()) => {
                self.stale = false;
                true
            }
            Err(e) => {
                self.stale = true;
                self.export_failures += 1;
                error!(rows = self.ledger.len(), error = %e, "ledger snapshot failed");
                false
            }
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn export_failures(&self) -> usize {
        self.export_failures
    }

    /// Make sure the sink holds the final ledger and hand the ledger back.
    ///
    /// An empty ledger still produces a header-only export.
    pub fn finish(mut self) -> Result<(Ledger, S)> {
        if self.stale || self.ledger.is_empty() {
            if self.stale {
                warn!("retrying ledger export after an earlier failure");
            }
            if !self.snapshot() {
                return Err(LedgerError::ExportFailure(format!(
                    "final snapshot of {} rows could not be written",
                    self.ledger.len()
                )));
            }
        }

        info!(
            rows = self.ledger.len(),
            fees_missing = self.ledger.fees_missing(),
            total_fee_usd = %format_fixed(self.ledger.total_fee_usd(), 6),
            "ledger complete"
        );
        Ok((self.ledger, self.sink))
    }
}
