use alloy_primitives::Address;
use thiserror::Error;

/// Errors raised while reconstructing the swap ledger.
///
/// A missing fee transfer is not an error: it surfaces as `None` from the fee
/// locator and as an empty fee cell in the export.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("rpc unavailable during {operation}: {reason}")]
    RpcUnavailable { operation: String, reason: String },

    #[error("oracle {feed} unavailable at block {block}: {reason}")]
    OracleUnavailable {
        feed: Address,
        block: u64,
        reason: String,
    },

    #[error("swap {origin} -> {target} does not match the tracked asset pair")]
    UntrackedPair { origin: Address, target: Address },

    #[error("failed to decode log: {0}")]
    Decode(String),

    #[error("invalid block range {from}..={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("export failed: {0}")]
    ExportFailure(String),
}

impl LedgerError {
    pub(crate) fn rpc(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::RpcUnavailable {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error only affects the swap being valued.
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            Self::RpcUnavailable { .. } | Self::OracleUnavailable { .. } | Self::UntrackedPair { .. }
        )
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
