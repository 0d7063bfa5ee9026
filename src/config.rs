use std::{path::PathBuf, str::FromStr, time::Duration};

use alloy_primitives::Address;

use crate::{
    error::{LedgerError, Result},
    types::{TrackedAsset, TrackedAssets},
};

/// Retry settings applied to every RPC request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each later one
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

/// Static configuration for one ledger run
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub pool: Address,
    pub treasury: Address,
    pub assets: TrackedAssets,
    pub start_block: u64,
    /// Inclusive end of the range; the chain head when unset
    pub end_block: Option<u64>,
    pub output_path: PathBuf,
    /// Swaps valued in parallel
    pub concurrency: usize,
    /// Blocks per swap log query
    pub log_chunk_size: u64,
    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration from the process environment, honouring a `.env` file.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let assets = TrackedAssets {
            stable: TrackedAsset {
                token: vars.required("STABLE_TOKEN_ADDRESS")?,
                feed: vars.required("STABLE_FEED_ADDRESS")?,
                symbol: vars.optional("STABLE_SYMBOL")?.unwrap_or_else(|| "USDC".to_string()),
            },
            volatile: TrackedAsset {
                token: vars.required("VOLATILE_TOKEN_ADDRESS")?,
                feed: vars.required("VOLATILE_FEED_ADDRESS")?,
                symbol: vars.optional("VOLATILE_SYMBOL")?.unwrap_or_else(|| "ARB".to_string()),
            },
        };

        if assets.stable.token == assets.volatile.token {
            return Err(LedgerError::Config(
                "STABLE_TOKEN_ADDRESS and VOLATILE_TOKEN_ADDRESS must differ".to_string(),
            ));
        }

        let config = Self {
            rpc_url: vars.required("RPC_URL")?,
            pool: vars.required("POOL_ADDRESS")?,
            treasury: vars.required("TREASURY_ADDRESS")?,
            assets,
            start_block: vars.required("START_BLOCK")?,
            end_block: vars.optional("END_BLOCK")?,
            output_path: vars
                .optional("OUTPUT_PATH")?
                .unwrap_or_else(|| PathBuf::from("output.csv")),
            concurrency: vars.optional("CONCURRENCY")?.unwrap_or(8),
            log_chunk_size: vars.optional("LOG_CHUNK_SIZE")?.unwrap_or(10_000),
            retry: RetryPolicy {
                max_retries: vars
                    .optional("RPC_MAX_RETRIES")?
                    .unwrap_or(RetryPolicy::default().max_retries),
                initial_backoff: vars
                    .optional::<u64>("RPC_RETRY_BACKOFF_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(RetryPolicy::default().initial_backoff),
            },
        };

        if config.concurrency == 0 || config.log_chunk_size == 0 {
            return Err(LedgerError::Config(
                "CONCURRENCY and LOG_CHUNK_SIZE must be positive".to_string(),
            ));
        }
        if let Some(end) = config.end_block {
            if end < config.start_block {
                return Err(LedgerError::InvalidRange {
                    from: config.start_block,
                    to: end,
                });
            }
        }

        Ok(config)
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.lookup)(key).map(|v| v.trim().to_string()) {
            None => Ok(None),
            Some(value) if value.is_empty() => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|e| LedgerError::Config(format!("{key}={value}: {e}"))),
        }
    }

    fn required<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)?
            .ok_or_else(|| LedgerError::Config(format!("{key} must be set")))
    }
}
