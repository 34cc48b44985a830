//! Market data source boundary

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// One untyped record as returned by a provider, keyed by the provider's own
/// field names
pub type RawRecord = Map<String, Value>;

/// External market data provider
///
/// Implementations return records exactly as the provider names them; the
/// gateway normalizes and validates them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Current quote for an instrument code
    async fn fetch_quote(&self, code: &str) -> Result<RawRecord>;

    /// Daily bars for an instrument code, at most `lookback_days` of them
    async fn fetch_history(&self, code: &str, lookback_days: usize) -> Result<Vec<RawRecord>>;
}
