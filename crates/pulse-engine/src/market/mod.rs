//! Market data acquisition
//!
//! - [`source`]: the provider boundary returning untyped records
//! - [`normalize`]: alias table and coercion into typed entities
//! - [`gateway`]: cache, pacing, retry and timeout around a source
//! - [`eastmoney`], [`yahoo`]: concrete providers

pub mod eastmoney;
pub mod gateway;
pub mod normalize;
pub mod source;
pub mod yahoo;

pub use eastmoney::EastmoneySource;
pub use gateway::MarketGateway;
pub use normalize::{Field, NormalizedRecord, quote_from_record, series_from_records};
pub use source::{MarketDataSource, RawRecord};
pub use yahoo::YahooSource;

use crate::config::DataSourceKind;
use crate::error::Result;
use std::sync::Arc;

/// Construct the configured provider
pub fn create_source(kind: DataSourceKind) -> Result<Arc<dyn MarketDataSource>> {
    Ok(match kind {
        DataSourceKind::Eastmoney => Arc::new(EastmoneySource::new()?),
        DataSourceKind::Yahoo => Arc::new(YahooSource::new()),
    })
}
