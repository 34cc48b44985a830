//! Watch-pool analysis pipeline
//!
//! Fetches quotes and daily history for a fixed pool of ETFs or stocks,
//! computes deterministic signals, asks an OpenAI-compatible model for a
//! score and commentary, and ranks the result into a report.
//!
//! # Architecture
//!
//! - [`market::MarketGateway`]: TTL cache, paced and retried provider calls,
//!   normalization of localized records into typed entities
//! - [`scheduler::RequestScheduler`]: serializes every external call with a
//!   pluggable delay between calls
//! - [`signals::SignalEngine`]: moving-average trend, relative volume,
//!   intraday move and the longer-horizon technical context
//! - [`analyzer::LlmAnalyzer`]: structured-output negotiation, reply repair
//!   and validation
//! - [`report::ReportAssembler`]: runs the pool and ranks the entries
//!
//! # Example
//!
//! ```rust,ignore
//! use pulse_engine::{OutputFormat, Pool, PulseConfig, ReportAssembler, formatter_for};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PulseConfig::from_env()?;
//!     let assembler = ReportAssembler::from_config(&config, true)?;
//!
//!     let report = assembler.build_report(&Pool::etf()).await;
//!     println!("{}", formatter_for(OutputFormat::Markdown, config.language).render(&report)?);
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod error;
pub mod market;
pub mod model;
pub mod pool;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod signals;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{FormatMode, LlmAnalyzer, UnavailableReason, Verdict};
pub use cache::{Clock, MarketCache, SystemClock};
pub use config::{DataSourceKind, Language, LlmSettings, PacingSettings, PulseConfig, SignalSettings};
pub use error::{PulseError, Result};
pub use market::{MarketDataSource, MarketGateway};
pub use model::{Bar, BarSeries, Instrument, InstrumentKind, QuoteSnapshot};
pub use pool::Pool;
pub use report::{AnalysisReport, OutputFormat, ReportAssembler, ReportEntry, formatter_for, split_message};
pub use retry::RetryPolicy;
pub use scheduler::{Delay, RequestScheduler};
pub use signals::{SignalBundle, SignalEngine, Trend};
