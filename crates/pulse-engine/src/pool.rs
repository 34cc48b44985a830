//! Watch pools
//!
//! A pool is a fixed list of instruments analysed together per command.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PulseError, Result};
use crate::model::{Instrument, InstrumentKind};

/// A named, ordered list of instruments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    /// Pool name shown in report headers
    pub name: String,
    /// Instruments in declaration order
    pub instruments: Vec<Instrument>,
}

impl Pool {
    /// Create a pool
    pub fn new(name: impl Into<String>, instruments: Vec<Instrument>) -> Self {
        Self {
            name: name.into(),
            instruments,
        }
    }

    /// Built-in core ETF pool
    pub fn etf() -> Self {
        let entries = [
            ("510050", "上证50ETF"),
            ("510300", "沪深300ETF"),
            ("510500", "中证500ETF"),
            ("159919", "创业板50ETF"),
            ("588000", "科创50ETF"),
            ("512000", "券商ETF"),
            ("159995", "芯片ETF"),
            ("512690", "酒ETF"),
            ("512010", "医药ETF"),
            ("513050", "中概互联ETF"),
            ("512800", "银行ETF"),
            ("159992", "创新药ETF"),
            ("515030", "新能源车ETF"),
            ("159825", "农业ETF"),
            ("518880", "黄金ETF"),
        ];
        Self::new(
            "ETF",
            entries
                .iter()
                .map(|(code, name)| Instrument::etf(*code, *name))
                .collect(),
        )
    }

    /// Built-in core stock pool
    pub fn stock() -> Self {
        let entries = [
            ("603298", "杭叉集团"),
            ("930901", "动漫游戏指数"),
            ("000819", "有色金属"),
            ("161129", "原油LOF易方达"),
        ];
        Self::new(
            "Stock",
            entries
                .iter()
                .map(|(code, name)| Instrument::stock(*code, *name))
                .collect(),
        )
    }

    /// Built-in pool for a kind
    pub fn builtin(kind: InstrumentKind) -> Self {
        match kind {
            InstrumentKind::Etf => Self::etf(),
            InstrumentKind::Stock => Self::stock(),
        }
    }

    /// Load a pool from a JSON file
    ///
    /// The file holds `{"name": "...", "instruments": [{"code", "name", "kind"}, ...]}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let pool: Self = serde_json::from_str(&raw)?;
        pool.validate()?;
        Ok(pool)
    }

    /// Reject empty pools, blank codes and duplicated codes
    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            return Err(PulseError::ConfigError(format!("pool '{}' is empty", self.name)));
        }

        let mut seen = std::collections::HashSet::new();
        for instrument in &self.instruments {
            if instrument.code.trim().is_empty() {
                return Err(PulseError::ConfigError(format!(
                    "pool '{}' contains an instrument without a code",
                    self.name
                )));
            }
            if !seen.insert(instrument.code.as_str()) {
                return Err(PulseError::ConfigError(format!(
                    "pool '{}' lists {} twice",
                    self.name, instrument.code
                )));
            }
        }
        Ok(())
    }

    /// Number of instruments
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Whether the pool has no instruments
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_pools() {
        let etf = Pool::etf();
        assert_eq!(etf.len(), 15);
        assert!(etf.instruments.iter().all(|i| i.kind == InstrumentKind::Etf));
        assert!(etf.validate().is_ok());

        let stock = Pool::builtin(InstrumentKind::Stock);
        assert_eq!(stock.instruments[0].code, "603298");
        assert!(stock.validate().is_ok());
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let pool = Pool::new(
            "dup",
            vec![Instrument::etf("510300", "a"), Instrument::etf("510300", "b")],
        );
        assert!(matches!(pool.validate(), Err(PulseError::ConfigError(_))));
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("pulse-pool-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"name": "mine", "instruments": [
                {"code": "510300", "name": "沪深300ETF", "kind": "etf"},
                {"code": "AAPL", "name": "Apple", "kind": "stock"}
            ]}"#,
        )
        .unwrap();

        let pool = Pool::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(pool.name, "mine");
        assert_eq!(pool.instruments[1].kind, InstrumentKind::Stock);
    }

    #[test]
    fn test_empty_pool_file_rejected() {
        let path = std::env::temp_dir().join(format!("pulse-empty-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"name": "none", "instruments": []}"#).unwrap();
        let result = Pool::from_json_file(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(result.is_err());
    }
}
