//! Eastmoney quote and k-line client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use super::source::{MarketDataSource, RawRecord};
use crate::error::{PulseError, Result};

const QUOTE_URL: &str = "https://push2.eastmoney.com/api/qt/ulist.np/get";
const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Quote field ids and the column names Eastmoney's web tables use for them
const QUOTE_FIELDS: [(&str, &str); 8] = [
    ("f12", "代码"),
    ("f14", "名称"),
    ("f2", "最新价"),
    ("f5", "成交量"),
    ("f15", "最高"),
    ("f16", "最低"),
    ("f17", "今开"),
    ("f18", "昨收"),
];

/// Column order of the comma-separated k-line rows (`fields2=f51..f61`)
const KLINE_COLUMNS: [&str; 11] = [
    "日期", "开盘", "收盘", "最高", "最低", "成交量", "成交额", "振幅", "涨跌幅", "涨跌额", "换手率",
];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    rc: i64,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    diff: Value,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

/// Eastmoney market data source for A-share codes
#[derive(Debug, Clone)]
pub struct EastmoneySource {
    client: Client,
}

impl EastmoneySource {
    /// Create a new client
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    /// Eastmoney market-prefixed id: CSI indices (93xxxx) get `2.`, Shanghai
    /// codes (5xx/6xx/9xx) `1.` and everything else `0.`; codes that already
    /// carry a prefix pass through
    pub fn secid(code: &str) -> String {
        if code.contains('.') {
            return code.to_string();
        }
        if code.len() == 6 && code.starts_with("93") {
            return format!("2.{code}");
        }
        match code.chars().next() {
            Some('5' | '6' | '9') => format!("1.{code}"),
            _ => format!("0.{code}"),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Envelope<T>> {
        let response = self.client.get(url).query(params).send().await?;

        if !response.status().is_success() {
            return Err(PulseError::SourceError(format!(
                "Eastmoney HTTP error: {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

/// Turn the `diff` member (array or index-keyed object) into the first row
fn first_diff_row(diff: Value) -> Option<serde_json::Map<String, Value>> {
    let row = match diff {
        Value::Array(rows) => rows.into_iter().next()?,
        Value::Object(map) => map.into_iter().next()?.1,
        _ => return None,
    };
    match row {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn quote_record(row: &serde_json::Map<String, Value>) -> RawRecord {
    QUOTE_FIELDS
        .iter()
        .filter_map(|(id, column)| row.get(*id).map(|v| ((*column).to_string(), v.clone())))
        .collect()
}

fn kline_record(line: &str) -> RawRecord {
    line.split(',')
        .zip(KLINE_COLUMNS)
        .map(|(value, column)| (column.to_string(), Value::String(value.to_string())))
        .collect()
}

#[async_trait]
impl MarketDataSource for EastmoneySource {
    fn name(&self) -> &'static str {
        "eastmoney"
    }

    #[instrument(skip(self))]
    async fn fetch_quote(&self, code: &str) -> Result<RawRecord> {
        let fields = QUOTE_FIELDS.iter().map(|(id, _)| *id).collect::<Vec<_>>().join(",");
        let params = [
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("secids", Self::secid(code)),
            ("fields", fields),
        ];

        let envelope: Envelope<QuoteData> = self.get_json(QUOTE_URL, &params).await?;
        if envelope.rc != 0 {
            return Err(PulseError::SourceError(format!("Eastmoney rc={}", envelope.rc)));
        }
        let data = envelope
            .data
            .ok_or_else(|| PulseError::InvalidSymbol(code.to_string()))?;
        let row = first_diff_row(data.diff).ok_or_else(|| PulseError::MalformedPayload {
            symbol: code.to_string(),
            reason: "quote list is empty".to_string(),
        })?;

        Ok(quote_record(&row))
    }

    #[instrument(skip(self))]
    async fn fetch_history(&self, code: &str, lookback_days: usize) -> Result<Vec<RawRecord>> {
        let params = [
            ("secid", Self::secid(code)),
            ("fields1", "f1,f2,f3,f4,f5,f6".to_string()),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61".to_string()),
            ("klt", "101".to_string()),
            ("fqt", "1".to_string()),
            ("end", "20500101".to_string()),
            ("lmt", lookback_days.to_string()),
        ];

        let envelope: Envelope<KlineData> = self.get_json(KLINE_URL, &params).await?;
        let data = envelope
            .data
            .ok_or_else(|| PulseError::InvalidSymbol(code.to_string()))?;

        Ok(data.klines.iter().map(|line| kline_record(line)).collect())
    }
}
