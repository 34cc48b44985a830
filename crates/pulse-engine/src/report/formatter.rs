//! Report rendering

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use std::fmt;
use std::str::FromStr;

use super::assembler::{AnalysisReport, ReportEntry};
use crate::analyzer::{UnavailableReason, Verdict};
use crate::config::Language;
use crate::error::{PulseError, Result};
use crate::signals::SignalBundle;

/// Longest message a Telegram chat accepts
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Output rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Chat-friendly Markdown
    #[default]
    Markdown,
    /// Terminal table
    Plain,
    /// Serialized report
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "plain" | "table" | "text" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(PulseError::ConfigError(format!("unknown output format '{other}'"))),
        }
    }
}

pub trait ReportFormatter: Send + Sync {
    fn format(&self) -> OutputFormat;
    fn render(&self, report: &AnalysisReport) -> Result<String>;
}

struct Labels {
    title: &'static str,
    score: &'static str,
    comment: &'static str,
    trend: &'static str,
    relative_volume: &'static str,
    change: &'static str,
    low_confidence: &'static str,
    data_unavailable: &'static str,
    analysis_unavailable: &'static str,
    not_requested: &'static str,
    name: &'static str,
    anomaly: &'static str,
    empty: &'static str,
}

const ZH: Labels = Labels {
    title: "AI分析报告",
    score: "AI评分",
    comment: "AI点评",
    trend: "趋势",
    relative_volume: "相对成交量",
    change: "涨跌幅",
    low_confidence: "历史数据不足",
    data_unavailable: "数据不可用",
    analysis_unavailable: "分析不可用",
    not_requested: "未分析",
    name: "名称",
    anomaly: "异常",
    empty: "报告为空",
};

const EN: Labels = Labels {
    title: "AI analysis report",
    score: "Score",
    comment: "Comment",
    trend: "Trend",
    relative_volume: "Rel. volume",
    change: "Change",
    low_confidence: "short history",
    data_unavailable: "data unavailable",
    analysis_unavailable: "analysis unavailable",
    not_requested: "not requested",
    name: "Name",
    anomaly: "Anomaly",
    empty: "empty report",
};

fn labels(language: Language) -> &'static Labels {
    match language {
        Language::Chinese => &ZH,
        Language::English => &EN,
    }
}

fn marker(labels: &Labels, verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Unavailable { reason: UnavailableReason::DataUnavailable, .. } => labels.data_unavailable,
        Verdict::Unavailable { reason: UnavailableReason::NotRequested, .. } => labels.not_requested,
        Verdict::Unavailable { .. } => labels.analysis_unavailable,
        Verdict::Scored { .. } => "",
    }
}

fn relative_volume(signals: &SignalBundle) -> String {
    signals
        .relative_volume
        .map_or_else(|| "-".to_string(), |ratio| format!("{ratio:.2}x"))
}

fn signal_line(labels: &Labels, signals: &SignalBundle) -> String {
    let mut line = format!(
        "{}: {} | {}: {}{} | {}: {:+.2}%{}",
        labels.trend,
        signals.trend,
        labels.relative_volume,
        relative_volume(signals),
        if signals.volume_anomaly { " ⚠️" } else { "" },
        labels.change,
        signals.intraday_move_pct,
        if signals.move_anomaly { " ⚠️" } else { "" },
    );
    if signals.low_confidence {
        line.push_str(&format!(" ({})", labels.low_confidence));
    }
    line
}

/// Chat rendering, one block per instrument
pub struct MarkdownFormatter {
    language: Language,
}

impl MarkdownFormatter {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    fn entry(&self, rank: usize, entry: &ReportEntry) -> String {
        let l = labels(self.language);
        let mut out = format!("🏅 #{rank} **{} ({})**\n", entry.instrument.name, entry.instrument.code);

        match &entry.verdict {
            Verdict::Scored { score, commentary, .. } => {
                out.push_str(&format!("  - {}: **{score:.0} / 100**\n", l.score));
                out.push_str(&format!("  - {}: *{commentary}*\n", l.comment));
            }
            verdict => out.push_str(&format!("  - ⚠️ {}\n", marker(l, verdict))),
        }
        if let Some(signals) = &entry.signals {
            out.push_str(&format!("  - {}\n", signal_line(l, signals)));
        }
        out
    }
}

impl ReportFormatter for MarkdownFormatter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Markdown
    }

    fn render(&self, report: &AnalysisReport) -> Result<String> {
        let l = labels(self.language);
        let mut out = format!(
            "📊 **{} {}** ({})\n\n",
            report.pool_name,
            l.title,
            report.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
        if report.is_empty() {
            out.push_str(l.empty);
            return Ok(out);
        }
        for (i, entry) in report.iter().enumerate() {
            out.push_str(&self.entry(i + 1, entry));
            out.push('\n');
        }
        Ok(out.trim_end().to_string())
    }
}

/// Terminal table rendering
pub struct PlainFormatter {
    language: Language,
}

impl PlainFormatter {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl ReportFormatter for PlainFormatter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Plain
    }

    fn render(&self, report: &AnalysisReport) -> Result<String> {
        let l = labels(self.language);
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                "#", l.name, l.score, l.trend, l.relative_volume, l.change, l.anomaly, l.comment,
            ]);

        for (i, entry) in report.iter().enumerate() {
            let (trend, volume, change, anomaly) = match &entry.signals {
                Some(s) => (
                    s.trend.to_string(),
                    relative_volume(s),
                    format!("{:+.2}%", s.intraday_move_pct),
                    match (s.volume_anomaly, s.move_anomaly) {
                        (true, true) => "vol+move",
                        (true, false) => "vol",
                        (false, true) => "move",
                        (false, false) => "",
                    }
                    .to_string(),
                ),
                None => ("-".into(), "-".into(), "-".into(), String::new()),
            };
            let (score, comment) = match &entry.verdict {
                Verdict::Scored { score, commentary, .. } => (format!("{score:.0}"), commentary.clone()),
                verdict => ("-".to_string(), marker(l, verdict).to_string()),
            };

            table.add_row(vec![
                (i + 1).to_string(),
                format!("{} ({})", entry.instrument.name, entry.instrument.code),
                score,
                trend,
                volume,
                change,
                anomaly,
                comment,
            ]);
        }

        Ok(format!("{} {}\n{table}", report.pool_name, l.title))
    }
}

/// Serialized report
pub struct JsonFormatter;

impl ReportFormatter for JsonFormatter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Json
    }

    fn render(&self, report: &AnalysisReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

/// Formatter for an output format
pub fn formatter_for(format: OutputFormat, language: Language) -> Box<dyn ReportFormatter> {
    match format {
        OutputFormat::Markdown => Box::new(MarkdownFormatter::new(language)),
        OutputFormat::Plain => Box::new(PlainFormatter::new(language)),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Split text into chunks of at most `limit` characters
///
/// Breaks on line boundaries where possible; a single line longer than the
/// limit is cut at character boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        for piece in chars.chunks(limit) {
            if current_len + piece.len() > limit {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.extend(piece);
            current_len += piece.len();
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::FormatMode;
    use crate::model::Instrument;
    use crate::testing::sample_signals;
    use chrono::Utc;

    fn report() -> AnalysisReport {
        let (instrument, signals) = sample_signals();
        AnalysisReport {
            pool_name: "ETF".to_string(),
            generated_at: Utc::now(),
            analyzed: true,
            entries: vec![
                ReportEntry {
                    instrument,
                    quote: None,
                    signals: Some(signals),
                    verdict: Verdict::Scored {
                        score: 72.0,
                        commentary: "放量上涨".into(),
                        format: FormatMode::JsonSchema,
                    },
                    data_error: None,
                },
                ReportEntry {
                    instrument: Instrument::etf("159919", "创业板50ETF"),
                    quote: None,
                    signals: None,
                    verdict: Verdict::unavailable(UnavailableReason::DataUnavailable, "timeout"),
                    data_error: Some("timeout".into()),
                },
            ],
        }
    }

    #[test]
    fn test_markdown_marks_degraded_entries() {
        let text = MarkdownFormatter::new(Language::Chinese).render(&report()).unwrap();
        assert!(text.contains("🏅 #1 **沪深300ETF (510300)**"));
        assert!(text.contains("**72 / 100**"));
        assert!(text.contains("🏅 #2 **创业板50ETF (159919)**"));
        assert!(text.contains("数据不可用"));

        let text = MarkdownFormatter::new(Language::English).render(&report()).unwrap();
        assert!(text.contains("data unavailable"));
        assert!(text.contains("Rel. volume: 3.00x ⚠️"));
    }

    #[test]
    fn test_plain_and_json() {
        let table = PlainFormatter::new(Language::English).render(&report()).unwrap();
        assert!(table.contains("510300"));
        assert!(table.contains("data unavailable"));

        let json = formatter_for(OutputFormat::Json, Language::English).render(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["entries"][0]["verdict"]["score"], 72.0);
        assert_eq!(value["entries"][1]["verdict"]["status"], "unavailable");
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("TABLE".parse::<OutputFormat>().unwrap(), OutputFormat::Plain);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_split_message_on_lines() {
        let text = "aaaa\nbbbb\ncccc\n";
        let chunks = split_message(text, 10);
        assert_eq!(chunks, ["aaaa\nbbbb\n", "cccc\n"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_message_long_line() {
        let text = "中".repeat(10);
        let chunks = split_message(&text, 4);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
        assert_eq!(chunks.concat(), text);

        assert_eq!(split_message("short", TELEGRAM_MESSAGE_LIMIT), ["short"]);
        assert!(split_message("", TELEGRAM_MESSAGE_LIMIT).is_empty());
    }
}
