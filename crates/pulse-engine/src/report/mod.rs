//! Report assembly and rendering

pub mod assembler;
pub mod formatter;

pub use assembler::{AnalysisReport, ReportAssembler, ReportEntry, rank_entries};
pub use formatter::{
    JsonFormatter, MarkdownFormatter, OutputFormat, PlainFormatter, ReportFormatter,
    TELEGRAM_MESSAGE_LIMIT, formatter_for, split_message,
};
