use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    aggregate::GroupBy, data::parse_day_first_date, filter::SearchBy, normalize::SalesField,
    reconcile::ItemKey, source::SourceFormat,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Filter, group and compare sales exports against targets",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Filter a sales export by product or client, optionally grouped, and export the result
    Report(ReportArgs),
    /// Compare actual sales against per-seller item targets
    Targets(TargetsArgs),
    /// Show how a source's columns map onto the canonical schema
    Inspect(InspectArgs),
}

/// How to read one source.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Force the input format instead of sniffing it from the extension and content
    #[arg(long, value_enum)]
    pub format: Option<SourceFormat>,
    /// Worksheet to read from a workbook (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,
    /// Input delimiter for text sources (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of text sources (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// YAML file with extra column aliases and required-column overrides
    #[arg(long)]
    pub aliases: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output delimiter for exported files (defaults to ';')
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding for exported files (defaults to utf-8 with BOM)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Print the result as JSON instead of tables
    #[arg(long)]
    pub json: bool,
    /// Name of the person running the report, recorded in the log
    #[arg(long)]
    pub operator: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Sales source: file path, '-' for stdin, or an http(s) URL
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// Which field --value selects on
    #[arg(long = "search-by", value_enum, default_value_t = SearchBy::ProductCode)]
    pub search_by: SearchBy,
    /// Product code, description or client to report on
    #[arg(long)]
    pub value: String,
    /// First day of the range, inclusive (dd/mm/yyyy or yyyy-mm-dd; defaults to the earliest sale)
    #[arg(long, value_parser = parse_cli_date)]
    pub from: Option<NaiveDate>,
    /// Last day of the range, inclusive (defaults to the latest sale)
    #[arg(long, value_parser = parse_cli_date)]
    pub to: Option<NaiveDate>,
    /// Restrict to one or more sellers (repeat the flag for each)
    #[arg(long = "seller")]
    pub sellers: Vec<String>,
    /// Group the filtered rows
    #[arg(long = "group-by", value_enum, default_value_t = GroupBy::None)]
    pub group_by: GroupBy,
    /// Export the detail rows to this file
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Export the grouped rows to this file
    #[arg(long = "grouped-output")]
    pub grouped_output: Option<PathBuf>,
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub out: OutputArgs,
}

#[derive(Debug, Args)]
pub struct TargetsArgs {
    /// Sales source: file path, '-' for stdin, or an http(s) URL
    #[arg(long)]
    pub sales: String,
    /// Targets source: file path or an http(s) URL
    #[arg(long)]
    pub targets: String,
    /// Sales field matched against the target's item name
    #[arg(long = "item-key", value_enum, default_value_t = ItemKey::Description)]
    pub item_key: ItemKey,
    /// Restrict the comparison to one or more sellers (repeat the flag for each)
    #[arg(long = "seller")]
    pub sellers: Vec<String>,
    /// Only count sales on or after this day
    #[arg(long, value_parser = parse_cli_date)]
    pub from: Option<NaiveDate>,
    /// Only count sales on or before this day
    #[arg(long, value_parser = parse_cli_date)]
    pub to: Option<NaiveDate>,
    /// Day the progress summary is computed for (defaults to the current date)
    #[arg(long, value_parser = parse_cli_date)]
    pub today: Option<NaiveDate>,
    /// Last selling day of the period (defaults to the end of today's month)
    #[arg(long = "period-end", value_parser = parse_cli_date)]
    pub period_end: Option<NaiveDate>,
    /// Export the comparison to this file
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub out: OutputArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum SourceKind {
    Sales,
    Targets,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Source to inspect: file path, '-' for stdin, or an http(s) URL
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// Which canonical schema to resolve against
    #[arg(long, value_enum, default_value_t = SourceKind::Sales)]
    pub kind: SourceKind,
    /// List the sorted distinct values of one sales field instead
    #[arg(long, value_enum)]
    pub distinct: Option<SalesField>,
    /// Print the resolution as JSON
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub source: SourceArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_cli_date(value: &str) -> Result<NaiveDate, String> {
    parse_day_first_date(value)
        .ok_or_else(|| format!("'{value}' is not a date (expected dd/mm/yyyy or yyyy-mm-dd)"))
}
