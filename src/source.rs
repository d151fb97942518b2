//! Loading raw tables from files, stdin or remote URLs.
//!
//! A source is fetched into memory first so the same bytes can be
//! fingerprinted for the report cache and then parsed as either a
//! spreadsheet workbook or delimited text.

use std::{
    fs,
    io::{Cursor, Read},
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use clap::ValueEnum;
use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    cache::Fingerprint,
    data::{RawCell, RawTable},
    io_utils,
};

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0";
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum SourceFormat {
    Csv,
    Workbook,
}

#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub format: Option<SourceFormat>,
    pub sheet: Option<String>,
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            format: None,
            sheet: None,
            delimiter: None,
            encoding: encoding_rs::UTF_8,
        }
    }
}

/// Bytes of one source plus the location they came from.
#[derive(Debug, Clone)]
pub struct SourceData {
    pub label: String,
    pub bytes: Vec<u8>,
}

impl SourceData {
    pub fn new(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            bytes,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.bytes)
    }
}

pub fn fetch(location: &str) -> Result<SourceData> {
    let bytes = if io_utils::is_dash(location) {
        let mut buffer = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut buffer)
            .context("Reading source from stdin")?;
        buffer
    } else if io_utils::is_remote(location) {
        fetch_remote(location)?
    } else {
        fs::read(location).with_context(|| format!("Opening input file {location:?}"))?
    };
    debug!("Fetched {} byte(s) from {location}", bytes.len());
    Ok(SourceData::new(location, bytes))
}

fn fetch_remote(url: &str) -> Result<Vec<u8>> {
    info!("Downloading {url}");
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .context("Building HTTP client")?;
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("Requesting {url}"))?
        .error_for_status()
        .with_context(|| format!("Downloading {url}"))?;
    let bytes = response
        .bytes()
        .with_context(|| format!("Reading response body from {url}"))?;
    Ok(bytes.to_vec())
}

/// Explicit format first, then extension, then magic bytes; text otherwise.
pub fn sniff_format(label: &str, bytes: &[u8], explicit: Option<SourceFormat>) -> SourceFormat {
    if let Some(format) = explicit {
        return format;
    }
    if let Some(ext) = io_utils::extension_of(label) {
        if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
            return SourceFormat::Workbook;
        }
        if ext == "csv" || ext == "tsv" || ext == "txt" {
            return SourceFormat::Csv;
        }
    }
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        SourceFormat::Workbook
    } else {
        SourceFormat::Csv
    }
}

pub fn read_csv(source: &SourceData, options: &SourceOptions) -> Result<RawTable> {
    let mut text = String::new();
    DecodeReaderBytesBuilder::new()
        .encoding(Some(options.encoding))
        .bom_sniffing(true)
        .strip_bom(true)
        .build(source.bytes.as_slice())
        .read_to_string(&mut text)
        .with_context(|| format!("Decoding {} as {}", source.label, options.encoding.name()))?;

    let delimiter = io_utils::resolve_input_delimiter(
        &source.label,
        options.delimiter,
        io_utils::first_line(&text),
    );
    debug!(
        "Reading {} as delimited text with delimiter '{}'",
        source.label,
        io_utils::printable_delimiter(delimiter)
    );

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .with_context(|| format!("Reading headers from {}", source.label))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();
    if headers.iter().all(String::is_empty) {
        bail!("{} has no header row", source.label);
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Reading row {} of {}", idx + 2, source.label))?;
        rows.push(record.iter().map(RawCell::text).collect());
    }
    Ok(RawTable::new(headers, rows))
}

fn cell_from(data: &Data) -> RawCell {
    match data {
        Data::Empty => RawCell::Empty,
        Data::String(s) => RawCell::text(s.as_str()),
        Data::Float(f) => RawCell::Number(*f),
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) => RawCell::DateTime(value),
            None => RawCell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => RawCell::text(s.as_str()),
        other => RawCell::text(other.to_string()),
    }
}

pub fn read_workbook(source: &SourceData, options: &SourceOptions) -> Result<RawTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(source.bytes.clone()))
        .with_context(|| format!("Opening workbook {}", source.label))?;
    let sheet = match &options.sheet {
        Some(name) => name.clone(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("Workbook {} has no sheets", source.label))?,
    };
    debug!("Reading sheet '{sheet}' from {}", source.label);
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("Reading sheet '{sheet}' from {}", source.label))?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or_else(|| anyhow!("Sheet '{sheet}' in {} is empty", source.label))?
        .iter()
        .map(|cell| cell_from(cell).as_display())
        .collect::<Vec<_>>();
    let body = rows
        .map(|row| row.iter().map(cell_from).collect())
        .collect();
    Ok(RawTable::new(headers, body))
}

/// Parses fetched bytes according to the sniffed format.
pub fn parse(source: &SourceData, options: &SourceOptions) -> Result<RawTable> {
    let table = match sniff_format(&source.label, &source.bytes, options.format) {
        SourceFormat::Workbook => read_workbook(source, options)?,
        SourceFormat::Csv => read_csv(source, options)?,
    };
    info!(
        "Loaded {} row(s) and {} column(s) from {}",
        table.row_count(),
        table.headers.len(),
        source.label
    );
    Ok(table)
}

/// Fetches and parses in one step, returning the bytes for fingerprinting.
pub fn load_raw_table(location: &str, options: &SourceOptions) -> Result<(SourceData, RawTable)> {
    let source = fetch(location)?;
    let table = parse(&source, options)?;
    Ok((source, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_prefers_explicit_then_extension_then_magic() {
        assert_eq!(
            sniff_format("data.csv", ZIP_MAGIC, Some(SourceFormat::Workbook)),
            SourceFormat::Workbook
        );
        assert_eq!(sniff_format("data.xlsx", b"", None), SourceFormat::Workbook);
        assert_eq!(sniff_format("data.csv", ZIP_MAGIC, None), SourceFormat::Csv);
        assert_eq!(sniff_format("-", b"PK\x03\x04rest", None), SourceFormat::Workbook);
        assert_eq!(sniff_format("-", b"A;B\n", None), SourceFormat::Csv);
    }

    #[test]
    fn csv_sniffs_semicolons_and_strips_bom() {
        let source = SourceData::new("ventas.csv", "\u{feff}Cliente;Monto\nAcme;10,5\n;\n".into());
        let table = read_csv(&source, &SourceOptions::default()).expect("read csv");
        assert_eq!(table.headers, vec!["Cliente", "Monto"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], RawCell::Text("10,5".into()));
        assert_eq!(table.rows[1][0], RawCell::Empty);
    }

    #[test]
    fn csv_pads_ragged_rows() {
        let source = SourceData::new("x.csv", b"A,B,C\n1,2\n".to_vec());
        let table = read_csv(&source, &SourceOptions::default()).expect("read csv");
        assert_eq!(table.rows[0].len(), 3);
        assert_eq!(table.rows[0][2], RawCell::Empty);
    }

    #[test]
    fn csv_decodes_legacy_encodings() {
        let (bytes, _, _) =
            encoding_rs::WINDOWS_1252.encode("Cliente,Descripción\nAcme,Cañón\n");
        let source = SourceData::new("x.csv", bytes.into_owned());
        let options = SourceOptions {
            encoding: encoding_rs::WINDOWS_1252,
            ..SourceOptions::default()
        };
        let table = read_csv(&source, &options).expect("read csv");
        assert_eq!(table.headers[1], "Descripción");
        assert_eq!(table.rows[0][1], RawCell::Text("Cañón".into()));
    }

    #[test]
    fn corrupt_workbook_is_an_error() {
        let source = SourceData::new("broken.xlsx", b"PK\x03\x04 not really a zip".to_vec());
        assert!(parse(&source, &SourceOptions::default()).is_err());
    }

    #[test]
    fn missing_file_reports_location() {
        let err = fetch("/definitely/not/here.csv").expect_err("missing file");
        assert!(format!("{err:#}").contains("here.csv"));
    }
}
