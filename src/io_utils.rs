//! Delimiter and encoding resolution shared by the loader and the exporter.
//!
//! - **Delimiters**: explicit override, then `.tsv` → tab, then a header
//!   sniff (`;` wins over `,` when it is more frequent on the first line).
//! - **Encodings**: `encoding_rs` labels, defaulting to UTF-8.
//! - **Locations**: `-` means stdin; `http://` and `https://` are remote.

use std::path::Path;

use anyhow::{Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
pub const DEFAULT_EXPORT_DELIMITER: u8 = b';';

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn is_dash(location: &str) -> bool {
    location.trim() == "-"
}

pub fn is_remote(location: &str) -> bool {
    let lower = location.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Lower-cased extension of a path or URL, ignoring any query string.
pub fn extension_of(location: &str) -> Option<String> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(location: &str, provided: Option<u8>, header_line: &str) -> u8 {
    if let Some(delim) = provided {
        return delim;
    }
    if extension_of(location).as_deref() == Some("tsv") {
        return DEFAULT_TSV_DELIMITER;
    }
    let semicolons = header_line.matches(';').count();
    let commas = header_line.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        DEFAULT_CSV_DELIMITER
    }
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>) -> u8 {
    if let Some(delim) = provided {
        return delim;
    }
    match path
        .and_then(|p| p.extension())
        .and_then(|ext| ext.to_str())
    {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_EXPORT_DELIMITER,
    }
}

/// First line of a decoded buffer, without a leading BOM.
pub fn first_line(text: &str) -> &str {
    text.trim_start_matches('\u{feff}')
        .lines()
        .next()
        .unwrap_or_default()
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "tab".to_string(),
        other => (other as char).to_string(),
    }
}
