//! Projection, relabelling and delimited serialization of result tables.
//!
//! Every result (filtered detail rows, groups, target comparisons) is turned
//! into a plain [`Table`] of strings first. Exports default to `;` separated
//! UTF-8 with a byte-order mark so spreadsheet tools keep accented text
//! intact; other encodings are written without a BOM.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use serde::Serialize;

use crate::{
    aggregate::{SummaryRow, Totals},
    data::{format_day_first, format_fixed, format_number, format_optional_number},
    io_utils::{self, DEFAULT_EXPORT_DELIMITER, UTF8_BOM},
    normalize::{CanonicalField, SalesField},
    reconcile::{ComparisonRow, ProgressSummary},
    sales::SalesTable,
};

pub const DETAIL_COLUMNS: &[&str] = &[
    "VENDEDOR",
    "FECHA",
    "DOCUMENTO",
    "DESCRIPCION",
    "CANTIDAD",
    "MONTO",
];

pub const DETAIL_LABELS: &[(&str, &str)] = &[
    ("VENDEDOR", "Vendedor"),
    ("FECHA", "Fecha"),
    ("DOCUMENTO", "Documento"),
    ("DESCRIPCION", "Descripcion"),
    ("CANTIDAD", "Cantidad"),
    ("MONTO", "Monto"),
];

pub const SUMMARY_HEADERS: &[&str] = &["Grupo", "Cantidad", "Monto", "Transacciones"];

pub const COMPARISON_HEADERS: &[&str] = &[
    "Vendedor",
    "Categoria",
    "Subcategoria",
    "Articulo",
    "Meta_Cantidad",
    "Cantidad_Real",
    "Brecha_Cantidad",
    "Pct_Cantidad",
    "Meta_Monto",
    "Monto_Real",
    "Brecha_Monto",
    "Pct_Monto",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(
        headers: impl IntoIterator<Item = S>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, or `None` when the column is absent.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or_default())
                .collect(),
        )
    }
}

/// Keeps whitelisted columns in whitelist order; names not in `table` are skipped.
pub fn project(table: &Table, whitelist: &[&str]) -> Table {
    let picks = whitelist
        .iter()
        .filter_map(|name| table.column_index(name).map(|idx| (*name, idx)))
        .collect::<Vec<_>>();
    Table {
        headers: picks.iter().map(|(name, _)| name.to_string()).collect(),
        rows: table
            .rows
            .iter()
            .map(|row| {
                picks
                    .iter()
                    .map(|(_, idx)| row.get(*idx).cloned().unwrap_or_default())
                    .collect()
            })
            .collect(),
    }
}

pub fn rename(table: &Table, renames: &[(&str, &str)]) -> Table {
    let headers = table
        .headers
        .iter()
        .map(|header| {
            renames
                .iter()
                .find(|(from, _)| from == header)
                .map(|(_, to)| to.to_string())
                .unwrap_or_else(|| header.clone())
        })
        .collect();
    Table {
        headers,
        rows: table.rows.clone(),
    }
}

/// All canonical sales columns, values rendered for export.
pub fn sales_table(sales: &SalesTable) -> Table {
    let headers = SalesField::all().iter().map(|f| f.canonical_name());
    let rows = sales
        .iter()
        .map(|r| {
            vec![
                r.client.clone(),
                r.product_code.clone(),
                r.description.clone(),
                r.document_id.clone(),
                r.date.map(format_day_first).unwrap_or_default(),
                format_optional_number(r.quantity),
                r.seller.clone(),
                r.month.clone(),
                r.year.clone(),
                format_optional_number(r.amount),
            ]
        })
        .collect();
    Table::new(headers, rows)
}

pub fn detail_export(sales: &SalesTable) -> Table {
    rename(&project(&sales_table(sales), DETAIL_COLUMNS), DETAIL_LABELS)
}

pub fn summary_table(rows: &[SummaryRow]) -> Table {
    Table::new(
        SUMMARY_HEADERS.iter().copied(),
        rows.iter()
            .map(|row| {
                vec![
                    row.group_key.clone(),
                    format_number(row.total_quantity),
                    format_number(row.total_amount),
                    row.distinct_document_count.to_string(),
                ]
            })
            .collect(),
    )
}

pub fn comparison_table(rows: &[ComparisonRow]) -> Table {
    Table::new(
        COMPARISON_HEADERS.iter().copied(),
        rows.iter()
            .map(|row| {
                vec![
                    row.seller.clone(),
                    row.category.clone(),
                    row.subcategory.clone(),
                    row.item_name.clone(),
                    format_number(row.target_quantity),
                    format_number(row.actual_quantity),
                    format_number(row.quantity_gap),
                    format_fixed(row.quantity_pct),
                    format_number(row.target_amount),
                    format_number(row.actual_amount),
                    format_number(row.amount_gap),
                    format_fixed(row.amount_pct),
                ]
            })
            .collect(),
    )
}

/// Two-column metric/value view of the totals panel.
pub fn totals_table(totals: &Totals) -> Table {
    Table::new(
        ["Metric", "Value"],
        vec![
            vec!["Total quantity".into(), format_number(totals.total_quantity)],
            vec!["Total amount".into(), format_fixed(totals.total_amount)],
            vec!["Transactions".into(), totals.transactions.to_string()],
            vec!["Average price".into(), format_fixed(totals.average_price)],
            vec!["Null quantities".into(), totals.null_quantities.to_string()],
            vec!["Null amounts".into(), totals.null_amounts.to_string()],
        ],
    )
}

pub fn progress_table(summary: &ProgressSummary) -> Table {
    Table::new(
        ["Metric", "Value"],
        vec![
            vec!["Target amount".into(), format_fixed(summary.target_amount)],
            vec!["Actual amount".into(), format_fixed(summary.actual_amount)],
            vec!["Amount progress %".into(), format_fixed(summary.amount_pct)],
            vec!["Target quantity".into(), format_number(summary.target_quantity)],
            vec!["Actual quantity".into(), format_number(summary.actual_quantity)],
            vec!["Quantity progress %".into(), format_fixed(summary.quantity_pct)],
            vec!["Remaining amount".into(), format_fixed(summary.remaining_amount)],
            vec!["Remaining days".into(), summary.remaining_days.to_string()],
            vec!["Needed per day".into(), summary.velocity_needed.to_string()],
        ],
    )
}

#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_EXPORT_DELIMITER,
            encoding: UTF_8,
        }
    }
}

pub fn to_delimited_bytes(table: &Table, options: ExportOptions) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .from_writer(Vec::new());
    writer
        .write_record(&table.headers)
        .context("Writing export headers")?;
    for row in &table.rows {
        writer.write_record(row).context("Writing export row")?;
    }
    let utf8 = writer
        .into_inner()
        .map_err(|err| anyhow!("Finishing export buffer: {}", err.error()))?;

    if options.encoding == UTF_8 {
        let mut bytes = Vec::with_capacity(UTF8_BOM.len() + utf8.len());
        bytes.extend_from_slice(UTF8_BOM);
        bytes.extend_from_slice(&utf8);
        return Ok(bytes);
    }
    let text = String::from_utf8(utf8).context("Export buffer is not valid UTF-8")?;
    let (encoded, _, had_errors) = options.encoding.encode(&text);
    if had_errors {
        return Err(anyhow!(
            "Export contains characters that cannot be encoded as {}",
            options.encoding.name()
        ));
    }
    Ok(encoded.into_owned())
}

/// Writes `table` to `path`, or to stdout when the path is `-`.
pub fn write_delimited(table: &Table, path: &Path, options: ExportOptions) -> Result<()> {
    let bytes = to_delimited_bytes(table, options)?;
    let mut out: Box<dyn Write> = if path.to_str().is_some_and(io_utils::is_dash) {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
        ))
    };
    out.write_all(&bytes)
        .with_context(|| format!("Writing export to {path:?}"))?;
    out.flush().with_context(|| format!("Flushing export to {path:?}"))?;
    Ok(())
}
