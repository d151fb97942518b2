//! Schema normalization: raw headers and cells into canonical records.
//!
//! Headers are canonicalized (see [`canonical_header`]) and matched against a
//! ranked [`AliasTable`]. Only fields listed as *required* cause a hard
//! failure ([`NormalizationError::MissingRequiredColumns`]); any other absent
//! field degrades to a fill value and is reported as a
//! [`NormalizationWarning`]. Cell coercion never drops rows: unreadable
//! numbers and dates become `None` and are counted once per field.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    aliases::{AliasTable, canonical_header},
    data::{Coerced, RawCell, RawTable, coerce_date, coerce_number},
    reconcile::TargetRecord,
    sales::{SalesRecord, SalesTable},
};

pub const NO_CODE: &str = "NO CODE";
pub const UNSPECIFIED: &str = "UNSPECIFIED";

/// A field of one of the canonical schemas.
pub trait CanonicalField: Copy + Ord + fmt::Debug + 'static {
    fn canonical_name(self) -> &'static str;
    fn all() -> &'static [Self];

    fn from_canonical(name: &str) -> Option<Self> {
        let wanted = canonical_header(name);
        Self::all()
            .iter()
            .copied()
            .find(|field| field.canonical_name() == wanted)
    }

    /// Parses a list of canonical names, rejecting unknown ones.
    fn parse_set(names: &[String]) -> Result<BTreeSet<Self>> {
        names
            .iter()
            .map(|name| {
                Self::from_canonical(name).ok_or_else(|| {
                    anyhow!(
                        "Unknown column '{name}'; expected one of: {}",
                        Self::all().iter().map(|f| f.canonical_name()).join(", ")
                    )
                })
            })
            .collect()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[value(rename_all = "kebab-case")]
pub enum SalesField {
    Client,
    ProductCode,
    Description,
    DocumentId,
    Date,
    Quantity,
    Seller,
    Month,
    Year,
    Amount,
}

impl CanonicalField for SalesField {
    fn canonical_name(self) -> &'static str {
        match self {
            SalesField::Client => "CLIENTE",
            SalesField::ProductCode => "COD_PROD",
            SalesField::Description => "DESCRIPCION",
            SalesField::DocumentId => "DOCUMENTO",
            SalesField::Date => "FECHA",
            SalesField::Quantity => "CANTIDAD",
            SalesField::Seller => "VENDEDOR",
            SalesField::Month => "MES",
            SalesField::Year => "YEAR",
            SalesField::Amount => "MONTO",
        }
    }

    fn all() -> &'static [Self] {
        &[
            SalesField::Client,
            SalesField::ProductCode,
            SalesField::Description,
            SalesField::DocumentId,
            SalesField::Date,
            SalesField::Quantity,
            SalesField::Seller,
            SalesField::Month,
            SalesField::Year,
            SalesField::Amount,
        ]
    }
}

impl SalesField {
    pub fn default_required() -> BTreeSet<SalesField> {
        BTreeSet::from([
            SalesField::Client,
            SalesField::Description,
            SalesField::DocumentId,
            SalesField::Date,
            SalesField::Quantity,
            SalesField::Amount,
        ])
    }

    /// Required set from an alias file override, or the default set.
    pub fn required_from(aliases: &AliasTable) -> Result<BTreeSet<SalesField>> {
        match &aliases.required.sales {
            Some(names) => Self::parse_set(names),
            None => Ok(Self::default_required()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetField {
    Seller,
    Category,
    Subcategory,
    ItemName,
    TargetQuantity,
    TargetAmount,
}

impl CanonicalField for TargetField {
    fn canonical_name(self) -> &'static str {
        match self {
            TargetField::Seller => "VENDEDOR",
            TargetField::Category => "CATEGORIA",
            TargetField::Subcategory => "SUBCATEGORIA",
            TargetField::ItemName => "ARTICULO",
            TargetField::TargetQuantity => "META_CANTIDAD",
            TargetField::TargetAmount => "META_MONTO",
        }
    }

    fn all() -> &'static [Self] {
        &[
            TargetField::Seller,
            TargetField::Category,
            TargetField::Subcategory,
            TargetField::ItemName,
            TargetField::TargetQuantity,
            TargetField::TargetAmount,
        ]
    }
}

impl TargetField {
    pub fn default_required() -> BTreeSet<TargetField> {
        BTreeSet::from([
            TargetField::Seller,
            TargetField::ItemName,
            TargetField::TargetAmount,
        ])
    }

    pub fn required_from(aliases: &AliasTable) -> Result<BTreeSet<TargetField>> {
        match &aliases.required.targets {
            Some(names) => Self::parse_set(names),
            None => Ok(Self::default_required()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error(
        "Missing required column(s): {}. Columns found: [{}]. Columns expected: [{}]",
        .missing.join(", "),
        .found.join(", "),
        .expected.join(", ")
    )]
    MissingRequiredColumns {
        found: Vec<String>,
        expected: Vec<String>,
        missing: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationWarning {
    /// A field was read from a fallback header instead of its canonical name.
    AliasUsed { field: &'static str, header: String },
    /// A field had no column at all and was filled with a fixed value.
    FieldDefaulted { field: &'static str, fill: String },
    /// A field had no column and was computed from another field.
    FieldDerived {
        field: &'static str,
        from: &'static str,
    },
    /// At least one row has no usable date.
    NullDates { rows: usize },
    /// Non-empty cells of a numeric field could not be read as numbers.
    InvalidNumbers { field: &'static str, rows: usize },
}

impl fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationWarning::AliasUsed { field, header } => {
                write!(f, "column {field} read from alias '{header}'")
            }
            NormalizationWarning::FieldDefaulted { field, fill } if fill.is_empty() => {
                write!(f, "column {field} not found; left blank")
            }
            NormalizationWarning::FieldDefaulted { field, fill } => {
                write!(f, "column {field} not found; filled with '{fill}'")
            }
            NormalizationWarning::FieldDerived { field, from } => {
                write!(f, "column {field} not found; derived from {from}")
            }
            NormalizationWarning::NullDates { rows } => {
                write!(f, "{rows} row(s) have dates that could not be interpreted (marked null)")
            }
            NormalizationWarning::InvalidNumbers { field, rows } => {
                write!(f, "{rows} value(s) in {field} are not numeric (marked null)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ColumnSource {
    Canonical { header: String },
    Alias { header: String },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub field: &'static str,
    #[serde(flatten)]
    pub source: ColumnSource,
    #[serde(skip)]
    index: Option<usize>,
}

impl ResolvedColumn {
    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

/// A normalized value together with how its columns were found and what degraded.
#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub value: T,
    pub columns: Vec<ResolvedColumn>,
    pub warnings: Vec<NormalizationWarning>,
}

impl<T> Normalized<T> {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn log_warnings(&self, label: &str) {
        for warning in &self.warnings {
            warn!("{label}: {warning}");
        }
    }
}

/// Matches every field of `F` against `headers`, canonical name first, then aliases.
pub fn resolve_columns<F: CanonicalField>(
    headers: &[String],
    aliases: &AliasTable,
    required: &BTreeSet<F>,
) -> Result<Vec<ResolvedColumn>, NormalizationError> {
    let canonical = headers
        .iter()
        .map(|h| canonical_header(h))
        .collect::<Vec<_>>();

    let mut resolved = Vec::with_capacity(F::all().len());
    let mut missing = Vec::new();
    for &field in F::all() {
        let name = field.canonical_name();
        let hit = aliases
            .candidates(name)
            .into_iter()
            .enumerate()
            .find_map(|(rank, candidate)| {
                canonical
                    .iter()
                    .position(|header| *header == candidate)
                    .map(|idx| (rank, idx))
            });
        let (source, index) = match hit {
            Some((0, idx)) => (
                ColumnSource::Canonical {
                    header: headers[idx].clone(),
                },
                Some(idx),
            ),
            Some((_, idx)) => (
                ColumnSource::Alias {
                    header: headers[idx].clone(),
                },
                Some(idx),
            ),
            None => {
                if required.contains(&field) {
                    missing.push(name.to_string());
                }
                (ColumnSource::Missing, None)
            }
        };
        resolved.push(ResolvedColumn {
            field: name,
            source,
            index,
        });
    }

    if !missing.is_empty() {
        return Err(NormalizationError::MissingRequiredColumns {
            found: headers.to_vec(),
            expected: required
                .iter()
                .map(|f| f.canonical_name().to_string())
                .collect(),
            missing,
        });
    }
    Ok(resolved)
}

struct FieldLookup<F> {
    indices: HashMap<&'static str, usize>,
    _field: std::marker::PhantomData<F>,
}

impl<F: CanonicalField> FieldLookup<F> {
    fn new(columns: &[ResolvedColumn]) -> Self {
        Self {
            indices: columns
                .iter()
                .filter_map(|c| c.index.map(|idx| (c.field, idx)))
                .collect(),
            _field: std::marker::PhantomData,
        }
    }

    fn index(&self, field: F) -> Option<usize> {
        self.indices.get(field.canonical_name()).copied()
    }

    fn has(&self, field: F) -> bool {
        self.index(field).is_some()
    }

    fn cell<'a>(&self, row: &'a [RawCell], field: F) -> Option<&'a RawCell> {
        self.index(field).and_then(|idx| row.get(idx))
    }

    fn text(&self, row: &[RawCell], field: F, fill: &str) -> String {
        match self.index(field) {
            Some(idx) => row.get(idx).map(|c| c.as_display()).unwrap_or_default(),
            None => fill.to_string(),
        }
    }
}

fn alias_warnings(columns: &[ResolvedColumn]) -> Vec<NormalizationWarning> {
    columns
        .iter()
        .filter_map(|column| match &column.source {
            ColumnSource::Alias { header } => Some(NormalizationWarning::AliasUsed {
                field: column.field,
                header: header.clone(),
            }),
            _ => None,
        })
        .collect()
}

#[derive(Default)]
struct CoercionCounts {
    null_dates: usize,
    invalid: HashMap<&'static str, usize>,
}

impl CoercionCounts {
    fn number<F: CanonicalField>(&mut self, cell: Option<&RawCell>, field: F) -> Option<f64> {
        let coerced = cell.map(coerce_number).unwrap_or(Coerced::Missing);
        if coerced.is_invalid() {
            *self.invalid.entry(field.canonical_name()).or_insert(0) += 1;
        }
        coerced.value()
    }

    fn date(&mut self, cell: Option<&RawCell>) -> Option<chrono::NaiveDate> {
        let date = cell.map(coerce_date).and_then(|c| c.value());
        if date.is_none() {
            self.null_dates += 1;
        }
        date
    }

    fn into_warnings<F: CanonicalField>(self, check_dates: bool) -> Vec<NormalizationWarning> {
        let mut warnings = Vec::new();
        if check_dates && self.null_dates > 0 {
            warnings.push(NormalizationWarning::NullDates {
                rows: self.null_dates,
            });
        }
        for &field in F::all() {
            if let Some(&rows) = self.invalid.get(field.canonical_name()) {
                warnings.push(NormalizationWarning::InvalidNumbers {
                    field: field.canonical_name(),
                    rows,
                });
            }
        }
        warnings
    }
}

fn is_blank_row(row: &[RawCell]) -> bool {
    row.iter().all(RawCell::is_empty)
}

/// Builds a [`SalesTable`] from a raw table.
pub fn normalize_sales(
    raw: &RawTable,
    required: &BTreeSet<SalesField>,
    aliases: &AliasTable,
) -> Result<Normalized<SalesTable>, NormalizationError> {
    let columns = resolve_columns::<SalesField>(&raw.headers, aliases, required)?;
    let lookup = FieldLookup::<SalesField>::new(&columns);
    let mut warnings = alias_warnings(&columns);

    for &field in SalesField::all() {
        if lookup.has(field) {
            continue;
        }
        let name = field.canonical_name();
        warnings.push(match field {
            SalesField::ProductCode => defaulted(name, NO_CODE),
            SalesField::Seller | SalesField::Client => defaulted(name, UNSPECIFIED),
            SalesField::Month | SalesField::Year if lookup.has(SalesField::Date) => {
                NormalizationWarning::FieldDerived {
                    field: name,
                    from: SalesField::Date.canonical_name(),
                }
            }
            _ => defaulted(name, ""),
        });
    }

    let mut counts = CoercionCounts::default();
    let mut records = Vec::with_capacity(raw.row_count());
    let mut skipped = 0usize;
    for row in &raw.rows {
        if is_blank_row(row) {
            skipped += 1;
            continue;
        }
        let date = counts.date(lookup.cell(row, SalesField::Date));
        let quantity = counts.number(lookup.cell(row, SalesField::Quantity), SalesField::Quantity);
        let amount = counts.number(lookup.cell(row, SalesField::Amount), SalesField::Amount);
        let month = if lookup.has(SalesField::Month) {
            lookup.text(row, SalesField::Month, "")
        } else {
            date.map(|d| d.format("%m").to_string()).unwrap_or_default()
        };
        let year = if lookup.has(SalesField::Year) {
            lookup.text(row, SalesField::Year, "")
        } else {
            date.map(|d| d.format("%Y").to_string()).unwrap_or_default()
        };
        records.push(SalesRecord {
            client: lookup.text(row, SalesField::Client, UNSPECIFIED),
            product_code: lookup.text(row, SalesField::ProductCode, NO_CODE),
            description: lookup.text(row, SalesField::Description, ""),
            document_id: lookup.text(row, SalesField::DocumentId, ""),
            date,
            quantity,
            seller: lookup.text(row, SalesField::Seller, UNSPECIFIED),
            month,
            year,
            amount,
        });
    }
    if skipped > 0 {
        debug!("Skipped {skipped} blank row(s)");
    }
    warnings.extend(counts.into_warnings::<SalesField>(true));

    info!(
        "Normalized {} sales row(s) with {} warning(s)",
        records.len(),
        warnings.len()
    );
    Ok(Normalized {
        value: SalesTable::from_records(records),
        columns,
        warnings,
    })
}

/// Builds target records from a raw table. Unreadable target numbers count as zero.
pub fn normalize_targets(
    raw: &RawTable,
    required: &BTreeSet<TargetField>,
    aliases: &AliasTable,
) -> Result<Normalized<Vec<TargetRecord>>, NormalizationError> {
    let columns = resolve_columns::<TargetField>(&raw.headers, aliases, required)?;
    let lookup = FieldLookup::<TargetField>::new(&columns);
    let mut warnings = alias_warnings(&columns);

    for &field in TargetField::all() {
        if lookup.has(field) {
            continue;
        }
        let name = field.canonical_name();
        warnings.push(match field {
            TargetField::Seller => defaulted(name, UNSPECIFIED),
            TargetField::TargetQuantity | TargetField::TargetAmount => defaulted(name, "0"),
            _ => defaulted(name, ""),
        });
    }

    let mut counts = CoercionCounts::default();
    let mut targets = Vec::with_capacity(raw.row_count());
    for row in raw.rows.iter().filter(|row| !is_blank_row(row)) {
        targets.push(TargetRecord {
            seller: lookup.text(row, TargetField::Seller, UNSPECIFIED),
            category: lookup.text(row, TargetField::Category, ""),
            subcategory: lookup.text(row, TargetField::Subcategory, ""),
            item_name: lookup.text(row, TargetField::ItemName, ""),
            target_quantity: counts
                .number(
                    lookup.cell(row, TargetField::TargetQuantity),
                    TargetField::TargetQuantity,
                )
                .unwrap_or(0.0),
            target_amount: counts
                .number(
                    lookup.cell(row, TargetField::TargetAmount),
                    TargetField::TargetAmount,
                )
                .unwrap_or(0.0),
        });
    }
    warnings.extend(counts.into_warnings::<TargetField>(false));

    info!(
        "Normalized {} target row(s) with {} warning(s)",
        targets.len(),
        warnings.len()
    );
    Ok(Normalized {
        value: targets,
        columns,
        warnings,
    })
}

fn defaulted(field: &'static str, fill: &str) -> NormalizationWarning {
    NormalizationWarning::FieldDefaulted {
        field,
        fill: fill.to_string(),
    }
}
