use std::collections::BTreeSet;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::sales::{SalesRecord, SalesTable};

/// What the operator searches by, before it is resolved into a [`Dimension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum SearchBy {
    ProductCode,
    Description,
    Client,
}

/// The equality test at the heart of every query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Dimension {
    ProductCode(String),
    Client(String),
}

impl Dimension {
    /// Turns a selector value into a dimension.
    ///
    /// A description resolves to the product code of the first record with
    /// that exact description; `None` means no record carries it.
    pub fn resolve(table: &SalesTable, search_by: SearchBy, value: &str) -> Option<Dimension> {
        match search_by {
            SearchBy::ProductCode => Some(Dimension::ProductCode(value.to_string())),
            SearchBy::Client => Some(Dimension::Client(value.to_string())),
            SearchBy::Description => {
                let code = table.code_for_description(value)?;
                debug!("Description '{value}' resolved to product code '{code}'");
                Some(Dimension::ProductCode(code.to_string()))
            }
        }
    }

    pub fn matches(&self, record: &SalesRecord) -> bool {
        match self {
            Dimension::ProductCode(code) => record.product_code == *code,
            Dimension::Client(client) => record.client == *client,
        }
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            bail!("Date range start {start} is after end {end}");
        }
        Ok(Self { start, end })
    }

    /// Range covering every dated record, or `None` when no record has a date.
    pub fn spanning(table: &SalesTable) -> Option<Self> {
        table
            .date_span()
            .map(|(start, end)| Self { start, end })
    }

    /// Fills missing bounds from the table's own date span.
    ///
    /// A filled bound never crosses the given one, so a lone `start` past the
    /// last sale yields a range that matches nothing. Only two explicit,
    /// inverted bounds are an error.
    pub fn with_defaults(
        table: &SalesTable,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self> {
        let (lo, hi) = table.date_span().unwrap_or((today, today));
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            (Some(start), None) => Self::new(start, hi.max(start)),
            (None, Some(end)) => Self::new(lo.min(end), end),
            (None, None) => Self::new(lo, hi),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub dimension: Dimension,
    /// Empty means every seller.
    pub sellers: BTreeSet<String>,
    pub date_range: DateRange,
}

impl FilterCriteria {
    pub fn new(dimension: Dimension, date_range: DateRange) -> Self {
        Self {
            dimension,
            sellers: BTreeSet::new(),
            date_range,
        }
    }

    pub fn with_sellers<I, S>(mut self, sellers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sellers = sellers.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches(&self, record: &SalesRecord) -> bool {
        self.dimension.matches(record)
            && record.date.is_some_and(|d| self.date_range.contains(d))
            && (self.sellers.is_empty() || self.sellers.contains(&record.seller))
    }
}

/// Keeps the records matching `criteria`, ordered by date ascending.
pub fn apply(table: &SalesTable, criteria: &FilterCriteria) -> SalesTable {
    let mut kept = table
        .iter()
        .filter(|record| criteria.matches(record))
        .cloned()
        .collect::<Vec<_>>();
    kept.sort_by_key(|record| record.date);
    debug!(
        "Filter kept {} of {} row(s) for {:?}",
        kept.len(),
        table.len(),
        criteria.dimension
    );
    SalesTable::from_records(kept)
}

/// Date-only restriction, used for target comparisons where no dimension applies.
pub fn restrict(table: &SalesTable, date_range: Option<DateRange>) -> SalesTable {
    match date_range {
        None => table.clone(),
        Some(range) => SalesTable::from_records(
            table
                .iter()
                .filter(|record| record.date.is_some_and(|d| range.contains(d)))
                .cloned()
                .collect(),
        ),
    }
}
