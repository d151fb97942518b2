use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One normalized sales line.
///
/// `quantity` and `amount` are `None` when the source cell was empty or could
/// not be read as a number; `date` is `None` when the source date was not a
/// valid day-first date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub client: String,
    pub product_code: String,
    pub description: String,
    pub document_id: String,
    pub date: Option<NaiveDate>,
    pub quantity: Option<f64>,
    pub seller: String,
    pub month: String,
    pub year: String,
    pub amount: Option<f64>,
}

impl SalesRecord {
    pub fn quantity_or_zero(&self) -> f64 {
        self.quantity.unwrap_or(0.0)
    }

    pub fn amount_or_zero(&self) -> f64 {
        self.amount.unwrap_or(0.0)
    }
}

/// An immutable, ordered set of sales records sharing the canonical schema.
///
/// Filtering and grouping never mutate a table; they build new values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalesTable {
    records: Vec<SalesRecord>,
}

impl SalesTable {
    pub fn from_records(records: Vec<SalesRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[SalesRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SalesRecord> {
        self.records.iter()
    }

    /// Earliest and latest valid dates, ignoring null dates.
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.records.iter().filter_map(|r| r.date);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }

    pub fn product_codes(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.product_code.as_str()))
    }

    pub fn descriptions(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.description.as_str()))
    }

    pub fn clients(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.client.as_str()))
    }

    pub fn sellers(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.seller.as_str()))
    }

    /// Product code of the first record carrying exactly this description.
    pub fn code_for_description(&self, description: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.description == description)
            .map(|r| r.product_code.as_str())
    }

    /// Description of the first record carrying this product code.
    pub fn description_for_code(&self, code: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.product_code == code)
            .map(|r| r.description.as_str())
    }
}

impl<'a> IntoIterator for &'a SalesTable {
    type Item = &'a SalesRecord;
    type IntoIter = std::slice::Iter<'a, SalesRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn record(
        seller: &str,
        client: &str,
        code: &str,
        date: Option<NaiveDate>,
        quantity: Option<f64>,
        amount: Option<f64>,
    ) -> SalesRecord {
        SalesRecord {
            client: client.to_string(),
            product_code: code.to_string(),
            description: format!("Product {code}"),
            document_id: format!("F-{seller}-{code}"),
            date,
            quantity,
            seller: seller.to_string(),
            month: date.map(|d| d.format("%m").to_string()).unwrap_or_default(),
            year: date.map(|d| d.format("%Y").to_string()).unwrap_or_default(),
            amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn date_span_skips_null_dates() {
        let table = SalesTable::from_records(vec![
            record("Ana", "C1", "X", Some(date(2024, 3, 1)), Some(1.0), Some(1.0)),
            record("Ana", "C1", "X", None, Some(1.0), Some(1.0)),
            record("Luis", "C2", "Y", Some(date(2024, 1, 15)), Some(1.0), Some(1.0)),
        ]);
        assert_eq!(
            table.date_span(),
            Some((date(2024, 1, 15), date(2024, 3, 1)))
        );
        assert_eq!(SalesTable::default().date_span(), None);
    }

    #[test]
    fn selector_lists_are_sorted_and_unique() {
        let table = SalesTable::from_records(vec![
            record("Luis", "C2", "Y", None, None, None),
            record("Ana", "C1", "X", None, None, None),
            record("Ana", "C2", "X", None, None, None),
        ]);
        assert_eq!(table.sellers(), vec!["Ana", "Luis"]);
        assert_eq!(table.product_codes(), vec!["X", "Y"]);
        assert_eq!(table.clients(), vec!["C1", "C2"]);
    }

    #[test]
    fn description_lookup_returns_first_match() {
        let mut first = record("Ana", "C1", "X", None, None, None);
        first.description = "Widget".into();
        let mut second = record("Ana", "C1", "Z", None, None, None);
        second.description = "Widget".into();
        let table = SalesTable::from_records(vec![first, second]);
        assert_eq!(table.code_for_description("Widget"), Some("X"));
        assert_eq!(table.code_for_description("Gadget"), None);
        assert_eq!(table.description_for_code("Z"), Some("Widget"));
    }
}
