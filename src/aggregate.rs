use std::collections::{HashMap, HashSet};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::sales::{SalesRecord, SalesTable};

pub const UNDATED_GROUP: &str = "UNDATED";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum GroupBy {
    #[default]
    None,
    Seller,
    Client,
    Month,
    Year,
}

impl GroupBy {
    /// Grouping key for one record; `None` for the detail-only mode.
    pub fn key(self, record: &SalesRecord) -> Option<String> {
        let key = match self {
            GroupBy::None => return None,
            GroupBy::Seller => record.seller.clone(),
            GroupBy::Client => record.client.clone(),
            GroupBy::Month => record
                .date
                .map(|d| d.format("%Y-%m").to_string())
                .unwrap_or_else(|| UNDATED_GROUP.to_string()),
            GroupBy::Year => record
                .date
                .map(|d| d.format("%Y").to_string())
                .unwrap_or_else(|| UNDATED_GROUP.to_string()),
        };
        Some(key)
    }

    pub fn label(self) -> &'static str {
        match self {
            GroupBy::None => "none",
            GroupBy::Seller => "seller",
            GroupBy::Client => "client",
            GroupBy::Month => "month",
            GroupBy::Year => "year",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub group_key: String,
    pub total_quantity: f64,
    pub total_amount: f64,
    pub distinct_document_count: usize,
}

struct GroupAccumulator {
    key: String,
    quantity: f64,
    amount: f64,
    documents: HashSet<String>,
}

impl GroupAccumulator {
    fn new(key: String) -> Self {
        Self {
            key,
            quantity: 0.0,
            amount: 0.0,
            documents: HashSet::new(),
        }
    }

    fn ingest(&mut self, record: &SalesRecord) {
        self.quantity += record.quantity_or_zero();
        self.amount += record.amount_or_zero();
        self.documents.insert(record.document_id.clone());
    }

    fn finish(self) -> SummaryRow {
        SummaryRow {
            group_key: self.key,
            total_quantity: self.quantity,
            total_amount: self.amount,
            distinct_document_count: self.documents.len(),
        }
    }
}

/// Groups `table` by `group_by`; `GroupBy::None` skips aggregation.
///
/// Groups come out in order of first appearance.
pub fn aggregate(table: &SalesTable, group_by: GroupBy) -> Option<Vec<SummaryRow>> {
    if group_by == GroupBy::None {
        return None;
    }
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<GroupAccumulator> = Vec::new();
    for record in table {
        let key = group_by.key(record)?;
        let slot = match positions.get(&key) {
            Some(&slot) => slot,
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push(GroupAccumulator::new(key));
                groups.len() - 1
            }
        };
        groups[slot].ingest(record);
    }
    Some(groups.into_iter().map(GroupAccumulator::finish).collect())
}

/// Presentation order: largest amount first, ties by key.
pub fn sort_by_amount_desc(rows: &mut [SummaryRow]) {
    rows.sort_by(|a, b| {
        b.total_amount
            .total_cmp(&a.total_amount)
            .then_with(|| a.group_key.cmp(&b.group_key))
    });
}

/// Whole-result metrics shown beneath a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub total_quantity: f64,
    pub total_amount: f64,
    pub transactions: usize,
    /// `total_amount / total_quantity`, 0 when no units were sold.
    pub average_price: f64,
    pub null_quantities: usize,
    pub null_amounts: usize,
}

impl Totals {
    pub fn from_table(table: &SalesTable) -> Self {
        let mut documents = HashSet::new();
        let mut totals = Totals::default();
        for record in table {
            totals.total_quantity += record.quantity_or_zero();
            totals.total_amount += record.amount_or_zero();
            totals.null_quantities += usize::from(record.quantity.is_none());
            totals.null_amounts += usize::from(record.amount.is_none());
            documents.insert(record.document_id.as_str());
        }
        totals.transactions = documents.len();
        totals.average_price = if totals.total_quantity > 0.0 {
            totals.total_amount / totals.total_quantity
        } else {
            0.0
        };
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sales::fixtures::{date, record};

    fn sample() -> SalesTable {
        let mut rows = vec![
            record("Ana", "Acme", "X", Some(date(2024, 1, 5)), Some(2.0), Some(20.0)),
            record("Luis", "Acme", "X", Some(date(2024, 1, 20)), Some(1.0), Some(15.0)),
            record("Ana", "Globex", "Y", Some(date(2024, 2, 3)), None, Some(7.5)),
            record("Ana", "Globex", "Y", None, Some(4.0), None),
        ];
        rows[1].document_id = rows[0].document_id.clone();
        SalesTable::from_records(rows)
    }

    #[test]
    fn none_grouping_skips_aggregation() {
        assert!(aggregate(&sample(), GroupBy::None).is_none());
    }

    #[test]
    fn seller_groups_sum_with_nulls_as_zero() {
        let rows = aggregate(&sample(), GroupBy::Seller).unwrap();
        assert_eq!(rows.len(), 2);
        let ana = rows.iter().find(|r| r.group_key == "Ana").unwrap();
        assert_eq!(ana.total_quantity, 6.0);
        assert_eq!(ana.total_amount, 27.5);
        assert_eq!(ana.distinct_document_count, 2);
    }

    #[test]
    fn month_keys_are_year_month_labels() {
        let rows = aggregate(&sample(), GroupBy::Month).unwrap();
        let keys = rows.iter().map(|r| r.group_key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["2024-01", "2024-02", UNDATED_GROUP]);
        assert_eq!(rows[0].total_amount, 35.0);
        assert_eq!(rows[0].distinct_document_count, 1);
    }

    #[test]
    fn every_grouping_conserves_the_total_amount() {
        let table = sample();
        let expected: f64 = table.iter().map(|r| r.amount_or_zero()).sum();
        for group_by in [GroupBy::Seller, GroupBy::Client, GroupBy::Month, GroupBy::Year] {
            let total: f64 = aggregate(&table, group_by)
                .unwrap()
                .iter()
                .map(|r| r.total_amount)
                .sum();
            assert!((total - expected).abs() < 1e-9, "{group_by:?}");
        }
    }

    #[test]
    fn sort_by_amount_desc_orders_for_display() {
        let mut rows = aggregate(&sample(), GroupBy::Client).unwrap();
        sort_by_amount_desc(&mut rows);
        assert_eq!(rows[0].group_key, "Acme");
    }

    #[test]
    fn totals_guard_average_price_and_count_nulls() {
        let totals = Totals::from_table(&sample());
        assert_eq!(totals.total_quantity, 7.0);
        assert_eq!(totals.total_amount, 42.5);
        assert_eq!(totals.transactions, 2);
        assert_eq!(totals.null_quantities, 1);
        assert_eq!(totals.null_amounts, 1);
        assert!((totals.average_price - 42.5 / 7.0).abs() < 1e-9);

        assert_eq!(Totals::from_table(&SalesTable::default()).average_price, 0.0);
    }
}
