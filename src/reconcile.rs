//! Actual sales against per-seller, per-item targets.
//!
//! Targets are the join universe: every target yields exactly one
//! [`ComparisonRow`] (in target order) and sales without a target are left
//! out of the comparison. [`unmatched_sales`] lists the sales that fell out
//! so callers can report them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::sales::SalesTable;

const KEY_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub seller: String,
    pub category: String,
    pub subcategory: String,
    pub item_name: String,
    pub target_quantity: f64,
    pub target_amount: f64,
}

/// Which sales field plays the role of the target's item name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum ItemKey {
    #[default]
    Description,
    ProductCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesFact {
    pub seller: String,
    pub item_name: String,
    pub quantity: f64,
    pub amount: f64,
}

/// Projects a sales table onto the actual side of the join. Null numbers count as zero.
pub fn sales_facts(table: &SalesTable, key: ItemKey) -> Vec<SalesFact> {
    table
        .iter()
        .map(|record| SalesFact {
            seller: record.seller.clone(),
            item_name: match key {
                ItemKey::Description => record.description.clone(),
                ItemKey::ProductCode => record.product_code.clone(),
            },
            quantity: record.quantity_or_zero(),
            amount: record.amount_or_zero(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub seller: String,
    pub category: String,
    pub subcategory: String,
    pub item_name: String,
    pub target_quantity: f64,
    pub actual_quantity: f64,
    pub quantity_gap: f64,
    pub quantity_pct: f64,
    pub target_amount: f64,
    pub actual_amount: f64,
    pub amount_gap: f64,
    pub amount_pct: f64,
}

fn join_key(seller: &str, item: &str) -> String {
    format!("{seller}{KEY_SEPARATOR}{item}")
}

/// `actual / target * 100`, or 0 when the target is zero.
pub fn percent_of(actual: f64, target: f64) -> f64 {
    if target == 0.0 {
        return 0.0;
    }
    let pct = actual / target * 100.0;
    if pct.is_finite() { pct } else { 0.0 }
}

fn build_actual_lookup(sales: &[SalesFact]) -> HashMap<String, (f64, f64)> {
    let mut lookup: HashMap<String, (f64, f64)> = HashMap::new();
    for fact in sales {
        let entry = lookup
            .entry(join_key(&fact.seller, &fact.item_name))
            .or_insert((0.0, 0.0));
        entry.0 += fact.quantity;
        entry.1 += fact.amount;
    }
    lookup
}

/// One row per target. Targets sharing a `(seller, item)` key each carry the
/// full actual for that key; [`summarize`] counts it once.
pub fn reconcile(sales: &[SalesFact], targets: &[TargetRecord]) -> Vec<ComparisonRow> {
    let actuals = build_actual_lookup(sales);
    let mut seen = HashSet::new();
    for target in targets {
        if !seen.insert(join_key(&target.seller, &target.item_name)) {
            warn!(
                "Duplicate target for seller '{}' and item '{}'",
                target.seller, target.item_name
            );
        }
    }
    let mut matched = 0usize;
    let rows = targets
        .iter()
        .map(|target| {
            let (actual_quantity, actual_amount) =
                match actuals.get(&join_key(&target.seller, &target.item_name)) {
                    Some(&totals) => {
                        matched += 1;
                        totals
                    }
                    None => (0.0, 0.0),
                };
            ComparisonRow {
                seller: target.seller.clone(),
                category: target.category.clone(),
                subcategory: target.subcategory.clone(),
                item_name: target.item_name.clone(),
                target_quantity: target.target_quantity,
                actual_quantity,
                quantity_gap: target.target_quantity - actual_quantity,
                quantity_pct: percent_of(actual_quantity, target.target_quantity),
                target_amount: target.target_amount,
                actual_amount,
                amount_gap: target.target_amount - actual_amount,
                amount_pct: percent_of(actual_amount, target.target_amount),
            }
        })
        .collect::<Vec<_>>();
    debug!(
        "Reconciled {} target(s) against {} sales fact(s); {} matched",
        targets.len(),
        sales.len(),
        matched
    );
    rows
}

/// Sales facts whose `(seller, item)` has no target.
pub fn unmatched_sales<'a>(sales: &'a [SalesFact], targets: &[TargetRecord]) -> Vec<&'a SalesFact> {
    let keys = targets
        .iter()
        .map(|t| join_key(&t.seller, &t.item_name))
        .collect::<HashSet<_>>();
    sales
        .iter()
        .filter(|fact| !keys.contains(&join_key(&fact.seller, &fact.item_name)))
        .collect()
}

/// Keeps rows for the given sellers; an empty set keeps everything.
pub fn filter_comparisons(
    rows: &[ComparisonRow],
    sellers: &BTreeSet<String>,
) -> Vec<ComparisonRow> {
    rows.iter()
        .filter(|row| sellers.is_empty() || sellers.contains(&row.seller))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPeriod {
    pub today: NaiveDate,
    pub period_end: NaiveDate,
}

impl ProgressPeriod {
    /// Period running from `today` to the last day of its month.
    pub fn month_of(today: NaiveDate) -> Self {
        let (year, month) = if today.month() == 12 {
            (today.year() + 1, 1)
        } else {
            (today.year(), today.month() + 1)
        };
        let period_end = NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|first| first.pred_opt())
            .unwrap_or(today);
        Self { today, period_end }
    }

    /// Selling days left, today included.
    pub fn remaining_days(&self) -> i64 {
        (self.period_end - self.today).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "per_day", rename_all = "snake_case")]
pub enum Velocity {
    Required(f64),
    NotApplicable,
}

impl fmt::Display for Velocity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Velocity::Required(per_day) => write!(f, "{per_day:.2}"),
            Velocity::NotApplicable => f.write_str("N/A"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub target_amount: f64,
    pub actual_amount: f64,
    pub amount_pct: f64,
    pub target_quantity: f64,
    pub actual_quantity: f64,
    pub quantity_pct: f64,
    pub remaining_amount: f64,
    pub remaining_days: i64,
    pub velocity_needed: Velocity,
}

/// Period totals. Targets are summed per row; actuals once per `(seller, item)`.
pub fn summarize(rows: &[ComparisonRow], period: ProgressPeriod) -> ProgressSummary {
    let mut counted = HashSet::new();
    let (target_amount, actual_amount, target_quantity, actual_quantity) = rows.iter().fold(
        (0.0, 0.0, 0.0, 0.0),
        |(ta, aa, tq, aq), row| {
            let (quantity, amount) = if counted.insert(join_key(&row.seller, &row.item_name)) {
                (row.actual_quantity, row.actual_amount)
            } else {
                (0.0, 0.0)
            };
            (
                ta + row.target_amount,
                aa + amount,
                tq + row.target_quantity,
                aq + quantity,
            )
        },
    );
    let remaining_amount = (target_amount - actual_amount).max(0.0);
    let remaining_days = period.remaining_days();
    let velocity_needed = if remaining_days > 0 {
        Velocity::Required(remaining_amount / remaining_days as f64)
    } else {
        Velocity::NotApplicable
    };
    ProgressSummary {
        target_amount,
        actual_amount,
        amount_pct: percent_of(actual_amount, target_amount),
        target_quantity,
        actual_quantity,
        quantity_pct: percent_of(actual_quantity, target_quantity),
        remaining_amount,
        remaining_days,
        velocity_needed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sales::fixtures::{date, record};

    fn target(seller: &str, item: &str, quantity: f64, amount: f64) -> TargetRecord {
        TargetRecord {
            seller: seller.to_string(),
            category: "Tools".to_string(),
            subcategory: String::new(),
            item_name: item.to_string(),
            target_quantity: quantity,
            target_amount: amount,
        }
    }

    fn fact(seller: &str, item: &str, quantity: f64, amount: f64) -> SalesFact {
        SalesFact {
            seller: seller.to_string(),
            item_name: item.to_string(),
            quantity,
            amount,
        }
    }

    #[test]
    fn zero_target_without_sales_has_zero_pct_and_gap() {
        let rows = reconcile(&[], &[target("Ana", "X", 0.0, 0.0)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount_pct, 0.0);
        assert_eq!(rows[0].amount_gap, 0.0);
        assert_eq!(rows[0].actual_amount, 0.0);
        assert_eq!(rows[0].quantity_pct, 0.0);
        assert_eq!(rows[0].quantity_gap, 0.0);
    }

    #[test]
    fn zero_target_with_sales_has_finite_zero_pct() {
        let rows = reconcile(&[fact("Ana", "X", 3.0, 30.0)], &[target("Ana", "X", 0.0, 0.0)]);
        assert_eq!(rows[0].actual_quantity, 3.0);
        assert_eq!(rows[0].actual_amount, 30.0);
        assert_eq!(rows[0].quantity_pct, 0.0);
        assert_eq!(rows[0].amount_pct, 0.0);
        assert!(rows[0].quantity_pct.is_finite() && rows[0].amount_pct.is_finite());
        assert_eq!(rows[0].quantity_gap, -3.0);
        assert_eq!(rows[0].amount_gap, -30.0);
    }

    #[test]
    fn duplicate_targets_count_actuals_once_in_the_summary() {
        let targets = vec![target("Ana", "X", 1.0, 20.0), target("Ana", "X", 1.0, 20.0)];
        let rows = reconcile(&[fact("Ana", "X", 1.0, 10.0)], &targets);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.actual_amount == 10.0));

        let period = ProgressPeriod {
            today: date(2024, 1, 30),
            period_end: date(2024, 1, 31),
        };
        let summary = summarize(&rows, period);
        assert_eq!(summary.target_amount, 40.0);
        assert_eq!(summary.actual_amount, 10.0);
        assert_eq!(summary.actual_quantity, 1.0);
        assert_eq!(summary.remaining_amount, 30.0);
    }

    #[test]
    fn duplicate_sales_are_summed_and_unmatched_dropped() {
        let sales = vec![
            fact("Ana", "X", 2.0, 40.0),
            fact("Ana", "X", 3.0, 35.0),
            fact("Ana", "Y", 1.0, 5.0),
        ];
        let targets = vec![target("Ana", "X", 10.0, 100.0), target("Luis", "X", 1.0, 50.0)];
        let rows = reconcile(&sales, &targets);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].actual_quantity, 5.0);
        assert_eq!(rows[0].actual_amount, 75.0);
        assert_eq!(rows[0].amount_gap, 25.0);
        assert_eq!(rows[0].amount_pct, 75.0);
        assert_eq!(rows[0].quantity_pct, 50.0);
        assert_eq!(rows[1].seller, "Luis");
        assert_eq!(rows[1].actual_amount, 0.0);

        let unmatched = unmatched_sales(&sales, &targets);
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0].item_name, "Y");
    }

    #[test]
    fn sales_facts_follow_item_key() {
        let table = SalesTable::from_records(vec![record(
            "Ana",
            "Acme",
            "P-1",
            Some(date(2024, 3, 1)),
            None,
            Some(9.0),
        )]);
        let by_description = sales_facts(&table, ItemKey::Description);
        assert_eq!(by_description[0].item_name, "Product P-1");
        assert_eq!(by_description[0].quantity, 0.0);
        let by_code = sales_facts(&table, ItemKey::ProductCode);
        assert_eq!(by_code[0].item_name, "P-1");
    }

    #[test]
    fn filter_comparisons_keeps_requested_sellers() {
        let rows = reconcile(&[], &[target("Ana", "X", 1.0, 1.0), target("Luis", "X", 1.0, 1.0)]);
        assert_eq!(filter_comparisons(&rows, &BTreeSet::new()).len(), 2);
        let only_luis = filter_comparisons(&rows, &BTreeSet::from(["Luis".to_string()]));
        assert_eq!(only_luis.len(), 1);
        assert_eq!(only_luis[0].seller, "Luis");
    }

    #[test]
    fn month_period_ends_on_last_day() {
        assert_eq!(ProgressPeriod::month_of(date(2024, 2, 10)).period_end, date(2024, 2, 29));
        assert_eq!(ProgressPeriod::month_of(date(2024, 12, 31)).period_end, date(2024, 12, 31));
        assert_eq!(ProgressPeriod::month_of(date(2024, 12, 31)).remaining_days(), 1);
    }

    #[test]
    fn summary_computes_velocity_inside_the_period() {
        let rows = reconcile(&[fact("Ana", "X", 4.0, 40.0)], &[target("Ana", "X", 10.0, 100.0)]);
        let period = ProgressPeriod {
            today: date(2024, 1, 29),
            period_end: date(2024, 1, 31),
        };
        let summary = summarize(&rows, period);
        assert_eq!(summary.remaining_amount, 60.0);
        assert_eq!(summary.remaining_days, 3);
        assert_eq!(summary.velocity_needed, Velocity::Required(20.0));
        assert_eq!(summary.amount_pct, 40.0);
    }

    #[test]
    fn velocity_is_not_applicable_past_the_period_end() {
        let rows = reconcile(&[fact("Ana", "X", 20.0, 200.0)], &[target("Ana", "X", 10.0, 100.0)]);
        let period = ProgressPeriod {
            today: date(2024, 2, 2),
            period_end: date(2024, 1, 31),
        };
        let summary = summarize(&rows, period);
        assert_eq!(summary.remaining_amount, 0.0);
        assert_eq!(summary.velocity_needed, Velocity::NotApplicable);
        assert_eq!(summary.velocity_needed.to_string(), "N/A");
    }
}
