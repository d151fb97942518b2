use chrono::{Local, NaiveDate};
use log::info;
use serde::Serialize;

use crate::{
    aggregate::{self, GroupBy, SummaryRow, Totals},
    filter::{self, Dimension, FilterCriteria},
    sales::SalesTable,
};

/// Per-request values that would otherwise live in session globals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub operator: Option<String>,
    pub today: NaiveDate,
}

impl RequestContext {
    pub fn new(operator: Option<String>, today: Option<NaiveDate>) -> Self {
        Self {
            operator,
            today: today.unwrap_or_else(|| Local::now().date_naive()),
        }
    }

    pub fn operator_label(&self) -> &str {
        self.operator.as_deref().unwrap_or("anonymous")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ReportQuery {
    pub criteria: FilterCriteria,
    pub group_by: GroupBy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesReport {
    pub title: String,
    pub rows: SalesTable,
    pub groups: Option<Vec<SummaryRow>>,
    pub totals: Totals,
}

impl SalesReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn report_title(table: &SalesTable, dimension: &Dimension) -> String {
    match dimension {
        Dimension::ProductCode(code) => match table.description_for_code(code) {
            Some(description) if !description.is_empty() => {
                format!("Sales for: {code} - {description}")
            }
            _ => format!("Sales for: {code}"),
        },
        Dimension::Client(client) => format!("Sales for client: {client}"),
    }
}

/// Filter, then aggregate, then total.
pub fn build_report(table: &SalesTable, query: &ReportQuery) -> SalesReport {
    let rows = filter::apply(table, &query.criteria);
    let groups = aggregate::aggregate(&rows, query.group_by);
    let totals = Totals::from_table(&rows);
    info!(
        "Report matched {} row(s) across {} group(s)",
        rows.len(),
        groups.as_ref().map_or(0, Vec::len)
    );
    SalesReport {
        title: report_title(table, &query.criteria.dimension),
        rows,
        groups,
        totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        filter::DateRange,
        sales::fixtures::{date, record},
    };

    fn table() -> SalesTable {
        SalesTable::from_records(vec![
            record("Ana", "Acme", "X", Some(date(2024, 1, 5)), Some(2.0), Some(20.0)),
            record("Luis", "Globex", "X", Some(date(2024, 1, 7)), Some(1.0), Some(10.0)),
            record("Ana", "Globex", "Y", Some(date(2024, 1, 9)), Some(5.0), Some(50.0)),
        ])
    }

    fn january() -> DateRange {
        DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap()
    }

    #[test]
    fn product_report_has_title_groups_and_totals() {
        let query = ReportQuery {
            criteria: FilterCriteria::new(Dimension::ProductCode("X".into()), january()),
            group_by: GroupBy::Seller,
        };
        let report = build_report(&table(), &query);
        assert_eq!(report.title, "Sales for: X - Product X");
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.groups.as_ref().map(Vec::len), Some(2));
        assert_eq!(report.totals.total_amount, 30.0);
        assert_eq!(report.totals.average_price, 10.0);
    }

    #[test]
    fn client_report_without_matches_is_empty_not_an_error() {
        let query = ReportQuery {
            criteria: FilterCriteria::new(Dimension::Client("Initech".into()), january()),
            group_by: GroupBy::None,
        };
        let report = build_report(&table(), &query);
        assert!(report.is_empty());
        assert_eq!(report.title, "Sales for client: Initech");
        assert!(report.groups.is_none());
        assert_eq!(report.totals.total_amount, 0.0);
    }

    #[test]
    fn unknown_code_title_falls_back_to_code() {
        assert_eq!(
            report_title(&table(), &Dimension::ProductCode("Z".into())),
            "Sales for: Z"
        );
    }

    #[test]
    fn request_context_defaults_today() {
        let ctx = RequestContext::new(None, Some(date(2024, 5, 1)));
        assert_eq!(ctx.today, date(2024, 5, 1));
        assert_eq!(ctx.operator_label(), "anonymous");
    }
}
