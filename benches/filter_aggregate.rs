use chrono::{Days, NaiveDate};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use sales_report::aggregate::{GroupBy, Totals, aggregate};
use sales_report::aliases::AliasTable;
use sales_report::data::RawTable;
use sales_report::export::{self, ExportOptions};
use sales_report::filter::{self, DateRange, Dimension, FilterCriteria};
use sales_report::normalize::{SalesField, normalize_sales};
use sales_report::sales::SalesTable;

const SELLERS: &[&str] = &["Ana", "Luis", "Eva", "Marta", "Jorge"];
const CLIENTS: &[&str] = &["Acme", "Globex", "Initech", "Umbrella"];

fn generate_sales(rows: usize) -> RawTable {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("start date");
    let headers = [
        "CLIENTE",
        "COD_PROD",
        "DESCRIPCION",
        "DOCUMENTO",
        "FECHA",
        "CANTIDAD",
        "VENDEDOR",
        "MONTO",
    ];
    let owned = (0..rows)
        .map(|i| {
            let date = start
                .checked_add_days(Days::new((i % 365) as u64))
                .expect("date in range");
            vec![
                CLIENTS[i % CLIENTS.len()].to_string(),
                format!("P-{}", i % 50),
                format!("Product {}", i % 50),
                format!("F-{}", i / 3),
                date.format("%d/%m/%Y").to_string(),
                ((i % 7) + 1).to_string(),
                SELLERS[i % SELLERS.len()].to_string(),
                format!("{}.{:02}", (i % 500) + 10, i % 100),
            ]
        })
        .collect::<Vec<_>>();
    let borrowed = owned
        .iter()
        .map(|row| row.iter().map(String::as_str).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    RawTable::from_text_rows(&headers, &borrowed)
}

fn normalized(rows: usize) -> SalesTable {
    normalize_sales(
        &generate_sales(rows),
        &SalesField::default_required(),
        &AliasTable::builtin(),
    )
    .expect("normalize")
    .value
}

fn bench_pipeline(c: &mut Criterion) {
    let raw = generate_sales(50_000);
    let table = normalized(50_000);
    let criteria = FilterCriteria::new(
        Dimension::ProductCode("P-7".into()),
        DateRange::spanning(&table).expect("dated"),
    )
    .with_sellers(["Ana", "Eva"]);

    let mut group = c.benchmark_group("sales_pipeline");

    group.bench_function("normalize", |b| {
        b.iter(|| {
            normalize_sales(&raw, &SalesField::default_required(), &AliasTable::builtin())
                .expect("normalize")
        });
    });

    group.bench_function("filter", |b| {
        b.iter(|| filter::apply(&table, &criteria));
    });

    group.bench_function("aggregate_month", |b| {
        b.iter(|| aggregate(&table, GroupBy::Month));
    });

    group.bench_function("filter_group_export", |b| {
        b.iter_batched(
            || criteria.clone(),
            |criteria| {
                let rows = filter::apply(&table, &criteria);
                let groups = aggregate(&rows, GroupBy::Client).expect("grouped");
                let _ = Totals::from_table(&rows);
                let summary = export::summary_table(&groups);
                export::to_delimited_bytes(&summary, ExportOptions::default()).expect("export")
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
