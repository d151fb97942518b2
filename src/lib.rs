pub mod aggregate;
pub mod aliases;
pub mod cache;
pub mod cli;
pub mod data;
pub mod export;
pub mod filter;
pub mod io_utils;
pub mod normalize;
pub mod reconcile;
pub mod report;
pub mod sales;
pub mod source;
pub mod table;

use std::{collections::BTreeSet, env, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;
use log::{LevelFilter, debug, info, warn};
use serde_json::json;

use crate::{
    aggregate::sort_by_amount_desc,
    aliases::AliasTable,
    cli::{Cli, Commands, OutputArgs, SourceArgs, SourceKind},
    export::{ExportOptions, Table},
    filter::{DateRange, Dimension, FilterCriteria},
    normalize::{CanonicalField, ColumnSource, SalesField, TargetField},
    reconcile::{ItemKey, ProgressPeriod},
    report::{ReportQuery, RequestContext, build_report},
    sales::SalesTable,
    source::SourceOptions,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sales_report", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Report(args) => handle_report(&args),
        Commands::Targets(args) => handle_targets(&args),
        Commands::Inspect(args) => handle_inspect(&args),
    }
}

fn source_options(args: &SourceArgs) -> Result<SourceOptions> {
    Ok(SourceOptions {
        format: args.format,
        sheet: args.sheet.clone(),
        delimiter: args.delimiter,
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
    })
}

fn export_options(out: &OutputArgs, path: &Path) -> Result<ExportOptions> {
    Ok(ExportOptions {
        delimiter: io_utils::resolve_output_delimiter(Some(path), out.output_delimiter),
        encoding: io_utils::resolve_encoding(out.output_encoding.as_deref())?,
    })
}

fn write_export(table: &Table, path: &Path, out: &OutputArgs, what: &str) -> Result<()> {
    let options = export_options(out, path)?;
    export::write_delimited(table, path, options)?;
    info!(
        "Wrote {} {what} row(s) to {path:?} (delimiter '{}', {})",
        table.rows.len(),
        io_utils::printable_delimiter(options.delimiter),
        options.encoding.name()
    );
    Ok(())
}

fn load_sales(
    location: &str,
    options: &SourceOptions,
    aliases: &AliasTable,
) -> Result<(source::SourceData, SalesTable)> {
    let required = SalesField::required_from(aliases)?;
    let (source, raw) = source::load_raw_table(location, options)?;
    let normalized = normalize::normalize_sales(&raw, &required, aliases)
        .with_context(|| format!("Normalizing sales from {}", source.label))?;
    normalized.log_warnings(&source.label);
    Ok((source, normalized.value))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Serializing JSON output")?;
    println!("{rendered}");
    Ok(())
}

fn handle_report(args: &cli::ReportArgs) -> Result<()> {
    let ctx = RequestContext::new(args.out.operator.clone(), None);
    info!(
        "Report on {:?} '{}' from '{}' requested by {}",
        args.search_by,
        args.value,
        args.input,
        ctx.operator_label()
    );
    let aliases = AliasTable::load_or_builtin(args.source.aliases.as_deref())?;
    let options = source_options(&args.source)?;
    let (source, table) = load_sales(&args.input, &options, &aliases)?;
    debug!("Loaded {} ({})", source.label, source.fingerprint().short());

    let Some(dimension) = Dimension::resolve(&table, args.search_by, &args.value) else {
        warn!("No sales carry the description '{}'", args.value);
        if args.out.json {
            return print_json(&json!({
                "result": "no_match",
                "search_by": args.search_by,
                "value": args.value,
            }));
        }
        println!("No results for description '{}'.", args.value);
        return Ok(());
    };
    let date_range = DateRange::with_defaults(&table, args.from, args.to, ctx.today)?;
    debug!("Date range {} to {}", date_range.start, date_range.end);
    let query = ReportQuery {
        criteria: FilterCriteria::new(dimension, date_range)
            .with_sellers(args.sellers.iter().cloned()),
        group_by: args.group_by,
    };
    let report = build_report(&table, &query);

    if let Some(path) = &args.output {
        write_export(&export::detail_export(&report.rows), path, &args.out, "detail")?;
    }
    if let Some(path) = &args.grouped_output {
        match &report.groups {
            Some(groups) => {
                write_export(&export::summary_table(groups), path, &args.out, "grouped")?
            }
            None => warn!("--grouped-output {path:?} ignored because --group-by is none"),
        }
    }

    if args.out.json {
        return print_json(&report);
    }
    if args.output.is_some() || args.grouped_output.is_some() {
        return Ok(());
    }

    println!("{}", report.title);
    println!();
    if report.is_empty() {
        println!("No results for the selected filters.");
        return Ok(());
    }
    if let Some(groups) = &report.groups {
        let mut ordered = groups.clone();
        sort_by_amount_desc(&mut ordered);
        table::print_section(
            &format!("By {}", args.group_by.label()),
            &export::summary_table(&ordered),
        );
    }
    table::print_section("Detail", &export::detail_export(&report.rows));
    table::print_section("Totals", &export::totals_table(&report.totals));
    Ok(())
}

fn handle_targets(args: &cli::TargetsArgs) -> Result<()> {
    let ctx = RequestContext::new(args.out.operator.clone(), args.today);
    info!(
        "Comparing '{}' against targets '{}' for {} as of {}",
        args.sales,
        args.targets,
        ctx.operator_label(),
        ctx.today
    );
    let aliases = AliasTable::load_or_builtin(args.source.aliases.as_deref())?;
    let options = source_options(&args.source)?;
    let (_, sales) = load_sales(&args.sales, &options, &aliases)?;

    let required = TargetField::required_from(&aliases)?;
    let (target_source, raw_targets) = source::load_raw_table(&args.targets, &options)?;
    let targets = normalize::normalize_targets(&raw_targets, &required, &aliases)
        .with_context(|| format!("Normalizing targets from {}", target_source.label))?;
    targets.log_warnings(&target_source.label);

    let date_range = match (args.from, args.to) {
        (None, None) => None,
        (from, to) => Some(DateRange::with_defaults(&sales, from, to, ctx.today)?),
    };
    let sales = filter::restrict(&sales, date_range);
    let facts = reconcile::sales_facts(&sales, args.item_key);
    let unmatched = reconcile::unmatched_sales(&facts, &targets.value);
    if !unmatched.is_empty() {
        warn!(
            "{} sales row(s) have no target for their (seller, {}) pair",
            unmatched.len(),
            match args.item_key {
                ItemKey::Description => "description",
                ItemKey::ProductCode => "product code",
            }
        );
    }

    let sellers = args.sellers.iter().cloned().collect::<BTreeSet<_>>();
    let rows =
        reconcile::filter_comparisons(&reconcile::reconcile(&facts, &targets.value), &sellers);
    let period = match args.period_end {
        Some(period_end) => ProgressPeriod {
            today: ctx.today,
            period_end,
        },
        None => ProgressPeriod::month_of(ctx.today),
    };
    let summary = reconcile::summarize(&rows, period);

    if let Some(path) = &args.output {
        write_export(&export::comparison_table(&rows), path, &args.out, "comparison")?;
    }
    if args.out.json {
        return print_json(&json!({
            "comparisons": rows,
            "progress": summary,
            "unmatched_sales": unmatched.len(),
        }));
    }
    if args.output.is_some() {
        return Ok(());
    }
    table::print_section("Targets vs actual", &export::comparison_table(&rows));
    table::print_section(
        &format!("Progress through {}", period.period_end.format("%d/%m/%Y")),
        &export::progress_table(&summary),
    );
    Ok(())
}

fn column_source_row(field: &str, source: &ColumnSource, required: bool) -> Vec<String> {
    let (how, header) = match source {
        ColumnSource::Canonical { header } => ("canonical", header.as_str()),
        ColumnSource::Alias { header } => ("alias", header.as_str()),
        ColumnSource::Missing => ("defaulted", ""),
    };
    vec![
        field.to_string(),
        how.to_string(),
        header.to_string(),
        if required { "yes" } else { "" }.to_string(),
    ]
}

fn handle_inspect(args: &cli::InspectArgs) -> Result<()> {
    let aliases = AliasTable::load_or_builtin(args.source.aliases.as_deref())?;
    let options = source_options(&args.source)?;
    let (source, raw) = source::load_raw_table(&args.input, &options)?;
    info!("Inspecting {} ({})", source.label, source.fingerprint().short());

    // Resolve with nothing required so every mapping is shown, missing ones included.
    let (columns, warnings, required_names) = match args.kind {
        SourceKind::Sales => {
            let normalized = normalize::normalize_sales(&raw, &BTreeSet::new(), &aliases)?;
            if let Some(field) = args.distinct {
                let values = distinct_values(&normalized.value, field);
                if args.json {
                    return print_json(&values);
                }
                for value in values {
                    println!("{value}");
                }
                return Ok(());
            }
            let required = SalesField::required_from(&aliases)?
                .into_iter()
                .map(|f| f.canonical_name())
                .collect::<Vec<_>>();
            (normalized.columns, normalized.warnings, required)
        }
        SourceKind::Targets => {
            let normalized = normalize::normalize_targets(&raw, &BTreeSet::new(), &aliases)?;
            let required = TargetField::required_from(&aliases)?
                .into_iter()
                .map(|f| f.canonical_name())
                .collect::<Vec<_>>();
            (normalized.columns, normalized.warnings, required)
        }
    };
    let missing = columns
        .iter()
        .filter(|c| c.source == ColumnSource::Missing && required_names.contains(&c.field))
        .map(|c| c.field)
        .collect::<Vec<_>>();

    if args.json {
        return print_json(&json!({
            "source": source.label,
            "fingerprint": source.fingerprint(),
            "rows": raw.row_count(),
            "columns": columns,
            "warnings": warnings,
            "missing_required": missing,
        }));
    }

    println!("{} ({} row(s))", source.label, raw.row_count());
    println!();
    let mapping = Table::new(
        ["Field", "Resolved", "Header", "Required"],
        columns
            .iter()
            .map(|c| column_source_row(c.field, &c.source, required_names.contains(&c.field)))
            .collect(),
    );
    table::print_section("Columns", &mapping);
    if !warnings.is_empty() {
        println!("Warnings");
        for warning in &warnings {
            println!("- {warning}");
        }
        println!();
    }
    if !missing.is_empty() {
        println!("Missing required column(s): {}", missing.iter().join(", "));
    }
    Ok(())
}

fn distinct_values(table: &SalesTable, field: SalesField) -> Vec<String> {
    match field {
        SalesField::Client => table.clients(),
        SalesField::ProductCode => table.product_codes(),
        SalesField::Description => table.descriptions(),
        SalesField::Seller => table.sellers(),
        other => export::sales_table(table)
            .column(other.canonical_name())
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .sorted()
            .dedup()
            .collect(),
    }
}
