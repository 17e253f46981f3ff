use chrono::NaiveDate;
use financial_statement_normalizer::report::to_csv_string;
use financial_statement_normalizer::{
    analyze, convert_line_items_to_statement, preview_expression, AnalysisOptions, CellValue,
    Field, Granularity, MappingConfig, MappingResolver, SelectionPolicy, StatementLineItem,
    UserMapping,
};
use std::collections::BTreeMap;

fn line(item: &str, period: NaiveDate, value: f64) -> StatementLineItem {
    StatementLineItem {
        line_item: item.to_string(),
        period,
        value: CellValue::Number(value),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let fy23 = NaiveDate::from_ymd_opt(2023, 12, 31).ok_or_else(|| anyhow::anyhow!("bad date"))?;
    let fy22 = NaiveDate::from_ymd_opt(2022, 12, 31).ok_or_else(|| anyhow::anyhow!("bad date"))?;

    // A vendor that splits revenue into product and service lines.
    let items = vec![
        line("Total Revenue", fy23, 600_000_000.0),
        line("Operating Revenue", fy23, 400_000_000.0),
        line("Cost Of Revenue", fy23, 450_000_000.0),
        line("Pretax Income", fy23, 200_000_000.0),
        line("Net Income", fy23, 160_000_000.0),
        line("Total Revenue", fy22, 500_000_000.0),
        line("Operating Revenue", fy22, 300_000_000.0),
        line("Cost Of Revenue", fy22, 380_000_000.0),
        line("Pretax Income", fy22, 150_000_000.0),
        line("Net Income", fy22, 120_000_000.0),
    ];
    let annual = convert_line_items_to_statement(&items, Granularity::Annual);

    let config = MappingConfig::default();
    let resolver = MappingResolver::new(&config);

    let mut selections = BTreeMap::new();
    selections.insert(Field::Revenue, SelectionPolicy::Custom("1+2".to_string()));
    let report = resolver.resolve_all(&annual, &selections)?;

    let revenue = report.mapping.get(Field::Revenue);
    println!("Revenue mapped to: {}", revenue);
    println!(
        "Latest value: {:?}",
        preview_expression(revenue, &annual, None)
    );

    // Persist and reload the mapping as a later session would.
    let saved = report.mapping.to_json()?;
    println!("\nSaved mapping:\n{}", saved);
    let reloaded = UserMapping::from_json(&saved, &config)?;

    let analysis = analyze(&annual, None, &reloaded, &AnalysisOptions::default())?;
    println!("\n{}", to_csv_string(&analysis.series, 1_000_000.0)?);

    Ok(())
}
