use financial_statement_normalizer::report::{key_metrics, to_markdown};
use financial_statement_normalizer::sample::{demo_statement, is_demo_ticker, DEMO_TICKERS};
use financial_statement_normalizer::utils::format_percent;
use financial_statement_normalizer::{
    analyze, preview_candidates, AnalysisOptions, Field, MappingConfig, MappingResolver,
    SelectionPolicy,
};
use std::collections::BTreeMap;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let ticker = std::env::args().nth(1).unwrap_or_else(|| DEMO_TICKERS[0].to_string());
    if !is_demo_ticker(&ticker) {
        println!("No bundled data for {}, showing {}", ticker, DEMO_TICKERS[0]);
    }
    let annual = demo_statement(&ticker);
    let config = MappingConfig::default();
    let resolver = MappingResolver::new(&config);

    println!("Raw columns for {}:", ticker.to_uppercase());
    for column in annual.column_overview() {
        println!(" {:>2}. {:<40} {:?}", column.index, column.column, column.latest_value);
    }

    // The bundled statements report revenue as "Revenue", which no default
    // alias matches, so the resolver offers every column for it.
    let revenue_candidates = resolver.candidates(&annual, Field::Revenue);
    println!("\nRevenue candidates (degraded: {}):", revenue_candidates.is_degraded());
    for preview in preview_candidates(&revenue_candidates, &annual, None) {
        println!(" {:>2}. {:<40} {}", preview.index, preview.column, preview.display);
    }

    let mut selections = BTreeMap::new();
    selections.insert(Field::Revenue, SelectionPolicy::Choose("Revenue".to_string()));
    let report = resolver.resolve_all(&annual, &selections)?;

    for (field, issue) in report.issues() {
        println!(" ! {}: {}", field, issue);
    }

    let options = AnalysisOptions::default();
    let analysis = analyze(&annual, None, &report.mapping, &options)?;
    println!("\nTTM: {:?}\n", analysis.ttm);
    println!("{}", to_markdown(&analysis.series, options.display_scale));

    let metrics = key_metrics(&analysis.series);
    println!("Revenue Y/Y:    {}", format_percent(metrics.revenue_yoy));
    println!("Net Income Y/Y: {}", format_percent(metrics.net_income_yoy));
    println!("Gross Margin:   {}", format_percent(metrics.gross_margin));
    println!("Net Margin:     {}", format_percent(metrics.net_margin));

    Ok(())
}
