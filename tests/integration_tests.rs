use chrono::NaiveDate;
use financial_statement_normalizer::report::{export_csv, key_metrics, DisplayTable};
use financial_statement_normalizer::sample::demo_statement;
use financial_statement_normalizer::*;
use std::collections::BTreeMap;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn two_year_statement() -> RawStatement {
    RawStatement::new(
        Granularity::Annual,
        vec![
            "Total Revenue".to_string(),
            "Operating Revenue".to_string(),
            "Cost Of Revenue".to_string(),
        ],
        vec![
            StatementRow::new(date(2022, 12, 31))
                .with_value("Total Revenue", 90.0)
                .with_value("Operating Revenue", 45.0)
                .with_value("Cost Of Revenue", 36.0),
            StatementRow::new(date(2023, 12, 31))
                .with_value("Total Revenue", 100.0)
                .with_value("Operating Revenue", 50.0)
                .with_value("Cost Of Revenue", 40.0),
        ],
    )
}

fn policies(entries: &[(Field, SelectionPolicy)]) -> BTreeMap<Field, SelectionPolicy> {
    entries.iter().cloned().collect()
}

#[test]
fn test_gross_profit_fallback_and_revenue_growth() {
    let statement = two_year_statement();
    let analysis = analyze_with_defaults(&statement, None).unwrap();
    let series = &analysis.series;

    let fy23 = Period::Date(date(2023, 12, 31));
    let fy22 = Period::Date(date(2022, 12, 31));

    assert_eq!(series.rows()[0].period, fy23);
    assert_eq!(series.value(fy23, Field::GrossProfit), Some(60.0));
    assert_eq!(series.value(fy22, Field::GrossProfit), Some(54.0));

    let growth = series.value(fy23, Field::RevenueYoy).unwrap();
    assert!((growth - 11.11).abs() < 0.01, "Revenue Y/Y was {}", growth);
    assert_eq!(series.value(fy22, Field::RevenueYoy), None);

    assert!((series.value(fy23, Field::GrossMargin).unwrap() - 60.0).abs() < 1e-9);
    assert_eq!(series.value(fy23, Field::NetMargin), None);
}

#[test]
fn test_custom_expression_over_candidate_indices() {
    let statement = two_year_statement();
    let config = MappingConfig::default();
    let resolver = MappingResolver::new(&config);

    let report = resolver
        .resolve_all(
            &statement,
            &policies(&[(Field::Revenue, SelectionPolicy::Custom("1+2".to_string()))]),
        )
        .unwrap();
    assert!(report.resolution(Field::Revenue).unwrap().issue.is_none());

    let analysis = analyze(&statement, None, &report.mapping, &AnalysisOptions::default()).unwrap();
    let fy23 = Period::Date(date(2023, 12, 31));
    assert_eq!(analysis.series.value(fy23, Field::Revenue), Some(150.0));
    assert_eq!(analysis.series.value(fy23, Field::GrossProfit), Some(110.0));
}

#[test]
fn test_out_of_range_index_falls_back_to_first_alias() {
    let statement = two_year_statement();
    let config = MappingConfig::default();

    let report = MappingResolver::new(&config)
        .resolve_all(
            &statement,
            &policies(&[(Field::Revenue, SelectionPolicy::Custom("5".to_string()))]),
        )
        .unwrap();

    let resolution = report.resolution(Field::Revenue).unwrap();
    assert!(matches!(
        resolution.issue,
        Some(NormalizerError::OutOfRangeSelection { index: 5, len: 2 })
    ));
    assert_eq!(
        report.mapping.get(Field::Revenue),
        &FieldExpression::Direct("Total Revenue".to_string())
    );
}

#[test]
fn test_unsafe_input_is_rejected_not_executed() {
    let statement = two_year_statement();
    let config = MappingConfig::default();

    for input in ["__import__('os')", "1; 2", "1 ** 2", "1.5 * 2"] {
        let report = MappingResolver::new(&config)
            .resolve_all(
                &statement,
                &policies(&[(Field::Revenue, SelectionPolicy::Custom(input.to_string()))]),
            )
            .unwrap();
        let resolution = report.resolution(Field::Revenue).unwrap();
        assert!(resolution.issue.is_some(), "'{}' was accepted", input);
        assert_eq!(
            report.mapping.get(Field::Revenue),
            &FieldExpression::Direct("Total Revenue".to_string())
        );
    }
}

#[test]
fn test_ttm_row_first_and_regular_growth_unchanged() {
    let annual = two_year_statement();
    let quarterly = RawStatement::new(
        Granularity::SubAnnual,
        vec!["Total Revenue".to_string(), "Cost Of Revenue".to_string()],
        [
            (date(2024, 3, 31), 26.0),
            (date(2024, 6, 30), 27.0),
            (date(2024, 9, 30), 28.0),
            (date(2024, 12, 31), 29.0),
            (date(2023, 12, 31), 25.0),
        ]
        .iter()
        .map(|(d, revenue)| {
            StatementRow::new(*d)
                .with_value("Total Revenue", *revenue)
                .with_value("Cost Of Revenue", revenue * 0.4)
        })
        .collect(),
    );

    let with_ttm = analyze_with_defaults(&annual, Some(&quarterly)).unwrap();
    let without = analyze_with_defaults(&annual, None).unwrap();

    assert!(with_ttm.ttm.is_included());
    assert!(matches!(without.ttm, TtmStatus::Unavailable(_)));

    let first = &with_ttm.series.rows()[0];
    assert_eq!(first.period, Period::Ttm);
    assert_eq!(first.record.get(Field::Revenue), Some(110.0));
    assert!((first.record.get(Field::RevenueYoy).unwrap() - 10.0).abs() < 1e-9);
    assert!((first.record.get(Field::GrossMargin).unwrap() - 60.0).abs() < 1e-9);

    assert_eq!(with_ttm.series.without_ttm(), without.series);

    let metrics = key_metrics(&with_ttm.series);
    assert!((metrics.revenue_yoy.unwrap() - 10.0).abs() < 1e-9);
}

#[test]
fn test_mapping_persists_across_sessions() {
    let statement = two_year_statement();
    let config = MappingConfig::default();
    let report = MappingResolver::new(&config)
        .resolve_all(
            &statement,
            &policies(&[(Field::Revenue, SelectionPolicy::Custom("1 + 2".to_string()))]),
        )
        .unwrap();

    let json = report.mapping.to_json().unwrap();
    let reloaded = UserMapping::from_json(&json, &config).unwrap();
    assert_eq!(reloaded, report.mapping);

    let first = analyze(&statement, None, &report.mapping, &AnalysisOptions::default()).unwrap();
    let second = analyze(&statement, None, &reloaded, &AnalysisOptions::default()).unwrap();
    assert_eq!(first.series, second.series);
}

#[test]
fn test_demo_statement_end_to_end() {
    let annual = demo_statement("AAPL");
    let config = MappingConfig::default();
    let resolver = MappingResolver::new(&config);

    let defaults = resolver.resolve_defaults(&annual).unwrap();
    assert!(defaults.degraded_fields().contains(&Field::Revenue));
    assert_eq!(defaults.mapping.get(Field::Revenue), &FieldExpression::Unresolved);

    let report = resolver
        .resolve_all(
            &annual,
            &policies(&[(Field::Revenue, SelectionPolicy::Choose("Revenue".to_string()))]),
        )
        .unwrap();
    let analysis = analyze(&annual, None, &report.mapping, &AnalysisOptions::default()).unwrap();

    let fy23 = Period::Date(date(2023, 9, 30));
    let series = &analysis.series;
    assert_eq!(series.len(), 4);
    assert!((series.value(fy23, Field::RevenueYoy).unwrap() - 7.7938).abs() < 1e-3);
    assert!((series.value(fy23, Field::NetIncomeYoy).unwrap() + 4.7874).abs() < 1e-3);
    assert!((series.value(fy23, Field::GrossMargin).unwrap() - 42.6602).abs() < 1e-3);
    assert!((series.value(fy23, Field::TaxPercentage).unwrap() - 16.3430).abs() < 1e-3);
    assert_eq!(series.value(fy23, Field::Eps), Some(6.14));

    let table = DisplayTable::from_series(series, 1e6);
    assert!((table.value(fy23, Field::Revenue).unwrap() - 394_328.0).abs() < 1e-6);
}

#[test]
fn test_csv_export_to_file() {
    let analysis = analyze_with_defaults(&two_year_statement(), None).unwrap();
    let path = std::env::temp_dir().join(format!(
        "normalizer_export_{}.csv",
        std::process::id()
    ));

    export_csv(&analysis.series, 1.0, &path).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    let expected: Vec<String> = std::iter::once("Period".to_string())
        .chain(Field::OUTPUT_COLUMNS.iter().map(|f| f.to_string()))
        .collect();
    assert_eq!(headers, expected);

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(&rows[0][0], "2023-12-31");
    assert_eq!(&rows[0][1], "100.00");
    assert_eq!(&rows[0][3], "60.00");
    assert_eq!(&rows[0][16], "11.11%");

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_csv_ingestion_into_analysis() {
    let data = "Period,Total Revenue,Cost Of Revenue,Pretax Income,Net Income\n\
                2023-12-31,200,80,50,40\n\
                2022-12-31,160,70,,30\n";
    let statement =
        read_statement_csv(data.as_bytes(), CsvLayout::PeriodsAsRows, Granularity::Annual).unwrap();
    let analysis = analyze_with_defaults(&statement, None).unwrap();

    let fy23 = Period::Date(date(2023, 12, 31));
    let fy22 = Period::Date(date(2022, 12, 31));
    assert_eq!(analysis.series.value(fy23, Field::Taxes), Some(10.0));
    assert!((analysis.series.value(fy23, Field::TaxPercentage).unwrap() - 20.0).abs() < 1e-9);
    assert_eq!(analysis.series.value(fy22, Field::Taxes), None);
    assert!((analysis.series.value(fy23, Field::NetIncomeYoy).unwrap() - 33.333).abs() < 1e-3);
}
