//! # Financial Statement Normalizer
//!
//! A library for normalizing vendor-reported income statement line items into
//! a canonical schema and deriving a consistent time series of margins,
//! growth rates and trailing-twelve-month aggregates.
//!
//! ## Core Concepts
//!
//! - **Raw Statement**: periods × vendor line items, with arbitrary column names
//! - **Mapping**: one [`FieldExpression`] per canonical target field, either a
//!   direct column, a restricted arithmetic expression over columns, or unresolved
//! - **Derivation**: per-period fallbacks (Gross Profit, Operating Income, Taxes),
//!   margins, then Y/Y growth across the whole series
//! - **TTM**: a synthetic period summed from the most recent sub-annual periods,
//!   always placed first and never part of the chronological Y/Y chain
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_statement_normalizer::*;
//! use std::collections::BTreeMap;
//!
//! let annual = sample::demo_statement("AAPL");
//! let config = MappingConfig::default();
//!
//! // The demo data reports revenue under a name that is not a default alias.
//! let mut policies = BTreeMap::new();
//! policies.insert(Field::Revenue, SelectionPolicy::Choose("Revenue".to_string()));
//!
//! let resolved = MappingResolver::new(&config).resolve_all(&annual, &policies)?;
//! let analysis = analyze(&annual, None, &resolved.mapping, &AnalysisOptions::default())?;
//!
//! println!("{}", report::to_markdown(&analysis.series, 1_000_000.0));
//! ```

pub mod engine;
pub mod error;
pub mod expression;
pub mod ingestion;
pub mod mapping;
pub mod report;
pub mod sample;
pub mod schema;
pub mod statement;
pub mod ttm;
pub mod utils;

pub use engine::{DerivationEngine, Period, Record, SeriesRow, TimeSeries};
pub use error::{NormalizerError, Result};
pub use expression::{Expr, FieldExpression, Operator};
pub use ingestion::*;
pub use mapping::{
    find_candidates, preview_candidates, preview_expression, resolve, CandidatePreview,
    Candidates, MappingReport, MappingResolver, Resolution, SelectionPolicy, UserMapping,
};
pub use report::{key_metrics, KeyMetrics};
pub use schema::*;
pub use statement::*;
pub use ttm::TtmAggregator;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;

/// Outcome of the TTM step for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TtmStatus {
    /// A TTM row was prepended, summed over `periods` sub-annual periods
    /// ending at `window_end`.
    Included { window_end: NaiveDate, periods: usize },
    /// TTM was requested but could not be built. The series has no TTM row.
    Unavailable(String),
    /// TTM was switched off in the options.
    Disabled,
}

impl TtmStatus {
    pub fn is_included(&self) -> bool {
        matches!(self, TtmStatus::Included { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub series: TimeSeries,
    pub ttm: TtmStatus,
}

pub struct StatementAnalyzer;

impl StatementAnalyzer {
    /// Derives the full time series for `annual`, optionally with a TTM row
    /// built from `sub_annual`.
    ///
    /// Only an empty annual statement is fatal. Any TTM problem is reported
    /// through [`TtmStatus::Unavailable`] and the regular series is returned
    /// unchanged.
    pub fn analyze(
        annual: &RawStatement,
        sub_annual: Option<&RawStatement>,
        mapping: &UserMapping,
        options: &AnalysisOptions,
    ) -> Result<Analysis> {
        options.validate()?;

        info!(
            "Analyzing {} {:?} periods ({} raw columns)",
            annual.len(),
            annual.granularity(),
            annual.columns().len()
        );
        debug!("Unresolved fields: {:?}", mapping.unresolved_fields());

        let engine = DerivationEngine::new(mapping);
        let mut series = engine.build(annual)?;

        let ttm = if !options.include_ttm {
            TtmStatus::Disabled
        } else {
            match sub_annual {
                None => {
                    warn!("TTM skipped: no sub-annual statement supplied");
                    TtmStatus::Unavailable("no sub-annual statement supplied".to_string())
                }
                Some(statement) => {
                    let aggregator = TtmAggregator::new(options.ttm_periods);
                    let latest_annual = series.latest_regular().map(|row| row.record.clone());

                    match aggregator.build_record(statement, &engine, latest_annual.as_ref()) {
                        Ok((window_end, record)) => {
                            series.prepend_ttm(record);
                            TtmStatus::Included {
                                window_end,
                                periods: options.ttm_periods,
                            }
                        }
                        Err(e) => {
                            warn!("TTM skipped: {}", e);
                            TtmStatus::Unavailable(e.to_string())
                        }
                    }
                }
            }
        };

        Ok(Analysis { series, ttm })
    }
}

pub fn analyze(
    annual: &RawStatement,
    sub_annual: Option<&RawStatement>,
    mapping: &UserMapping,
    options: &AnalysisOptions,
) -> Result<Analysis> {
    StatementAnalyzer::analyze(annual, sub_annual, mapping, options)
}

/// Resolves every field with its first matching alias and analyzes with
/// default options.
pub fn analyze_with_defaults(
    annual: &RawStatement,
    sub_annual: Option<&RawStatement>,
) -> Result<Analysis> {
    let config = MappingConfig::default();
    let report = MappingResolver::new(&config).resolve_defaults(annual)?;
    StatementAnalyzer::analyze(annual, sub_annual, &report.mapping, &AnalysisOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn columns() -> Vec<String> {
        ["Total Revenue", "Cost Of Revenue", "Net Income"]
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    fn annual() -> RawStatement {
        RawStatement::new(
            Granularity::Annual,
            columns(),
            vec![
                StatementRow::new(date(2023, 12, 31))
                    .with_value("Total Revenue", 100.0)
                    .with_value("Cost Of Revenue", 40.0)
                    .with_value("Net Income", 10.0),
                StatementRow::new(date(2022, 12, 31))
                    .with_value("Total Revenue", 90.0)
                    .with_value("Cost Of Revenue", 36.0)
                    .with_value("Net Income", 8.0),
            ],
        )
    }

    fn quarterly(count: usize) -> RawStatement {
        let quarter_ends = [date(2024, 3, 31), date(2024, 6, 30), date(2024, 9, 30), date(2024, 12, 31)];
        let rows = quarter_ends
            .iter()
            .take(count)
            .map(|end| {
                StatementRow::new(*end)
                    .with_value("Total Revenue", 30.0)
                    .with_value("Cost Of Revenue", 12.0)
                    .with_value("Net Income", 3.0)
            })
            .collect();
        RawStatement::new(Granularity::SubAnnual, columns(), rows)
    }

    #[test]
    fn test_analysis_with_ttm_puts_ttm_first() {
        let analysis = analyze_with_defaults(&annual(), Some(&quarterly(4))).unwrap();

        assert_eq!(
            analysis.ttm,
            TtmStatus::Included {
                window_end: date(2024, 12, 31),
                periods: 4
            }
        );
        assert_eq!(analysis.series.len(), 3);
        let ttm = analysis.series.ttm().unwrap();
        assert_eq!(ttm.record.get(Field::Revenue), Some(120.0));
        assert!((ttm.record.get(Field::RevenueYoy).unwrap() - 20.0).abs() < 1e-9);
        assert!((ttm.record.get(Field::NetIncomeYoy).unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_ttm_failure_is_not_fatal() {
        let analysis = analyze_with_defaults(&annual(), Some(&quarterly(2))).unwrap();

        assert!(matches!(analysis.ttm, TtmStatus::Unavailable(_)));
        assert!(analysis.series.ttm().is_none());
        assert_eq!(analysis.series.len(), 2);
    }

    #[test]
    fn test_regular_growth_unaffected_by_ttm() {
        let with_ttm = analyze_with_defaults(&annual(), Some(&quarterly(4))).unwrap();
        let without = analyze_with_defaults(&annual(), None).unwrap();

        assert_eq!(with_ttm.series.without_ttm(), without.series);
    }

    #[test]
    fn test_disabled_ttm_and_invalid_options() {
        let config = MappingConfig::default();
        let report = MappingResolver::new(&config).resolve_defaults(&annual()).unwrap();

        let options = AnalysisOptions {
            include_ttm: false,
            ..AnalysisOptions::default()
        };
        let analysis = analyze(&annual(), Some(&quarterly(4)), &report.mapping, &options).unwrap();
        assert_eq!(analysis.ttm, TtmStatus::Disabled);
        assert!(analysis.series.ttm().is_none());

        let invalid = AnalysisOptions {
            ttm_periods: 0,
            ..AnalysisOptions::default()
        };
        assert!(matches!(
            analyze(&annual(), None, &report.mapping, &invalid),
            Err(NormalizerError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_empty_statement_is_fatal() {
        let empty = RawStatement::new(Granularity::Annual, columns(), vec![]);
        assert!(matches!(
            analyze_with_defaults(&empty, None),
            Err(NormalizerError::EmptyStatement)
        ));
    }
}
