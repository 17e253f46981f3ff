use crate::engine::{DerivationEngine, Record};
use crate::error::{NormalizerError, Result};
use crate::schema::Field;
use crate::statement::{CellValue, Granularity, RawStatement, StatementRow};
use crate::utils::relative_change;
use chrono::NaiveDate;
use log::debug;

pub const DEFAULT_TTM_PERIODS: usize = 4;

/// Builds the synthetic trailing-twelve-month period from sub-annual data.
#[derive(Debug, Clone, Copy)]
pub struct TtmAggregator {
    periods: usize,
}

impl Default for TtmAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_TTM_PERIODS)
    }
}

impl TtmAggregator {
    pub fn new(periods: usize) -> Self {
        Self { periods }
    }

    /// Sums every raw column over the most recent sub-annual periods.
    ///
    /// Missing cells count as zero, so a column with no numeric value in the
    /// window sums to zero. The returned row is dated at the most recent
    /// period in the window.
    pub fn aggregate(&self, statement: &RawStatement) -> Result<StatementRow> {
        if statement.granularity() != Granularity::SubAnnual {
            return Err(NormalizerError::TtmUnavailable(
                "statement is not sub-annual".to_string(),
            ));
        }
        if self.periods == 0 {
            return Err(NormalizerError::TtmUnavailable(
                "window of zero periods".to_string(),
            ));
        }
        if statement.len() < self.periods {
            return Err(NormalizerError::TtmUnavailable(format!(
                "need {} sub-annual periods, found {}",
                self.periods,
                statement.len()
            )));
        }

        let window = &statement.rows()[..self.periods];
        let mut summed = StatementRow::new(window[0].period);

        for column in statement.columns() {
            let total: f64 = window.iter().filter_map(|row| row.number(column)).sum();
            summed.values.insert(column.clone(), CellValue::Number(total));
        }

        debug!(
            "TTM window {} .. {} over {} columns",
            window[self.periods - 1].period,
            window[0].period,
            statement.columns().len()
        );

        Ok(summed)
    }

    /// Full TTM record: mapping, fallbacks and margins, plus growth against
    /// the latest annual record. Returned with the end of the summed window.
    pub fn build_record(
        &self,
        statement: &RawStatement,
        engine: &DerivationEngine<'_>,
        latest_annual: Option<&Record>,
    ) -> Result<(NaiveDate, Record)> {
        let summed = self.aggregate(statement)?;
        let mut record = engine.derive_period(&summed);
        apply_ttm_growth(&mut record, latest_annual);
        Ok((summed.period, record))
    }
}

/// TTM Y/Y compares against the most recent annual period, not the prior
/// quarter.
pub fn apply_ttm_growth(ttm: &mut Record, latest_annual: Option<&Record>) {
    let base = |field: Field| latest_annual.and_then(|r| r.get(field));

    let revenue_yoy = relative_change(ttm.get(Field::Revenue), base(Field::Revenue));
    let net_income_yoy = relative_change(ttm.get(Field::NetIncome), base(Field::NetIncome));

    ttm.set(Field::RevenueYoy, revenue_yoy);
    ttm.set(Field::NetIncomeYoy, net_income_yoy);
}
