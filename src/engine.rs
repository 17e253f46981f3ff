use crate::error::{NormalizerError, Result};
use crate::mapping::UserMapping;
use crate::schema::Field;
use crate::statement::{RawStatement, StatementRow};
use crate::utils::{pct_change, percentage_of};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical values for one period. An absent field is unresolved, which is
/// distinct from zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<Field, f64>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        self.values.get(&field).copied()
    }

    pub fn is_resolved(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    /// Stores a value; `None` or a non-finite number clears the field.
    pub fn set(&mut self, field: Field, value: Option<f64>) {
        match value.filter(|v| v.is_finite()) {
            Some(v) => {
                self.values.insert(field, v);
            }
            None => {
                self.values.remove(&field);
            }
        }
    }

    pub fn with(mut self, field: Field, value: f64) -> Self {
        self.set(field, Some(value));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        self.values.iter().map(|(f, v)| (*f, *v))
    }
}

/// Row key of a [`TimeSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Period {
    /// Synthetic trailing-twelve-month period.
    Ttm,
    Date(NaiveDate),
}

impl Period {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Period::Ttm => None,
            Period::Date(d) => Some(*d),
        }
    }

    pub fn is_ttm(&self) -> bool {
        matches!(self, Period::Ttm)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Ttm => f.write_str("TTM"),
            Period::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl TryFrom<String> for Period {
    type Error = NormalizerError;

    fn try_from(value: String) -> Result<Self> {
        if value.eq_ignore_ascii_case("TTM") {
            return Ok(Period::Ttm);
        }
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map(Period::Date)
            .map_err(|_| NormalizerError::InvalidPeriod(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub period: Period,
    pub record: Record,
}

/// Derived records, most recent first. A TTM row, when present, is always
/// the first row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    rows: Vec<SeriesRow>,
}

impl TimeSeries {
    pub fn rows(&self) -> &[SeriesRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ttm(&self) -> Option<&SeriesRow> {
        self.rows.first().filter(|row| row.period.is_ttm())
    }

    pub fn regular(&self) -> impl Iterator<Item = &SeriesRow> {
        self.rows.iter().filter(|row| !row.period.is_ttm())
    }

    /// Most recent non-TTM record.
    pub fn latest_regular(&self) -> Option<&SeriesRow> {
        self.regular().next()
    }

    pub fn get(&self, period: Period) -> Option<&Record> {
        self.rows
            .iter()
            .find(|row| row.period == period)
            .map(|row| &row.record)
    }

    pub fn value(&self, period: Period, field: Field) -> Option<f64> {
        self.get(period).and_then(|record| record.get(field))
    }

    /// The regular periods only, as plotted by charts.
    pub fn without_ttm(&self) -> Self {
        Self {
            rows: self.regular().cloned().collect(),
        }
    }

    /// Puts a TTM record in front, replacing any previous one.
    pub(crate) fn prepend_ttm(&mut self, record: Record) {
        self.rows.retain(|row| !row.period.is_ttm());
        self.rows.insert(
            0,
            SeriesRow {
                period: Period::Ttm,
                record,
            },
        );
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Derives fields that are structurally computable but unresolved.
///
/// Returns the fallbacks that had to be skipped because a prerequisite was
/// itself unresolved.
pub fn apply_fallbacks(record: &mut Record) -> Vec<NormalizerError> {
    let mut skipped = Vec::new();

    if !record.is_resolved(Field::GrossProfit) {
        match (record.get(Field::Revenue), record.get(Field::TotalCogs)) {
            (Some(revenue), Some(cogs)) => record.set(Field::GrossProfit, Some(revenue - cogs)),
            (None, _) => skipped.push(missing(Field::GrossProfit, Field::Revenue)),
            (_, None) => skipped.push(missing(Field::GrossProfit, Field::TotalCogs)),
        }
    }

    let opex = [
        Field::SellingGeneralAdministrative,
        Field::ResearchDevelopment,
        Field::SalesMarketing,
    ]
    .iter()
    .map(|f| record.get(*f).unwrap_or(0.0))
    .sum::<f64>();
    record.set(Field::OperatingExpenses, Some(opex));

    if !record.is_resolved(Field::OperatingIncome) {
        match record.get(Field::GrossProfit) {
            Some(gross) => record.set(Field::OperatingIncome, Some(gross - opex)),
            None => skipped.push(missing(Field::OperatingIncome, Field::GrossProfit)),
        }
    }

    if !record.is_resolved(Field::Taxes) {
        match (record.get(Field::PretaxIncome), record.get(Field::NetIncome)) {
            (Some(pretax), Some(net)) => record.set(Field::Taxes, Some(pretax - net)),
            (None, _) => skipped.push(missing(Field::Taxes, Field::PretaxIncome)),
            (_, None) => skipped.push(missing(Field::Taxes, Field::NetIncome)),
        }
    }

    skipped
}

fn missing(field: Field, prerequisite: Field) -> NormalizerError {
    NormalizerError::MissingAggregateSource {
        field,
        missing: prerequisite,
    }
}

/// Gross, net and operating margin plus tax percentage, each guarded against
/// a missing or zero denominator.
pub fn apply_margins(record: &mut Record) {
    let revenue = record.get(Field::Revenue);
    let pretax = record.get(Field::PretaxIncome);

    let gross = percentage_of(record.get(Field::GrossProfit), revenue);
    let net = percentage_of(record.get(Field::NetIncome), revenue);
    let operating = percentage_of(record.get(Field::OperatingIncome), revenue);
    let tax = percentage_of(record.get(Field::Taxes), pretax);

    record.set(Field::GrossMargin, gross);
    record.set(Field::NetMargin, net);
    record.set(Field::OperatingMargin, operating);
    record.set(Field::TaxPercentage, tax);
}

/// Revenue and Net Income Y/Y for the regular rows, each compared with the
/// chronologically preceding regular row. TTM rows are left untouched.
pub fn apply_growth(rows: &mut [SeriesRow]) {
    let mut chronological: Vec<(NaiveDate, usize)> = rows
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| row.period.date().map(|d| (d, idx)))
        .collect();
    chronological.sort_by_key(|(date, _)| *date);

    let mut prior: Option<(Option<f64>, Option<f64>)> = None;
    for (_, idx) in chronological {
        let record = &mut rows[idx].record;
        let revenue = record.get(Field::Revenue);
        let net_income = record.get(Field::NetIncome);

        let (revenue_yoy, net_income_yoy) = match prior {
            Some((prev_revenue, prev_net)) => (
                pct_change(revenue, prev_revenue),
                pct_change(net_income, prev_net),
            ),
            None => (None, None),
        };
        record.set(Field::RevenueYoy, revenue_yoy);
        record.set(Field::NetIncomeYoy, net_income_yoy);

        prior = Some((revenue, net_income));
    }
}

/// Applies a resolved mapping to statement rows and derives the canonical
/// metrics.
pub struct DerivationEngine<'a> {
    mapping: &'a UserMapping,
}

impl<'a> DerivationEngine<'a> {
    pub fn new(mapping: &'a UserMapping) -> Self {
        Self { mapping }
    }

    pub fn map_row(&self, row: &StatementRow) -> Record {
        let mut record = Record::new();
        for (field, expression) in self.mapping.iter() {
            record.set(field, expression.evaluate(row));
        }
        record
    }

    /// Mapping, fallbacks and margins for one period. Growth needs the whole
    /// series and is applied separately.
    pub fn derive_period(&self, row: &StatementRow) -> Record {
        let mut record = self.map_row(row);
        for skipped in apply_fallbacks(&mut record) {
            debug!("{}: {}", row.period, skipped);
        }
        apply_margins(&mut record);
        record
    }

    pub fn build(&self, statement: &RawStatement) -> Result<TimeSeries> {
        if statement.is_empty() {
            return Err(NormalizerError::EmptyStatement);
        }

        let mut rows: Vec<SeriesRow> = statement
            .rows()
            .iter()
            .map(|row| SeriesRow {
                period: Period::Date(row.period),
                record: self.derive_period(row),
            })
            .collect();

        apply_growth(&mut rows);
        rows.sort_by(|a, b| b.period.date().cmp(&a.period.date()));

        Ok(TimeSeries { rows })
    }
}
