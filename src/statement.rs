use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Fiscal-year statements.
    Annual,
    /// Quarterly (or other sub-annual) statements, the source for TTM.
    SubAnnual,
}

/// One reported cell. Vendors occasionally ship numbers as text, so text is
/// kept and parsed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Missing,
}

impl CellValue {
    /// Numeric reading of the cell. NaN, infinities and unparsable text are
    /// treated as missing.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            CellValue::Number(v) => *v,
            CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
            CellValue::Missing => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(CellValue::Missing, CellValue::Number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub period: NaiveDate,
    pub values: BTreeMap<String, CellValue>,
}

impl StatementRow {
    pub fn new(period: NaiveDate) -> Self {
        Self {
            period,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.values.get(column)
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(CellValue::as_number)
    }
}

/// A raw column listed with its most recent value, for review before mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnOverview {
    /// 1-based position, the number a user types to select the column.
    pub index: usize,
    pub column: String,
    pub latest_value: Option<f64>,
}

/// Period-indexed table of vendor line items, most recent period first.
///
/// Read-only once built: the core never mutates provider data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawStatement {
    granularity: Granularity,
    columns: Vec<String>,
    rows: Vec<StatementRow>,
}

impl RawStatement {
    /// Builds a statement. `columns` fixes the vendor column order; keys found
    /// in rows but not listed are appended in name order.
    pub fn new(granularity: Granularity, columns: Vec<String>, mut rows: Vec<StatementRow>) -> Self {
        let mut seen: HashSet<String> = HashSet::new();
        let mut ordered: Vec<String> = columns
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect();

        for row in &rows {
            for key in row.values.keys() {
                if seen.insert(key.clone()) {
                    ordered.push(key.clone());
                }
            }
        }

        rows.sort_by(|a, b| b.period.cmp(&a.period));

        Self {
            granularity,
            columns: ordered,
            rows,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[StatementRow] {
        &self.rows
    }

    pub fn latest(&self) -> Option<&StatementRow> {
        self.rows.first()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn find_column_ignore_case(&self, name: &str) -> Option<&str> {
        let wanted = name.to_lowercase();
        self.columns
            .iter()
            .find(|c| c.to_lowercase() == wanted)
            .map(String::as_str)
    }

    pub fn column_overview(&self) -> Vec<ColumnOverview> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, column)| ColumnOverview {
                index: i + 1,
                column: column.clone(),
                latest_value: self.latest().and_then(|row| row.number(column)),
            })
            .collect()
    }
}
