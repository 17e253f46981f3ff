use crate::engine::{Period, TimeSeries};
use crate::error::Result;
use crate::schema::Field;
use crate::utils::{format_amount, format_decimal, format_percent};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// The final table in presentation form: fixed column order, monetary
/// columns divided by the display scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayTable {
    pub columns: Vec<Field>,
    pub rows: Vec<DisplayRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub period: Period,
    pub values: Vec<Option<f64>>,
}

impl DisplayTable {
    pub fn from_series(series: &TimeSeries, scale: f64) -> Self {
        let columns = Field::OUTPUT_COLUMNS.to_vec();
        let rows = series
            .rows()
            .iter()
            .map(|row| DisplayRow {
                period: row.period,
                values: columns
                    .iter()
                    .map(|field| {
                        let value = row.record.get(*field)?;
                        Some(if field.is_monetary() { value / scale } else { value })
                    })
                    .collect(),
            })
            .collect();

        Self { columns, rows }
    }

    pub fn value(&self, period: Period, field: Field) -> Option<f64> {
        let col = self.columns.iter().position(|f| *f == field)?;
        self.rows
            .iter()
            .find(|row| row.period == period)
            .and_then(|row| row.values[col])
    }
}

fn format_cell(field: Field, value: Option<f64>) -> String {
    if field.is_percentage() {
        format_percent(value)
    } else if field.is_monetary() {
        format_amount(value)
    } else {
        format_decimal(value)
    }
}

fn header() -> Vec<String> {
    std::iter::once("Period".to_string())
        .chain(Field::OUTPUT_COLUMNS.iter().map(|f| f.to_string()))
        .collect()
}

/// Formatted export of the display table.
pub fn write_csv<W: Write>(series: &TimeSeries, scale: f64, writer: W) -> Result<()> {
    let table = DisplayTable::from_series(series, scale);
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(header())?;
    for row in &table.rows {
        let mut record = vec![row.period.to_string()];
        record.extend(
            table
                .columns
                .iter()
                .zip(row.values.iter())
                .map(|(field, value)| format_cell(*field, *value)),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Unscaled numeric export. Missing values are empty cells.
pub fn write_raw_csv<W: Write>(series: &TimeSeries, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(header())?;
    for row in series.rows() {
        let mut record = vec![row.period.to_string()];
        record.extend(
            Field::OUTPUT_COLUMNS
                .iter()
                .map(|field| row.record.get(*field).map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn to_csv_string(series: &TimeSeries, scale: f64) -> Result<String> {
    let mut buffer = Vec::new();
    write_csv(series, scale, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn export_csv(series: &TimeSeries, scale: f64, path: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(series, scale, file)
}

pub fn to_markdown(series: &TimeSeries, scale: f64) -> String {
    let table = DisplayTable::from_series(series, scale);
    let mut output = String::new();

    output.push_str(&format!("| {} |\n", header().join(" | ")));
    output.push_str(&format!("|{}\n", "---|".repeat(table.columns.len() + 1)));

    for row in &table.rows {
        let cells: Vec<String> = table
            .columns
            .iter()
            .zip(row.values.iter())
            .map(|(field, value)| format_cell(*field, *value))
            .collect();
        output.push_str(&format!("| {} | {} |\n", row.period, cells.join(" | ")));
    }

    output
}

/// Headline figures taken from the first row of the series, the TTM row when
/// one is present.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct KeyMetrics {
    pub revenue_yoy: Option<f64>,
    pub net_income_yoy: Option<f64>,
    pub gross_margin: Option<f64>,
    pub net_margin: Option<f64>,
}

pub fn key_metrics(series: &TimeSeries) -> KeyMetrics {
    let Some(first) = series.rows().first() else {
        return KeyMetrics::default();
    };

    KeyMetrics {
        revenue_yoy: first.record.get(Field::RevenueYoy),
        net_income_yoy: first.record.get(Field::NetIncomeYoy),
        gross_margin: first.record.get(Field::GrossMargin),
        net_margin: first.record.get(Field::NetMargin),
    }
}
