use crate::error::{NormalizerError, Result};
use crate::statement::{CellValue, Granularity, RawStatement, StatementRow};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// One reported value in long form, as delivered by most data providers.
#[derive(Debug, Clone)]
pub struct StatementLineItem {
    pub line_item: String,
    pub period: NaiveDate,
    pub value: CellValue,
}

pub fn convert_line_items_to_statement(
    items: &[StatementLineItem],
    granularity: Granularity,
) -> RawStatement {
    let mut columns: Vec<String> = Vec::new();
    let mut rows: BTreeMap<NaiveDate, StatementRow> = BTreeMap::new();

    for item in items {
        if !columns.contains(&item.line_item) {
            columns.push(item.line_item.clone());
        }
        rows.entry(item.period)
            .or_insert_with(|| StatementRow::new(item.period))
            .values
            .insert(item.line_item.clone(), item.value.clone());
    }

    RawStatement::new(granularity, columns, rows.into_values().collect())
}

/// Orientation of a wide CSV statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    /// Header `Period,<line item>,...`; one row per period.
    PeriodsAsRows,
    /// Header `<label>,<period>,...`; one row per line item.
    PeriodsAsColumns,
}

fn parse_period(text: &str) -> Result<NaiveDate> {
    let trimmed = text.trim();
    let date_part = trimmed.split([' ', 'T']).next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| NormalizerError::InvalidPeriod(trimmed.to_string()))
}

fn parse_cell(text: &str) -> CellValue {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("n/a")
    {
        return CellValue::Missing;
    }
    match trimmed.replace(',', "").parse::<f64>() {
        Ok(v) => CellValue::Number(v),
        Err(_) => CellValue::Text(trimmed.to_string()),
    }
}

pub fn read_statement_csv<R: Read>(
    reader: R,
    layout: CsvLayout,
    granularity: Granularity,
) -> Result<RawStatement> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    match layout {
        CsvLayout::PeriodsAsRows => {
            let columns: Vec<String> = headers.iter().skip(1).cloned().collect();
            let mut rows = Vec::new();

            for record in csv_reader.records() {
                let record = record?;
                let Some(period) = record.get(0) else {
                    continue;
                };
                if period.trim().is_empty() {
                    continue;
                }
                let mut row = StatementRow::new(parse_period(period)?);
                for (column, cell) in columns.iter().zip(record.iter().skip(1)) {
                    row.values.insert(column.clone(), parse_cell(cell));
                }
                rows.push(row);
            }

            Ok(RawStatement::new(granularity, columns, rows))
        }

        CsvLayout::PeriodsAsColumns => {
            let periods = headers
                .iter()
                .skip(1)
                .map(|h| parse_period(h))
                .collect::<Result<Vec<NaiveDate>>>()?;
            let mut rows: Vec<StatementRow> =
                periods.iter().map(|p| StatementRow::new(*p)).collect();
            let mut columns = Vec::new();

            for record in csv_reader.records() {
                let record = record?;
                let Some(line_item) = record.get(0).map(str::trim) else {
                    continue;
                };
                if line_item.is_empty() {
                    continue;
                }
                columns.push(line_item.to_string());
                for (row, cell) in rows.iter_mut().zip(record.iter().skip(1)) {
                    row.values.insert(line_item.to_string(), parse_cell(cell));
                }
            }

            Ok(RawStatement::new(granularity, columns, rows))
        }
    }
}

pub fn read_statement_csv_file(
    path: impl AsRef<Path>,
    layout: CsvLayout,
    granularity: Granularity,
) -> Result<RawStatement> {
    let file = std::fs::File::open(path)?;
    read_statement_csv(file, layout, granularity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_line_items_become_rows_in_first_seen_column_order() {
        let items = vec![
            StatementLineItem {
                line_item: "Total Revenue".to_string(),
                period: date(2022, 12, 31),
                value: CellValue::Number(90.0),
            },
            StatementLineItem {
                line_item: "Cost Of Revenue".to_string(),
                period: date(2023, 12, 31),
                value: CellValue::Number(40.0),
            },
            StatementLineItem {
                line_item: "Total Revenue".to_string(),
                period: date(2023, 12, 31),
                value: CellValue::Number(100.0),
            },
        ];

        let statement = convert_line_items_to_statement(&items, Granularity::Annual);
        assert_eq!(statement.columns(), &["Total Revenue", "Cost Of Revenue"]);
        assert_eq!(statement.len(), 2);
        assert_eq!(statement.latest().unwrap().number("Total Revenue"), Some(100.0));
        assert_eq!(statement.rows()[1].number("Cost Of Revenue"), None);
    }

    #[test]
    fn test_read_periods_as_rows() {
        let data = "Period,Total Revenue,Cost Of Revenue,Note\n\
                    2022-12-31,90,36,\n\
                    2023-12-31,\"1,000\",NaN,restated\n";
        let statement =
            read_statement_csv(data.as_bytes(), CsvLayout::PeriodsAsRows, Granularity::Annual)
                .unwrap();

        let latest = statement.latest().unwrap();
        assert_eq!(latest.period, date(2023, 12, 31));
        assert_eq!(latest.number("Total Revenue"), Some(1000.0));
        assert_eq!(latest.get("Cost Of Revenue"), Some(&CellValue::Missing));
        assert_eq!(latest.get("Note"), Some(&CellValue::Text("restated".to_string())));
    }

    #[test]
    fn test_read_periods_as_columns() {
        let data = "Line Item,2024-03-31 00:00:00,2023-12-31\n\
                    Total Revenue,45,40\n\
                    Cost Of Revenue,18,\n";
        let statement = read_statement_csv(
            data.as_bytes(),
            CsvLayout::PeriodsAsColumns,
            Granularity::SubAnnual,
        )
        .unwrap();

        assert_eq!(statement.columns(), &["Total Revenue", "Cost Of Revenue"]);
        assert_eq!(statement.latest().unwrap().number("Cost Of Revenue"), Some(18.0));
        assert_eq!(statement.rows()[1].number("Cost Of Revenue"), None);
    }

    #[test]
    fn test_bad_period_is_an_error() {
        let data = "Period,Total Revenue\nFY2023,100\n";
        let result =
            read_statement_csv(data.as_bytes(), CsvLayout::PeriodsAsRows, Granularity::Annual);
        assert!(matches!(result, Err(NormalizerError::InvalidPeriod(_))));
    }
}
