//! Bundled annual income statements for offline use and demos.
//!
//! Figures are in the reporting currency (USD), most recent fiscal year
//! first. Revenue is reported under the vendor name `Revenue`, which is not a
//! default alias, so these statements also exercise degraded candidate mode.

use crate::statement::{Granularity, RawStatement, StatementRow};
use chrono::NaiveDate;

pub const DEMO_TICKERS: [&str; 3] = ["AAPL", "MSFT", "GOOGL"];

const COLUMNS: [&str; 10] = [
    "Revenue",
    "Cost Of Revenue",
    "Gross Profit",
    "Selling General And Administration",
    "Research And Development",
    "Operating Income",
    "Pretax Income",
    "Income Tax Expense",
    "Net Income",
    "Diluted EPS",
];

struct DemoData {
    dates: [(i32, u32, u32); 4],
    values: [[f64; 4]; 10],
}

const AAPL: DemoData = DemoData {
    dates: [(2023, 9, 30), (2022, 9, 30), (2021, 9, 30), (2020, 9, 30)],
    values: [
        [394328000000.0, 365817000000.0, 274515000000.0, 260174000000.0],
        [226107000000.0, 208168000000.0, 152836000000.0, 161782000000.0],
        [168221000000.0, 157649000000.0, 121679000000.0, 98392000000.0],
        [26474000000.0, 25094000000.0, 21973000000.0, 19916000000.0],
        [29915000000.0, 26251000000.0, 21914000000.0, 18752000000.0],
        [111832000000.0, 109552000000.0, 94680000000.0, 66288000000.0],
        [113645000000.0, 109272000000.0, 94680000000.0, 67091000000.0],
        [18573000000.0, 14089000000.0, 14527000000.0, 9680000000.0],
        [95025000000.0, 99803000000.0, 94680000000.0, 57411000000.0],
        [6.14, 6.11, 5.61, 3.28],
    ],
};

const MSFT: DemoData = DemoData {
    dates: [(2023, 6, 30), (2022, 6, 30), (2021, 6, 30), (2020, 6, 30)],
    values: [
        [211915000000.0, 198270000000.0, 168088000000.0, 143015000000.0],
        [70950000000.0, 65812000000.0, 52232000000.0, 46078000000.0],
        [140965000000.0, 132458000000.0, 115856000000.0, 96937000000.0],
        [42513000000.0, 39585000000.0, 35327000000.0, 29539000000.0],
        [27155000000.0, 24512000000.0, 20716000000.0, 19269000000.0],
        [88389000000.0, 83383000000.0, 69916000000.0, 52959000000.0],
        [88092000000.0, 83386000000.0, 71102000000.0, 53036000000.0],
        [10605000000.0, 10978000000.0, 9831000000.0, 8755000000.0],
        [77487000000.0, 72738000000.0, 61271000000.0, 44281000000.0],
        [10.31, 9.65, 8.05, 5.76],
    ],
};

const GOOGL: DemoData = DemoData {
    dates: [(2023, 12, 31), (2022, 12, 31), (2021, 12, 31), (2020, 12, 31)],
    values: [
        [307394000000.0, 282836000000.0, 257637000000.0, 182527000000.0],
        [131380000000.0, 126203000000.0, 110939000000.0, 84732000000.0],
        [176014000000.0, 156633000000.0, 146698000000.0, 97795000000.0],
        [45567000000.0, 43026000000.0, 37702000000.0, 31023000000.0],
        [44861000000.0, 39500000000.0, 31562000000.0, 27573000000.0],
        [84486000000.0, 73972000000.0, 78714000000.0, 41224000000.0],
        [84800000000.0, 76033000000.0, 86692000000.0, 42733000000.0],
        [11907000000.0, 13118000000.0, 14701000000.0, 7813000000.0],
        [73800000000.0, 59972000000.0, 76033000000.0, 40269000000.0],
        [5.80, 4.56, 5.61, 2.93],
    ],
};

/// Demo annual statement for `ticker`. Unknown tickers get AAPL.
pub fn demo_statement(ticker: &str) -> RawStatement {
    let data = match ticker.trim().to_uppercase().as_str() {
        "MSFT" => &MSFT,
        "GOOGL" => &GOOGL,
        _ => &AAPL,
    };

    let rows = data
        .dates
        .iter()
        .enumerate()
        .filter_map(|(period_idx, &(y, m, d))| {
            let date = NaiveDate::from_ymd_opt(y, m, d)?;
            let row = COLUMNS
                .iter()
                .zip(data.values.iter())
                .fold(StatementRow::new(date), |row, (column, series)| {
                    row.with_value(*column, series[period_idx])
                });
            Some(row)
        })
        .collect();

    RawStatement::new(
        Granularity::Annual,
        COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
    )
}

pub fn is_demo_ticker(ticker: &str) -> bool {
    let upper = ticker.trim().to_uppercase();
    DEMO_TICKERS.iter().any(|t| *t == upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_statement_shape() {
        let statement = demo_statement("msft");
        assert_eq!(statement.len(), 4);
        assert_eq!(statement.columns().len(), 10);
        let latest = statement.latest().unwrap();
        assert_eq!(latest.period, NaiveDate::from_ymd_opt(2023, 6, 30).unwrap());
        assert_eq!(latest.number("Diluted EPS"), Some(10.31));
    }

    #[test]
    fn test_unknown_ticker_falls_back_to_aapl() {
        assert!(!is_demo_ticker("TSLA"));
        assert!(is_demo_ticker(" googl "));
        assert_eq!(demo_statement("TSLA"), demo_statement("AAPL"));
    }
}
