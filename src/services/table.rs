// src/services/table.rs
use chrono::NaiveDate;
use csv::{Reader, Writer};
use log::debug;
use std::io::{Read, Write};

use crate::error::{Result, ValuationError};

/// Column holding the statement period in every financial statement table.
pub const REPORT_DATE: &str = "REPORT_DATE";

/// Flat row table as delivered upstream and stored in the cache: one header
/// row, every cell kept as text until a consumer asks for a number.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    label: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    cells: &'a [String],
}

impl Table {
    pub fn new(label: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Table {
            label: label.into(),
            headers,
            rows,
        }
    }

    pub fn from_reader<R: Read>(label: impl Into<String>, reader: R) -> Result<Self> {
        let label = label.into();
        let mut rdr = Reader::from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| ValuationError::malformed(&label, e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| ValuationError::malformed(&label, e.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        debug!("Parsed {} rows x {} columns for {}", rows.len(), headers.len(), label);

        Ok(Table { label, headers, rows })
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = Writer::from_writer(writer);
        wtr.write_record(&self.headers)
            .map_err(|e| ValuationError::malformed(&self.label, e.to_string()))?;
        for row in &self.rows {
            wtr.write_record(row)
                .map_err(|e| ValuationError::malformed(&self.label, e.to_string()))?;
        }
        wtr.flush().map_err(|e| ValuationError::malformed(&self.label, e.to_string()))?;
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row { table: self, cells })
    }

    /// Rows ordered by the date in `column`, oldest first. Rows with equal
    /// dates keep their upstream order.
    pub fn rows_by_date(&self, column: &str) -> Result<Vec<(NaiveDate, Row<'_>)>> {
        if self.column_index(column).is_none() {
            return Err(ValuationError::missing(&self.label, column));
        }
        let mut dated = self
            .rows()
            .map(|row| row.date(column).map(|date| (date, row)))
            .collect::<Result<Vec<_>>>()?;
        dated.sort_by_key(|(date, _)| *date);
        Ok(dated)
    }

    /// Most recent row by `column`.
    pub fn latest_by_date(&self, column: &str) -> Result<Row<'_>> {
        self.rows_by_date(column)?
            .pop()
            .map(|(_, row)| row)
            .ok_or_else(|| ValuationError::unavailable(&self.label, "table has no rows"))
    }
}

impl<'a> Row<'a> {
    pub fn get(&self, field: &str) -> Option<&'a str> {
        self.table
            .column_index(field)
            .and_then(|idx| self.cells.get(idx))
            .map(|cell| cell.trim())
    }

    /// Numeric field that must be present and parseable.
    pub fn number(&self, field: &str) -> Result<f64> {
        let raw = self
            .get(field)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ValuationError::missing(&self.table.label, field))?;
        parse_number(raw).ok_or_else(|| {
            ValuationError::malformed(&self.table.label, format!("{} is not numeric: '{}'", field, raw))
        })
    }

    /// Numeric field where an absent column or blank cell counts as zero.
    pub fn number_or_zero(&self, field: &str) -> Result<f64> {
        match self.get(field) {
            None | Some("") => Ok(0.0),
            Some(raw) => parse_number(raw).ok_or_else(|| {
                ValuationError::malformed(&self.table.label, format!("{} is not numeric: '{}'", field, raw))
            }),
        }
    }

    pub fn date(&self, field: &str) -> Result<NaiveDate> {
        let raw = self
            .get(field)
            .ok_or_else(|| ValuationError::missing(&self.table.label, field))?;
        parse_date(raw).ok_or_else(|| {
            ValuationError::malformed(&self.table.label, format!("{} is not a date: '{}'", field, raw))
        })
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(',', "");
    match cleaned.as_str() {
        "NaN" | "nan" | "None" | "null" => Some(0.0),
        other => other.parse::<f64>().ok(),
    }
}

/// Accepts `2024-03-31`, `2024-03-31 00:00:00` and `20240331`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(head) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INCOME_CSV: &str = "\
REPORT_DATE,TOTAL_OPERATE_INCOME,RESEARCH_EXPENSE,BASIC_EPS
2023-12-31 00:00:00,1000,50,0.8
2024-06-30 00:00:00,600,,0.4
2022-12-31 00:00:00,900,40,0.7
";

    fn income() -> Table {
        Table::from_reader("sz000598", INCOME_CSV.as_bytes()).unwrap()
    }

    #[test]
    fn latest_row_is_selected_by_report_date() {
        let table = income();
        let latest = table.latest_by_date(REPORT_DATE).unwrap();
        assert_eq!(latest.number("TOTAL_OPERATE_INCOME").unwrap(), 600.0);
        assert_eq!(latest.number_or_zero("RESEARCH_EXPENSE").unwrap(), 0.0);
        assert_eq!(latest.number_or_zero("NOT_A_COLUMN").unwrap(), 0.0);
    }

    #[test]
    fn rows_by_date_sorts_ascending() {
        let table = income();
        let dates: Vec<_> = table
            .rows_by_date(REPORT_DATE)
            .unwrap()
            .into_iter()
            .map(|(d, _)| d.to_string())
            .collect();
        assert_eq!(dates, vec!["2022-12-31", "2023-12-31", "2024-06-30"]);
    }

    #[test]
    fn missing_required_field_names_ticker_and_field() {
        let table = income();
        let row = table.latest_by_date(REPORT_DATE).unwrap();
        match row.number("MONETARYFUNDS").unwrap_err() {
            ValuationError::MissingField { ticker, field } => {
                assert_eq!(ticker, "sz000598");
                assert_eq!(field, "MONETARYFUNDS");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_date_column_is_reported() {
        let table = Table::new("sh600008", vec!["A".into()], vec![vec!["1".into()]]);
        assert!(matches!(
            table.latest_by_date(REPORT_DATE),
            Err(ValuationError::MissingField { .. })
        ));
    }

    #[test]
    fn csv_survives_write_and_read() {
        let table = income();
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let reread = Table::from_reader("sz000598", buf.as_slice()).unwrap();
        assert_eq!(reread, table);
    }

    #[test]
    fn parse_date_accepts_compact_form() {
        assert_eq!(parse_date("20240105"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_date("garbage"), None);
    }
}
