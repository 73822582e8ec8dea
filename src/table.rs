//! In-memory working table.
//!
//! Columns are kept in file order so a load/save cycle does not reshuffle the
//! operator's spreadsheet. Empty cells are treated as absent values.

use crate::errors::AppError;
use std::collections::HashMap;

/// Column names of the working table.
pub mod columns {
    pub const FIRST_NAME: &str = "שם פרטי";
    pub const LAST_NAME: &str = "שם משפחה";
    pub const ROLE: &str = "תפקיד";
    pub const TOPICS: &str = "נושאים";
    pub const EMAIL: &str = "דוא\"ל";
    pub const MOBILE: &str = "נייד";

    pub const CONFIDENCE_SCORE: &str = "confidence_score";
    pub const LAST_UPDATED: &str = "last_updated";
    pub const UPDATE_NOTES: &str = "update_notes";
    pub const DECISION: &str = "decision";
    pub const SOURCE_URLS: &str = "source_urls";
    pub const SEARCH_HISTORY: &str = "search_history";

    /// Processing metadata, appended on first run when missing.
    pub const METADATA: [&str; 6] = [
        CONFIDENCE_SCORE,
        LAST_UPDATED,
        UPDATE_NOTES,
        DECISION,
        SOURCE_URLS,
        SEARCH_HISTORY,
    ];
}

/// Sheet row number of the first data row (row 1 holds the header).
pub const FIRST_DATA_ROW: usize = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingTable {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl WorkingTable {
    pub fn new(headers: Vec<String>) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Self {
            headers,
            index,
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding short rows to the header width.
    ///
    /// A row carrying non-blank cells beyond the last header is rejected, since
    /// saving it back would drop those cells. Trailing blank cells are dropped.
    pub fn push_row(&mut self, mut values: Vec<String>) -> Result<(), AppError> {
        let width = self.headers.len();
        if let Some(extra) = values.iter().skip(width).position(|v| !v.trim().is_empty()) {
            return Err(AppError::Storage(format!(
                "Row {} has a value in column {} but the header has only {} columns",
                row_number(self.rows.len()),
                width + extra + 1,
                width
            )));
        }
        values.resize(width, String::new());
        self.rows.push(values);
        Ok(())
    }

    /// First header name that appears more than once, ignoring blank headers.
    pub fn duplicate_header(headers: &[String]) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        headers
            .iter()
            .map(|h| h.as_str())
            .filter(|h| !h.trim().is_empty())
            .find(|h| !seen.insert(*h))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    /// Adds `column` at the end with empty cells. No-op if it already exists.
    pub fn ensure_column(&mut self, column: &str) -> bool {
        if self.has_column(column) {
            return false;
        }
        self.index.insert(column.to_string(), self.headers.len());
        self.headers.push(column.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        true
    }

    pub fn ensure_metadata_columns(&mut self) -> usize {
        columns::METADATA
            .iter()
            .filter(|column| self.ensure_column(column))
            .count()
    }

    /// Value of a cell, `None` when the column is missing or the cell is blank.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = *self.index.get(column)?;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Writes a cell, creating the column if needed. `None` clears it.
    pub fn set(&mut self, row: usize, column: &str, value: Option<String>) {
        if row >= self.rows.len() {
            return;
        }
        self.ensure_column(column);
        let col = self.index[column];
        self.rows[row][col] = value.unwrap_or_default();
    }

    /// Returns the row as (header, value) pairs in column order.
    pub fn row_fields(&self, row: usize) -> Option<Vec<(&str, &str)>> {
        self.rows.get(row).map(|values| {
            self.headers
                .iter()
                .map(|h| h.as_str())
                .zip(values.iter().map(|v| v.as_str()))
                .collect()
        })
    }

    /// Display name: given and family name joined by a space.
    pub fn full_name(&self, row: usize) -> Option<String> {
        let first = self.get(row, columns::FIRST_NAME).map(str::trim);
        let last = self.get(row, columns::LAST_NAME).map(str::trim);
        match (first, last) {
            (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
            (Some(n), None) | (None, Some(n)) => Some(n.to_string()),
            (None, None) => None,
        }
    }

    /// Stored confidence. Accepts spreadsheet renderings like `85.0`.
    pub fn confidence(&self, row: usize) -> Option<u8> {
        self.get(row, columns::CONFIDENCE_SCORE)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|c| (0.0..=100.0).contains(c))
            .map(|c| c.round() as u8)
    }

    /// Builds a table with the same headers and only the given rows.
    pub fn subset(&self, rows: &[usize]) -> WorkingTable {
        let mut table = WorkingTable::new(self.headers.clone());
        for &row in rows {
            if let Some(values) = self.rows.get(row) {
                table.rows.push(values.clone());
            }
        }
        table
    }
}

/// Converts a data index to the sheet row number shown to operators.
pub fn row_number(index: usize) -> usize {
    index + FIRST_DATA_ROW
}

/// Converts a sheet row number to a data index.
pub fn row_index(row_number: usize) -> Option<usize> {
    row_number.checked_sub(FIRST_DATA_ROW)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkingTable {
        let mut table = WorkingTable::new(vec![
            columns::FIRST_NAME.to_string(),
            columns::LAST_NAME.to_string(),
            columns::ROLE.to_string(),
        ]);
        table
            .push_row(vec!["אבי".into(), "וייס".into(), "Reporter @ OutletA".into()])
            .unwrap();
        table.push_row(vec!["".into(), "".into()]).unwrap();
        table
    }

    #[test]
    fn test_wide_row_with_values_is_rejected() {
        let mut table = sample();
        let result = table.push_row(vec![
            "דנה".into(),
            "כהן".into(),
            "".into(),
            "extra-note".into(),
        ]);

        match result {
            Err(AppError::Storage(msg)) => {
                assert!(msg.contains("Row 4"), "{}", msg);
                assert!(msg.contains("column 4"), "{}", msg);
            }
            other => panic!("expected storage error, got {:?}", other),
        }
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_trailing_blank_cells_are_dropped() {
        let mut table = sample();
        table
            .push_row(vec!["דנה".into(), "כהן".into(), "".into(), " ".into(), "".into()])
            .unwrap();
        assert_eq!(table.rows()[2].len(), 3);
    }

    #[test]
    fn test_duplicate_header_detection() {
        let headers = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();

        assert_eq!(
            WorkingTable::duplicate_header(&headers(&["a", columns::MOBILE, "b", columns::MOBILE])),
            Some(columns::MOBILE)
        );
        assert_eq!(WorkingTable::duplicate_header(&headers(&["a", "", "b", ""])), None);
        assert_eq!(WorkingTable::duplicate_header(&headers(&["a", "b"])), None);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = sample();
        assert_eq!(table.rows()[1].len(), 3);
        assert_eq!(table.get(1, columns::ROLE), None);
    }

    #[test]
    fn test_metadata_columns_added_once() {
        let mut table = sample();
        assert_eq!(table.ensure_metadata_columns(), 6);
        assert_eq!(table.ensure_metadata_columns(), 0);
        assert_eq!(table.headers().len(), 9);
        assert!(table.rows().iter().all(|r| r.len() == 9));
    }

    #[test]
    fn test_set_and_clear() {
        let mut table = sample();
        table.set(0, columns::DECISION, Some("AUTO-UPDATE".to_string()));
        assert_eq!(table.get(0, columns::DECISION), Some("AUTO-UPDATE"));

        table.set(0, columns::DECISION, None);
        assert_eq!(table.get(0, columns::DECISION), None);

        // out of range writes are ignored
        table.set(10, columns::DECISION, Some("x".to_string()));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_full_name_and_confidence() {
        let mut table = sample();
        assert_eq!(table.full_name(0).as_deref(), Some("אבי וייס"));
        assert_eq!(table.full_name(1), None);

        table.set(0, columns::CONFIDENCE_SCORE, Some("85.0".to_string()));
        assert_eq!(table.confidence(0), Some(85));
        table.set(0, columns::CONFIDENCE_SCORE, Some("abc".to_string()));
        assert_eq!(table.confidence(0), None);
    }

    #[test]
    fn test_row_number_conversion() {
        assert_eq!(row_number(0), 2);
        assert_eq!(row_index(2), Some(0));
        assert_eq!(row_index(1), None);
    }
}
