//! In-memory result tables.
//!
//! Every stage output is small enough to hold fully in memory, so a table is
//! just a header row plus string cells. Missing values are written as `NA`
//! and both `NA` and empty cells read back as null.

use crate::identity::RecordIdentity;
use std::collections::HashSet;
use thiserror::Error;

/// Marker written for missing values.
pub const NA: &str = "NA";

/// Returns true when a cell holds no value.
pub fn is_null(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty() || trimmed == NA || trimmed.eq_ignore_ascii_case("nan")
}

/// Errors raised when building a table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("column '{0}' appears more than once")]
    DuplicateColumn(String),
}

/// A rectangular table with named columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates an empty table with the given headers.
    pub fn new<I, S>(headers: I) -> Result<Self, ShapeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for header in &headers {
            if !seen.insert(header.as_str()) {
                return Err(ShapeError::DuplicateColumn(header.clone()));
            }
        }
        Ok(Self {
            headers,
            rows: Vec::new(),
        })
    }

    /// Creates a table and fills it with rows.
    pub fn with_rows<I, S>(headers: I, rows: Vec<Vec<String>>) -> Result<Self, ShapeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(headers)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
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

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Appends a row, rejecting rows of the wrong width.
    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), ShapeError> {
        if row.len() != self.headers.len() {
            return Err(ShapeError::RowWidth {
                row: self.rows.len(),
                expected: self.headers.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Iterates over the cells of a column, or nothing if it does not exist.
    pub fn column<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.map(|i| row[i].as_str()))
    }

    /// Distinct values of a column in first-seen order, nulls excluded.
    pub fn distinct(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.column(name)
            .filter(|cell| !is_null(cell))
            .filter(|cell| seen.insert(cell.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// Normalized identities found in `name`, nulls excluded.
    pub fn identities(&self, name: &str) -> HashSet<RecordIdentity> {
        self.column(name)
            .filter(|cell| !is_null(cell))
            .map(RecordIdentity::of)
            .collect()
    }

    /// Keeps only rows for which `keep` returns true.
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[String]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Returns a copy restricted to the listed columns that exist, in the
    /// listed order. Unknown names are ignored.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Table {
        let mut headers = Vec::new();
        let mut indices = Vec::new();
        for name in columns {
            let name = name.as_ref();
            if let Some(idx) = self.column_index(name)
                && !headers.iter().any(|h: &String| h == name)
            {
                headers.push(name.to_string());
                indices.push(idx);
            }
        }
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Table { headers, rows }
    }

    /// Drops exact duplicate rows, keeping the first occurrence.
    pub fn dedup(&mut self) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row.clone()));
    }

    /// Renames a column. Returns false if `from` is missing or `to` exists.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if self.has_column(to) {
            return false;
        }
        match self.column_index(from) {
            Some(idx) => {
                self.headers[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Consumes the table, returning headers and rows.
    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<String>>) {
        (self.headers, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| (*c).to_string()).collect()
    }

    fn sample() -> Table {
        Table::with_rows(
            ["filename", "item_id", "rt"],
            vec![
                row(&["a/s1.asc", "1", "200"]),
                row(&["b/s2.asc", "2", "NA"]),
                row(&["a/s1.asc", "3", ""]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_rows() {
        let mut table = Table::new(["a", "b"]).unwrap();
        let err = table.push_row(row(&["1"])).unwrap_err();
        assert_eq!(
            err,
            ShapeError::RowWidth {
                row: 0,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn rejects_duplicate_headers() {
        assert_eq!(
            Table::new(["a", "a"]).unwrap_err(),
            ShapeError::DuplicateColumn("a".to_string())
        );
    }

    #[test]
    fn null_cells() {
        assert!(is_null("NA"));
        assert!(is_null("  "));
        assert!(is_null("NaN"));
        assert!(!is_null("0"));
    }

    #[test]
    fn identities_strip_directories() {
        let ids = sample().identities("filename");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&RecordIdentity::of("s1.asc")));
    }

    #[test]
    fn missing_column_yields_nothing() {
        assert_eq!(sample().column("nope").count(), 0);
        assert!(sample().identities("nope").is_empty());
    }

    #[test]
    fn project_keeps_requested_order_and_skips_unknown() {
        let projected = sample().project(&["rt", "missing", "filename"]);
        assert_eq!(projected.headers(), ["rt", "filename"]);
        assert_eq!(projected.rows()[0], row(&["200", "a/s1.asc"]));
    }

    #[test]
    fn dedup_keeps_first() {
        let mut table = Table::with_rows(
            ["k"],
            vec![row(&["x"]), row(&["y"]), row(&["x"])],
        )
        .unwrap();
        table.dedup();
        assert_eq!(table.rows(), [row(&["x"]), row(&["y"])]);
    }

    #[test]
    fn rename_refuses_to_clobber() {
        let mut table = sample();
        assert!(!table.rename_column("item_id", "rt"));
        assert!(table.rename_column("item_id", "item"));
        assert!(table.has_column("item"));
        assert!(!table.rename_column("item_id", "other"));
    }

    #[test]
    fn distinct_skips_nulls() {
        assert_eq!(sample().distinct("rt"), vec!["200".to_string()]);
    }
}
