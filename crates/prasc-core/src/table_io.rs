//! Reading and writing result tables.
//!
//! `results.csv` and `results_combined.csv` are comma separated; the question
//! files are space separated with quoted recording paths. Null cells are
//! written as `NA`.

use crate::config::FileEncoding;
use prasc_proto::{NA, ShapeError, Table, is_null};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Field separator of a result file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Space,
}

impl Delimiter {
    fn byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Space => b' ',
        }
    }
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed table {path}: {source}")]
    Shape {
        path: PathBuf,
        #[source]
        source: ShapeError,
    },
    #[error("{path} has no header row")]
    NoHeader { path: PathBuf },
}

/// Reads and writes tables with a fixed text encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableIo {
    encoding: FileEncoding,
}

impl TableIo {
    pub fn new(encoding: FileEncoding) -> Self {
        Self { encoding }
    }

    pub fn read(&self, path: &Path, delimiter: Delimiter) -> Result<Table, TableError> {
        let bytes = std::fs::read(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = self.encoding.decode(&bytes);
        parse_table(&text, delimiter).map_err(|err| err.at(path))
    }

    /// Reads `path` if it exists. `Ok(None)` means there is no file.
    pub fn read_optional(
        &self,
        path: &Path,
        delimiter: Delimiter,
    ) -> Result<Option<Table>, TableError> {
        if !path.is_file() {
            return Ok(None);
        }
        self.read(path, delimiter).map(Some)
    }

    pub fn write(&self, path: &Path, table: &Table, delimiter: Delimiter) -> Result<(), TableError> {
        let text = render_table(table, delimiter).map_err(|source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, self.encoding.encode(&text)).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Path-less parse failure, attached to a path by the caller.
#[derive(Debug)]
enum ParseFailure {
    Csv(csv::Error),
    Shape(ShapeError),
    NoHeader,
}

impl ParseFailure {
    fn at(self, path: &Path) -> TableError {
        let path = path.to_path_buf();
        match self {
            ParseFailure::Csv(source) => TableError::Csv { path, source },
            ParseFailure::Shape(source) => TableError::Shape { path, source },
            ParseFailure::NoHeader => TableError::NoHeader { path },
        }
    }
}

fn parse_table(text: &str, delimiter: Delimiter) -> Result<Table, ParseFailure> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter.byte())
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(ParseFailure::Csv)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(ParseFailure::NoHeader);
    }

    let mut table = Table::new(headers).map_err(ParseFailure::Shape)?;
    for record in reader.records() {
        let record = record.map_err(ParseFailure::Csv)?;
        let row = record.iter().map(str::to_string).collect();
        table.push_row(row).map_err(ParseFailure::Shape)?;
    }
    Ok(table)
}

fn render_table(table: &Table, delimiter: Delimiter) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter.byte())
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());
    writer.write_record(table.headers())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| if is_null(cell) { NA } else { cell.as_str() }))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_quoted_space_separated_paths() {
        let text = "filename question_type item_id\n\"C:/data/Fix Aligned/s1_fa.asc\" 2 7\n";
        let table = parse_table(text, Delimiter::Space).unwrap();
        assert_eq!(table.headers(), ["filename", "question_type", "item_id"]);
        assert_eq!(table.rows()[0][0], "C:/data/Fix Aligned/s1_fa.asc");
        assert_eq!(table.rows()[0][2], "7");
    }

    #[test]
    fn ragged_rows_are_parse_errors() {
        let err = parse_table("a,b\n1,2,3\n", Delimiter::Comma).unwrap_err();
        assert!(matches!(err, ParseFailure::Csv(_)));
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(
            parse_table("", Delimiter::Comma).unwrap_err(),
            ParseFailure::NoHeader
        ));
    }

    #[test]
    fn writes_na_for_null_cells_and_quotes_spaces() {
        let table = Table::with_rows(
            ["filename", "rt"],
            vec![
                vec!["Fix Aligned/s1.asc".to_string(), String::new()],
                vec!["s2.asc".to_string(), "200".to_string()],
            ],
        )
        .unwrap();
        let text = render_table(&table, Delimiter::Space).unwrap();
        assert_eq!(text, "filename rt\n\"Fix Aligned/s1.asc\" NA\ns2.asc 200\n");
    }

    #[test]
    fn latin1_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let io = TableIo::new(FileEncoding::Latin1);
        let table = Table::with_rows(
            ["word"],
            vec![vec!["caf\u{e9}".to_string()]],
        )
        .unwrap();
        io.write(&path, &table, Delimiter::Comma).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"word\ncaf\xe9\n".to_vec());
        assert_eq!(io.read(&path, Delimiter::Comma).unwrap(), table);
    }

    #[test]
    fn read_optional_missing_file() {
        let dir = TempDir::new().unwrap();
        let io = TableIo::default();
        assert!(
            io.read_optional(&dir.path().join("nope.csv"), Delimiter::Comma)
                .unwrap()
                .is_none()
        );
    }
}
