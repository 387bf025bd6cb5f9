//! Reconciling new partial results with results from earlier runs.

use crate::table_io::{Delimiter, TableIo};
use prasc_proto::{NA, RecordIdentity, ShapeError, Table, is_null};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("{side} table has no '{key}' column")]
    MissingKey { side: &'static str, key: String },
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Merges `incoming` over `prior`, keyed by recording identity in `key`.
///
/// Prior rows for recordings that `incoming` covers are dropped; the rest
/// keep their order and come first. Columns are the union of both tables
/// with prior columns first; cells a table lacks are `NA`.
pub fn merge(prior: &Table, incoming: &Table, key: &str) -> Result<Table, MergeError> {
    let prior_key = prior.column_index(key).ok_or_else(|| MergeError::MissingKey {
        side: "prior",
        key: key.to_string(),
    })?;
    if !incoming.has_column(key) {
        return Err(MergeError::MissingKey {
            side: "incoming",
            key: key.to_string(),
        });
    }

    let covered: HashSet<RecordIdentity> = incoming.identities(key);

    let mut headers: Vec<String> = prior.headers().to_vec();
    for header in incoming.headers() {
        if !headers.contains(header) {
            headers.push(header.clone());
        }
    }

    let mut merged = Table::new(headers.clone())?;
    for row in prior.rows() {
        let cell = &row[prior_key];
        if !is_null(cell) && covered.contains(&RecordIdentity::of(cell)) {
            continue;
        }
        merged.push_row(reshape(prior, row, &headers))?;
    }
    for row in incoming.rows() {
        merged.push_row(reshape(incoming, row, &headers))?;
    }
    Ok(merged)
}

/// Lays `row` of `source` out under `headers`, filling gaps with `NA`.
fn reshape(source: &Table, row: &[String], headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|h| {
            source
                .column_index(h)
                .map_or_else(|| NA.to_string(), |i| row[i].clone())
        })
        .collect()
}

/// Writes a merged table. A failed write is reported and swallowed so the
/// run can continue with the other stages.
pub fn persist(io: &TableIo, table: &Table, path: &Path, delimiter: Delimiter) -> bool {
    match io.write(path, table, delimiter) {
        Ok(()) => {
            info!(file = %path.display(), rows = table.len(), "Wrote merged results");
            true
        }
        Err(err) => {
            warn!(file = %path.display(), error = %err, "Unable to write merged results; continuing");
            false
        }
    }
}
