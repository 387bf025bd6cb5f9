//! Combining per-stage results into `results_combined.csv`.
//!
//! The measures table is the base when present; otherwise the per-question
//! records are. Per-question records join the measures on recording identity
//! and item id, the per-recording summary on identity alone, and stimulus
//! metadata on item id (and item condition when measures are the base).
//! Every join keeps the columns of the left table and appends the right
//! table's remaining columns.
//!
//! A per-stage table only counts as folded in when all of its rows landed in
//! the combined table; files that were not fully folded are never deleted.

use crate::field_map::{FieldMap, LogicalField};
use crate::outputs::OutputFiles;
use crate::table_io::{Delimiter, TableError, TableIo};
use prasc_proto::question::QUESTION_TYPE;
use prasc_proto::{NA, RecordIdentity, ShapeError, Table, is_null};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CombineError {
    #[error("no per-stage results found to combine")]
    NothingToCombine,
    #[error("{field} not included in results; cannot combine results")]
    MissingJoinKey { field: LogicalField },
    #[error("{table} table has no '{column}' column to join on")]
    MissingColumn { table: &'static str, column: String },
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Why stimulus metadata was not joined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StimulusRejection {
    #[error("stimuli file has no '{column}' column")]
    MissingColumn { column: String },
    #[error("results have no '{column}' column")]
    ResultsMissingColumn { column: String },
    #[error("stimuli column '{column}' has null or blank values")]
    NullOrBlank { column: String },
    #[error("stimuli column '{column}' has non-numeric value '{value}'")]
    NonNumeric { column: String, value: String },
    #[error("results have {column} values not in the stimuli file: {}", keys.join(", "))]
    UnknownKeys { column: String, keys: Vec<String> },
}

/// A join that was skipped. None of these abort the combine stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("filename not included in results; questions were not combined")]
    QuestionsNeedFilename,
    #[error("item_condition not included in results; stimuli were not combined")]
    StimuliNeedCondition,
    #[error("stimuli were not combined: {0}")]
    Stimuli(StimulusRejection),
    #[error("stimuli file could not be read: {0}")]
    StimuliUnreadable(String),
}

/// Per-stage tables available to combine.
#[derive(Debug, Clone, Default)]
pub struct CombineInputs {
    pub measures: Option<Table>,
    pub questions: Option<Table>,
    pub summary: Option<Table>,
}

impl CombineInputs {
    pub fn is_empty(&self) -> bool {
        self.measures.is_none() && self.questions.is_none() && self.summary.is_none()
    }
}

/// Which per-stage tables ended up in the combined table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Folded {
    pub measures: bool,
    pub questions: bool,
    pub summary: bool,
}

#[derive(Debug, Clone)]
pub struct CombineOutcome {
    pub table: Table,
    pub folded: Folded,
    pub skipped: Vec<SkipReason>,
}

/// Summary of a finished combine stage.
#[derive(Debug, Clone)]
pub struct CombineReport {
    pub output: PathBuf,
    pub rows: usize,
    pub deleted: Vec<PathBuf>,
    pub skipped: Vec<SkipReason>,
}

/// Joins the available tables.
pub fn combine(
    inputs: CombineInputs,
    fields: &FieldMap,
    stimuli: Option<Table>,
) -> Result<CombineOutcome, CombineError> {
    if inputs.is_empty() {
        return Err(CombineError::NothingToCombine);
    }
    if !fields.is_included(LogicalField::ItemId) {
        return Err(CombineError::MissingJoinKey {
            field: LogicalField::ItemId,
        });
    }

    let filename = fields.header(LogicalField::Filename);
    let item_id = fields.header(LogicalField::ItemId);
    let item_condition = fields.header(LogicalField::ItemCondition);
    let by_recording = [JoinKey::identity(filename)];

    let mut folded = Folded::default();
    let mut skipped = Vec::new();

    let CombineInputs {
        measures,
        questions,
        summary,
    } = inputs;

    let table = match (measures, questions, summary) {
        (Some(mut results), questions, summary) => {
            let mut joined = false;
            if fields.is_included(LogicalField::Filename) {
                if let Some(questions) = questions {
                    let questions = without_filler_trials(questions);
                    let by_question = [JoinKey::identity(filename), JoinKey::value(item_id)];
                    folded.questions = covers(&results, &questions, &by_question)?;
                    results = join(&results, &questions, &by_question, JoinKind::Left)?;
                    joined = true;
                }
                if let Some(summary) = summary {
                    folded.summary = covers(&results, &summary, &by_recording)?;
                    results = join(&results, &summary, &by_recording, JoinKind::Left)?;
                    joined = true;
                }
            } else if questions.is_some() || summary.is_some() {
                skipped.push(SkipReason::QuestionsNeedFilename);
            }

            if let Some(stimuli) = stimuli {
                if fields.is_included(LogicalField::ItemCondition) {
                    let columns = [("item_id", item_id), ("item_condition", item_condition)];
                    match join_stimuli(&results, stimuli, &columns)? {
                        Ok(table) => {
                            results = table;
                            joined = true;
                        }
                        Err(rejection) => skipped.push(SkipReason::Stimuli(rejection)),
                    }
                } else {
                    skipped.push(SkipReason::StimuliNeedCondition);
                }
            }
            folded.measures = joined;
            results
        }
        (None, Some(questions), summary) => {
            let mut results = without_filler_trials(questions);
            let mut joined = false;
            let mut complete = true;
            if let Some(summary) = summary {
                complete = covers(&summary, &results, &by_recording)?;
                results = join(&results, &summary, &by_recording, JoinKind::Right)?;
                folded.summary = true;
                joined = true;
            }
            if let Some(stimuli) = stimuli {
                match join_stimuli(&results, stimuli, &[("item_id", item_id)])? {
                    Ok(table) => {
                        results = table;
                        joined = true;
                    }
                    Err(rejection) => skipped.push(SkipReason::Stimuli(rejection)),
                }
            }
            folded.questions = joined && complete;
            results
        }
        (None, None, Some(summary)) => summary,
        (None, None, None) => return Err(CombineError::NothingToCombine),
    };

    Ok(CombineOutcome {
        table,
        folded,
        skipped,
    })
}

/// Runs the combine stage over the files in the output directory.
///
/// Nothing is written or deleted when a precondition fails. Per-stage files
/// are deleted only after the combined table was written, and only when
/// `keep_all` is false.
pub fn combine_files(
    io: &TableIo,
    files: &OutputFiles,
    fields: &FieldMap,
    stimuli: Option<&Path>,
    keep_all: bool,
) -> Result<CombineReport, CombineError> {
    let measures_path = files.results();
    let questions_path = files.questions();
    let summary_path = files.summary();

    if !measures_path.is_file() && !questions_path.is_file() && !summary_path.is_file() {
        return Err(CombineError::NothingToCombine);
    }
    if !fields.is_included(LogicalField::ItemId) {
        return Err(CombineError::MissingJoinKey {
            field: LogicalField::ItemId,
        });
    }

    let inputs = CombineInputs {
        measures: io.read_optional(&measures_path, Delimiter::Comma)?,
        questions: io.read_optional(&questions_path, Delimiter::Space)?,
        summary: io.read_optional(&summary_path, Delimiter::Space)?,
    };

    let mut skipped = Vec::new();
    let stimuli = match stimuli {
        Some(path) => match io.read(path, Delimiter::Comma) {
            Ok(table) => Some(table),
            Err(err) => {
                skipped.push(SkipReason::StimuliUnreadable(err.to_string()));
                None
            }
        },
        None => None,
    };

    info!("Combining results");
    let outcome = combine(inputs, fields, stimuli)?;
    skipped.extend(outcome.skipped);
    for reason in &skipped {
        warn!(reason = %reason, "Skipped a join while combining");
    }

    let output = files.combined();
    io.write(&output, &outcome.table, Delimiter::Comma)?;
    info!(file = %output.display(), rows = outcome.table.len(), "Wrote combined results");

    let mut deleted = Vec::new();
    if !keep_all {
        let folded = [
            (outcome.folded.measures, measures_path),
            (outcome.folded.questions, questions_path),
            (outcome.folded.summary, summary_path),
        ];
        for (was_folded, path) in folded {
            if !was_folded {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => deleted.push(path),
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "Unable to delete non-combined results file");
                }
            }
        }
    }

    Ok(CombineReport {
        output,
        rows: outcome.table.len(),
        deleted,
        skipped,
    })
}

/// Drops filler trials (question type 1).
fn without_filler_trials(mut questions: Table) -> Table {
    if let Some(idx) = questions.column_index(QUESTION_TYPE) {
        questions.retain_rows(|row| normalize_value(&row[idx]) != "1");
    }
    questions
}

/// Validates stimulus metadata and left-joins it onto `results`.
///
/// `columns` pairs each literal stimulus column name with the configured
/// header. The outer error is fatal; the inner one only skips the join.
fn join_stimuli(
    results: &Table,
    mut stimuli: Table,
    columns: &[(&str, &str)],
) -> Result<Result<Table, StimulusRejection>, CombineError> {
    for &(literal, header) in columns {
        if !stimuli.has_column(header) {
            stimuli.rename_column(literal, header);
        }
    }
    for &(_, header) in columns {
        if let Err(rejection) = validate_stimulus_column(results, &stimuli, header) {
            return Ok(Err(rejection));
        }
    }
    let keys: Vec<JoinKey<'_>> = columns.iter().map(|&(_, h)| JoinKey::value(h)).collect();
    join(results, &stimuli, &keys, JoinKind::Left).map(Ok)
}

fn validate_stimulus_column(
    results: &Table,
    stimuli: &Table,
    column: &str,
) -> Result<(), StimulusRejection> {
    if !stimuli.has_column(column) {
        return Err(StimulusRejection::MissingColumn {
            column: column.to_string(),
        });
    }
    if !results.has_column(column) {
        return Err(StimulusRejection::ResultsMissingColumn {
            column: column.to_string(),
        });
    }
    if stimuli.column(column).any(is_null) {
        return Err(StimulusRejection::NullOrBlank {
            column: column.to_string(),
        });
    }
    if let Some(value) = stimuli
        .column(column)
        .find(|cell| !cell.trim().chars().all(|c| c.is_ascii_digit()))
    {
        return Err(StimulusRejection::NonNumeric {
            column: column.to_string(),
            value: value.to_string(),
        });
    }
    let known: HashSet<String> = stimuli.column(column).map(normalize_value).collect();
    let unknown: Vec<String> = results
        .distinct(column)
        .into_iter()
        .filter(|value| !known.contains(&normalize_value(value)))
        .collect();
    if !unknown.is_empty() {
        return Err(StimulusRejection::UnknownKeys {
            column: column.to_string(),
            keys: unknown,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinKind {
    /// Every left row, matched right rows appended.
    Left,
    /// Every right row, matched left rows prepended.
    Right,
}

#[derive(Debug, Clone, Copy)]
struct JoinKey<'a> {
    column: &'a str,
    by_identity: bool,
}

impl<'a> JoinKey<'a> {
    fn identity(column: &'a str) -> Self {
        Self {
            column,
            by_identity: true,
        }
    }

    fn value(column: &'a str) -> Self {
        Self {
            column,
            by_identity: false,
        }
    }
}

/// Column index and comparison mode of each key.
type KeyColumns = Vec<(usize, bool)>;

fn key_columns(table: &Table, keys: &[JoinKey<'_>], side: &'static str) -> Result<KeyColumns, CombineError> {
    keys.iter()
        .map(|key| {
            table
                .column_index(key.column)
                .map(|idx| (idx, key.by_identity))
                .ok_or_else(|| CombineError::MissingColumn {
                    table: side,
                    column: key.column.to_string(),
                })
        })
        .collect()
}

/// Normalized key of a row. Rows with a null key cell never match.
fn row_key(row: &[String], columns: &KeyColumns) -> Option<Vec<String>> {
    columns
        .iter()
        .map(|&(idx, by_identity)| {
            let cell = &row[idx];
            if is_null(cell) {
                None
            } else if by_identity {
                Some(RecordIdentity::of(cell).as_str().to_string())
            } else {
                Some(normalize_value(cell))
            }
        })
        .collect()
}

/// Trims a cell and drops an all-zero fractional part, so `5.0` matches `5`.
fn normalize_value(cell: &str) -> String {
    let trimmed = cell.trim();
    if let Some((whole, fraction)) = trimmed.split_once('.') {
        let digits = whole.strip_prefix('-').unwrap_or(whole);
        if !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit())
            && !fraction.is_empty()
            && fraction.chars().all(|c| c == '0')
        {
            return whole.to_string();
        }
    }
    trimmed.to_string()
}

/// True when every row of `right` has a key matching some row of `left`,
/// so a left join carries all of `right` into the result.
fn covers(left: &Table, right: &Table, keys: &[JoinKey<'_>]) -> Result<bool, CombineError> {
    let left_keys = key_columns(left, keys, "left")?;
    let right_keys = key_columns(right, keys, "right")?;
    let index = index_rows(left, &left_keys);
    Ok(right
        .rows()
        .iter()
        .all(|row| row_key(row, &right_keys).is_some_and(|key| index.contains_key(&key))))
}

fn index_rows(table: &Table, columns: &KeyColumns) -> HashMap<Vec<String>, Vec<usize>> {
    let mut index: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for (i, row) in table.rows().iter().enumerate() {
        if let Some(key) = row_key(row, columns) {
            index.entry(key).or_default().push(i);
        }
    }
    index
}

fn join(left: &Table, right: &Table, keys: &[JoinKey<'_>], kind: JoinKind) -> Result<Table, CombineError> {
    let left_keys = key_columns(left, keys, "left")?;
    let right_keys = key_columns(right, keys, "right")?;

    let extra: Vec<usize> = right
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, h)| !left.has_column(h))
        .map(|(i, _)| i)
        .collect();
    let mut headers = left.headers().to_vec();
    headers.extend(extra.iter().map(|&i| right.headers()[i].clone()));
    let mut out = Table::new(headers)?;

    let joined_row = |l: &[String], r: &[String]| -> Vec<String> {
        l.iter().cloned().chain(extra.iter().map(|&i| r[i].clone())).collect()
    };

    match kind {
        JoinKind::Left => {
            let index = index_rows(right, &right_keys);
            for l in left.rows() {
                match row_key(l, &left_keys).and_then(|k| index.get(&k)) {
                    Some(matches) => {
                        for &r in matches {
                            out.push_row(joined_row(l, &right.rows()[r]))?;
                        }
                    }
                    None => {
                        let row = l
                            .iter()
                            .cloned()
                            .chain(extra.iter().map(|_| NA.to_string()))
                            .collect();
                        out.push_row(row)?;
                    }
                }
            }
        }
        JoinKind::Right => {
            let index = index_rows(left, &left_keys);
            for r in right.rows() {
                match row_key(r, &right_keys).and_then(|k| index.get(&k)) {
                    Some(matches) => {
                        for &l in matches {
                            out.push_row(joined_row(&left.rows()[l], r))?;
                        }
                    }
                    None => {
                        let mut row: Vec<String> = left
                            .headers()
                            .iter()
                            .map(|h| {
                                right
                                    .column_index(h)
                                    .map_or_else(|| NA.to_string(), |i| r[i].clone())
                            })
                            .collect();
                        row.extend(extra.iter().map(|&i| r[i].clone()));
                        out.push_row(row)?;
                    }
                }
            }
        }
    }
    Ok(out)
}
