//! Deciding which recordings still need processing.
//!
//! Earlier runs leave either per-stage files or, after combining, only
//! `results_combined.csv`. Both are read back as "prior" results; recordings
//! whose identity already appears there are not processed again.

use crate::field_map::{FieldLookup, FieldMap, LogicalField};
use crate::outputs::OutputFiles;
use crate::table_io::{Delimiter, TableIo};
use prasc_proto::question::{self, NUMBER_QUESTIONS, QUESTION_TYPE};
use prasc_proto::{RecordIdentity, Table, is_null};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where prior results were read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorSource {
    /// The stage's own output file(s).
    StageFiles,
    /// Columns projected out of `results_combined.csv`.
    Combined,
}

/// Results of an earlier run that a stage builds on.
pub trait PriorResults {
    fn source(&self) -> PriorSource;

    /// Identities of the recordings already processed.
    fn processed(&self, filename_col: &str) -> HashSet<RecordIdentity>;
}

/// Prior measures table.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuresPrior {
    pub table: Table,
    pub source: PriorSource,
}

impl PriorResults for MeasuresPrior {
    fn source(&self) -> PriorSource {
        self.source
    }

    fn processed(&self, filename_col: &str) -> HashSet<RecordIdentity> {
        self.table.identities(filename_col)
    }
}

/// Prior question records and summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionsPrior {
    pub questions: Table,
    pub summary: Table,
    pub source: PriorSource,
}

impl PriorResults for QuestionsPrior {
    fn source(&self) -> PriorSource {
        self.source
    }

    /// Recordings present in both tables.
    fn processed(&self, filename_col: &str) -> HashSet<RecordIdentity> {
        let in_questions = self.questions.identities(filename_col);
        let in_summary = self.summary.identities(filename_col);
        match self.source {
            // A recording without questions only has a summary row.
            PriorSource::Combined => in_summary,
            PriorSource::StageFiles => in_questions.intersection(&in_summary).cloned().collect(),
        }
    }
}

/// Recordings a stage still has to process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkSet {
    pub pending: Vec<PathBuf>,
    pub already_processed: usize,
}

impl WorkSet {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Filters `recordings` down to those not covered by `prior`, keeping input
/// order.
pub fn files_needing_work(
    recordings: &[PathBuf],
    prior: Option<&dyn PriorResults>,
    fields: &FieldMap,
    force_all: bool,
) -> WorkSet {
    let everything = || WorkSet {
        pending: recordings.to_vec(),
        already_processed: 0,
    };
    if force_all {
        return everything();
    }
    let Some(prior) = prior else {
        return everything();
    };
    let filename_col = match fields.lookup(LogicalField::Filename) {
        FieldLookup::Present(header) => header,
        FieldLookup::Absent { .. } => {
            warn!("filename not included in existing results; all recordings will be processed");
            return everything();
        }
    };

    let processed = prior.processed(filename_col);
    let pending: Vec<PathBuf> = recordings
        .iter()
        .filter(|path| !processed.contains(&RecordIdentity::of_path(path)))
        .cloned()
        .collect();
    debug!(
        pending = pending.len(),
        processed = processed.len(),
        "Filtered recordings against prior results"
    );
    WorkSet {
        already_processed: recordings.len() - pending.len(),
        pending,
    }
}

/// Loads prior measures: `results.csv`, else the combined output, projected
/// to the configured measure columns and deduplicated.
pub fn load_measures_prior(io: &TableIo, files: &OutputFiles, fields: &FieldMap) -> Option<MeasuresPrior> {
    let columns = fields.included_columns();
    if let Some(table) = read_prior(io, &files.results(), Delimiter::Comma) {
        return Some(MeasuresPrior {
            table: table.project(columns),
            source: PriorSource::StageFiles,
        });
    }
    if let Some(table) = read_prior(io, &files.combined(), Delimiter::Comma) {
        // duplicate stimulus rows multiply measure rows in the combined output
        let mut table = table.project(columns);
        table.dedup();
        return Some(MeasuresPrior {
            table,
            source: PriorSource::Combined,
        });
    }
    info!("No existing sentence results found; all recordings will be processed");
    None
}

/// Loads prior question results.
///
/// When both question files exist, both are restricted to the recordings
/// they have in common. Otherwise the question columns of the combined output
/// are projected back out, dropping rows the joins padded with nulls.
pub fn load_questions_prior(io: &TableIo, files: &OutputFiles, fields: &FieldMap) -> Option<QuestionsPrior> {
    let filename_col = fields.header(LogicalField::Filename);
    let item_id_col = fields.header(LogicalField::ItemId);

    let questions = read_prior(io, &files.questions(), Delimiter::Space);
    let summary = read_prior(io, &files.summary(), Delimiter::Space);
    if let (Some(mut questions), Some(mut summary)) = (questions, summary) {
        let prior = QuestionsPrior {
            questions: questions.clone(),
            summary: summary.clone(),
            source: PriorSource::StageFiles,
        };
        let common = prior.processed(filename_col);
        restrict_to(&mut questions, filename_col, &common);
        restrict_to(&mut summary, filename_col, &common);
        return Some(QuestionsPrior {
            questions,
            summary,
            ..prior
        });
    }

    let combined = read_prior(io, &files.combined(), Delimiter::Comma)?;
    if !combined.has_column(NUMBER_QUESTIONS) {
        info!("Combined results carry no question data; all questions will be processed");
        return None;
    }
    Some(QuestionsPrior {
        questions: project_non_null(
            &combined,
            &question::question_headers(filename_col, item_id_col),
            QUESTION_TYPE,
        ),
        summary: project_non_null(
            &combined,
            &question::summary_headers(filename_col),
            NUMBER_QUESTIONS,
        ),
        source: PriorSource::Combined,
    })
}

/// Reads a prior table; unreadable files count as absent.
fn read_prior(io: &TableIo, path: &Path, delimiter: Delimiter) -> Option<Table> {
    match io.read_optional(path, delimiter) {
        Ok(table) => table,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "Ignoring unreadable prior results");
            None
        }
    }
}

fn restrict_to(table: &mut Table, filename_col: &str, keep: &HashSet<RecordIdentity>) {
    if let Some(idx) = table.column_index(filename_col) {
        table.retain_rows(|row| keep.contains(&RecordIdentity::of(&row[idx])));
    }
}

/// Projects `columns`, drops rows whose `required` cell is null and removes
/// duplicates.
fn project_non_null(table: &Table, columns: &[String], required: &str) -> Table {
    let mut projected = table.project(columns);
    if let Some(idx) = projected.column_index(required) {
        projected.retain_rows(|row| !is_null(&row[idx]));
    }
    projected.dedup();
    projected
}
