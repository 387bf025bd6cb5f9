//! # prasc-core
//!
//! Result reconciliation for the prasc pipeline.
//!
//! This crate provides:
//! - Parameter file and column configuration loading
//! - Incremental selection of recordings that still need processing
//! - Comprehension question scoring
//! - Merging new partial results into earlier ones
//! - Joining measures, questions and stimuli into one table
//! - The [`Pipeline`] that sequences the stages

mod config;
mod field_map;
mod incremental;
mod join;
mod merge;
mod outputs;
mod pipeline;
mod questions;
pub mod start_points;
mod table_io;

pub use config::{
    CommandConfig, ConfigError, DEFAULT_PARAMETERS_FILE, EnginesConfig, FileEncoding, PrascConfig,
    StimuliLocation, with_default_extension,
};
pub use field_map::{ColumnConfig, ColumnSetting, FieldLookup, FieldMap, LogicalField};
pub use incremental::{
    MeasuresPrior, PriorResults, PriorSource, QuestionsPrior, WorkSet, files_needing_work,
    load_measures_prior, load_questions_prior,
};
pub use join::{
    CombineError, CombineInputs, CombineOutcome, CombineReport, Folded, SkipReason,
    StimulusRejection, combine, combine_files,
};
pub use merge::{MergeError, merge, persist};
pub use outputs::{
    COMBINED_FILE, CORRECTED_SUFFIX, OutputFiles, QUESTIONS_FILE, RESULTS_FILE, SUMMARY_FILE,
    corrected_name, is_corrected, list_corrected, list_raw,
};
pub use pipeline::{PARTIAL_RESULTS_FILE, Pipeline, PipelineError, RunPlan, RunSummary, StageMode};
pub use questions::{QuestionScorer, QuestionScores, ScoreError, ScoredRecording};
pub use table_io::{Delimiter, TableError, TableIo};
