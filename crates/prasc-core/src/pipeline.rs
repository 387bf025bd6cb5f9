//! Stage sequencing.
//!
//! A run goes through up to four stages in a fixed order: alignment
//! correction, measure extraction, question scoring and combining. Each stage
//! can be skipped, run incrementally, or forced over every recording.

use crate::config::{ConfigError, PrascConfig, StimuliLocation};
use crate::field_map::{FieldMap, LogicalField};
use crate::incremental::{self, PriorResults, PriorSource, WorkSet};
use crate::join::{self, CombineError, CombineReport};
use crate::merge::{self, MergeError};
use crate::outputs::{self, OutputFiles};
use crate::questions::{QuestionScorer, ScoreError};
use crate::start_points;
use crate::table_io::{Delimiter, TableError, TableIo};
use prasc_proto::question;
use prasc_proto::{
    AlignmentCorrector, AlignmentRequest, EngineError, MeasureExtractor, MeasureRequest,
    ShapeError, Table,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Name of the measures table the extractor writes before it is merged.
pub const PARTIAL_RESULTS_FILE: &str = "results_partial.csv";

/// How a stage treats recordings processed by earlier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageMode {
    Skip,
    /// Only recordings missing from prior results.
    #[default]
    Incremental,
    /// Every recording.
    Force,
}

impl StageMode {
    pub fn is_active(self) -> bool {
        self != StageMode::Skip
    }
}

/// What a run does, after flag reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub fix: StageMode,
    pub measures: StageMode,
    pub questions: StageMode,
    pub combine: bool,
    pub keep_all: bool,
    pub overwrite: bool,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            fix: StageMode::Incremental,
            measures: StageMode::Incremental,
            questions: StageMode::Incremental,
            combine: true,
            keep_all: false,
            overwrite: false,
        }
    }
}

impl RunPlan {
    fn needs_output_dir(&self) -> bool {
        self.measures.is_active() || self.questions.is_active() || self.combine
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot list recordings in {dir}: {source}")]
    Recordings {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} already exist(s); use --overwrite to replace", display_paths(.0))]
    OutputsExist(Vec<PathBuf>),
    #[error("alignment correction failed: {0}")]
    Alignment(#[source] EngineError),
    #[error("measure extraction failed: {0}")]
    Measures(#[source] EngineError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Combine(#[from] CombineError),
}

impl PipelineError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Combine(CombineError::NothingToCombine) => 2,
            _ => 1,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub recordings: usize,
    pub aligned: usize,
    pub measured: usize,
    pub scored: usize,
    pub combined: Option<CombineReport>,
}

/// Runs the stages of a [`RunPlan`] against one parameter set.
pub struct Pipeline {
    config: PrascConfig,
    plan: RunPlan,
    corrector: Box<dyn AlignmentCorrector>,
    extractor: Box<dyn MeasureExtractor>,
    io: TableIo,
    files: OutputFiles,
}

impl Pipeline {
    pub fn new(
        config: PrascConfig,
        plan: RunPlan,
        corrector: Box<dyn AlignmentCorrector>,
        extractor: Box<dyn MeasureExtractor>,
    ) -> Self {
        let io = TableIo::new(config.file_encoding);
        let files = OutputFiles::new(config.output_dir());
        Self {
            config,
            plan,
            corrector,
            extractor,
            io,
            files,
        }
    }

    pub fn files(&self) -> &OutputFiles {
        &self.files
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let fields = if self.plan.needs_output_dir() {
            FieldMap::load(self.config.column_config_path())?
        } else {
            FieldMap::default()
        };
        if self.plan.combine && !fields.is_included(LogicalField::ItemId) {
            return Err(CombineError::MissingJoinKey {
                field: LogicalField::ItemId,
            }
            .into());
        }
        self.check_overwrite()?;
        if self.plan.needs_output_dir() {
            create_dir(self.files.dir())?;
        }

        let mut summary = RunSummary::default();
        let recordings = self.align(&mut summary).await?;
        summary.recordings = recordings.len();

        if self.plan.measures.is_active() {
            summary.measured = self.measure(&recordings, &fields).await?;
        }
        if self.plan.questions.is_active() {
            summary.scored = self.score(&recordings, &fields)?;
        }
        if self.plan.combine {
            summary.combined = Some(self.combine(&fields)?);
        }
        Ok(summary)
    }

    fn check_overwrite(&self) -> Result<(), PipelineError> {
        if self.plan.overwrite {
            return Ok(());
        }
        let conflicts = self.files.conflicts(
            self.plan.measures.is_active(),
            self.plan.questions.is_active(),
            self.plan.combine,
        );
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::OutputsExist(conflicts))
        }
    }

    /// Runs alignment correction and returns the recordings later stages use.
    async fn align(&self, summary: &mut RunSummary) -> Result<Vec<PathBuf>, PipelineError> {
        let asc_dir = self.config.asc_dir();
        if !self.plan.fix.is_active() {
            info!(dir = %asc_dir.display(), "Skipping alignment; using recordings as they are");
            return list(&asc_dir, |dir| outputs::list_recordings(dir, |_| true));
        }

        let fa_dir = self.config.fa_dir();
        create_dir(&fa_dir)?;
        let raw = list(&asc_dir, outputs::list_raw)?;
        let to_align: Vec<PathBuf> = if self.plan.fix == StageMode::Force {
            raw
        } else {
            raw.into_iter()
                .filter(|path| {
                    outputs::corrected_name(path).is_none_or(|name| !fa_dir.join(name).is_file())
                })
                .collect()
        };

        if to_align.is_empty() {
            info!("All recordings have corrected versions; skipping alignment (use --refix to redo)");
        } else {
            let start_points =
                start_points::resolve(&self.config.start_pts, self.config.script_path().as_deref())?;
            if self.plan.fix == StageMode::Force {
                remove_alignment_summaries(&fa_dir);
            }
            info!(
                engine = self.corrector.name(),
                recordings = to_align.len(),
                "Correcting alignment"
            );
            let request = AlignmentRequest {
                recordings: to_align,
                output_dir: fa_dir.clone(),
                start_points,
                start_flag: self.config.start_flag,
                options: self.config.fix_align.clone(),
            };
            self.corrector
                .correct(&request)
                .await
                .map_err(PipelineError::Alignment)?;
            summary.aligned = request.recordings.len();
        }

        list(&fa_dir, outputs::list_corrected)
    }

    /// Runs the measure extractor on pending recordings and merges its
    /// output into `results.csv`.
    async fn measure(&self, recordings: &[PathBuf], fields: &FieldMap) -> Result<usize, PipelineError> {
        let prior = match self.plan.measures {
            StageMode::Incremental => incremental::load_measures_prior(&self.io, &self.files, fields),
            _ => None,
        };
        let work = files_needing_work(recordings, prior.as_ref(), fields, self.plan.measures);
        let target = self.files.results();

        if work.is_empty() {
            info!("All sentences have already been processed; skipping measures (use --resentences to redo)");
            if let Some(prior) = prior.filter(|p| p.source == PriorSource::Combined) {
                merge::persist(&self.io, &prior.table, &target, Delimiter::Comma);
            }
            return Ok(0);
        }

        let partial = self.files.dir().join(PARTIAL_RESULTS_FILE);
        let request = MeasureRequest {
            recordings: work.pending.clone(),
            regions: self.config.sentences_path(),
            config: self.config.column_config_path(),
            output: partial.clone(),
        };
        info!(
            engine = self.extractor.name(),
            recordings = work.pending.len(),
            "Extracting reading measures (this may take a while)"
        );
        self.extractor
            .extract(&request)
            .await
            .map_err(PipelineError::Measures)?;

        let incoming = self.io.read(&partial, Delimiter::Comma)?;
        let merged = match &prior {
            Some(prior) => merge_or_replace(&prior.table, incoming, fields),
            None => incoming,
        };
        if merge::persist(&self.io, &merged, &target, Delimiter::Comma)
            && let Err(err) = std::fs::remove_file(&partial)
        {
            warn!(file = %partial.display(), error = %err, "Unable to delete partial results");
        }
        Ok(work.pending.len())
    }

    /// Scores questions of pending recordings and merges them into the
    /// question files.
    fn score(&self, recordings: &[PathBuf], fields: &FieldMap) -> Result<usize, PipelineError> {
        let filename_col = fields.header(LogicalField::Filename);
        let item_id_col = fields.header(LogicalField::ItemId);

        let prior = match self.plan.questions {
            StageMode::Incremental => incremental::load_questions_prior(&self.io, &self.files, fields),
            _ => None,
        };
        let work = files_needing_work(recordings, prior.as_ref(), fields, self.plan.questions);

        if work.is_empty() {
            info!("All questions have already been processed; skipping questions (use --requestions to redo)");
            if let Some(prior) = prior.filter(|p| p.source == PriorSource::Combined) {
                merge::persist(&self.io, &prior.questions, &self.files.questions(), Delimiter::Space);
                merge::persist(&self.io, &prior.summary, &self.files.summary(), Delimiter::Space);
            }
            return Ok(0);
        }

        info!(recordings = work.pending.len(), "Scoring comprehension questions");
        let scorer = QuestionScorer::new(self.config.start_flag, self.config.file_encoding);
        let scores = scorer.score_all(&work.pending)?;
        let mut questions = question::questions_table(&scores.records, filename_col, item_id_col)?;
        let mut summaries = question::summaries_table(&scores.summaries, filename_col)?;

        if let Some(prior) = &prior {
            questions = merge_or_replace(&prior.questions, questions, fields);
            summaries = merge_or_replace(&prior.summary, summaries, fields);
        }
        merge::persist(&self.io, &questions, &self.files.questions(), Delimiter::Space);
        merge::persist(&self.io, &summaries, &self.files.summary(), Delimiter::Space);
        Ok(work.pending.len())
    }

    fn combine(&self, fields: &FieldMap) -> Result<CombineReport, PipelineError> {
        let stimuli = match self.config.stimuli_location() {
            StimuliLocation::Found(path) => Some(path),
            StimuliLocation::NotFound => {
                warn!("Stimuli file not found; stimulus information will not be added to results");
                None
            }
            StimuliLocation::Ambiguous(candidates) => {
                warn!(
                    count = candidates.len(),
                    "Multiple stimuli files found; stimulus information will not be added to results"
                );
                None
            }
        };
        Ok(join::combine_files(
            &self.io,
            &self.files,
            fields,
            stimuli.as_deref(),
            self.plan.keep_all,
        )?)
    }
}

fn files_needing_work<P: PriorResults>(
    recordings: &[PathBuf],
    prior: Option<&P>,
    fields: &FieldMap,
    mode: StageMode,
) -> WorkSet {
    incremental::files_needing_work(
        recordings,
        prior.map(|p| p as &dyn PriorResults),
        fields,
        mode == StageMode::Force,
    )
}

/// Merges on the filename column, or keeps only the new rows when a merge is
/// impossible.
fn merge_or_replace(prior: &Table, incoming: Table, fields: &FieldMap) -> Table {
    let key = fields.header(LogicalField::Filename);
    match merge::merge(prior, &incoming, key) {
        Ok(merged) => merged,
        Err(MergeError::MissingKey { side, .. }) => {
            warn!(key = %key, side = side, "Cannot merge with prior results; keeping only new results");
            incoming
        }
        Err(MergeError::Shape(err)) => {
            warn!(error = %err, "Cannot merge with prior results; keeping only new results");
            incoming
        }
    }
}

fn create_dir(path: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(path).map_err(|source| PipelineError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn list(
    dir: &Path,
    lister: impl Fn(&Path) -> std::io::Result<Vec<PathBuf>>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let found = lister(dir).map_err(|source| PipelineError::Recordings {
        dir: dir.to_path_buf(),
        source,
    })?;
    if found.is_empty() {
        warn!(dir = %dir.display(), "No recordings found");
    }
    Ok(found)
}

/// Removes fix_align `.fas` summaries before re-fixing everything.
fn remove_alignment_summaries(fa_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(fa_dir) else {
        return;
    };
    for path in entries.filter_map(Result::ok).map(|e| e.path()) {
        let is_summary = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("fas"));
        if is_summary && let Err(err) = std::fs::remove_file(&path) {
            warn!(file = %path.display(), error = %err, "Unable to delete old alignment summary");
        }
    }
}
