//! Traits for the external engines the pipeline drives.
//!
//! The alignment corrector and the measure extractor are opaque programs.
//! The pipeline only knows their request shapes; `prasc-adapters` supplies
//! process-backed implementations and tests supply fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Marker that opens a trial in a recording's event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StartFlag {
    #[default]
    Trialid,
    Synctime,
}

impl StartFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            StartFlag::Trialid => "TRIALID",
            StartFlag::Synctime => "SYNCTIME",
        }
    }
}

impl fmt::Display for StartFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StartFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRIALID" => Ok(StartFlag::Trialid),
            "SYNCTIME" => Ok(StartFlag::Synctime),
            other => Err(format!(
                "invalid start_flag '{other}', expected one of: TRIALID, SYNCTIME"
            )),
        }
    }
}

/// A `(x, y)` start point of a text line, in screen pixels.
pub type StartPoint = [u32; 2];

/// An `(x_min, x_max, y_min, y_max)` fixation bounding box.
pub type XyBounds = [u32; 4];

/// Numeric and boolean options passed through to the alignment routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentOptions {
    pub xy_bounds: Option<Vec<XyBounds>>,
    pub keep_y_var: bool,
    pub use_run_rule: bool,
    pub trial_plots: bool,
    pub save_trial_plots: bool,
    pub summary_file: bool,
    pub show_image: bool,
    pub den_sd_cutoff: f64,
    pub den_ratio_cutoff: f64,
    pub k_bounds: [f64; 2],
    pub o_bounds: [f64; 2],
    pub s_bounds: [f64; 2],
}

impl Default for AlignmentOptions {
    fn default() -> Self {
        Self {
            xy_bounds: None,
            keep_y_var: false,
            use_run_rule: true,
            trial_plots: false,
            save_trial_plots: false,
            summary_file: true,
            show_image: false,
            den_sd_cutoff: f64::INFINITY,
            den_ratio_cutoff: 1.0,
            k_bounds: [-0.1, 0.1],
            o_bounds: [-50.0, 50.0],
            s_bounds: [1.0, 20.0],
        }
    }
}

/// One invocation of the alignment corrector.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRequest {
    pub recordings: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub start_points: Vec<StartPoint>,
    pub start_flag: StartFlag,
    pub options: AlignmentOptions,
}

/// One invocation of the reading-measure extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureRequest {
    pub recordings: Vec<PathBuf>,
    /// Region boundary file (`sentences.txt`).
    pub regions: PathBuf,
    /// Column configuration (`config.json`).
    pub config: PathBuf,
    /// Measures table the extractor writes.
    pub output: PathBuf,
}

/// Failures reported by an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' terminated unexpectedly ({status})")]
    Failed { program: String, status: String },
    #[error("control file {path}: {reason}")]
    ControlFile { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Drift correction of raw recordings.
#[async_trait]
pub trait AlignmentCorrector: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Writes a `_fa.asc` file into `request.output_dir` for every recording.
    async fn correct(&self, request: &AlignmentRequest) -> Result<(), EngineError>;
}

/// Region-level reading measure extraction.
#[async_trait]
pub trait MeasureExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Writes the measures table for `request.recordings` to `request.output`.
    async fn extract(&self, request: &MeasureRequest) -> Result<(), EngineError>;
}
