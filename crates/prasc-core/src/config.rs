//! Parameter file loading.
//!
//! The parameter file is a YAML document. Every field has a default, so an
//! empty file describes the conventional layout:
//!
//! ```yaml
//! asc_files_dir: ASC
//! fa_output_dir: ASC/Fix Aligned
//! fix_align_loc: fix_align_v0p92.R
//! config_json_loc: config.json
//! sentences_txt_loc: sentences.txt
//! output_dir: prASCed results
//! file_encoding: latin1
//! start_flag: TRIALID
//! start_pts: [[250, 200], [250, 300]]
//! fix_align:
//!   keep_y_var: false
//!   k_bounds: [-0.1, 0.1]
//! ```
//!
//! Relative paths resolve against the directory holding the parameter file.

use prasc_proto::{AlignmentOptions, StartFlag, StartPoint};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Default parameter file name.
pub const DEFAULT_PARAMETERS_FILE: &str = "prasc.yml";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid setting for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("column configuration {path}: {reason}")]
    ColumnConfig { path: PathBuf, reason: String },
    #[error("start_pts not provided in the parameter file or a script file")]
    MissingStartPoints,
}

/// Text encoding of the result tables being combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileEncoding {
    #[default]
    #[serde(rename = "latin1", alias = "latin-1", alias = "iso-8859-1")]
    Latin1,
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
}

impl FileEncoding {
    /// Decodes raw file contents.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            FileEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            FileEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Encodes text for writing. Characters outside latin1 become `?`.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            FileEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            FileEncoding::Utf8 => text.as_bytes().to_vec(),
        }
    }
}

/// A program plus leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// External programs used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    /// R interpreter used to run fix_align.
    pub rscript: String,
    /// Command that runs SideEye. When unset, a bundled Python shim is run
    /// with `python3`.
    pub sideeye: Option<CommandConfig>,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            rscript: "Rscript".to_string(),
            sideeye: None,
        }
    }
}

/// Top-level parameter file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrascConfig {
    /// Directory with the raw (not yet aligned) `.asc` recordings.
    pub asc_files_dir: PathBuf,
    /// Directory receiving `_fa.asc` recordings. Defaults to
    /// `<asc_files_dir>/Fix Aligned`.
    pub fa_output_dir: Option<PathBuf>,
    /// EyeTrack script that may carry `start_pts`.
    pub script_loc: Option<PathBuf>,
    pub fix_align_loc: PathBuf,
    pub config_json_loc: PathBuf,
    pub sentences_txt_loc: PathBuf,
    /// Stimulus metadata. Defaults to the single `*-formatted.csv` next to
    /// the parameter file.
    pub stimuli_loc: Option<PathBuf>,
    pub file_encoding: FileEncoding,
    pub output_dir: PathBuf,
    pub start_flag: StartFlag,
    pub start_pts: Vec<StartPoint>,
    pub fix_align: AlignmentOptions,
    pub engines: EnginesConfig,

    /// Directory relative paths resolve against. Set by [`Self::from_file`].
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for PrascConfig {
    fn default() -> Self {
        Self {
            asc_files_dir: PathBuf::from("ASC"),
            fa_output_dir: None,
            script_loc: None,
            fix_align_loc: PathBuf::from("fix_align_v0p92.R"),
            config_json_loc: PathBuf::from("config.json"),
            sentences_txt_loc: PathBuf::from("sentences.txt"),
            stimuli_loc: None,
            file_encoding: FileEncoding::default(),
            output_dir: PathBuf::from("prASCed results"),
            start_flag: StartFlag::default(),
            start_pts: Vec::new(),
            fix_align: AlignmentOptions::default(),
            engines: EnginesConfig::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

/// Outcome of looking for the stimulus metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StimuliLocation {
    Found(PathBuf),
    NotFound,
    Ambiguous(Vec<PathBuf>),
}

impl PrascConfig {
    /// Loads a parameter file. An empty file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(config)
    }

    /// Parses YAML content. Blank documents yield the defaults.
    pub fn parse_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Appends the expected extension to configured file locations that lack
    /// it, so `config` means `config.json` and `sentences` means
    /// `sentences.txt`.
    pub fn normalize(&mut self) {
        self.config_json_loc = with_default_extension(&self.config_json_loc, "json");
        self.sentences_txt_loc = with_default_extension(&self.sentences_txt_loc, "txt");
        self.fix_align_loc = with_default_extension(&self.fix_align_loc, "R");
        if let Some(loc) = &self.stimuli_loc {
            self.stimuli_loc = Some(with_default_extension(loc, "csv"));
        }
        if let Some(loc) = &self.script_loc {
            self.script_loc = Some(with_default_extension(loc, "script"));
        }
    }

    /// Checks values that the types alone cannot rule out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(invalid("output_dir", "must not be empty"));
        }
        let options = &self.fix_align;
        if options.den_sd_cutoff.is_nan() {
            return Err(invalid("den_sd_cutoff", "must be a number or .inf"));
        }
        let ratio = options.den_ratio_cutoff;
        if ratio.is_nan() || (ratio.is_infinite() && ratio.is_sign_negative()) {
            return Err(invalid("den_ratio_cutoff", "must be a number or .inf"));
        }
        check_bounds("k_bounds", options.k_bounds)?;
        check_bounds("o_bounds", options.o_bounds)?;
        check_bounds("s_bounds", options.s_bounds)?;
        if let Some(boxes) = &options.xy_bounds {
            if boxes.is_empty() {
                return Err(invalid("xy_bounds", "must list at least one box or be null"));
            }
            for [x_min, x_max, y_min, y_max] in boxes {
                if x_min > x_max || y_min > y_max {
                    return Err(invalid(
                        "xy_bounds",
                        format!("box ({x_min}, {x_max}, {y_min}, {y_max}) has min above max"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Resolves a configured path against the parameter file's directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn asc_dir(&self) -> PathBuf {
        self.resolve_path(&self.asc_files_dir)
    }

    pub fn fa_dir(&self) -> PathBuf {
        match &self.fa_output_dir {
            Some(dir) => self.resolve_path(dir),
            None => self.asc_dir().join("Fix Aligned"),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output_dir)
    }

    pub fn fix_align_path(&self) -> PathBuf {
        self.resolve_path(&self.fix_align_loc)
    }

    pub fn column_config_path(&self) -> PathBuf {
        self.resolve_path(&self.config_json_loc)
    }

    pub fn sentences_path(&self) -> PathBuf {
        self.resolve_path(&self.sentences_txt_loc)
    }

    /// The configured script file, or the single `*.script` file in the base
    /// directory.
    pub fn script_path(&self) -> Option<PathBuf> {
        if let Some(loc) = &self.script_loc {
            return Some(self.resolve_path(loc));
        }
        let candidates = list_with_suffix(&self.base_dir, ".script");
        match candidates.as_slice() {
            [single] => Some(single.clone()),
            [] => None,
            many => {
                warn!(
                    count = many.len(),
                    "Multiple script files found, not importing start_pts from a script"
                );
                None
            }
        }
    }

    /// Locates the stimulus metadata table.
    pub fn stimuli_location(&self) -> StimuliLocation {
        if let Some(loc) = &self.stimuli_loc {
            let path = self.resolve_path(loc);
            return if path.is_file() {
                StimuliLocation::Found(path)
            } else {
                debug!(path = %path.display(), "Configured stimuli file does not exist");
                StimuliLocation::NotFound
            };
        }
        let mut candidates = list_with_suffix(&self.base_dir, "-formatted.csv");
        match candidates.len() {
            0 => StimuliLocation::NotFound,
            1 => StimuliLocation::Found(candidates.remove(0)),
            _ => StimuliLocation::Ambiguous(candidates),
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_bounds(field: &'static str, [low, high]: [f64; 2]) -> Result<(), ConfigError> {
    if !low.is_finite() || !high.is_finite() {
        return Err(invalid(field, "bounds must be finite numbers"));
    }
    if low > high {
        return Err(invalid(field, format!("lower bound {low} exceeds upper bound {high}")));
    }
    Ok(())
}

/// Appends `.ext` unless the path already ends with it (case-insensitive).
pub fn with_default_extension(path: &Path, ext: &str) -> PathBuf {
    let has_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext));
    if has_ext || path.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    }
}

/// Files in `dir` whose names end with `suffix`, sorted by name.
fn list_with_suffix(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.to_ascii_lowercase().ends_with(suffix))
        })
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_document_yields_defaults() {
        let config = PrascConfig::parse_yaml("").unwrap();
        assert_eq!(config.asc_files_dir, PathBuf::from("ASC"));
        assert_eq!(config.output_dir, PathBuf::from("prASCed results"));
        assert_eq!(config.file_encoding, FileEncoding::Latin1);
        assert_eq!(config.start_flag, StartFlag::Trialid);
        assert!(config.start_pts.is_empty());
        assert_eq!(config.engines.rscript, "Rscript");
    }

    #[test]
    fn typed_alignment_parameters() {
        let yaml = r"
start_flag: SYNCTIME
start_pts: [[250, 200], [250, 300]]
file_encoding: utf-8
fix_align:
  xy_bounds: [[0, 1024, 0, 768]]
  keep_y_var: true
  den_sd_cutoff: .inf
  o_bounds: [-40, 40]
";
        let config = PrascConfig::parse_yaml(yaml).unwrap();
        assert_eq!(config.start_flag, StartFlag::Synctime);
        assert_eq!(config.start_pts, vec![[250, 200], [250, 300]]);
        assert_eq!(config.file_encoding, FileEncoding::Utf8);
        assert_eq!(config.fix_align.xy_bounds, Some(vec![[0, 1024, 0, 768]]));
        assert!(config.fix_align.keep_y_var);
        assert!(config.fix_align.den_sd_cutoff.is_infinite());
        assert_eq!(config.fix_align.o_bounds, [-40.0, 40.0]);
        assert_eq!(config.fix_align.s_bounds, [1.0, 20.0]);
        config.validate().unwrap();
    }

    #[test]
    fn malformed_boolean_is_rejected() {
        let yaml = "fix_align:\n  keep_y_var: maybe\n";
        assert!(PrascConfig::parse_yaml(yaml).is_err());
    }

    #[test]
    fn inverted_bounds_fail_validation() {
        let mut config = PrascConfig::default();
        config.fix_align.k_bounds = [0.1, -0.1];
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "k_bounds", .. }));
    }

    #[test]
    fn inverted_xy_box_fails_validation() {
        let mut config = PrascConfig::default();
        config.fix_align.xy_bounds = Some(vec![[100, 50, 0, 10]]);
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { field: "xy_bounds", .. }
        ));
    }

    #[test]
    fn normalize_appends_missing_extensions() {
        let mut config = PrascConfig::parse_yaml(
            "config_json_loc: config\nsentences_txt_loc: sentences.TXT\nstimuli_loc: Stimuli-formatted\nfix_align_loc: fix_align_v0p92\n",
        )
        .unwrap();
        config.normalize();
        assert_eq!(config.config_json_loc, PathBuf::from("config.json"));
        assert_eq!(config.sentences_txt_loc, PathBuf::from("sentences.TXT"));
        assert_eq!(config.stimuli_loc, Some(PathBuf::from("Stimuli-formatted.csv")));
        assert_eq!(config.fix_align_loc, PathBuf::from("fix_align_v0p92.R"));
    }

    #[test]
    fn paths_resolve_against_parameter_file_directory() {
        let dir = TempDir::new().unwrap();
        let params = dir.path().join("prasc.yml");
        std::fs::write(&params, "asc_files_dir: raw\n").unwrap();

        let config = PrascConfig::from_file(&params).unwrap();
        assert_eq!(config.asc_dir(), dir.path().join("raw"));
        assert_eq!(config.fa_dir(), dir.path().join("raw").join("Fix Aligned"));
        assert_eq!(config.output_dir(), dir.path().join("prASCed results"));
    }

    #[test]
    fn missing_parameter_file_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let err = PrascConfig::from_file(dir.path().join("absent.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn stimuli_discovery() {
        let dir = TempDir::new().unwrap();
        let mut config = PrascConfig {
            base_dir: dir.path().to_path_buf(),
            ..PrascConfig::default()
        };
        assert_eq!(config.stimuli_location(), StimuliLocation::NotFound);

        std::fs::write(dir.path().join("Exp1-formatted.csv"), "item_id\n").unwrap();
        assert_eq!(
            config.stimuli_location(),
            StimuliLocation::Found(dir.path().join("Exp1-formatted.csv"))
        );

        std::fs::write(dir.path().join("Exp2-formatted.csv"), "item_id\n").unwrap();
        assert!(matches!(config.stimuli_location(), StimuliLocation::Ambiguous(v) if v.len() == 2));

        config.stimuli_loc = Some(PathBuf::from("Exp2-formatted.csv"));
        assert_eq!(
            config.stimuli_location(),
            StimuliLocation::Found(dir.path().join("Exp2-formatted.csv"))
        );
    }

    #[test]
    fn latin1_round_trip() {
        let bytes = [b'c', 0xE9, b'!'];
        let text = FileEncoding::Latin1.decode(&bytes);
        assert_eq!(text, "c\u{e9}!");
        assert_eq!(FileEncoding::Latin1.encode(&text), bytes.to_vec());
        assert_eq!(FileEncoding::Latin1.encode("\u{263a}"), b"?".to_vec());
    }
}
