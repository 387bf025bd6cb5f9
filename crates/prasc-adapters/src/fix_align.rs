//! fix_align drift correction run through `Rscript`.
//!
//! The fix_align source is copied into a temporary control file, followed by
//! a single `fix_align(...)` call rendered from the typed request. The control
//! file is run with `Rscript --vanilla` and removed afterwards.

use async_trait::async_trait;
use prasc_proto::{AlignmentCorrector, AlignmentOptions, AlignmentRequest, EngineError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Name of the generated control file.
pub const CONTROL_FILE: &str = "fix_align_tmp.r";

/// Runs fix_align with an R interpreter.
#[derive(Debug, Clone)]
pub struct RscriptCorrector {
    rscript: String,
    source: PathBuf,
    work_dir: PathBuf,
}

impl RscriptCorrector {
    /// `source` is the fix_align R file; the control file is written into
    /// `work_dir`.
    pub fn new(rscript: impl Into<String>, source: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            rscript: rscript.into(),
            source: source.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn control_path(&self) -> PathBuf {
        self.work_dir.join(CONTROL_FILE)
    }

    /// Writes the control file, replacing a stale one.
    pub fn write_control_file(&self, request: &AlignmentRequest) -> Result<PathBuf, EngineError> {
        let source = std::fs::read_to_string(&self.source).map_err(|e| EngineError::ControlFile {
            path: self.source.clone(),
            reason: format!("cannot read fix_align source: {e}"),
        })?;
        let control = self.control_path();
        if control.exists() {
            std::fs::remove_file(&control).map_err(|e| EngineError::ControlFile {
                path: control.clone(),
                reason: format!("unable to delete existing control file: {e}"),
            })?;
        }
        let mut script = prepare_source(&source);
        if !script.ends_with('\n') {
            script.push('\n');
        }
        script.push_str(&render_call(request));
        script.push('\n');
        std::fs::write(&control, script)?;
        debug!(file = %control.display(), "Wrote fix_align control file");
        Ok(control)
    }
}

#[async_trait]
impl AlignmentCorrector for RscriptCorrector {
    fn name(&self) -> &str {
        "fix_align"
    }

    async fn correct(&self, request: &AlignmentRequest) -> Result<(), EngineError> {
        let control = self.write_control_file(request)?;
        info!(recordings = request.recordings.len(), "Processing recordings with fix_align");

        // Recording paths are relative to our working directory, so R runs there too.
        let status = Command::new(&self.rscript)
            .arg("--vanilla")
            .arg(&control)
            .status()
            .await;

        let status = match status {
            Ok(status) => status,
            Err(source) => {
                remove_control(&control);
                return Err(EngineError::Spawn {
                    program: self.rscript.clone(),
                    source,
                });
            }
        };
        remove_control(&control);
        if !status.success() {
            return Err(EngineError::Failed {
                program: self.rscript.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

fn remove_control(control: &Path) {
    if let Err(err) = std::fs::remove_file(control) {
        warn!(
            file = %control.display(),
            error = %err,
            "Unable to delete fix_align control file; delete it manually before the next run"
        );
    }
}

fn timestamp_re() -> &'static Regex {
    static TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();
    TIMESTAMP_RE.get_or_init(|| Regex::new(r"format\((.*)\)\)").expect("valid timestamp regex"))
}

const PROCESSING_MESSAGE: &str = r#"print(paste('Processing: ', files[i], sep=""))"#;
const SHORT_PROCESSING_MESSAGE: &str = r#"cat('Processing ', basename(files[i]), '...\n', sep="")"#;

/// Adjusts the fix_align source: timestamps in output names get `;` instead
/// of `:` (invalid in Windows paths), and progress lines show only the file
/// name.
pub fn prepare_source(source: &str) -> String {
    let source = timestamp_re().replace_all(source, "gsub(':', ';', format(${1})))");
    source.replace(PROCESSING_MESSAGE, SHORT_PROCESSING_MESSAGE)
}

/// Renders the `fix_align(...)` call for a request.
pub fn render_call(request: &AlignmentRequest) -> String {
    let AlignmentOptions {
        xy_bounds,
        keep_y_var,
        use_run_rule,
        trial_plots,
        save_trial_plots,
        summary_file,
        show_image,
        den_sd_cutoff,
        den_ratio_cutoff,
        k_bounds,
        o_bounds,
        s_bounds,
    } = &request.options;

    let start_pts = rbind(request.start_points.iter().map(|p| r_vector(p.iter())));
    let asc_files = r_vector(request.recordings.iter().map(|p| r_path(p)));
    let xy_bounds = match xy_bounds {
        Some(boxes) if !boxes.is_empty() => rbind(boxes.iter().map(|b| r_vector(b.iter()))),
        _ => "NULL".to_string(),
    };

    format!(
        "fix_align(start_pts = {start_pts}, asc_files = {asc_files}, xy_bounds = {xy_bounds}, \
         keep_y_var = {}, use_run_rule = {}, trial_plots = {}, save_trial_plots = {}, \
         summary_file = {}, show_image = {}, fa_dir = {}, start_flag = \"{}\", \
         den_sd_cutoff = {}, den_ratio_cutoff = {}, k_bounds = {}, o_bounds = {}, s_bounds = {})",
        r_bool(*keep_y_var),
        r_bool(*use_run_rule),
        r_bool(*trial_plots),
        r_bool(*save_trial_plots),
        r_bool(*summary_file),
        r_bool(*show_image),
        r_path(&request.output_dir),
        request.start_flag,
        r_number(*den_sd_cutoff),
        r_number(*den_ratio_cutoff),
        r_vector(k_bounds.iter().map(|v| r_number(*v))),
        r_vector(o_bounds.iter().map(|v| r_number(*v))),
        r_vector(s_bounds.iter().map(|v| r_number(*v))),
    )
}

fn r_bool(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

fn r_number(value: f64) -> String {
    if value.is_infinite() {
        if value.is_sign_positive() { "Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}

/// A quoted path with forward slashes.
fn r_path(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/").replace('"', "\\\"");
    format!("\"{text}\"")
}

fn r_vector<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: ToString,
{
    let items: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    format!("c({})", items.join(", "))
}

fn rbind(rows: impl Iterator<Item = String>) -> String {
    let rows: Vec<String> = rows.collect();
    format!("rbind({})", rows.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prasc_proto::StartFlag;
    use tempfile::TempDir;

    fn request(dir: &Path) -> AlignmentRequest {
        AlignmentRequest {
            recordings: vec![dir.join("s1.asc"), PathBuf::from(r"C:\data\s2.asc")],
            output_dir: dir.join("Fix Aligned"),
            start_points: vec![[250, 200], [250, 300]],
            start_flag: StartFlag::Trialid,
            options: AlignmentOptions::default(),
        }
    }

    #[test]
    fn renders_default_call() {
        let req = AlignmentRequest {
            recordings: vec![PathBuf::from("ASC/s1.asc")],
            output_dir: PathBuf::from("ASC/Fix Aligned"),
            start_points: vec![[250, 200]],
            start_flag: StartFlag::Trialid,
            options: AlignmentOptions::default(),
        };
        assert_eq!(
            render_call(&req),
            "fix_align(start_pts = rbind(c(250, 200)), asc_files = c(\"ASC/s1.asc\"), \
             xy_bounds = NULL, keep_y_var = FALSE, use_run_rule = TRUE, trial_plots = FALSE, \
             save_trial_plots = FALSE, summary_file = TRUE, show_image = FALSE, \
             fa_dir = \"ASC/Fix Aligned\", start_flag = \"TRIALID\", den_sd_cutoff = Inf, \
             den_ratio_cutoff = 1, k_bounds = c(-0.1, 0.1), o_bounds = c(-50, 50), s_bounds = c(1, 20))"
        );
    }

    #[test]
    fn renders_bounds_and_windows_paths() {
        let dir = TempDir::new().unwrap();
        let mut req = request(dir.path());
        req.options.xy_bounds = Some(vec![[0, 1024, 0, 768], [10, 20, 30, 40]]);
        req.start_flag = StartFlag::Synctime;
        let call = render_call(&req);
        assert!(call.contains("xy_bounds = rbind(c(0, 1024, 0, 768), c(10, 20, 30, 40))"));
        assert!(call.contains("\"C:/data/s2.asc\""));
        assert!(call.contains("start_pts = rbind(c(250, 200), c(250, 300))"));
        assert!(call.contains("start_flag = \"SYNCTIME\""));
    }

    #[test]
    fn prepares_source() {
        let source = "name <- format(Sys.time(), \"%H:%M\"))\nprint(paste('Processing: ', files[i], sep=\"\"))\n";
        let prepared = prepare_source(source);
        assert!(prepared.starts_with("name <- gsub(':', ';', format(Sys.time(), \"%H:%M\")))"));
        assert!(prepared.contains("cat('Processing ', basename(files[i])"));
    }

    #[test]
    fn control_file_replaces_stale_copy() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("fix_align.R");
        std::fs::write(&source, "fix_align <- function(...) NULL").unwrap();
        std::fs::write(dir.path().join(CONTROL_FILE), "stale").unwrap();

        let corrector = RscriptCorrector::new("Rscript", &source, dir.path());
        let control = corrector.write_control_file(&request(dir.path())).unwrap();
        let text = std::fs::read_to_string(control).unwrap();
        assert!(text.starts_with("fix_align <- function(...) NULL\nfix_align(start_pts"));
        assert!(!text.contains("stale"));
    }

    #[test]
    fn missing_source_is_a_control_file_error() {
        let dir = TempDir::new().unwrap();
        let corrector = RscriptCorrector::new("Rscript", dir.path().join("absent.R"), dir.path());
        assert!(matches!(
            corrector.write_control_file(&request(dir.path())),
            Err(EngineError::ControlFile { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn control_file_is_removed_after_success() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("fix_align.R");
        std::fs::write(&source, "").unwrap();
        let corrector = RscriptCorrector::new("true", &source, dir.path());

        corrector.correct(&request(dir.path())).await.unwrap();
        assert!(!corrector.control_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_fatal_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("fix_align.R");
        std::fs::write(&source, "").unwrap();
        let corrector = RscriptCorrector::new("false", &source, dir.path());

        let err = corrector.correct(&request(dir.path())).await.unwrap_err();
        assert!(matches!(err, EngineError::Failed { .. }));
        assert!(!corrector.control_path().exists());
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("fix_align.R");
        std::fs::write(&source, "").unwrap();
        let corrector = RscriptCorrector::new("prasc-no-such-rscript", &source, dir.path());

        let err = corrector.correct(&request(dir.path())).await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
        assert!(!corrector.control_path().exists());
    }
}
