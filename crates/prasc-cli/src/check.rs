//! `prasc check`: validates a parameter file and its environment without
//! running any stage.

use crate::display::Painter;
use clap::Parser;
use prasc_adapters::{SideEyeExtractor, find_program};
use prasc_core::{
    DEFAULT_PARAMETERS_FILE, FieldLookup, FieldMap, LogicalField, PrascConfig, StimuliLocation,
    list_corrected, list_raw, start_points,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Parameter file
    #[arg(default_value = DEFAULT_PARAMETERS_FILE)]
    pub params: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub checks: Vec<Check>,
    pub failures: usize,
    pub warnings: usize,
}

impl CheckReport {
    fn push(&mut self, name: &'static str, status: CheckStatus, detail: impl Into<String>) {
        match status {
            CheckStatus::Fail => self.failures += 1,
            CheckStatus::Warn => self.warnings += 1,
            CheckStatus::Pass => {}
        }
        self.checks.push(Check {
            name,
            status,
            detail: detail.into(),
        });
    }

    pub fn get(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn lines(&self, painter: Painter) -> Vec<String> {
        let mut lines: Vec<String> = self
            .checks
            .iter()
            .map(|check| {
                let text = format!("{}: {}", check.name, check.detail);
                match check.status {
                    CheckStatus::Pass => painter.ok(&text),
                    CheckStatus::Warn => painter.warn(&text),
                    CheckStatus::Fail => painter.fail(&text),
                }
            })
            .collect();
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        lines.push(painter.bold(&format!(
            "{} failure{}, {} warning{}",
            self.failures,
            plural(self.failures),
            self.warnings,
            plural(self.warnings)
        )));
        lines
    }
}

/// Runs every check against a loaded configuration.
pub fn run_checks(config: &PrascConfig) -> CheckReport {
    let mut report = CheckReport::default();

    let asc_dir = config.asc_dir();
    match list_raw(&asc_dir) {
        Ok(raw) => report.push(
            "recordings",
            CheckStatus::Pass,
            format!("{} recording(s) in {}", raw.len(), asc_dir.display()),
        ),
        Err(e) => report.push(
            "recordings",
            CheckStatus::Fail,
            format!("{}: {e}", asc_dir.display()),
        ),
    }

    let fa_dir = config.fa_dir();
    match list_corrected(&fa_dir) {
        Ok(corrected) => report.push(
            "corrected",
            CheckStatus::Pass,
            format!("{} corrected recording(s) in {}", corrected.len(), fa_dir.display()),
        ),
        Err(_) => report.push(
            "corrected",
            CheckStatus::Warn,
            format!("{} does not exist yet and will be created", fa_dir.display()),
        ),
    }

    match FieldMap::load(config.column_config_path()) {
        Ok(fields) => {
            let describe = |field: LogicalField| match fields.lookup(field) {
                FieldLookup::Present(header) => format!("{field} -> {header}"),
                FieldLookup::Absent { .. } => format!("{field} excluded"),
            };
            let detail = LogicalField::ALL
                .iter()
                .map(|f| describe(*f))
                .collect::<Vec<_>>()
                .join(", ");
            let status = if fields.is_included(LogicalField::ItemId) {
                CheckStatus::Pass
            } else {
                CheckStatus::Warn
            };
            report.push("columns", status, detail);
        }
        Err(e) => report.push("columns", CheckStatus::Fail, e.to_string()),
    }

    require_file(&mut report, "regions", &config.sentences_path());
    require_file(&mut report, "fix_align", &config.fix_align_path());

    let script = config.script_path();
    match start_points::resolve(&config.start_pts, script.as_deref()) {
        Ok(points) => report.push(
            "start_pts",
            CheckStatus::Pass,
            format!("{} line start point(s)", points.len()),
        ),
        Err(e) => report.push("start_pts", CheckStatus::Fail, e.to_string()),
    }

    match config.stimuli_location() {
        StimuliLocation::Found(path) => {
            report.push("stimuli", CheckStatus::Pass, path.display().to_string());
        }
        StimuliLocation::NotFound => report.push(
            "stimuli",
            CheckStatus::Warn,
            "no stimuli file; stimuli will not be combined",
        ),
        StimuliLocation::Ambiguous(paths) => report.push(
            "stimuli",
            CheckStatus::Warn,
            format!(
                "{} candidate files; set stimuli_loc to pick one",
                paths.len()
            ),
        ),
    }

    check_program(&mut report, "rscript", &config.engines.rscript);
    let extractor = SideEyeExtractor::from_config(config.engines.sideeye.as_ref());
    check_program(&mut report, "sideeye", extractor.program());

    report
}

fn require_file(report: &mut CheckReport, name: &'static str, path: &Path) {
    if path.is_file() {
        report.push(name, CheckStatus::Pass, path.display().to_string());
    } else {
        report.push(
            name,
            CheckStatus::Fail,
            format!("{} not found", path.display()),
        );
    }
}

fn check_program(report: &mut CheckReport, name: &'static str, program: &str) {
    match find_program(program) {
        Ok(path) => report.push(name, CheckStatus::Pass, path.display().to_string()),
        Err(e) => report.push(name, CheckStatus::Fail, e.to_string()),
    }
}
