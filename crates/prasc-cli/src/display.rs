//! Terminal output helpers.

use clap::ValueEnum;
use prasc_core::RunSummary;
use std::io::{IsTerminal, stdout};

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    pub fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
}

/// Wraps text in an ANSI color when enabled.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    pub fn new(mode: ColorMode) -> Self {
        Self {
            enabled: mode.should_use_colors(),
        }
    }

    pub fn paint(self, color: &str, text: &str) -> String {
        if self.enabled {
            format!("{color}{text}{}", colors::RESET)
        } else {
            text.to_string()
        }
    }

    pub fn ok(self, text: &str) -> String {
        format!("{} {text}", self.paint(colors::GREEN, "✓"))
    }

    pub fn warn(self, text: &str) -> String {
        format!("{} {text}", self.paint(colors::YELLOW, "!"))
    }

    pub fn fail(self, text: &str) -> String {
        format!("{} {text}", self.paint(colors::RED, "✗"))
    }

    pub fn dim(self, text: &str) -> String {
        self.paint(colors::DIM, text)
    }

    pub fn bold(self, text: &str) -> String {
        self.paint(colors::BOLD, text)
    }
}

/// Lines printed after a successful run.
pub fn summary_lines(summary: &RunSummary, painter: Painter) -> Vec<String> {
    let mut lines = vec![painter.ok(&format!(
        "{} recording(s): {} aligned, {} measured, {} scored",
        summary.recordings, summary.aligned, summary.measured, summary.scored
    ))];
    if let Some(report) = &summary.combined {
        lines.push(painter.ok(&format!(
            "Combined {} row(s) into {}",
            report.rows,
            report.output.display()
        )));
        for path in &report.deleted {
            lines.push(painter.dim(&format!("  removed {}", path.display())));
        }
        for reason in &report.skipped {
            lines.push(painter.warn(&reason.to_string()));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn painter_without_colors_is_plain() {
        let painter = Painter::new(ColorMode::Never);
        assert_eq!(painter.paint(colors::RED, "x"), "x");
        assert_eq!(painter.ok("done"), "✓ done");
    }

    #[test]
    fn painter_with_colors_wraps_text() {
        let painter = Painter::new(ColorMode::Always);
        assert_eq!(painter.bold("x"), "\x1b[1mx\x1b[0m");
    }

    #[test]
    fn summary_without_combine_is_one_line() {
        let summary = RunSummary {
            recordings: 3,
            aligned: 1,
            measured: 1,
            scored: 2,
            combined: None,
        };
        let lines = summary_lines(&summary, Painter::new(ColorMode::Never));
        assert_eq!(
            lines,
            vec!["✓ 3 recording(s): 1 aligned, 1 measured, 2 scored".to_string()]
        );
    }
}
