//! Start point resolution.
//!
//! Line start points come from the parameter file or from the
//! `start_pts = rbind(c(x, y), ...)` line of an EyeTrack script.

use crate::config::ConfigError;
use prasc_proto::StartPoint;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

fn matrix_re() -> &'static Regex {
    static MATRIX_RE: OnceLock<Regex> = OnceLock::new();
    MATRIX_RE.get_or_init(|| {
        Regex::new(r"^rbind\s*\(\s*c\s*\(\s*\d+\s*,\s*\d+\s*\)(\s*,\s*c\s*\(\s*\d+\s*,\s*\d+\s*\))*\s*\)$")
            .expect("valid start point matrix regex")
    })
}

fn pair_re() -> &'static Regex {
    static PAIR_RE: OnceLock<Regex> = OnceLock::new();
    PAIR_RE.get_or_init(|| {
        Regex::new(r"c\s*\(\s*(\d+)\s*,\s*(\d+)\s*\)").expect("valid start point pair regex")
    })
}

fn script_line_re() -> &'static Regex {
    static LINE_RE: OnceLock<Regex> = OnceLock::new();
    LINE_RE.get_or_init(|| {
        Regex::new(r"(?m)start_pts\s*=\s*(.*?)\s*$").expect("valid start_pts line regex")
    })
}

/// Parses an R `rbind(c(x, y), ...)` matrix.
pub fn parse_rbind(text: &str) -> Option<Vec<StartPoint>> {
    let text = text.trim();
    if !matrix_re().is_match(text) {
        return None;
    }
    pair_re()
        .captures_iter(text)
        .map(|caps| Some([caps[1].parse().ok()?, caps[2].parse().ok()?]))
        .collect()
}

/// What a script says about start points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStartPoints {
    /// No `start_pts` line.
    Missing,
    /// A line whose value is not a valid matrix.
    Malformed(String),
    Valid(Vec<StartPoint>),
}

/// Extracts start points from script text.
pub fn from_script(script: &str) -> ScriptStartPoints {
    let Some(caps) = script_line_re().captures(script) else {
        return ScriptStartPoints::Missing;
    };
    let value = &caps[1];
    match parse_rbind(value) {
        Some(points) => ScriptStartPoints::Valid(points),
        None => ScriptStartPoints::Malformed(value.to_string()),
    }
}

/// Picks the start points to use.
///
/// Parameter-file points win over script points; disagreement is reported.
/// Missing from both is an error.
pub fn resolve(configured: &[StartPoint], script: Option<&Path>) -> Result<Vec<StartPoint>, ConfigError> {
    let from_file = match script {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => from_script(&text),
            Err(err) => {
                warn!(script = %path.display(), error = %err, "Unable to read script file");
                ScriptStartPoints::Missing
            }
        },
        None => ScriptStartPoints::Missing,
    };

    match (configured.is_empty(), from_file) {
        (false, ScriptStartPoints::Valid(points)) => {
            if points != configured {
                warn!("start_pts specified in both the parameter file and the script file; using the parameter file");
            }
            Ok(configured.to_vec())
        }
        (false, ScriptStartPoints::Malformed(value)) => {
            warn!(value = %value, "start_pts in the script file is malformed; using the parameter file");
            Ok(configured.to_vec())
        }
        (false, ScriptStartPoints::Missing) => Ok(configured.to_vec()),
        (true, ScriptStartPoints::Valid(points)) => Ok(points),
        (true, ScriptStartPoints::Malformed(value)) => Err(ConfigError::Invalid {
            field: "start_pts",
            reason: format!("script value '{value}' is not of the form rbind(c(x, y), ...)"),
        }),
        (true, ScriptStartPoints::Missing) => Err(ConfigError::MissingStartPoints),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_matrix() {
        assert_eq!(
            parse_rbind("rbind(c(250, 200), c(250,300))"),
            Some(vec![[250, 200], [250, 300]])
        );
        assert_eq!(parse_rbind("rbind( c(1,2) )"), Some(vec![[1, 2]]));
    }

    #[test]
    fn rejects_malformed_matrix() {
        assert_eq!(parse_rbind("c(250, 200)"), None);
        assert_eq!(parse_rbind("rbind(c(250, -1))"), None);
        assert_eq!(parse_rbind("rbind(c(250, 200),)"), None);
    }

    #[test]
    fn script_line_extraction() {
        let script = "set display 1024\nstart_pts = rbind(c(10, 20), c(10, 60))\nend\n";
        assert_eq!(from_script(script), ScriptStartPoints::Valid(vec![[10, 20], [10, 60]]));
        assert_eq!(from_script("nothing here"), ScriptStartPoints::Missing);
        assert!(matches!(
            from_script("start_pts = rbind(oops)"),
            ScriptStartPoints::Malformed(_)
        ));
    }

    #[test]
    fn parameter_file_wins() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("exp.script");
        std::fs::write(&script, "start_pts = rbind(c(1, 1))\n").unwrap();

        let points = resolve(&[[5, 5]], Some(&script)).unwrap();
        assert_eq!(points, vec![[5, 5]]);
    }

    #[test]
    fn script_fills_in_missing_parameter() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("exp.script");
        std::fs::write(&script, "start_pts = rbind(c(1, 1))\n").unwrap();

        assert_eq!(resolve(&[], Some(&script)).unwrap(), vec![[1, 1]]);
    }

    #[test]
    fn neither_source_is_an_error() {
        assert!(matches!(resolve(&[], None), Err(ConfigError::MissingStartPoints)));
    }
}
