//! Locations of recordings and per-stage result files.

use std::path::{Path, PathBuf};
use tracing::debug;

pub const RESULTS_FILE: &str = "results.csv";
pub const QUESTIONS_FILE: &str = "subject_question_info.txt";
pub const SUMMARY_FILE: &str = "question_summary.txt";
pub const COMBINED_FILE: &str = "results_combined.csv";

/// Suffix of an alignment-corrected recording.
pub const CORRECTED_SUFFIX: &str = "_fa.asc";

/// Per-stage and combined result files inside the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFiles {
    dir: PathBuf,
}

impl OutputFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Measures table (`results.csv`).
    pub fn results(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    /// Per-question records (`subject_question_info.txt`).
    pub fn questions(&self) -> PathBuf {
        self.dir.join(QUESTIONS_FILE)
    }

    /// Per-recording accuracy (`question_summary.txt`).
    pub fn summary(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE)
    }

    pub fn combined(&self) -> PathBuf {
        self.dir.join(COMBINED_FILE)
    }

    /// Existing files a run would overwrite.
    ///
    /// The measures file is guarded when measuring or combining, the question
    /// files when scoring or combining, and the combined file when combining.
    pub fn conflicts(&self, measuring: bool, scoring: bool, combining: bool) -> Vec<PathBuf> {
        let mut guarded = Vec::new();
        if combining {
            guarded.push(self.combined());
        }
        if measuring || combining {
            guarded.push(self.results());
        }
        if scoring || combining {
            guarded.push(self.questions());
            guarded.push(self.summary());
        }
        guarded.into_iter().filter(|p| p.is_file()).collect()
    }
}

/// True for `.asc` recordings, corrected or not.
pub fn is_recording(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("asc"))
}

/// True for `_fa.asc` recordings.
pub fn is_corrected(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_ascii_lowercase().ends_with(CORRECTED_SUFFIX))
}

/// Name of the corrected counterpart of a raw recording: `s1.asc` becomes
/// `s1_fa.asc`.
pub fn corrected_name(raw: &Path) -> Option<String> {
    let stem = raw.file_stem()?.to_str()?;
    Some(format!("{stem}{CORRECTED_SUFFIX}"))
}

/// Recordings in `dir` accepted by `filter`, sorted by file name.
pub fn list_recordings(dir: &Path, filter: impl Fn(&Path) -> bool) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_recording(&path) && filter(&path) {
            found.push(path);
        }
    }
    found.sort();
    debug!(dir = %dir.display(), count = found.len(), "Listed recordings");
    Ok(found)
}

/// Raw recordings: `.asc` files that are not `_fa.asc`.
pub fn list_raw(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    list_recordings(dir, |p| !is_corrected(p))
}

/// Corrected recordings: `_fa.asc` files.
pub fn list_corrected(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    list_recordings(dir, is_corrected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "").unwrap();
    }

    #[test]
    fn corrected_naming() {
        assert_eq!(corrected_name(Path::new("ASC/s1.asc")).as_deref(), Some("s1_fa.asc"));
        assert!(is_corrected(Path::new("x/S1_FA.ASC")));
        assert!(!is_corrected(Path::new("x/s1.asc")));
    }

    #[test]
    fn raw_and_corrected_listing() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.asc");
        touch(dir.path(), "a.asc");
        touch(dir.path(), "a_fa.asc");
        touch(dir.path(), "notes.txt");

        let raw = list_raw(dir.path()).unwrap();
        assert_eq!(raw, vec![dir.path().join("a.asc"), dir.path().join("b.asc")]);
        let corrected = list_corrected(dir.path()).unwrap();
        assert_eq!(corrected, vec![dir.path().join("a_fa.asc")]);
    }

    #[test]
    fn conflicts_depend_on_stages() {
        let dir = TempDir::new().unwrap();
        let files = OutputFiles::new(dir.path());
        touch(dir.path(), RESULTS_FILE);
        touch(dir.path(), SUMMARY_FILE);

        assert!(files.conflicts(false, false, false).is_empty());
        assert_eq!(files.conflicts(true, false, false), vec![files.results()]);
        assert_eq!(files.conflicts(false, true, false), vec![files.summary()]);
        assert_eq!(
            files.conflicts(false, false, true),
            vec![files.results(), files.summary()]
        );
    }
}
