//! Comprehension question scoring.
//!
//! A recording's event log is scanned once. Only three kinds of line matter:
//! the trial start marker (`TRIALID` or `SYNCTIME`), `QUESTION_ANSWER`, which
//! names the correct response, and `TRIAL_RESULT`, which carries the given
//! response and closes the trial.

use crate::config::FileEncoding;
use prasc_proto::{QuestionRecord, RecordingSummary, StartFlag};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const QUESTION_ANSWER: &str = "QUESTION_ANSWER";
const TRIAL_RESULT: &str = "TRIAL_RESULT";

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("recording {path} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Scores of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecording {
    pub records: Vec<QuestionRecord>,
    pub summary: RecordingSummary,
}

/// Scores of a batch of recordings, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionScores {
    pub records: Vec<QuestionRecord>,
    pub summaries: Vec<RecordingSummary>,
}

#[derive(Debug)]
enum TrialState {
    Awaiting,
    Open {
        start_time: u64,
        condition: String,
        item: String,
        correct: Option<String>,
    },
}

/// Why a marker line was skipped.
#[derive(Debug, PartialEq, Eq)]
enum Malformed {
    MissingFields,
    BadTime,
    BadTrialId,
}

impl Malformed {
    fn describe(&self) -> &'static str {
        match self {
            Malformed::MissingFields => "fewer than four fields",
            Malformed::BadTime => "timestamp is not an integer",
            Malformed::BadTrialId => "trial id has no item separator",
        }
    }
}

/// Question scorer for one start marker.
#[derive(Debug, Clone, Copy)]
pub struct QuestionScorer {
    start_flag: StartFlag,
    encoding: FileEncoding,
}

impl QuestionScorer {
    pub fn new(start_flag: StartFlag, encoding: FileEncoding) -> Self {
        Self {
            start_flag,
            encoding,
        }
    }

    /// Scores every recording. Any unreadable recording fails the batch.
    pub fn score_all(&self, recordings: &[PathBuf]) -> Result<QuestionScores, ScoreError> {
        let mut scores = QuestionScores::default();
        for path in recordings {
            let scored = self.score_file(path)?;
            scores.records.extend(scored.records);
            scores.summaries.push(scored.summary);
        }
        Ok(scores)
    }

    pub fn score_file(&self, path: &Path) -> Result<ScoredRecording, ScoreError> {
        let bytes = std::fs::read(path).map_err(|source| ScoreError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let text = self.encoding.decode(&bytes);
        Ok(self.score_text(&path.to_string_lossy(), &text))
    }

    /// Scores the event log of `recording`.
    pub fn score_text(&self, recording: &str, text: &str) -> ScoredRecording {
        let flag = self.start_flag.as_str();
        let mut state = TrialState::Awaiting;
        let mut records = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let outcome = if line.contains(flag) {
                open_trial(line).map(|open| state = open)
            } else if line.contains(QUESTION_ANSWER) {
                record_answer(line, &mut state)
            } else if line.contains(TRIAL_RESULT) {
                close_trial(line, recording, &mut state).map(|record| records.extend(record))
            } else {
                Ok(())
            };
            if let Err(reason) = outcome {
                warn!(
                    recording = %recording,
                    line = line_no,
                    reason = reason.describe(),
                    "Skipping malformed marker line"
                );
            }
        }

        let correct = records.iter().filter(|r| r.was_correct).count();
        let summary = RecordingSummary {
            recording: recording.to_string(),
            questions: u32::try_from(records.len()).unwrap_or(u32::MAX),
            correct: u32::try_from(correct).unwrap_or(u32::MAX),
        };
        debug!(
            recording = %recording,
            questions = summary.questions,
            correct = summary.correct,
            proportion = ?summary.proportion_correct(),
            "Scored recording"
        );
        ScoredRecording { records, summary }
    }
}

/// `(time, token)` from the 2nd and 4th whitespace fields.
fn marker_fields(line: &str) -> Result<(u64, &str), Malformed> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(Malformed::MissingFields);
    }
    let time = fields[1].parse().map_err(|_| Malformed::BadTime)?;
    Ok((time, fields[3]))
}

fn open_trial(line: &str) -> Result<TrialState, Malformed> {
    let (start_time, token) = marker_fields(line)?;
    let (condition, rest) = token.split_once('I').ok_or(Malformed::BadTrialId)?;
    let condition = condition.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let item = rest.split('D').next().unwrap_or(rest);
    Ok(TrialState::Open {
        start_time,
        condition: condition.to_string(),
        item: item.to_string(),
        correct: None,
    })
}

fn record_answer(line: &str, state: &mut TrialState) -> Result<(), Malformed> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let answer = fields.get(3).ok_or(Malformed::MissingFields)?;
    if let TrialState::Open { correct, .. } = state {
        *correct = Some((*answer).to_string());
    }
    Ok(())
}

fn close_trial(
    line: &str,
    recording: &str,
    state: &mut TrialState,
) -> Result<Option<QuestionRecord>, Malformed> {
    let (end_time, response) = marker_fields(line)?;
    let TrialState::Open {
        start_time,
        condition,
        item,
        correct,
    } = std::mem::replace(state, TrialState::Awaiting)
    else {
        return Ok(None);
    };
    let Some(correct_answer) = correct else {
        return Ok(None);
    };
    if end_time < start_time {
        warn!(recording = %recording, item = %item, "Trial ends before it starts; latency set to 0");
    }
    Ok(Some(QuestionRecord {
        recording: recording.to_string(),
        condition,
        item,
        was_correct: response == correct_answer,
        correct_answer,
        response: response.to_string(),
        latency: end_time.saturating_sub(start_time),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scorer() -> QuestionScorer {
        QuestionScorer::new(StartFlag::Trialid, FileEncoding::Latin1)
    }

    const LOG: &str = "\
MSG 1000 TRIALID E1I5D0
MSG 1100 QUESTION_ANSWER X
MSG 1250 TRIAL_RESULT X
MSG 2000 TRIALID E2I6D0
MSG 2100 QUESTION_ANSWER X
MSG 2300 TRIAL_RESULT Y
MSG 3000 TRIALID F1I7D1
MSG 3400 TRIAL_RESULT 5
";

    #[test]
    fn correct_and_incorrect_trials() {
        let scored = scorer().score_text("ASC/s1_fa.asc", LOG);
        assert_eq!(scored.records.len(), 2);

        let first = &scored.records[0];
        assert_eq!(first.condition, "1");
        assert_eq!(first.item, "5");
        assert!(first.was_correct);
        assert_eq!(first.latency, 250);

        let second = &scored.records[1];
        assert_eq!(second.condition, "2");
        assert_eq!(second.item, "6");
        assert_eq!(second.correct_answer, "X");
        assert_eq!(second.response, "Y");
        assert!(!second.was_correct);
        assert_eq!(second.latency, 300);

        assert_eq!(scored.summary.questions, 2);
        assert_eq!(scored.summary.correct, 1);
        assert_eq!(scored.summary.proportion_correct(), Some(0.5));
    }

    #[test]
    fn trials_without_questions_are_not_counted() {
        let log = "MSG 10 TRIALID E1I1D0\nMSG 20 TRIAL_RESULT 0\n";
        let scored = scorer().score_text("s.asc", log);
        assert!(scored.records.is_empty());
        assert_eq!(scored.summary.questions, 0);
        assert_eq!(scored.summary.proportion_correct(), None);
    }

    #[test]
    fn result_without_open_trial_is_ignored() {
        let log = "MSG 5 TRIAL_RESULT X\nMSG 10 TRIALID E1I1D0\nMSG 15 QUESTION_ANSWER X\nMSG 20 TRIAL_RESULT X\nMSG 25 TRIAL_RESULT X\n";
        let scored = scorer().score_text("s.asc", log);
        assert_eq!(scored.records.len(), 1);
        assert_eq!(scored.summary.questions, 1);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let log = "MSG abc TRIALID E1I1D0\nMSG 10 TRIALID\nMSG 10 TRIALID E1I2D0\nMSG 15 QUESTION_ANSWER X\nMSG 20 TRIAL_RESULT X\n";
        let scored = scorer().score_text("s.asc", log);
        assert_eq!(scored.records.len(), 1);
        assert_eq!(scored.records[0].item, "2");
    }

    #[test]
    fn condition_keeps_digits_after_letters() {
        let log = "MSG 1 TRIALID COND12I40D3\nMSG 2 QUESTION_ANSWER A\nMSG 3 TRIAL_RESULT A\n";
        let scored = scorer().score_text("s.asc", log);
        assert_eq!(scored.records[0].condition, "12");
        assert_eq!(scored.records[0].item, "40");
    }

    #[test]
    fn synctime_start_flag() {
        let log = "MSG 100 SYNCTIME E3I9D0\nMSG 150 QUESTION_ANSWER 1\nMSG 180 TRIAL_RESULT 1\n";
        let scored = QuestionScorer::new(StartFlag::Synctime, FileEncoding::Utf8).score_text("s.asc", log);
        assert_eq!(scored.records.len(), 1);
        assert_eq!(scored.records[0].condition, "3");
    }

    #[test]
    fn unreadable_recording_fails_the_batch() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("a_fa.asc");
        std::fs::write(&good, LOG).unwrap();
        let missing = dir.path().join("missing_fa.asc");

        let err = scorer().score_all(&[good, missing.clone()]).unwrap_err();
        let ScoreError::Unreadable { path, .. } = err;
        assert_eq!(path, missing);
    }

    #[test]
    fn batch_keeps_input_order() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("b_fa.asc");
        let b = dir.path().join("a_fa.asc");
        std::fs::write(&a, LOG).unwrap();
        std::fs::write(&b, "").unwrap();

        let scores = scorer().score_all(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(scores.summaries.len(), 2);
        assert_eq!(scores.summaries[0].recording, a.to_string_lossy());
        assert_eq!(scores.summaries[1].questions, 0);
        assert!(scores.records.iter().all(|r| r.recording == a.to_string_lossy()));
    }
}
