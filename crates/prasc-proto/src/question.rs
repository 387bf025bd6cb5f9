//! Question scoring records and their tabular layout.

use crate::table::{NA, ShapeError, Table};
use serde::{Deserialize, Serialize};

/// Column holding the condition number parsed from the trial id.
pub const QUESTION_TYPE: &str = "question_type";
pub const CORRECT_ANSWER: &str = "correct_answer";
pub const RESPONSE: &str = "response";
pub const WAS_RESPONSE_CORRECT: &str = "was_response_correct";
pub const RESPONSE_RT: &str = "response_RT";

pub const NUMBER_QUESTIONS: &str = "s_number_questions";
pub const NUM_CORRECT_ANSWERS: &str = "s_num_correct_answers";
pub const TOTAL_PROP_CORRECT: &str = "s_total_prop_correct";

/// One answered comprehension question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Recording path as it was handed to the scorer.
    pub recording: String,
    pub condition: String,
    pub item: String,
    pub correct_answer: String,
    pub response: String,
    pub was_correct: bool,
    /// Trial end minus trial start, in recording clock units.
    pub latency: u64,
}

/// Per-recording accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub recording: String,
    pub questions: u32,
    pub correct: u32,
}

impl RecordingSummary {
    /// Proportion of correct answers, or `None` for a recording without
    /// questions.
    pub fn proportion_correct(&self) -> Option<f64> {
        if self.questions == 0 {
            None
        } else {
            Some(f64::from(self.correct) / f64::from(self.questions))
        }
    }
}

/// Header of `subject_question_info.txt` for the configured column names.
pub fn question_headers(filename_col: &str, item_id_col: &str) -> Vec<String> {
    vec![
        filename_col.to_string(),
        QUESTION_TYPE.to_string(),
        item_id_col.to_string(),
        CORRECT_ANSWER.to_string(),
        RESPONSE.to_string(),
        WAS_RESPONSE_CORRECT.to_string(),
        RESPONSE_RT.to_string(),
    ]
}

/// Header of `question_summary.txt` for the configured filename column.
pub fn summary_headers(filename_col: &str) -> Vec<String> {
    vec![
        filename_col.to_string(),
        NUMBER_QUESTIONS.to_string(),
        NUM_CORRECT_ANSWERS.to_string(),
        TOTAL_PROP_CORRECT.to_string(),
    ]
}

/// Lays question records out as a table.
pub fn questions_table(
    records: &[QuestionRecord],
    filename_col: &str,
    item_id_col: &str,
) -> Result<Table, ShapeError> {
    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.recording.clone(),
                r.condition.clone(),
                r.item.clone(),
                r.correct_answer.clone(),
                r.response.clone(),
                bool_cell(r.was_correct).to_string(),
                r.latency.to_string(),
            ]
        })
        .collect();
    Table::with_rows(question_headers(filename_col, item_id_col), rows)
}

/// Lays recording summaries out as a table.
pub fn summaries_table(
    summaries: &[RecordingSummary],
    filename_col: &str,
) -> Result<Table, ShapeError> {
    let rows = summaries
        .iter()
        .map(|s| {
            vec![
                s.recording.clone(),
                s.questions.to_string(),
                s.correct.to_string(),
                s.proportion_correct()
                    .map_or_else(|| NA.to_string(), format_proportion),
            ]
        })
        .collect();
    Table::with_rows(summary_headers(filename_col), rows)
}

fn bool_cell(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

/// Formats a proportion with the shortest round-tripping representation,
/// always keeping a fractional part (`1.0`, `0.75`).
fn format_proportion(value: f64) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(correct: bool) -> QuestionRecord {
        QuestionRecord {
            recording: "ASC/s1_fa.asc".to_string(),
            condition: "1".to_string(),
            item: "5".to_string(),
            correct_answer: "X".to_string(),
            response: if correct { "X" } else { "Y" }.to_string(),
            was_correct: correct,
            latency: 150,
        }
    }

    #[test]
    fn zero_questions_has_no_proportion() {
        let summary = RecordingSummary {
            recording: "s.asc".to_string(),
            questions: 0,
            correct: 0,
        };
        assert_eq!(summary.proportion_correct(), None);

        let table = summaries_table(&[summary], "filename").unwrap();
        assert_eq!(table.rows()[0][3], "NA");
    }

    #[test]
    fn proportion_keeps_fraction() {
        let full = RecordingSummary {
            recording: "s.asc".to_string(),
            questions: 4,
            correct: 4,
        };
        let partial = RecordingSummary {
            recording: "t.asc".to_string(),
            questions: 4,
            correct: 3,
        };
        let table = summaries_table(&[full, partial], "subject").unwrap();
        assert_eq!(table.headers()[0], "subject");
        assert_eq!(table.rows()[0][3], "1.0");
        assert_eq!(table.rows()[1][3], "0.75");
    }

    #[test]
    fn question_rows_use_configured_headers() {
        let table = questions_table(&[record(true), record(false)], "file", "item").unwrap();
        assert_eq!(
            table.headers(),
            [
                "file",
                "question_type",
                "item",
                "correct_answer",
                "response",
                "was_response_correct",
                "response_RT"
            ]
        );
        assert_eq!(table.rows()[0][5], "TRUE");
        assert_eq!(table.rows()[1][5], "FALSE");
        assert_eq!(table.rows()[1][6], "150");
    }
}
