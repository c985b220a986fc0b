//! crates/tuteskillz_core/src/transcript.rs
//!
//! Extracts (subject, grade) pairs from the plain text of an exam transcript.

use crate::domain::ExamResult;
use regex::Regex;
use std::sync::OnceLock;

const HEADER_LINE: &str = "SUBJECT GRADE DEFINITION";

fn result_line() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(r"(?i)^(.+?)\s+([A-CFSW])\s+(.+)$").expect("transcript line pattern is valid")
    })
}

/// Parses lines shaped like `MATHEMATICS A DISTINCTION`.
///
/// Blank lines, the column header and anything not matching the pattern are skipped.
pub fn parse_transcript(text: &str) -> Vec<ExamResult> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != HEADER_LINE)
        .filter_map(|line| {
            let caps = result_line().captures(line)?;
            Some(ExamResult {
                subject: caps[1].trim().to_string(),
                grade: caps[2].trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_rows_and_skips_header() {
        let text = "SUBJECT GRADE DEFINITION\n\
                    MATHEMATICS A DISTINCTION\n\
                    \n\
                    SCIENCE B VERY GOOD PASS\n\
                    ENGLISH LANGUAGE C CREDIT PASS\n";
        let parsed = parse_transcript(text);
        assert_eq!(
            parsed,
            vec![
                ExamResult { subject: "MATHEMATICS".into(), grade: "A".into() },
                ExamResult { subject: "SCIENCE".into(), grade: "B".into() },
                ExamResult { subject: "ENGLISH LANGUAGE".into(), grade: "C".into() },
            ]
        );
    }

    #[test]
    fn ignores_lines_without_a_grade_letter() {
        let parsed = parse_transcript("INDEX NUMBER 1234567\nHISTORY s simple pass");
        assert_eq!(parsed, vec![ExamResult { subject: "HISTORY".into(), grade: "s".into() }]);
    }
}
