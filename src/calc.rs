use crate::model::{ExamResult, SubjectMark};

/// Upper bound for one subject's total marks.
pub const MAX_SUBJECT_TOTAL: i64 = 1000;

fn saturate(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}

fn percentage_wide(obtained: i128, max: i128) -> i64 {
    if max <= 0 {
        return 0;
    }
    saturate((200 * obtained + max).div_euclid(2 * max))
}

/// Percentage rounded half-up, the way the result forms always displayed it:
/// `floor(100 * obtained / max + 0.5)`. Integer arithmetic keeps 91.5 exact.
pub fn percentage(obtained: i64, max: i64) -> i64 {
    percentage_wide(i128::from(obtained), i128::from(max))
}

pub fn grade_for(percentage: i64) -> &'static str {
    match percentage {
        p if p >= 90 => "A+",
        p if p >= 80 => "A",
        p if p >= 70 => "B",
        p if p >= 60 => "C",
        p if p >= 50 => "D",
        _ => "F",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTotals {
    pub total_marks: i64,
    pub max_marks: i64,
    pub percentage: i64,
    pub grade: &'static str,
}

pub fn totals(subjects: &[SubjectMark]) -> ResultTotals {
    // Summed wide so stored or imported outliers cannot overflow.
    let total_marks: i128 = subjects.iter().map(|s| i128::from(s.marks)).sum();
    let max_marks: i128 = subjects.iter().map(|s| i128::from(s.total_marks)).sum();
    let percentage = percentage_wide(total_marks, max_marks);
    ResultTotals {
        total_marks: saturate(total_marks),
        max_marks: saturate(max_marks),
        percentage,
        grade: grade_for(percentage),
    }
}

/// Recomputes the derived fields of a result from its subjects.
pub fn apply_totals(result: &mut ExamResult) {
    let t = totals(&result.subjects);
    result.total_marks = t.total_marks;
    result.max_marks = t.max_marks;
    result.percentage = t.percentage;
    result.grade = t.grade.to_string();
}
