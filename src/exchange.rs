//! CSV import of exam results and CSV exports of the roster, admissions and
//! results.

use crate::calc::{self, MAX_SUBJECT_TOTAL};
use crate::lenient;
use crate::model::{Admission, ExamResult, Student, SubjectMark};
use anyhow::Context;
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Trim, WriterBuilder};
use thiserror::Error;

pub const RESULT_IMPORT_FIXED_COLUMNS: usize = 4;
/// Used when a subject's total is missing, zero or not a number.
pub const DEFAULT_SUBJECT_TOTAL: i64 = 100;

pub const STUDENT_HEADERS: [&str; 11] = [
    "Name",
    "Roll Number",
    "Class",
    "Section",
    "Age",
    "Parent Name",
    "Parent Contact",
    "Parent Email",
    "Address",
    "Admission Date",
    "Status",
];

pub const ADMISSION_HEADERS: [&str; 9] = [
    "Name",
    "Age",
    "Class Applied",
    "Parent Name",
    "Parent Contact",
    "Parent Email",
    "Address",
    "Application Date",
    "Status",
];

pub const RESULT_HEADERS: [&str; 10] = [
    "Student Name",
    "Roll Number",
    "Class",
    "Section",
    "Exam Type",
    "Total Marks",
    "Max Marks",
    "Percentage",
    "Grade",
    "Subjects",
];

#[derive(Error, Debug)]
pub enum CsvImportError {
    #[error("failed to read csv: {0}")]
    Parse(#[from] csv::Error),
    #[error("no valid results found in csv ({rows_total} data rows, {skipped} skipped)")]
    Empty { rows_total: usize, skipped: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: &'static str,
}

/// Parsed results with totals already applied. Ids are left at 0 for the
/// caller to assign.
#[derive(Debug, Clone, Default)]
pub struct ResultImport {
    pub results: Vec<ExamResult>,
    pub rows_total: usize,
    pub skipped: Vec<SkippedRow>,
}

/// Groups with an empty cell, or with marks outside `0..=total` or a total
/// above [`MAX_SUBJECT_TOTAL`], are left out.
fn parse_subjects(record: &StringRecord) -> Vec<SubjectMark> {
    let cells: Vec<&str> = record.iter().skip(RESULT_IMPORT_FIXED_COLUMNS).collect();
    cells
        .chunks_exact(3)
        .filter(|group| group.iter().all(|c| !c.is_empty()))
        .map(|group| SubjectMark {
            name: group[0].to_string(),
            marks: lenient::leading_int(group[1]).unwrap_or(0),
            total_marks: lenient::leading_int(group[2])
                .filter(|t| *t != 0)
                .unwrap_or(DEFAULT_SUBJECT_TOTAL),
            ..SubjectMark::default()
        })
        .filter(|s| {
            s.total_marks <= MAX_SUBJECT_TOTAL && (0..=s.total_marks).contains(&s.marks)
        })
        .collect()
}

/// Columns: studentName, rollNumber, class, examType, then repeating
/// (subjectName, marks, totalMarks) groups. The first row is a header.
pub fn parse_results_csv(text: &str) -> Result<ResultImport, CsvImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    reader.headers()?;

    let mut out = ResultImport::default();
    for row in reader.records() {
        out.rows_total += 1;
        let record = match row {
            Ok(r) => r,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                out.skipped.push(SkippedRow {
                    line,
                    reason: "malformed",
                });
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() < RESULT_IMPORT_FIXED_COLUMNS {
            out.skipped.push(SkippedRow {
                line,
                reason: "too_few_columns",
            });
            continue;
        }
        let subjects = parse_subjects(&record);
        if subjects.is_empty() {
            out.skipped.push(SkippedRow {
                line,
                reason: "no_subjects",
            });
            continue;
        }
        let mut result = ExamResult {
            student_name: record[0].to_string(),
            roll_number: record[1].to_string(),
            class_name: record[2].to_string(),
            exam_type: record[3].to_string(),
            subjects,
            ..ExamResult::default()
        };
        calc::apply_totals(&mut result);
        out.results.push(result);
    }

    if out.results.is_empty() {
        return Err(CsvImportError::Empty {
            rows_total: out.rows_total,
            skipped: out.skipped.len(),
        });
    }
    Ok(out)
}

fn write_all<I>(headers: &[&str], rows: I) -> anyhow::Result<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut w = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    w.write_record(headers).context("failed to write csv header")?;
    for row in rows {
        w.write_record(&row).context("failed to write csv row")?;
    }
    let bytes = w
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush csv: {}", e.error()))?;
    String::from_utf8(bytes).context("csv output is not utf-8")
}

fn age_cell(age: Option<i64>) -> String {
    age.map(|a| a.to_string()).unwrap_or_default()
}

pub fn students_csv(students: &[Student]) -> anyhow::Result<String> {
    write_all(
        &STUDENT_HEADERS,
        students.iter().map(|s| {
            vec![
                s.name.clone(),
                s.roll_number.clone(),
                s.class_name.clone(),
                s.section.clone(),
                age_cell(s.age),
                s.parent_name.clone(),
                s.parent_contact.clone(),
                s.parent_email.clone(),
                s.address.clone(),
                s.admission_date.clone(),
                s.status.to_string(),
            ]
        }),
    )
}

pub fn admissions_csv(admissions: &[Admission]) -> anyhow::Result<String> {
    write_all(
        &ADMISSION_HEADERS,
        admissions.iter().map(|a| {
            vec![
                a.name.clone(),
                age_cell(a.age),
                a.class_applied.clone(),
                a.parent_name.clone(),
                a.parent_contact.clone(),
                a.parent_email.clone(),
                a.address.clone(),
                a.application_date.clone(),
                a.status.to_string(),
            ]
        }),
    )
}

pub fn results_csv(results: &[ExamResult]) -> anyhow::Result<String> {
    write_all(
        &RESULT_HEADERS,
        results.iter().map(|r| {
            let subjects = r
                .subjects
                .iter()
                .map(|s| format!("{} {}/{}", s.name, s.marks, s.total_marks))
                .collect::<Vec<_>>()
                .join("; ");
            vec![
                r.student_name.clone(),
                r.roll_number.clone(),
                r.class_name.clone(),
                r.section.clone(),
                r.exam_type.clone(),
                r.total_marks.to_string(),
                r.max_marks.to_string(),
                r.percentage.to_string(),
                r.grade.clone(),
                subjects,
            ]
        }),
    )
}

const TEMPLATE_SUBJECT_GROUPS: usize = 5;

const TEMPLATE_ROWS: [&[&str]; 4] = [
    &[
        "John Doe", "KS001", "Class 10", "Final Term", "Mathematics", "95", "100", "Science", "88",
        "100", "English", "92", "100", "Social Studies", "85", "100", "Hindi", "90", "100",
    ],
    &[
        "Mike Johnson", "KS003", "Class 9", "Mid Term", "Mathematics", "78", "100", "Science",
        "82", "100", "English", "85", "100", "Hindi", "80", "100", "Social Studies", "75", "100",
    ],
    &[
        "Alex Miller", "KS009", "LKG", "Final Term", "English", "45", "50", "Mathematics", "42",
        "50", "Drawing", "48", "50", "", "", "", "", "", "",
    ],
    &[
        "Sophie Clark", "KS010", "UKG", "Final Term", "English", "47", "50", "Mathematics", "44",
        "50", "Drawing", "49", "50", "EVS", "46", "50", "", "", "",
    ],
];

/// Import template with sample rows; unused subject groups stay empty.
pub fn results_template() -> anyhow::Result<String> {
    let mut headers: Vec<String> = ["studentName", "rollNumber", "class", "examType"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    for n in 1..=TEMPLATE_SUBJECT_GROUPS {
        headers.push(format!("subject{}Name", n));
        headers.push(format!("subject{}Marks", n));
        headers.push(format!("subject{}Total", n));
    }
    let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();
    write_all(
        &header_refs,
        TEMPLATE_ROWS
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentStatus;

    #[test]
    fn import_computes_totals_and_grade() {
        let text = "studentName,rollNumber,class,examType,s1,m1,t1,s2,m2,t2\n\
                    Aarav Sharma,KS25001,Class 5,Mid Term,Mathematics,95,100,Science,88,100\n";
        let import = parse_results_csv(text).expect("import");
        assert_eq!(import.rows_total, 1);
        let r = &import.results[0];
        assert_eq!(r.student_name, "Aarav Sharma");
        assert_eq!(r.exam_type, "Mid Term");
        assert_eq!((r.total_marks, r.max_marks, r.percentage), (183, 200, 92));
        assert_eq!(r.grade, "A+");
        assert_eq!(r.id, 0);
    }

    #[test]
    fn short_rows_and_partial_groups_are_skipped() {
        let text = "h1,h2,h3,h4,a,b,c,d,e,f\n\
                    Only,Three,Cols\n\
                    Alex Miller,KS009,LKG,Final Term,English,45,50,Drawing,,50\n\
                    No Subjects,KS011,UKG,Final Term,,,\n";
        let import = parse_results_csv(text).expect("import");
        assert_eq!(import.rows_total, 3);
        assert_eq!(import.results.len(), 1);
        assert_eq!(import.results[0].subjects.len(), 1);
        assert_eq!(import.results[0].max_marks, 50);
        let reasons: Vec<&str> = import.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec!["too_few_columns", "no_subjects"]);
        assert_eq!(import.skipped[0].line, 2);
    }

    #[test]
    fn non_numeric_marks_and_totals_fall_back() {
        let text = "a,b,c,d,e,f,g\n\"Kid, Jr.\",R1,Class 1,Unit Test,Art,absent,n/a\n";
        let import = parse_results_csv(text).expect("import");
        let r = &import.results[0];
        assert_eq!(r.student_name, "Kid, Jr.");
        assert_eq!(r.subjects[0].marks, 0);
        assert_eq!(r.subjects[0].total_marks, DEFAULT_SUBJECT_TOTAL);
        assert_eq!(r.grade, "F");
    }

    #[test]
    fn decimal_marks_and_totals_keep_their_integer_part() {
        let text = "a,b,c,d,e,f,g,h,i,j\n\
                    Aarav Sharma,KS1,Class 5,Final,Math,85.5,100,Science,40,50.0\n";
        let import = parse_results_csv(text).expect("import");
        let r = &import.results[0];
        assert_eq!(r.subjects[0].marks, 85);
        assert_eq!(r.subjects[1].total_marks, 50);
        assert_eq!((r.total_marks, r.max_marks, r.percentage), (125, 150, 83));
        assert_eq!(r.grade, "A");
    }

    #[test]
    fn out_of_range_groups_are_dropped_without_overflow() {
        let text = "a,b,c,d,e,f,g,h,i,j\n\
                    X,KS1,C,F,Math,92233720368547758,100,Art,40,50\n\
                    Y,KS2,C,F,Math,10,5000,,,\n\
                    Z,KS3,C,F,Math,-5,100,,,\n\
                    W,KS4,C,F,Math,99999999999999999999,100,,,\n";
        let import = parse_results_csv(text).expect("import");
        assert_eq!(import.results.len(), 1);
        let r = &import.results[0];
        assert_eq!(r.subjects.len(), 1);
        assert_eq!(r.subjects[0].name, "Art");
        assert_eq!((r.total_marks, r.max_marks, r.percentage), (40, 50, 80));
        let reasons: Vec<&str> = import.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec!["no_subjects", "no_subjects", "no_subjects"]);
    }

    #[test]
    fn file_without_valid_rows_is_empty_error() {
        assert!(matches!(
            parse_results_csv("studentName,rollNumber,class,examType\n"),
            Err(CsvImportError::Empty { rows_total: 0, .. })
        ));
        assert!(matches!(
            parse_results_csv("a,b,c,d\nx,y,z,w\n"),
            Err(CsvImportError::Empty {
                rows_total: 1,
                skipped: 1
            })
        ));
    }

    #[test]
    fn template_parses_back_into_results() {
        let text = results_template().expect("template");
        assert!(text.starts_with("\"studentName\",\"rollNumber\",\"class\",\"examType\",\"subject1Name\""));
        let import = parse_results_csv(&text).expect("import");
        assert_eq!(import.results.len(), TEMPLATE_ROWS.len());
        assert_eq!(import.results[2].subjects.len(), 3);
        assert_eq!(import.results[3].max_marks, 200);
    }

    #[test]
    fn exports_quote_every_field() {
        let s = Student {
            name: "Priya \"Pia\" Patel".into(),
            roll_number: "KS25002".into(),
            class_name: "Class 6".into(),
            age: Some(12),
            status: StudentStatus::Transferred,
            ..Student::default()
        };
        let text = students_csv(&[s]).expect("csv");
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("\"Name\",\"Roll Number\",\"Class\",\"Section\",\"Age\",\"Parent Name\",\"Parent Contact\",\"Parent Email\",\"Address\",\"Admission Date\",\"Status\"")
        );
        assert_eq!(
            lines.next(),
            Some("\"Priya \"\"Pia\"\" Patel\",\"KS25002\",\"Class 6\",\"\",\"12\",\"\",\"\",\"\",\"\",\"\",\"transferred\"")
        );

        let a = Admission {
            name: "Rohit".into(),
            class_applied: "Class 4".into(),
            ..Admission::default()
        };
        let text = admissions_csv(&[a]).expect("csv");
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap_or("").ends_with("\"pending\""));
    }

    #[test]
    fn results_export_lists_subjects() {
        let mut r = ExamResult {
            student_name: "Aarav".into(),
            subjects: vec![
                SubjectMark {
                    name: "Math".into(),
                    marks: 9,
                    total_marks: 10,
                    ..SubjectMark::default()
                },
                SubjectMark {
                    name: "Art".into(),
                    marks: 7,
                    total_marks: 10,
                    ..SubjectMark::default()
                },
            ],
            ..ExamResult::default()
        };
        calc::apply_totals(&mut r);
        let text = results_csv(&[r]).expect("csv");
        let row = text.lines().nth(1).unwrap_or("");
        assert!(row.contains("\"16\",\"20\",\"80\",\"A\",\"Math 9/10; Art 7/10\""));
    }
}
