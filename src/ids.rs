use crate::model::{Document, Student};

/// First id handed out in a fresh workspace. Small enough for the remote
/// integer columns, unlike the millisecond timestamps used before.
pub const ID_BASE: i64 = 10000;

/// Largest id the remote int4 columns accept. Legacy timestamp ids sit above
/// it, so the counter never resumes from them and never reaches them.
pub const ID_MAX: i64 = i32::MAX as i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdGenerator {
    next: i64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self { next: ID_BASE }
    }
}

impl IdGenerator {
    /// Resumes after the persisted counter and after every id already in the
    /// document, whichever is higher. Values above [`ID_MAX`] are ignored.
    pub fn resume(persisted: Option<i64>, doc: &Document) -> Self {
        let after_doc = doc.max_id_up_to(ID_MAX) + 1;
        let after_counter = persisted
            .filter(|v| *v <= ID_MAX)
            .map(|v| v + 1)
            .unwrap_or(ID_BASE);
        Self {
            next: ID_BASE.max(after_doc).max(after_counter),
        }
    }

    pub fn next_id(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Last id handed out, for persisting.
    pub fn last_issued(&self) -> i64 {
        self.next - 1
    }
}

fn year_suffix(year: i32) -> String {
    format!("{:02}", year.rem_euclid(100))
}

/// Local roll-number ordinal: one past the roster size, and past the highest
/// number already issued for this prefix and year so deletions do not cause
/// reuse.
pub fn local_roll_ordinal(prefix: &str, year: i32, students: &[Student]) -> i64 {
    let stem = format!("{}{}", prefix, year_suffix(year));
    let highest = students
        .iter()
        .filter_map(|s| s.roll_number.strip_prefix(stem.as_str()))
        .filter_map(|rest| rest.parse::<i64>().ok())
        .max()
        .unwrap_or(0);
    (students.len() as i64 + 1).max(highest + 1)
}

pub fn format_roll_number(prefix: &str, year: i32, ordinal: i64) -> String {
    format!("{}{}{:03}", prefix, year_suffix(year), ordinal)
}
