use crate::model::{Admission, Announcement, ExamResult, Routine, Student};
use std::collections::HashSet;
use std::hash::Hash;

/// Keeps the first record seen for every identity key and drops the rest,
/// preserving input order. Returns the kept records and how many were dropped.
pub fn dedupe<T, K, F>(records: Vec<T>, identity: F) -> (Vec<T>, usize)
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen: HashSet<K> = HashSet::with_capacity(records.len());
    let total = records.len();
    let kept: Vec<T> = records
        .into_iter()
        .filter(|r| seen.insert(identity(r)))
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

pub fn admission_key(a: &Admission) -> (String, String, String, String) {
    (
        a.name.clone(),
        a.class_applied.clone(),
        a.parent_contact.clone(),
        a.application_date.clone(),
    )
}

pub fn student_key(s: &Student) -> (String, String, String) {
    (s.roll_number.clone(), s.name.clone(), s.class_name.clone())
}

pub fn result_key(r: &ExamResult) -> (String, String, String, String) {
    (
        r.student_name.clone(),
        r.roll_number.clone(),
        r.class_name.clone(),
        r.exam_type.clone(),
    )
}

pub fn routine_key(r: &Routine) -> (String, String, String) {
    (r.class_name.clone(), r.routine_type.clone(), r.title.clone())
}

/// Announcements have no semantic identity; only repeated ids collapse.
pub fn announcement_key(a: &Announcement) -> i64 {
    a.id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admission(id: i64, name: &str, contact: &str, date: &str) -> Admission {
        Admission {
            id,
            name: name.to_string(),
            class_applied: "Class 4".to_string(),
            parent_contact: contact.to_string(),
            application_date: date.to_string(),
            ..Admission::default()
        }
    }

    #[test]
    fn first_record_per_key_wins_and_order_is_kept() {
        let input = vec![
            admission(10, "Rohit", "111", "2024-12-20"),
            admission(11, "Anita", "222", "2024-12-22"),
            admission(12, "Rohit", "111", "2024-12-20"),
            admission(13, "Vikash", "333", "2024-12-25"),
            admission(14, "Anita", "222", "2024-12-22"),
        ];
        let (kept, dropped) = dedupe(input, admission_key);
        assert_eq!(dropped, 2);
        let ids: Vec<i64> = kept.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![10, 11, 13]);
    }

    #[test]
    fn records_differing_in_any_key_field_are_kept() {
        let input = vec![
            admission(1, "Rohit", "111", "2024-12-20"),
            admission(2, "Rohit", "111", "2024-12-21"),
            admission(3, "Rohit", "999", "2024-12-20"),
        ];
        let (kept, dropped) = dedupe(input, admission_key);
        assert_eq!(dropped, 0);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn students_and_routines_use_their_own_keys() {
        let a = Student {
            id: 1,
            name: "Priya".into(),
            roll_number: "KS25002".into(),
            class_name: "Class 6".into(),
            section: "A".into(),
            ..Student::default()
        };
        let b = Student {
            id: 2,
            section: "B".into(),
            ..a.clone()
        };
        let (kept, dropped) = dedupe(vec![a, b], student_key);
        assert_eq!((kept.len(), dropped), (1, 1));
        assert_eq!(kept[0].section, "A");

        let r1 = Routine {
            id: 7,
            class_name: "Class 9".into(),
            routine_type: "Daily".into(),
            title: "Class 9 Daily Routine".into(),
            ..Routine::default()
        };
        let r2 = Routine {
            id: 8,
            routine_type: "Exam".into(),
            ..r1.clone()
        };
        let (kept, dropped) = dedupe(vec![r1, r2], routine_key);
        assert_eq!((kept.len(), dropped), (2, 0));
    }

    #[test]
    fn empty_input_drops_nothing() {
        let (kept, dropped) = dedupe(Vec::<ExamResult>::new(), result_key);
        assert!(kept.is_empty());
        assert_eq!(dropped, 0);
    }
}
