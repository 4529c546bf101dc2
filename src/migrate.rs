//! Field-name migration from the camelCase convention written by the first
//! releases to the snake_case convention used everywhere now.
//!
//! Migration works on raw JSON so that it can run on anything the local cache
//! or the remote tables hand back. It never fails: collections that are
//! missing or not arrays come out empty, and records keep every field that is
//! not part of a rename.

use crate::model::{Document, Table};
use serde_json::{Map, Value};
use tracing::{debug, warn};

#[derive(Clone, Copy)]
struct Rename {
    current: &'static str,
    /// Checked in order; the first one present supplies the value when the
    /// current key is absent.
    legacy: &'static [&'static str],
}

struct Nested {
    field: &'static str,
    renames: &'static [Rename],
}

struct CollectionRules {
    renames: &'static [Rename],
    nested: &'static [Nested],
}

const PARENT_RENAMES: [Rename; 3] = [
    Rename {
        current: "parent_name",
        legacy: &["parentName"],
    },
    Rename {
        current: "parent_contact",
        legacy: &["parentContact"],
    },
    Rename {
        current: "parent_email",
        legacy: &["parentEmail"],
    },
];

const STUDENT_RENAMES: &[Rename] = &[
    Rename {
        current: "roll_number",
        legacy: &["rollNumber"],
    },
    Rename {
        current: "admission_date",
        legacy: &["admissionDate"],
    },
    Rename {
        current: "original_admission_id",
        legacy: &["originalAdmissionId"],
    },
    PARENT_RENAMES[0],
    PARENT_RENAMES[1],
    PARENT_RENAMES[2],
];

const ADMISSION_RENAMES: &[Rename] = &[
    // Admissions were first stored with a plain `class` key, later with both.
    Rename {
        current: "class_applied",
        legacy: &["classApplied", "class"],
    },
    Rename {
        current: "application_date",
        legacy: &["applicationDate"],
    },
    PARENT_RENAMES[0],
    PARENT_RENAMES[1],
    PARENT_RENAMES[2],
];

const SUBJECT_RENAMES: &[Rename] = &[Rename {
    current: "total_marks",
    legacy: &["totalMarks"],
}];

const RESULT_RENAMES: &[Rename] = &[
    Rename {
        current: "student_name",
        legacy: &["studentName"],
    },
    Rename {
        current: "roll_number",
        legacy: &["rollNumber"],
    },
    Rename {
        current: "exam_type",
        legacy: &["examType"],
    },
    Rename {
        current: "total_marks",
        legacy: &["totalMarks"],
    },
    Rename {
        current: "max_marks",
        legacy: &["maxMarks"],
    },
];

const ROUTINE_RENAMES: &[Rename] = &[
    Rename {
        current: "routine_type",
        legacy: &["routineType"],
    },
    Rename {
        current: "time_slots",
        legacy: &["timeSlots"],
    },
    Rename {
        current: "pdf_attachment",
        legacy: &["pdfAttachment"],
    },
    Rename {
        current: "created_at",
        legacy: &["createdAt"],
    },
];

const RESULT_NESTED: &[Nested] = &[Nested {
    field: "subjects",
    renames: SUBJECT_RENAMES,
}];

// Time slots keep their startTime/endTime keys; they still go through the
// element pass so a later rename only needs an entry here.
const ROUTINE_NESTED: &[Nested] = &[Nested {
    field: "time_slots",
    renames: &[],
}];

fn rules(table: Table) -> CollectionRules {
    match table {
        Table::Students => CollectionRules {
            renames: STUDENT_RENAMES,
            nested: &[],
        },
        Table::Admissions => CollectionRules {
            renames: ADMISSION_RENAMES,
            nested: &[],
        },
        Table::Announcements => CollectionRules {
            renames: &[],
            nested: &[],
        },
        Table::Results => CollectionRules {
            renames: RESULT_RENAMES,
            nested: RESULT_NESTED,
        },
        Table::Routines => CollectionRules {
            renames: ROUTINE_RENAMES,
            nested: ROUTINE_NESTED,
        },
    }
}

fn apply_renames(record: &mut Map<String, Value>, renames: &[Rename]) -> usize {
    let mut changed = 0usize;
    for rename in renames {
        let mut fallback: Option<Value> = None;
        for key in rename.legacy {
            if let Some(v) = record.remove(*key) {
                changed += 1;
                if fallback.is_none() {
                    fallback = Some(v);
                }
            }
        }
        let current_missing = matches!(record.get(rename.current), None | Some(Value::Null));
        if current_missing {
            if let Some(v) = fallback {
                record.insert(rename.current.to_string(), v);
            }
        }
    }
    changed
}

fn migrate_record(record: &mut Map<String, Value>, rules: &CollectionRules) -> usize {
    let mut changed = apply_renames(record, rules.renames);
    for nested in rules.nested {
        if let Some(Value::Array(items)) = record.get_mut(nested.field) {
            for item in items.iter_mut() {
                if let Value::Object(obj) = item {
                    changed += apply_renames(obj, nested.renames);
                }
            }
        }
    }
    changed
}

/// Migrates one collection of raw records. Non-array input yields an empty
/// collection.
pub fn migrate_collection(table: Table, raw: Option<&Value>) -> Vec<Value> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let Value::Array(items) = raw else {
        warn!(table = %table, "collection is not an array; using an empty one");
        return Vec::new();
    };
    let rules = rules(table);
    let mut changed = 0usize;
    let out: Vec<Value> = items
        .iter()
        .cloned()
        .map(|mut item| {
            if let Value::Object(obj) = &mut item {
                changed += migrate_record(obj, &rules);
            }
            item
        })
        .collect();
    if changed > 0 {
        debug!(table = %table, renamed = changed, "migrated legacy field names");
    }
    out
}

/// Normalizes a raw document to the current field names, still as JSON.
pub fn migrate_value(raw: &Value) -> Value {
    let mut doc = Map::new();
    for table in Table::ALL {
        let items = migrate_collection(table, raw.get(table.as_str()));
        doc.insert(table.as_str().to_string(), Value::Array(items));
    }
    Value::Object(doc)
}

/// Migrates a raw document and reads it into typed collections.
pub fn migrate(raw: &Value) -> Document {
    if !raw.is_object() && !raw.is_null() {
        warn!("stored document is not an object; starting from an empty one");
    }
    let normalized = migrate_value(raw);
    match serde_json::from_value::<Document>(normalized) {
        Ok(doc) => doc,
        Err(e) => {
            // Every field reader is lenient, so this only trips on serde bugs.
            warn!(error = %e, "migrated document did not deserialize; using an empty one");
            Document::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Every legacy key that migration removes, per collection.
    fn legacy_keys(table: Table) -> Vec<&'static str> {
        rules(table)
            .renames
            .iter()
            .flat_map(|r| r.legacy.iter().copied())
            .collect()
    }

    fn legacy_document() -> Value {
        json!({
            "students": [{
                "id": 1001,
                "name": "Aarav Sharma",
                "rollNumber": "KS25001",
                "class": "Class 5",
                "section": "A",
                "age": 11,
                "parent_name": "Rajesh Sharma",
                "parent_contact": "+91-9876543210",
                "admissionDate": "2024-01-15",
                "status": "active",
                "originalAdmissionId": 1
            }],
            "admissions": [{
                "id": 2001,
                "name": "Rohit Kumar",
                "age": 10,
                "class": "Class 4",
                "class_applied": "Class 4",
                "parent_contact": "+91-9876543212",
                "applicationDate": "2024-12-20",
                "status": "pending"
            }, {
                "id": 2002,
                "name": "Anita Singh",
                "class": "Class 7",
                "applicationDate": "2024-12-22",
                "status": "approved"
            }],
            "announcements": [{
                "id": 1,
                "title": "Welcome",
                "content": "Classes start soon",
                "date": "2024-12-28",
                "status": "active"
            }],
            "results": [{
                "id": 1,
                "studentName": "Aarav Sharma",
                "rollNumber": "KS001",
                "class": "Class 10",
                "examType": "Final Term",
                "subjects": [
                    { "name": "Mathematics", "marks": 95, "totalMarks": 100 },
                    { "name": "Science", "marks": 88, "totalMarks": 100 }
                ],
                "totalMarks": 183,
                "maxMarks": 200,
                "percentage": 92,
                "grade": "A+"
            }],
            "routines": [{
                "id": 1,
                "class": "Class 10",
                "routineType": "Daily",
                "title": "Class 10 Daily Routine",
                "timeSlots": [
                    { "startTime": "08:00", "endTime": "08:45", "subject": "Mathematics", "teacher": "Mr. Sharma" }
                ]
            }],
            "teachers": []
        })
    }

    fn assert_no_legacy_keys(v: &Value) {
        for table in Table::ALL {
            let items = v[table.as_str()].as_array().expect("array");
            for item in items {
                for key in legacy_keys(table) {
                    assert!(
                        item.get(key).is_none(),
                        "{} still carries legacy key {}",
                        table,
                        key
                    );
                }
            }
        }
        for r in v["results"].as_array().expect("results") {
            for s in r["subjects"].as_array().expect("subjects") {
                assert!(s.get("totalMarks").is_none());
            }
        }
    }

    #[test]
    fn legacy_fields_become_current_fields() {
        let doc = migrate(&legacy_document());
        let s = &doc.students[0];
        assert_eq!(s.roll_number, "KS25001");
        assert_eq!(s.admission_date, "2024-01-15");
        assert_eq!(s.original_admission_id, Some(1));
        assert_eq!(doc.admissions[0].class_applied, "Class 4");
        assert_eq!(doc.admissions[1].class_applied, "Class 7");
        assert_eq!(doc.admissions[1].application_date, "2024-12-22");
        let r = &doc.results[0];
        assert_eq!(r.student_name, "Aarav Sharma");
        assert_eq!(r.exam_type, "Final Term");
        assert_eq!(r.total_marks, 183);
        assert_eq!(r.max_marks, 200);
        assert_eq!(r.subjects[1].total_marks, 100);
        let rt = &doc.routines[0];
        assert_eq!(rt.routine_type, "Daily");
        assert_eq!(rt.time_slots.len(), 1);
        assert_eq!(rt.time_slots[0].start_time, "08:00");
    }

    #[test]
    fn current_name_wins_over_legacy_name() {
        let raw = json!({
            "students": [{ "id": 1, "roll_number": "NEW", "rollNumber": "OLD" }]
        });
        let doc = migrate(&raw);
        assert_eq!(doc.students[0].roll_number, "NEW");
        assert!(doc.students[0].extra.get("rollNumber").is_none());
    }

    #[test]
    fn migration_is_idempotent() {
        let once = migrate(&legacy_document());
        let again = migrate(&serde_json::to_value(&once).expect("serialize"));
        assert_eq!(once, again);

        let raw_once = migrate_value(&legacy_document());
        assert_eq!(migrate_value(&raw_once), raw_once);
    }

    #[test]
    fn no_record_mixes_conventions_after_migration() {
        let doc = migrate(&legacy_document());
        let v = serde_json::to_value(&doc).expect("serialize");
        assert_no_legacy_keys(&v);
        assert_no_legacy_keys(&migrate_value(&legacy_document()));
    }

    #[test]
    fn unmapped_fields_pass_through() {
        let raw = json!({
            "students": [{ "id": 3, "name": "X", "bloodGroup": "O+" }],
            "routines": [{ "id": 4, "timeSlots": [{ "startTime": "09:00", "room": "12B" }] }]
        });
        let doc = migrate(&raw);
        assert_eq!(doc.students[0].extra.get("bloodGroup"), Some(&json!("O+")));
        assert_eq!(
            doc.routines[0].time_slots[0].extra.get("room"),
            Some(&json!("12B"))
        );
    }

    #[test]
    fn malformed_or_missing_collections_become_empty() {
        let raw = json!({
            "students": "not a list",
            "admissions": { "id": 1 },
            "results": null
        });
        let doc = migrate(&raw);
        assert_eq!(doc, Document::default());
        assert_eq!(migrate(&json!(42)), Document::default());
        assert_eq!(migrate(&Value::Null), Document::default());
    }

    #[test]
    fn migration_keeps_every_record() {
        let raw = json!({
            "results": [{ "id": 1 }, { "id": 1 }, { "studentName": "no id" }]
        });
        let doc = migrate(&raw);
        assert_eq!(doc.results.len(), 3);
        assert_eq!(doc.results[2].student_name, "no id");
    }
}
