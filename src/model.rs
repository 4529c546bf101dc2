use crate::lenient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// The five remote tables, which are also the five document collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Students,
    Admissions,
    Announcements,
    Results,
    Routines,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Students,
        Table::Admissions,
        Table::Announcements,
        Table::Results,
        Table::Routines,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Students => "students",
            Table::Admissions => "admissions",
            Table::Announcements => "announcements",
            Table::Results => "results",
            Table::Routines => "routines",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! status_enum {
    ($name:ident { $default:ident => $default_text:literal $(, $variant:ident => $text:literal)* $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            #[default]
            $default,
            $($variant),*
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $name::$default => $default_text,
                    $($name::$variant => $text),*
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if s.eq_ignore_ascii_case($default_text) {
                    return Ok($name::$default);
                }
                $(if s.eq_ignore_ascii_case($text) {
                    return Ok($name::$variant);
                })*
                Err(format!("unknown status '{}'", s))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum!(StudentStatus { Active => "active", Inactive => "inactive", Transferred => "transferred" });
status_enum!(AdmissionStatus { Pending => "pending", Approved => "approved", Rejected => "rejected" });
status_enum!(AnnouncementStatus { Active => "active", Inactive => "inactive" });

/// Every record carries an integer id that the remote tables upsert on.
pub trait Record {
    fn id(&self) -> i64;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Student {
    #[serde(default, deserialize_with = "lenient::int")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub roll_number: String,
    #[serde(rename = "class", default, deserialize_with = "lenient::string")]
    pub class_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub section: String,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub age: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub parent_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub parent_contact: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub parent_email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub admission_date: String,
    #[serde(default, deserialize_with = "lenient::status")]
    pub status: StudentStatus,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub original_admission_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Admission {
    #[serde(default, deserialize_with = "lenient::int")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub age: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub class_applied: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub parent_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub parent_contact: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub parent_email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub application_date: String,
    #[serde(default, deserialize_with = "lenient::status")]
    pub status: AdmissionStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(default, deserialize_with = "lenient::int")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub content: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient::status")]
    pub status: AnnouncementStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectMark {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::int")]
    pub marks: i64,
    #[serde(default, deserialize_with = "lenient::int")]
    pub total_marks: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    #[serde(default, deserialize_with = "lenient::int")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub student_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub roll_number: String,
    #[serde(rename = "class", default, deserialize_with = "lenient::string")]
    pub class_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub section: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub exam_type: String,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub subjects: Vec<SubjectMark>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub total_marks: i64,
    #[serde(default, deserialize_with = "lenient::int")]
    pub max_marks: i64,
    #[serde(default, deserialize_with = "lenient::int")]
    pub percentage: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub grade: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    #[serde(rename = "startTime", default, deserialize_with = "lenient::string")]
    pub start_time: String,
    #[serde(rename = "endTime", default, deserialize_with = "lenient::string")]
    pub end_time: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub subject: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub teacher: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfAttachment {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::int")]
    pub size: i64,
    #[serde(rename = "type", default, deserialize_with = "lenient::string")]
    pub mime_type: String,
    /// Base64 payload.
    #[serde(default, deserialize_with = "lenient::string")]
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    #[serde(default, deserialize_with = "lenient::int")]
    pub id: i64,
    #[serde(rename = "class", default, deserialize_with = "lenient::string")]
    pub class_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub routine_type: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub time_slots: Vec<TimeSlot>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_object",
        skip_serializing_if = "Option::is_none"
    )]
    pub pdf_attachment: Option<PdfAttachment>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

macro_rules! impl_record {
    ($($ty:ty),+) => {
        $(impl Record for $ty {
            fn id(&self) -> i64 {
                self.id
            }
        })+
    };
}

impl_record!(Student, Admission, Announcement, ExamResult, Routine);

/// The whole dataset. Stored as one JSON document in the local cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, deserialize_with = "lenient::seq")]
    pub students: Vec<Student>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub admissions: Vec<Admission>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub announcements: Vec<Announcement>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub results: Vec<ExamResult>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub routines: Vec<Routine>,
}

impl Document {
    /// Highest record id not above `limit`, or 0 when there is none.
    pub fn max_id_up_to(&self, limit: i64) -> i64 {
        let ids = self
            .students
            .iter()
            .map(Record::id)
            .chain(self.admissions.iter().map(Record::id))
            .chain(self.announcements.iter().map(Record::id))
            .chain(self.results.iter().map(Record::id))
            .chain(self.routines.iter().map(Record::id));
        ids.filter(|id| *id <= limit).max().unwrap_or(0)
    }

    pub fn len(&self, table: Table) -> usize {
        match table {
            Table::Students => self.students.len(),
            Table::Admissions => self.admissions.len(),
            Table::Announcements => self.announcements.len(),
            Table::Results => self.results.len(),
            Table::Routines => self.routines.len(),
        }
    }
}
