use crate::dedupe::admission_key;
use crate::exchange;
use crate::ids::{format_roll_number, local_roll_ordinal};
use crate::ipc::error::{err, ok, FieldErrors};
use crate::ipc::helpers::{
    allocate_id, apply_patch, email_is_valid, not_found, opt_id, opt_str, patch_param, persist,
    required_id, required_str, to_json, today, workspace,
};
use crate::ipc::types::{AppState, Request, Workspace};
use crate::model::{Admission, AdmissionStatus, Student, StudentStatus, Table};
use chrono::Datelike;
use serde_json::json;
use tracing::info;

const ROLL_SEQUENCE: &str = "roll_number";
const DEFAULT_SECTION: &str = "A";

fn validate_edit(a: &Admission) -> FieldErrors {
    let mut errors = FieldErrors::default();
    if a.name.trim().is_empty() {
        errors.add("name", "name is required");
    }
    if !email_is_valid(&a.parent_email) {
        errors.add("parent_email", "parent email is not a valid address");
    }
    errors
}

fn validate_submission(a: &Admission) -> FieldErrors {
    let mut errors = validate_edit(a);
    match a.age {
        Some(age) if age > 0 => {}
        _ => errors.add("age", "age must be a positive number"),
    }
    if a.class_applied.trim().is_empty() {
        errors.add("class_applied", "class applied for is required");
    }
    if a.parent_contact.trim().is_empty() {
        errors.add("parent_contact", "parent contact is required");
    }
    errors
}

fn next_roll_number(ws: &Workspace) -> String {
    let year = chrono::Local::now().year();
    let prefix = ws.config.school.roll_prefix.as_str();
    let ordinal = ws
        .sync
        .next_sequence(ROLL_SEQUENCE)
        .unwrap_or_else(|| local_roll_ordinal(prefix, year, &ws.document.students));
    format_roll_number(prefix, year, ordinal)
}

/// Creates the student for an approved admission unless one already points
/// back at it.
fn enroll(ws: &mut Workspace, admission: &Admission) -> Option<Student> {
    let already = ws
        .document
        .students
        .iter()
        .any(|s| s.original_admission_id == Some(admission.id));
    if already {
        return None;
    }
    let roll_number = next_roll_number(ws);
    let student = Student {
        id: allocate_id(ws),
        name: admission.name.clone(),
        roll_number,
        class_name: admission.class_applied.clone(),
        section: DEFAULT_SECTION.to_string(),
        age: admission.age,
        parent_name: admission.parent_name.clone(),
        parent_contact: admission.parent_contact.clone(),
        parent_email: admission.parent_email.clone(),
        address: admission.address.clone(),
        admission_date: today(),
        status: StudentStatus::Active,
        original_admission_id: Some(admission.id),
        ..Student::default()
    };
    info!(
        admission_id = admission.id,
        student_id = student.id,
        roll_number = %student.roll_number,
        "admission approved; student enrolled"
    );
    ws.document.students.push(student.clone());
    Some(student)
}

fn handle_admissions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let status = match opt_str(req, "status").map(str::parse::<AdmissionStatus>) {
        None => None,
        Some(Ok(s)) => Some(s),
        Some(Err(e)) => return err(&req.id, "bad_params", e, None),
    };
    let admissions: Vec<&Admission> = ws
        .document
        .admissions
        .iter()
        .filter(|a| status.map_or(true, |s| a.status == s))
        .collect();
    ok(&req.id, json!({ "admissions": to_json(&admissions) }))
}

fn handle_admissions_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let mut candidate = match apply_patch(Table::Admissions, &Admission::default(), &req.params) {
        Ok(a) => a,
        Err(e) => return err(&req.id, "bad_params", e, None),
    };
    let errors = validate_submission(&candidate);
    if !errors.is_empty() {
        return errors.response(&req.id);
    }
    candidate.name = candidate.name.trim().to_string();
    candidate.status = AdmissionStatus::Pending;
    if candidate.application_date.trim().is_empty() {
        candidate.application_date = today();
    }

    let key = admission_key(&candidate);
    if let Some(existing) = ws
        .document
        .admissions
        .iter()
        .find(|a| admission_key(a) == key)
    {
        return ok(
            &req.id,
            json!({
                "created": false,
                "warning": {
                    "code": "duplicate_admission",
                    "message": "an identical application already exists",
                    "existingId": existing.id,
                }
            }),
        );
    }

    candidate.id = allocate_id(ws);
    ws.document.admissions.push(candidate.clone());
    let sync = persist(ws);
    ok(
        &req.id,
        json!({ "created": true, "admission": to_json(&candidate), "sync": sync }),
    )
}

/// Moves an admission to `status`. Approval enrolls the student once.
fn set_status(ws: &mut Workspace, idx: usize, status: AdmissionStatus) -> Option<Student> {
    ws.document.admissions[idx].status = status;
    if status != AdmissionStatus::Approved {
        return None;
    }
    let admission = ws.document.admissions[idx].clone();
    enroll(ws, &admission)
}

fn handle_admissions_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let admission_id = match required_id(req, "admissionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match patch_param(req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let Some(idx) = ws.document.admissions.iter().position(|a| a.id == admission_id) else {
        return not_found(req, "admission", admission_id);
    };
    let previous = ws.document.admissions[idx].clone();
    let updated = match apply_patch(Table::Admissions, &previous, patch) {
        Ok(a) => a,
        Err(e) => return err(&req.id, "bad_params", e, None),
    };
    let errors = validate_edit(&updated);
    if !errors.is_empty() {
        return errors.response(&req.id);
    }
    let new_status = updated.status;
    ws.document.admissions[idx] = Admission {
        status: previous.status,
        ..updated
    };
    let student = if new_status != previous.status {
        set_status(ws, idx, new_status)
    } else {
        None
    };
    let sync = persist(ws);
    ok(
        &req.id,
        json!({
            "admission": to_json(&ws.document.admissions[idx]),
            "student": student.as_ref().map(to_json),
            "sync": sync
        }),
    )
}

fn handle_admissions_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let admission_id = match required_id(req, "admissionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status = match required_str(req, "status") {
        Ok(s) => match s.parse::<AdmissionStatus>() {
            Ok(v) => v,
            Err(e) => return err(&req.id, "bad_params", e, None),
        },
        Err(e) => return e,
    };
    let Some(idx) = ws.document.admissions.iter().position(|a| a.id == admission_id) else {
        return not_found(req, "admission", admission_id);
    };
    let student = set_status(ws, idx, status);
    let sync = persist(ws);
    ok(
        &req.id,
        json!({
            "admission": to_json(&ws.document.admissions[idx]),
            "student": student.as_ref().map(to_json),
            "sync": sync
        }),
    )
}

fn handle_admissions_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let admission_id = match required_id(req, "admissionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(idx) = ws.document.admissions.iter().position(|a| a.id == admission_id) else {
        return not_found(req, "admission", admission_id);
    };
    ws.document.admissions.remove(idx);
    let sync = persist(ws);
    ok(&req.id, json!({ "deleted": admission_id, "sync": sync }))
}

fn handle_admissions_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let only = opt_id(req, "admissionId");
    let rows: Vec<Admission> = ws
        .document
        .admissions
        .iter()
        .filter(|a| only.map_or(true, |id| a.id == id))
        .cloned()
        .collect();
    if let Some(id) = only {
        if rows.is_empty() {
            return not_found(req, "admission", id);
        }
    }
    match exchange::admissions_csv(&rows) {
        Ok(csv) => ok(&req.id, json!({ "csv": csv, "rowCount": rows.len() })),
        Err(e) => err(&req.id, "export_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admissions.list" => Some(handle_admissions_list(state, req)),
        "admissions.submit" => Some(handle_admissions_submit(state, req)),
        "admissions.update" => Some(handle_admissions_update(state, req)),
        "admissions.setStatus" => Some(handle_admissions_set_status(state, req)),
        "admissions.delete" => Some(handle_admissions_delete(state, req)),
        "admissions.exportCsv" => Some(handle_admissions_export_csv(state, req)),
        _ => None,
    }
}
