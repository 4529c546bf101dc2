use crate::exchange;
use crate::ipc::error::{err, ok, FieldErrors};
use crate::ipc::helpers::{
    apply_patch, email_is_valid, not_found, opt_id, opt_str, patch_param, persist, required_id,
    to_json, workspace,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Student, StudentStatus, Table};
use serde_json::json;

fn validate(s: &Student) -> FieldErrors {
    let mut errors = FieldErrors::default();
    if s.name.trim().is_empty() {
        errors.add("name", "name is required");
    }
    if s.class_name.trim().is_empty() {
        errors.add("class", "class is required");
    }
    if matches!(s.age, Some(age) if age <= 0) {
        errors.add("age", "age must be a positive number");
    }
    if !email_is_valid(&s.parent_email) {
        errors.add("parent_email", "parent email is not a valid address");
    }
    errors
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let class = opt_str(req, "class");
    let status = match opt_str(req, "status").map(str::parse::<StudentStatus>) {
        None => None,
        Some(Ok(s)) => Some(s),
        Some(Err(e)) => return err(&req.id, "bad_params", e, None),
    };
    let students: Vec<&Student> = ws
        .document
        .students
        .iter()
        .filter(|s| class.map_or(true, |c| s.class_name == c))
        .filter(|s| status.map_or(true, |st| s.status == st))
        .collect();
    ok(&req.id, json!({ "students": to_json(&students) }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let student_id = match required_id(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match patch_param(req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let Some(idx) = ws.document.students.iter().position(|s| s.id == student_id) else {
        return not_found(req, "student", student_id);
    };
    let updated = match apply_patch(Table::Students, &ws.document.students[idx], patch) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "bad_params", e, None),
    };
    let errors = validate(&updated);
    if !errors.is_empty() {
        return errors.response(&req.id);
    }
    ws.document.students[idx] = updated;
    let sync = persist(ws);
    ok(
        &req.id,
        json!({ "student": to_json(&ws.document.students[idx]), "sync": sync }),
    )
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let student_id = match required_id(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(idx) = ws.document.students.iter().position(|s| s.id == student_id) else {
        return not_found(req, "student", student_id);
    };
    ws.document.students.remove(idx);
    let sync = persist(ws);
    ok(&req.id, json!({ "deleted": student_id, "sync": sync }))
}

fn handle_students_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let only = opt_id(req, "studentId");
    let rows: Vec<Student> = ws
        .document
        .students
        .iter()
        .filter(|s| only.map_or(true, |id| s.id == id))
        .cloned()
        .collect();
    if let Some(id) = only {
        if rows.is_empty() {
            return not_found(req, "student", id);
        }
    }
    match exchange::students_csv(&rows) {
        Ok(csv) => ok(&req.id, json!({ "csv": csv, "rowCount": rows.len() })),
        Err(e) => err(&req.id, "export_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.exportCsv" => Some(handle_students_export_csv(state, req)),
        _ => None,
    }
}
