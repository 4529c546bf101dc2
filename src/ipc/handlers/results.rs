use crate::calc::{self, MAX_SUBJECT_TOTAL};
use crate::exchange::{self, CsvImportError};
use crate::ipc::error::{err, ok, FieldErrors};
use crate::ipc::helpers::{
    allocate_id, apply_patch, bool_param, not_found, opt_str, patch_param, persist, required_id,
    required_str, to_json, workspace,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{ExamResult, Table};
use serde_json::json;
use tracing::info;

fn validate(r: &ExamResult) -> FieldErrors {
    let mut errors = FieldErrors::default();
    if r.student_name.trim().is_empty() {
        errors.add("student_name", "student name is required");
    }
    if r.class_name.trim().is_empty() {
        errors.add("class", "class is required");
    }
    if r.exam_type.trim().is_empty() {
        errors.add("exam_type", "exam type is required");
    }
    if r.subjects.is_empty() {
        errors.add("subjects", "add at least one subject");
    } else if r
        .subjects
        .iter()
        .any(|s| s.total_marks <= 0 || s.total_marks > MAX_SUBJECT_TOTAL)
    {
        errors.add(
            "subjects",
            format!("subject totals must be between 1 and {}", MAX_SUBJECT_TOTAL),
        );
    } else if r.subjects.iter().any(|s| s.marks < 0 || s.marks > s.total_marks) {
        errors.add("subjects", "marks must be between 0 and the subject total");
    }
    errors
}

/// Drops blank subject rows, validates, then recomputes the derived fields.
fn prepare(r: &mut ExamResult) -> FieldErrors {
    r.subjects.retain(|s| !s.name.trim().is_empty());
    let errors = validate(r);
    if errors.is_empty() {
        calc::apply_totals(r);
    }
    errors
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn handle_results_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "results": to_json(&ws.document.results) }))
}

fn handle_results_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let term = opt_str(req, "term").map(str::to_lowercase);
    let class = opt_str(req, "class");
    let section = opt_str(req, "section");
    let exam_type = opt_str(req, "examType");
    let results: Vec<&ExamResult> = ws
        .document
        .results
        .iter()
        .filter(|r| {
            term.as_deref().map_or(true, |t| {
                contains_ci(&r.roll_number, t) || contains_ci(&r.student_name, t)
            })
        })
        .filter(|r| class.map_or(true, |c| r.class_name == c))
        .filter(|r| section.map_or(true, |s| r.section == s))
        .filter(|r| exam_type.map_or(true, |e| r.exam_type == e))
        .collect();
    ok(
        &req.id,
        json!({ "results": to_json(&results), "count": results.len() }),
    )
}

fn handle_results_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let mut result = match apply_patch(Table::Results, &ExamResult::default(), &req.params) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "bad_params", e, None),
    };
    let errors = prepare(&mut result);
    if !errors.is_empty() {
        return errors.response(&req.id);
    }
    result.id = allocate_id(ws);
    ws.document.results.push(result.clone());
    let sync = persist(ws);
    ok(&req.id, json!({ "result": to_json(&result), "sync": sync }))
}

fn handle_results_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let result_id = match required_id(req, "resultId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match patch_param(req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let Some(idx) = ws.document.results.iter().position(|r| r.id == result_id) else {
        return not_found(req, "result", result_id);
    };
    let mut updated = match apply_patch(Table::Results, &ws.document.results[idx], patch) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "bad_params", e, None),
    };
    let errors = prepare(&mut updated);
    if !errors.is_empty() {
        return errors.response(&req.id);
    }
    ws.document.results[idx] = updated;
    let sync = persist(ws);
    ok(
        &req.id,
        json!({ "result": to_json(&ws.document.results[idx]), "sync": sync }),
    )
}

fn handle_results_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let result_id = match required_id(req, "resultId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(idx) = ws.document.results.iter().position(|r| r.id == result_id) else {
        return not_found(req, "result", result_id);
    };
    ws.document.results.remove(idx);
    let sync = persist(ws);
    ok(&req.id, json!({ "deleted": result_id, "sync": sync }))
}

fn handle_results_import_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let text = match required_str(req, "csv") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let dry_run = bool_param(req, "dryRun");

    let import = match exchange::parse_results_csv(&text) {
        Ok(v) => v,
        Err(e @ CsvImportError::Empty { .. }) => {
            return err(&req.id, "csv_empty", e.to_string(), None)
        }
        Err(e) => return err(&req.id, "csv_invalid", e.to_string(), None),
    };
    let skipped: Vec<serde_json::Value> = import
        .skipped
        .iter()
        .map(|s| json!({ "line": s.line, "reason": s.reason }))
        .collect();

    if dry_run {
        return ok(
            &req.id,
            json!({
                "dryRun": true,
                "rowsTotal": import.rows_total,
                "rowsValid": import.results.len(),
                "skipped": skipped,
                "preview": to_json(&import.results),
            }),
        );
    }

    let mut imported = Vec::with_capacity(import.results.len());
    for mut result in import.results {
        result.id = allocate_id(ws);
        imported.push(result.id);
        ws.document.results.push(result);
    }
    info!(
        imported = imported.len(),
        skipped = skipped.len(),
        "imported results from csv"
    );
    let sync = persist(ws);
    ok(
        &req.id,
        json!({
            "dryRun": false,
            "rowsTotal": import.rows_total,
            "imported": imported.len(),
            "importedIds": imported,
            "skipped": skipped,
            "sync": sync,
        }),
    )
}

fn handle_results_csv_template(_state: &mut AppState, req: &Request) -> serde_json::Value {
    match exchange::results_template() {
        Ok(csv) => ok(
            &req.id,
            json!({ "csv": csv, "fileName": "results_template.csv" }),
        ),
        Err(e) => err(&req.id, "export_failed", e.to_string(), None),
    }
}

fn handle_results_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    match exchange::results_csv(&ws.document.results) {
        Ok(csv) => ok(
            &req.id,
            json!({ "csv": csv, "rowCount": ws.document.results.len() }),
        ),
        Err(e) => err(&req.id, "export_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.list" => Some(handle_results_list(state, req)),
        "results.search" => Some(handle_results_search(state, req)),
        "results.create" => Some(handle_results_create(state, req)),
        "results.update" => Some(handle_results_update(state, req)),
        "results.delete" => Some(handle_results_delete(state, req)),
        "results.importCsv" => Some(handle_results_import_csv(state, req)),
        "results.csvTemplate" => Some(handle_results_csv_template(state, req)),
        "results.exportCsv" => Some(handle_results_export_csv(state, req)),
        _ => None,
    }
}
