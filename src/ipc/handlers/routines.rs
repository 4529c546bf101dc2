use crate::ipc::error::{err, ok, FieldErrors};
use crate::ipc::helpers::{
    allocate_id, apply_patch, not_found, opt_str, patch_param, persist, required_id, required_str,
    to_json, workspace,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{PdfAttachment, Routine, Table};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;

pub const PDF_MIME: &str = "application/pdf";
pub const MAX_PDF_BYTES: usize = 10 * 1024 * 1024;

fn validate(r: &Routine) -> FieldErrors {
    let mut errors = FieldErrors::default();
    if r.class_name.trim().is_empty() {
        errors.add("class", "class is required");
    }
    if r.routine_type.trim().is_empty() {
        errors.add("routine_type", "routine type is required");
    }
    if r.title.trim().is_empty() {
        errors.add("title", "title is required");
    }
    errors
}

/// Accepts raw base64 or a `data:` URL and returns the payload part.
fn strip_data_url(data: &str) -> &str {
    let data = data.trim();
    match data.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => data,
    }
}

fn handle_routines_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let class = opt_str(req, "class");
    let routine_type = opt_str(req, "routineType");
    let routines: Vec<&Routine> = ws
        .document
        .routines
        .iter()
        .filter(|r| class.map_or(true, |c| r.class_name == c))
        .filter(|r| routine_type.map_or(true, |t| r.routine_type.eq_ignore_ascii_case(t)))
        .collect();
    ok(&req.id, json!({ "routines": to_json(&routines) }))
}

fn handle_routines_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let mut routine = match apply_patch(Table::Routines, &Routine::default(), &req.params) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "bad_params", e, None),
    };
    let errors = validate(&routine);
    if !errors.is_empty() {
        return errors.response(&req.id);
    }
    // Attachments go through routines.attachPdf so they are checked.
    routine.pdf_attachment = None;
    routine.created_at = chrono::Utc::now().to_rfc3339();
    routine.id = allocate_id(ws);
    ws.document.routines.push(routine.clone());
    let sync = persist(ws);
    ok(&req.id, json!({ "routine": to_json(&routine), "sync": sync }))
}

fn handle_routines_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let routine_id = match required_id(req, "routineId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match patch_param(req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let Some(idx) = ws.document.routines.iter().position(|r| r.id == routine_id) else {
        return not_found(req, "routine", routine_id);
    };
    let current = &ws.document.routines[idx];
    let mut updated = match apply_patch(Table::Routines, current, patch) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "bad_params", e, None),
    };
    updated.pdf_attachment = current.pdf_attachment.clone();
    updated.created_at = current.created_at.clone();
    let errors = validate(&updated);
    if !errors.is_empty() {
        return errors.response(&req.id);
    }
    ws.document.routines[idx] = updated;
    let sync = persist(ws);
    ok(
        &req.id,
        json!({ "routine": to_json(&ws.document.routines[idx]), "sync": sync }),
    )
}

fn handle_routines_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let routine_id = match required_id(req, "routineId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(idx) = ws.document.routines.iter().position(|r| r.id == routine_id) else {
        return not_found(req, "routine", routine_id);
    };
    ws.document.routines.remove(idx);
    let sync = persist(ws);
    ok(&req.id, json!({ "deleted": routine_id, "sync": sync }))
}

fn handle_routines_attach_pdf(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let routine_id = match required_id(req, "routineId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let data = match required_str(req, "data") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mime_type = opt_str(req, "type").unwrap_or(PDF_MIME).to_ascii_lowercase();
    let Some(idx) = ws.document.routines.iter().position(|r| r.id == routine_id) else {
        return not_found(req, "routine", routine_id);
    };

    let mut errors = FieldErrors::default();
    if mime_type != PDF_MIME {
        errors.add("type", "only PDF files can be attached");
    }
    let payload = strip_data_url(&data);
    let size = match general_purpose::STANDARD.decode(payload) {
        Ok(bytes) => {
            if bytes.len() > MAX_PDF_BYTES {
                errors.add("data", "PDF must be 10 MB or smaller");
            } else if !bytes.starts_with(b"%PDF") {
                errors.add("data", "file content is not a PDF");
            }
            bytes.len()
        }
        Err(_) => {
            errors.add("data", "data is not valid base64");
            0
        }
    };
    if !errors.is_empty() {
        return errors.response(&req.id);
    }

    let attachment = PdfAttachment {
        name,
        size: size as i64,
        mime_type,
        data: payload.to_string(),
    };
    let summary = json!({
        "name": attachment.name,
        "size": attachment.size,
        "type": attachment.mime_type,
    });
    ws.document.routines[idx].pdf_attachment = Some(attachment);
    let sync = persist(ws);
    ok(
        &req.id,
        json!({ "routineId": routine_id, "attachment": summary, "sync": sync }),
    )
}

fn handle_routines_detach_pdf(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let routine_id = match required_id(req, "routineId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(idx) = ws.document.routines.iter().position(|r| r.id == routine_id) else {
        return not_found(req, "routine", routine_id);
    };
    let removed = ws.document.routines[idx].pdf_attachment.take().is_some();
    if !removed {
        return ok(&req.id, json!({ "routineId": routine_id, "removed": false }));
    }
    let sync = persist(ws);
    ok(
        &req.id,
        json!({ "routineId": routine_id, "removed": true, "sync": sync }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "routines.list" => Some(handle_routines_list(state, req)),
        "routines.create" => Some(handle_routines_create(state, req)),
        "routines.update" => Some(handle_routines_update(state, req)),
        "routines.delete" => Some(handle_routines_delete(state, req)),
        "routines.attachPdf" => Some(handle_routines_attach_pdf(state, req)),
        "routines.detachPdf" => Some(handle_routines_detach_pdf(state, req)),
        _ => None,
    }
}
