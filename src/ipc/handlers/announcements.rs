use crate::ipc::error::{err, ok, FieldErrors};
use crate::ipc::helpers::{
    allocate_id, apply_patch, bool_param, not_found, patch_param, persist, required_id, to_json,
    today, workspace,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Announcement, AnnouncementStatus, Table};
use serde_json::json;

fn validate(a: &Announcement) -> FieldErrors {
    let mut errors = FieldErrors::default();
    if a.title.trim().is_empty() {
        errors.add("title", "title is required");
    }
    if a.content.trim().is_empty() {
        errors.add("content", "content is required");
    }
    errors
}

fn handle_announcements_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let active_only = bool_param(req, "activeOnly");
    let announcements: Vec<&Announcement> = ws
        .document
        .announcements
        .iter()
        .filter(|a| !active_only || a.status == AnnouncementStatus::Active)
        .collect();
    ok(&req.id, json!({ "announcements": to_json(&announcements) }))
}

fn handle_announcements_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let mut a = match apply_patch(Table::Announcements, &Announcement::default(), &req.params) {
        Ok(a) => a,
        Err(e) => return err(&req.id, "bad_params", e, None),
    };
    let errors = validate(&a);
    if !errors.is_empty() {
        return errors.response(&req.id);
    }
    if a.date.trim().is_empty() {
        a.date = today();
    }
    a.id = allocate_id(ws);
    ws.document.announcements.push(a.clone());
    let sync = persist(ws);
    ok(&req.id, json!({ "announcement": to_json(&a), "sync": sync }))
}

fn handle_announcements_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let announcement_id = match required_id(req, "announcementId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match patch_param(req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let Some(idx) = ws
        .document
        .announcements
        .iter()
        .position(|a| a.id == announcement_id)
    else {
        return not_found(req, "announcement", announcement_id);
    };
    let updated = match apply_patch(Table::Announcements, &ws.document.announcements[idx], patch) {
        Ok(a) => a,
        Err(e) => return err(&req.id, "bad_params", e, None),
    };
    let errors = validate(&updated);
    if !errors.is_empty() {
        return errors.response(&req.id);
    }
    ws.document.announcements[idx] = updated;
    let sync = persist(ws);
    ok(
        &req.id,
        json!({ "announcement": to_json(&ws.document.announcements[idx]), "sync": sync }),
    )
}

fn handle_announcements_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let announcement_id = match required_id(req, "announcementId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(idx) = ws
        .document
        .announcements
        .iter()
        .position(|a| a.id == announcement_id)
    else {
        return not_found(req, "announcement", announcement_id);
    };
    ws.document.announcements.remove(idx);
    let sync = persist(ws);
    ok(&req.id, json!({ "deleted": announcement_id, "sync": sync }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "announcements.list" => Some(handle_announcements_list(state, req)),
        "announcements.create" => Some(handle_announcements_create(state, req)),
        "announcements.update" => Some(handle_announcements_update(state, req)),
        "announcements.delete" => Some(handle_announcements_delete(state, req)),
        _ => None,
    }
}
