use crate::ipc::error::ok;
use crate::ipc::helpers::{
    bool_param, document_counts, replace_document, ticket_json, to_json, workspace,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_sync_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let loaded = ws.sync.load();
    replace_document(ws, loaded.document);
    ok(
        &req.id,
        json!({
            "loadSource": loaded.source,
            "remoteError": loaded.remote_error.map(|e| e.to_string()),
            "counts": document_counts(&ws.document)
        }),
    )
}

fn handle_sync_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let ticket = ws.sync.save(&ws.document);
    let sync = ticket_json(&ticket);
    if !bool_param(req, "wait") {
        return ok(&req.id, json!({ "sync": sync }));
    }
    let report = ticket.wait();
    ok(&req.id, json!({ "sync": sync, "report": to_json(&report) }))
}

fn handle_sync_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let remote = &ws.config.remote;
    ok(
        &req.id,
        json!({
            "remoteConfigured": remote.enabled,
            "remoteEnabled": ws.sync.remote_enabled(),
            "remoteUrl": remote.url,
            "timeoutSecs": remote.timeout_secs,
            "rollPrefix": ws.config.school.roll_prefix,
            "lastLoadSource": ws.sync.last_load(),
            "lastSave": ws.sync.last_report().map(|r| to_json(&r)),
            "nextId": ws.ids.last_issued() + 1,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sync.load" => Some(handle_sync_load(state, req)),
        "sync.save" => Some(handle_sync_save(state, req)),
        "sync.status" => Some(handle_sync_status(state, req)),
        _ => None,
    }
}
