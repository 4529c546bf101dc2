use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{open_workspace, workspace};
use crate::ipc::types::{AppState, Request};
use crate::model::{AdmissionStatus, AnnouncementStatus};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|w| w.path.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    // Release the previous workspace (and flush its queued saves) first.
    state.workspace = None;

    match open_workspace(&path) {
        Ok((ws, loaded)) => {
            let remote_enabled = ws.sync.remote_enabled();
            state.workspace = Some(ws);
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "loadSource": loaded.source,
                    "remoteEnabled": remote_enabled,
                    "remoteError": loaded.remote_error.map(|e| e.to_string()),
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let doc = &ws.document;
    let pending = doc
        .admissions
        .iter()
        .filter(|a| a.status == AdmissionStatus::Pending)
        .count();
    let active_announcements = doc
        .announcements
        .iter()
        .filter(|a| a.status == AnnouncementStatus::Active)
        .count();
    ok(
        &req.id,
        json!({
            "students": doc.students.len(),
            "admissions": doc.admissions.len(),
            "pendingAdmissions": pending,
            "activeAnnouncements": active_announcements,
            "results": doc.results.len(),
            "routines": doc.routines.len(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "stats" => Some(handle_stats(state, req)),
        _ => None,
    }
}
