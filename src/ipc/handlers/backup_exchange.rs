use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{document_counts, persist, replace_document, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_backup_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let out = PathBuf::from(&out_path);
    let export = match backup::export_document_bundle(&ws.document, &out) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            )
        }
    };

    ok(
        &req.id,
        json!({
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "sha256": export.sha256
        }),
    )
}

fn handle_backup_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let in_path = match required_str(req, "inPath") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    let import = match backup::import_document_bundle(&src) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "import_failed",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            )
        }
    };

    replace_document(ws, import.document);
    info!(
        path = %in_path,
        format = %import.bundle_format_detected,
        students = ws.document.students.len(),
        "restored document from backup"
    );
    let sync = persist(ws);
    ok(
        &req.id,
        json!({
            "path": in_path,
            "bundleFormatDetected": import.bundle_format_detected,
            "exportedAt": import.exported_at,
            "counts": document_counts(&ws.document),
            "sync": sync
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportBundle" => Some(handle_backup_export_bundle(state, req)),
        "backup.importBundle" => Some(handle_backup_import_bundle(state, req)),
        _ => None,
    }
}
