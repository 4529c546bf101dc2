use crate::config::SchoolConfig;
use crate::db::{LocalCache, RECORD_ID_COUNTER};
use crate::ids::IdGenerator;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request, Workspace};
use crate::migrate::migrate_collection;
use crate::model::{Document, Table};
use crate::sync::{LoadOutcome, SaveTicket, SyncAdapter};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{info, warn};

pub fn workspace<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut Workspace, Value> {
    state
        .workspace
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Opens the cache, reads config and runs the initial load before any
/// request can mutate the document.
pub fn open_workspace(path: &Path) -> anyhow::Result<(Workspace, LoadOutcome)> {
    let cache = LocalCache::open(path)
        .with_context(|| format!("failed to open cache in {}", path.to_string_lossy()))?;
    let config = SchoolConfig::load(path);
    let mut sync = SyncAdapter::from_config(cache, &config.remote);
    let loaded = sync.load();
    let persisted = match sync.cache().counter(RECORD_ID_COUNTER) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "could not read id counter; resuming from document ids");
            None
        }
    };
    let ids = IdGenerator::resume(persisted, &loaded.document);
    info!(
        workspace = %path.to_string_lossy(),
        source = ?loaded.source,
        "workspace opened"
    );
    let ws = Workspace {
        path: path.to_path_buf(),
        config,
        sync,
        document: loaded.document.clone(),
        ids,
    };
    Ok((ws, loaded))
}

pub fn allocate_id(ws: &mut Workspace) -> i64 {
    let id = ws.ids.next_id();
    if let Err(e) = ws.sync.cache().set_counter(RECORD_ID_COUNTER, id) {
        warn!(error = %e, id, "could not persist id counter");
    }
    id
}

/// Swaps in a reloaded or restored document. Id allocation never goes below
/// an id already issued.
pub fn replace_document(ws: &mut Workspace, doc: Document) {
    let persisted = ws.sync.cache().counter(RECORD_ID_COUNTER).ok().flatten();
    let floor = persisted.unwrap_or(0).max(ws.ids.last_issued());
    ws.ids = IdGenerator::resume(Some(floor), &doc);
    ws.document = doc;
}

pub fn ticket_json(ticket: &SaveTicket) -> Value {
    json!({
        "localSaved": ticket.local_saved,
        "localError": ticket.local_error,
        "remoteQueued": ticket.remote_queued(),
        "jobId": ticket.job_id.map(|id| id.to_string()),
    })
}

/// Saves the current document and describes the outcome for the response.
pub fn persist(ws: &Workspace) -> Value {
    ticket_json(&ws.sync.save(&ws.document))
}

pub fn document_counts(doc: &Document) -> Value {
    let mut counts = serde_json::Map::new();
    for table in Table::ALL {
        counts.insert(table.as_str().to_string(), json!(doc.len(table)));
    }
    Value::Object(counts)
}

pub fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

pub fn opt_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    opt_str(req, key)
        .map(str::to_string)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_id(req: &Request, key: &str) -> Result<i64, Value> {
    req.params
        .get(key)
        .and_then(crate::lenient::int_value)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn opt_id(req: &Request, key: &str) -> Option<i64> {
    req.params.get(key).and_then(crate::lenient::int_value)
}

pub fn bool_param(req: &Request, key: &str) -> bool {
    req.params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

pub fn not_found(req: &Request, what: &str, id: i64) -> Value {
    err(
        &req.id,
        "not_found",
        format!("{} not found", what),
        Some(json!({ "id": id })),
    )
}

pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Applies a partial update to a record. Patch keys may use either naming
/// convention; `id` cannot be changed.
pub fn apply_patch<T>(table: Table, record: &T, patch: &Value) -> Result<T, String>
where
    T: Serialize + DeserializeOwned,
{
    if !patch.is_object() {
        return Err("patch must be an object".into());
    }
    let mut migrated = migrate_collection(table, Some(&Value::Array(vec![patch.clone()])));
    let Some(Value::Object(patch)) = migrated.pop() else {
        return Err("patch must be an object".into());
    };
    let mut base = serde_json::to_value(record).map_err(|e| e.to_string())?;
    let Some(obj) = base.as_object_mut() else {
        return Err("record is not an object".into());
    };
    for (k, v) in patch {
        if k == "id" {
            continue;
        }
        obj.insert(k, v);
    }
    serde_json::from_value(base).map_err(|e| e.to_string())
}

pub fn patch_param(req: &Request) -> Result<&Value, Value> {
    match req.params.get("patch") {
        Some(p) if p.is_object() => Ok(p),
        _ => Err(err(
            &req.id,
            "bad_params",
            "patch must be an object",
            None,
        )),
    }
}

/// Blank or `@`-less addresses are rejected; empty is allowed.
pub fn email_is_valid(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() {
        return true;
    }
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}
