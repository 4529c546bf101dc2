//! Load/save orchestration between the in-memory document, the local cache
//! and the optional remote store.
//!
//! Load prefers the remote tables and falls back to the cache when any table
//! fails. Save always writes the cache first and then hands a snapshot to a
//! background worker that upserts every record of every table one by one.

use crate::config::RemoteConfig;
use crate::db::LocalCache;
use crate::dedupe::{
    admission_key, announcement_key, dedupe, result_key, routine_key, student_key,
};
use crate::migrate::migrate;
use crate::model::{Document, Record, Table};
use crate::remote::{RemoteError, RemoteStore, RestStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadSource {
    Remote,
    LocalCache,
    Empty,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub document: Document,
    pub source: LoadSource,
    pub remote_error: Option<RemoteError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveStatus {
    /// Remote store disabled; only the cache was written.
    LocalOnly,
    Succeeded,
    PartiallyFailed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    pub id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOutcome {
    pub attempted: usize,
    pub written: usize,
    pub duplicates_dropped: usize,
    /// Records not attempted after the endpoint became unreachable.
    pub skipped: usize,
    pub errors: Vec<RecordError>,
}

impl TableOutcome {
    pub fn failed(&self) -> usize {
        self.errors.len() + self.skipped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub job_id: Option<String>,
    pub status: SaveStatus,
    pub local_saved: bool,
    pub local_error: Option<String>,
    pub tables: BTreeMap<Table, TableOutcome>,
}

impl SaveReport {
    fn local_only(local_saved: bool, local_error: Option<String>) -> Self {
        Self {
            job_id: None,
            status: SaveStatus::LocalOnly,
            local_saved,
            local_error,
            tables: BTreeMap::new(),
        }
    }
}

fn overall_status(tables: &BTreeMap<Table, TableOutcome>) -> SaveStatus {
    let failed: usize = tables.values().map(TableOutcome::failed).sum();
    let written: usize = tables.values().map(|t| t.written).sum();
    if failed == 0 {
        SaveStatus::Succeeded
    } else if written == 0 {
        SaveStatus::Failed
    } else {
        SaveStatus::PartiallyFailed
    }
}

/// Handle for one save. Dropping it is fine; the worker logs the outcome
/// either way.
pub struct SaveTicket {
    pub job_id: Option<Uuid>,
    pub local_saved: bool,
    pub local_error: Option<String>,
    state: TicketState,
}

enum TicketState {
    Done(SaveReport),
    Pending(Receiver<SaveReport>),
}

impl SaveTicket {
    fn done(report: SaveReport) -> Self {
        Self {
            job_id: None,
            local_saved: report.local_saved,
            local_error: report.local_error.clone(),
            state: TicketState::Done(report),
        }
    }

    pub fn remote_queued(&self) -> bool {
        matches!(self.state, TicketState::Pending(_))
    }

    /// Blocks until the remote part finishes.
    pub fn wait(self) -> SaveReport {
        match self.state {
            TicketState::Done(report) => report,
            TicketState::Pending(rx) => rx.recv().unwrap_or_else(|_| SaveReport {
                job_id: self.job_id.map(|id| id.to_string()),
                status: SaveStatus::Failed,
                local_saved: self.local_saved,
                local_error: self.local_error.clone(),
                tables: BTreeMap::new(),
            }),
        }
    }
}

struct SaveJob {
    id: Uuid,
    document: Document,
    local_saved: bool,
    local_error: Option<String>,
    reply: Sender<SaveReport>,
}

struct SaveWorker {
    tx: Option<Sender<SaveJob>>,
    handle: Option<JoinHandle<()>>,
}

impl SaveWorker {
    fn spawn(
        remote: Arc<dyn RemoteStore>,
        last_report: Arc<Mutex<Option<SaveReport>>>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<SaveJob>();
        let handle = std::thread::Builder::new()
            .name("schoold-sync".into())
            .spawn(move || {
                for job in rx {
                    let tables = push_document(remote.as_ref(), &job.document);
                    let report = SaveReport {
                        job_id: Some(job.id.to_string()),
                        status: overall_status(&tables),
                        local_saved: job.local_saved,
                        local_error: job.local_error,
                        tables,
                    };
                    log_report(&report);
                    if let Ok(mut last) = last_report.lock() {
                        *last = Some(report.clone());
                    }
                    let _ = job.reply.send(report);
                }
            })?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    fn submit(&self, job: SaveJob) -> Result<(), String> {
        match &self.tx {
            Some(tx) => tx.send(job).map_err(|e| e.to_string()),
            None => Err("sync worker stopped".into()),
        }
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        // Closing the channel lets queued saves finish before the join.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("sync worker panicked");
            }
        }
    }
}

fn log_report(report: &SaveReport) {
    let job_id = report.job_id.as_deref().unwrap_or("-");
    for (table, outcome) in &report.tables {
        if outcome.duplicates_dropped > 0 {
            info!(job_id, table = %table, dropped = outcome.duplicates_dropped, "dropped duplicate records before upload");
        }
        for e in &outcome.errors {
            warn!(job_id, table = %table, id = e.id, error = %e.message, "remote upsert failed");
        }
        if outcome.skipped > 0 {
            warn!(job_id, table = %table, skipped = outcome.skipped, "remote unreachable; remaining records skipped");
        }
    }
    match report.status {
        SaveStatus::Succeeded | SaveStatus::LocalOnly => {
            info!(job_id, status = ?report.status, "save finished")
        }
        SaveStatus::PartiallyFailed | SaveStatus::Failed => {
            warn!(job_id, status = ?report.status, "save finished with remote errors")
        }
    }
}

fn upload<T>(remote: &dyn RemoteStore, table: Table, records: &[T], dropped: usize) -> TableOutcome
where
    T: Serialize + Record,
{
    let mut outcome = TableOutcome {
        duplicates_dropped: dropped,
        ..TableOutcome::default()
    };
    for (i, record) in records.iter().enumerate() {
        let row = match serde_json::to_value(record) {
            Ok(v) => v,
            Err(e) => {
                outcome.errors.push(RecordError {
                    id: record.id(),
                    message: e.to_string(),
                });
                continue;
            }
        };
        outcome.attempted += 1;
        match remote.upsert(table, &row) {
            Ok(()) => outcome.written += 1,
            Err(e) => {
                let stop = e.is_transport() || matches!(e, RemoteError::TableNotFound(_));
                outcome.errors.push(RecordError {
                    id: record.id(),
                    message: e.to_string(),
                });
                if stop {
                    outcome.skipped = records.len() - i - 1;
                    break;
                }
            }
        }
    }
    outcome
}

/// Migrates, dedupes and upserts every collection. Tables are independent:
/// a failure in one never stops the others.
pub fn push_document(remote: &dyn RemoteStore, doc: &Document) -> BTreeMap<Table, TableOutcome> {
    let migrated = match serde_json::to_value(doc) {
        Ok(v) => migrate(&v),
        Err(e) => {
            warn!(error = %e, "document did not serialize for migration; uploading as is");
            doc.clone()
        }
    };

    let mut tables = BTreeMap::new();
    let (students, dropped) = dedupe(migrated.students, student_key);
    tables.insert(
        Table::Students,
        upload(remote, Table::Students, &students, dropped),
    );
    let (admissions, dropped) = dedupe(migrated.admissions, admission_key);
    tables.insert(
        Table::Admissions,
        upload(remote, Table::Admissions, &admissions, dropped),
    );
    let (announcements, dropped) = dedupe(migrated.announcements, announcement_key);
    tables.insert(
        Table::Announcements,
        upload(remote, Table::Announcements, &announcements, dropped),
    );
    let (results, dropped) = dedupe(migrated.results, result_key);
    tables.insert(
        Table::Results,
        upload(remote, Table::Results, &results, dropped),
    );
    let (routines, dropped) = dedupe(migrated.routines, routine_key);
    tables.insert(
        Table::Routines,
        upload(remote, Table::Routines, &routines, dropped),
    );
    tables
}

/// Reads all five tables. Any failure, including a single missing table,
/// fails the whole load.
pub fn fetch_document(remote: &dyn RemoteStore) -> Result<Value, RemoteError> {
    let mut doc = Map::new();
    for table in Table::ALL {
        let rows = remote.fetch_all(table)?;
        debug!(table = %table, rows = rows.len(), "fetched remote table");
        doc.insert(table.as_str().to_string(), Value::Array(rows));
    }
    Ok(Value::Object(doc))
}

pub struct SyncAdapter {
    cache: LocalCache,
    remote: Option<Arc<dyn RemoteStore>>,
    worker: Option<SaveWorker>,
    last_report: Arc<Mutex<Option<SaveReport>>>,
    last_load: Option<LoadSource>,
}

impl SyncAdapter {
    pub fn new(cache: LocalCache, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        let last_report = Arc::new(Mutex::new(None));
        let (remote, worker) = match remote {
            Some(r) => match SaveWorker::spawn(Arc::clone(&r), Arc::clone(&last_report)) {
                Ok(w) => (Some(r), Some(w)),
                Err(e) => {
                    warn!(error = %e, "could not start sync worker; remote sync disabled");
                    (None, None)
                }
            },
            None => (None, None),
        };
        Self {
            cache,
            remote,
            worker,
            last_report,
            last_load: None,
        }
    }

    /// Builds the REST client when the config enables it. A client that
    /// cannot be built is treated as disabled.
    pub fn from_config(cache: LocalCache, cfg: &RemoteConfig) -> Self {
        if !cfg.enabled {
            return Self::new(cache, None);
        }
        match RestStore::from_config(cfg) {
            Ok(store) => {
                info!(url = store.base_url(), "remote sync enabled");
                Self::new(cache, Some(Arc::new(store)))
            }
            Err(e) => {
                warn!(error = %e, "remote sync enabled but client failed to initialize; using local cache only");
                Self::new(cache, None)
            }
        }
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote.is_some()
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn last_load(&self) -> Option<LoadSource> {
        self.last_load
    }

    pub fn last_report(&self) -> Option<SaveReport> {
        self.last_report.lock().ok().and_then(|r| r.clone())
    }

    pub fn load(&mut self) -> LoadOutcome {
        let outcome = match self.remote.as_deref() {
            None => self.load_local(None),
            Some(remote) => match fetch_document(remote) {
                Ok(raw) => {
                    let document = migrate(&raw);
                    if let Err(e) = self.cache.save(&document) {
                        warn!(error = %e, "could not refresh local cache after remote load");
                    }
                    info!(
                        students = document.students.len(),
                        admissions = document.admissions.len(),
                        "loaded document from remote store"
                    );
                    LoadOutcome {
                        document,
                        source: LoadSource::Remote,
                        remote_error: None,
                    }
                }
                Err(e) => {
                    match &e {
                        RemoteError::TableNotFound(table) => {
                            warn!(table = %table, "remote table does not exist; falling back to local cache")
                        }
                        other => warn!(error = %other, "remote load failed; falling back to local cache"),
                    }
                    self.load_local(Some(e))
                }
            },
        };
        self.last_load = Some(outcome.source);
        outcome
    }

    fn load_local(&self, remote_error: Option<RemoteError>) -> LoadOutcome {
        let (document, source) = match self.cache.load() {
            Ok(Some(raw)) => (migrate(&raw), LoadSource::LocalCache),
            Ok(None) => (Document::default(), LoadSource::Empty),
            Err(e) => {
                warn!(error = %e, "local cache unreadable; starting with an empty document");
                (Document::default(), LoadSource::Empty)
            }
        };
        LoadOutcome {
            document,
            source,
            remote_error,
        }
    }

    /// Writes the cache, then queues the remote write. Never fails.
    pub fn save(&self, doc: &Document) -> SaveTicket {
        let (local_saved, local_error) = match self.cache.save(doc) {
            Ok(()) => (true, None),
            Err(e) => {
                warn!(error = %e, "local cache write failed; in-memory document stays authoritative");
                (false, Some(e.to_string()))
            }
        };

        let Some(worker) = &self.worker else {
            let report = SaveReport::local_only(local_saved, local_error);
            if let Ok(mut last) = self.last_report.lock() {
                *last = Some(report.clone());
            }
            return SaveTicket::done(report);
        };

        let id = Uuid::new_v4();
        let (reply, rx) = mpsc::channel();
        let job = SaveJob {
            id,
            document: doc.clone(),
            local_saved,
            local_error: local_error.clone(),
            reply,
        };
        match worker.submit(job) {
            Ok(()) => {
                debug!(job_id = %id, "queued remote save");
                SaveTicket {
                    job_id: Some(id),
                    local_saved,
                    local_error,
                    state: TicketState::Pending(rx),
                }
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "could not queue remote save");
                SaveTicket::done(SaveReport {
                    job_id: Some(id.to_string()),
                    status: SaveStatus::Failed,
                    local_saved,
                    local_error,
                    tables: BTreeMap::new(),
                })
            }
        }
    }

    /// Server-assigned counter value, when the remote store answers.
    pub fn next_sequence(&self, name: &str) -> Option<i64> {
        let remote = self.remote.as_deref()?;
        match remote.next_sequence(name) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(sequence = name, error = %e, "remote sequence unavailable; using local numbering");
                None
            }
        }
    }
}
