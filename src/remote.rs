//! Remote tabular store: five tables read in bulk and written one row at a
//! time with upsert-by-id. The production backend is a PostgREST endpoint.

use crate::config::RemoteConfig;
use crate::lenient;
use crate::model::Table;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("remote table '{0}' does not exist")]
    TableNotFound(String),
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("remote unreachable: {0}")]
    Transport(String),
    #[error("unexpected remote response: {0}")]
    Decode(String),
    #[error("remote client not configured: {0}")]
    Config(String),
}

impl RemoteError {
    /// Errors after which further calls to the same endpoint are pointless.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

pub trait RemoteStore: Send + Sync {
    fn fetch_all(&self, table: Table) -> Result<Vec<Value>, RemoteError>;
    fn upsert(&self, table: Table, record: &Value) -> Result<(), RemoteError>;
    /// Next value of a server-side counter.
    fn next_sequence(&self, name: &str) -> Result<i64, RemoteError>;
}

/// Classifies a failed table request. PostgREST answers 404 for unknown
/// relations and carries `42P01` / `PGRST205` in the body.
pub fn classify_table_failure(table: Table, status: u16, body: &str) -> RemoteError {
    if status == 404 || body.contains("42P01") || body.contains("PGRST205") {
        return RemoteError::TableNotFound(table.as_str().to_string());
    }
    RemoteError::Rejected {
        status,
        message: truncate(body, 300),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn from_config(cfg: &RemoteConfig) -> Result<Self, RemoteError> {
        let url = cfg
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RemoteError::Config("missing remote url".into()))?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RemoteError::Config(format!(
                "remote url must be http(s): {}",
                url
            )));
        }
        let api_key = cfg
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RemoteError::Config("missing remote api key".into()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .map_err(|e| RemoteError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, path);
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

impl RemoteStore for RestStore {
    fn fetch_all(&self, table: Table) -> Result<Vec<Value>, RemoteError> {
        let resp = self
            .request(Method::GET, &format!("{}?select=*", table.as_str()))
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_table_failure(table, status.as_u16(), &text));
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(rows)) => Ok(rows),
            Ok(other) => Err(RemoteError::Decode(format!(
                "expected an array from {}, got {}",
                table,
                truncate(&other.to_string(), 80)
            ))),
            Err(e) => Err(RemoteError::Decode(e.to_string())),
        }
    }

    fn upsert(&self, table: Table, record: &Value) -> Result<(), RemoteError> {
        let resp = self
            .request(Method::POST, &format!("{}?on_conflict=id", table.as_str()))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(record)
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().unwrap_or_default();
        Err(classify_table_failure(table, status.as_u16(), &text))
    }

    fn next_sequence(&self, name: &str) -> Result<i64, RemoteError> {
        let resp = self
            .request(Method::POST, "rpc/next_sequence")
            .json(&json!({ "seq_name": name }))
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: truncate(&text, 300),
            });
        }
        let v: Value =
            serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))?;
        lenient::int_value(&v)
            .ok_or_else(|| RemoteError::Decode(format!("sequence value is not an integer: {}", v)))
    }
}

#[cfg(test)]
pub mod memory {
    //! In-process remote store with switchable failure modes.

    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStore {
        pub tables: Mutex<BTreeMap<Table, Vec<Value>>>,
        pub missing: Mutex<HashSet<Table>>,
        pub offline: Mutex<bool>,
        pub reject_ids: Mutex<HashSet<i64>>,
        pub sequence: Mutex<i64>,
        pub upserts: Mutex<usize>,
    }

    impl MemoryStore {
        pub fn with_rows(table: Table, rows: Vec<Value>) -> Self {
            let store = Self::default();
            store.tables.lock().expect("lock").insert(table, rows);
            store
        }

        pub fn rows(&self, table: Table) -> Vec<Value> {
            self.tables
                .lock()
                .expect("lock")
                .get(&table)
                .cloned()
                .unwrap_or_default()
        }

        pub fn set_missing(&self, table: Table) {
            self.missing.lock().expect("lock").insert(table);
        }

        pub fn set_offline(&self, offline: bool) {
            *self.offline.lock().expect("lock") = offline;
        }

        pub fn reject_id(&self, id: i64) {
            self.reject_ids.lock().expect("lock").insert(id);
        }

        fn check(&self, table: Table) -> Result<(), RemoteError> {
            if *self.offline.lock().expect("lock") {
                return Err(RemoteError::Transport("connection refused".into()));
            }
            if self.missing.lock().expect("lock").contains(&table) {
                return Err(classify_table_failure(
                    table,
                    404,
                    r#"{"code":"42P01","message":"relation does not exist"}"#,
                ));
            }
            Ok(())
        }
    }

    impl RemoteStore for MemoryStore {
        fn fetch_all(&self, table: Table) -> Result<Vec<Value>, RemoteError> {
            self.check(table)?;
            Ok(self.rows(table))
        }

        fn upsert(&self, table: Table, record: &Value) -> Result<(), RemoteError> {
            self.check(table)?;
            let id = record.get("id").and_then(lenient::int_value).unwrap_or(0);
            if self.reject_ids.lock().expect("lock").contains(&id) {
                return Err(RemoteError::Rejected {
                    status: 400,
                    message: format!("row {} violates a check constraint", id),
                });
            }
            *self.upserts.lock().expect("lock") += 1;
            let mut tables = self.tables.lock().expect("lock");
            let rows = tables.entry(table).or_default();
            match rows
                .iter_mut()
                .find(|r| r.get("id").and_then(lenient::int_value) == Some(id))
            {
                Some(existing) => *existing = record.clone(),
                None => rows.push(record.clone()),
            }
            Ok(())
        }

        fn next_sequence(&self, _name: &str) -> Result<i64, RemoteError> {
            if *self.offline.lock().expect("lock") {
                return Err(RemoteError::Transport("connection refused".into()));
            }
            let mut seq = self.sequence.lock().expect("lock");
            *seq += 1;
            Ok(*seq)
        }
    }
}
