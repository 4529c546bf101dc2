use std::path::PathBuf;

use crate::config::SchoolConfig;
use crate::ids::IdGenerator;
use crate::model::Document;
use crate::sync::SyncAdapter;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything that belongs to the selected workspace directory.
pub struct Workspace {
    pub path: PathBuf,
    pub config: SchoolConfig,
    pub sync: SyncAdapter,
    pub document: Document,
    pub ids: IdGenerator,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<Workspace>,
}
