use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::Config;
use crate::context::AppContext;
use crate::sync::{probe_from_config, SyncProbe};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub context: AppContext,
    pub config: Config,
    pub probe: Box<dyn SyncProbe>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let probe = probe_from_config(config.sync.as_ref(), config.sync_timeout);
        Self {
            workspace: None,
            db: None,
            context: AppContext::new(),
            config,
            probe,
        }
    }
}
