use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::model::User;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Logged-in user for the open workspace; cleared whenever the workspace changes.
    pub session: Option<User>,
}

