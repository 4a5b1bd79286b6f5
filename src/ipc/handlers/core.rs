use crate::db;
use crate::ipc::helpers::{required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        req,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "user": state.session,
        })),
    )
}

/// Opens (creating if needed) the workspace database, seeds an empty one and
/// makes it current. Any previous session ends.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<bool> {
    let conn = db::open_db(path)?;
    let seeded = db::seed_defaults_if_empty(&conn)?;
    tracing::info!(workspace = %path.display(), seeded, "workspace opened");
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.session = None;
    Ok(seeded)
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = required_str(&req.params, "path").and_then(|raw| {
        let path = PathBuf::from(raw);
        let seeded = open_workspace(state, &path)
            .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;
        Ok(json!({
            "workspacePath": path.to_string_lossy(),
            "seeded": seeded,
        }))
    });
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
