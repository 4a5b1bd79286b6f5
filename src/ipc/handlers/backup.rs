use crate::backup;
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{admin_session, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn export_bundle(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    admin_session(state)?;
    let Some(workspace) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let out_path = PathBuf::from(required_str(&req.params, "outPath")?);
    let summary = backup::export_workspace_bundle(&workspace, &out_path)
        .map_err(|e| HandlerErr::new("backup_failed", format!("{e:?}")))?;
    tracing::info!(out = %out_path.display(), "workspace bundle exported");
    Ok(json!({
        "ok": true,
        "path": out_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "dbSha256": summary.db_sha256,
    }))
}

/// Replaces the workspace database and reopens it. After a successful import the
/// caller must log in again; a rejected file keeps the current session.
fn import_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    admin_session(state)?;
    let Some(workspace) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let in_path = PathBuf::from(required_str(&req.params, "inPath")?);

    // Close the connection before the file underneath it is swapped.
    let session = state.session.clone();
    state.db = None;
    let imported = backup::import_workspace_bundle(&in_path, &workspace);
    let reopened = open_workspace(state, &workspace);

    let summary = match imported {
        Ok(summary) => summary,
        Err(e) => {
            // A rejected file leaves the database as it was, so the login stands.
            if reopened.is_ok() {
                state.session = session;
            }
            return Err(HandlerErr::new("backup_failed", format!("{e:?}")));
        }
    };
    reopened.map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;
    tracing::info!(source = %in_path.display(), bundle_format = %summary.bundle_format_detected, "workspace bundle imported");
    Ok(json!({
        "ok": true,
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormatDetected": summary.bundle_format_detected,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(respond(req, export_bundle(state, req))),
        "backup.importWorkspaceBundle" => Some(respond(req, import_bundle(state, req))),
        _ => None,
    }
}
