use crate::db;
use crate::grading::GradeScale;
use crate::ipc::helpers::{admin_session, parse_param, respond, session, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn grade_scale_get(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let scale = db::load_grade_scale(conn).map_err(HandlerErr::query_failed)?;
    Ok(json!({ "scale": scale }))
}

/// Replaces the active scale. Reports pick it up on their next computation.
fn grade_scale_update(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, user) = admin_session(state)?;
    let scale: GradeScale = parse_param(&req.params, "scale")?;
    scale.validate()?;
    db::save_grade_scale(conn, &scale).map_err(HandlerErr::update_failed)?;
    tracing::info!(version = %scale.version, bands = scale.bands.len(), user = %user.username, "grade scale updated");
    Ok(json!({ "scale": scale }))
}

fn grade_scale_reset(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = admin_session(state)?;
    let scale = GradeScale::default();
    db::save_grade_scale(conn, &scale).map_err(HandlerErr::update_failed)?;
    Ok(json!({ "scale": scale }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.gradeScale.get" => Some(respond(req, grade_scale_get(state))),
        "setup.gradeScale.update" => Some(respond(req, grade_scale_update(state, req))),
        "setup.gradeScale.reset" => Some(respond(req, grade_scale_reset(state))),
        _ => None,
    }
}
