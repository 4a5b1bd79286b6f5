use crate::db;
use crate::ipc::helpers::{db_conn, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn login(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let username = required_str(&req.params, "username")?;
    let password = required_str(&req.params, "password")?;
    let conn = db_conn(state)?;
    let user = db::find_user_by_credentials(conn, username.trim(), &password)
        .map_err(HandlerErr::query_failed)?;
    let Some(user) = user else {
        tracing::info!(username = %username, "login rejected");
        return Err(HandlerErr::new("invalid_credentials", "Invalid credentials"));
    };
    tracing::info!(username = %user.username, role = user.role.as_str(), "login");
    let out = json!({ "user": user });
    state.session = Some(user);
    Ok(out)
}

fn logout(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let was_logged_in = state.session.take().is_some();
    Ok(json!({ "loggedOut": was_logged_in }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(respond(req, login(state, req))),
        "auth.logout" => Some(respond(req, logout(state))),
        _ => None,
    }
}
