use crate::db;
use crate::ipc::helpers::{admin_session, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::UserRole;
use serde_json::json;

fn list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = admin_session(state)?;
    let users = db::list_users(conn).map_err(HandlerErr::query_failed)?;
    Ok(json!({ "users": users }))
}

fn create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = admin_session(state)?;
    let username = required_str(&req.params, "username")?.trim().to_string();
    let password = required_str(&req.params, "password")?;
    let name = required_str(&req.params, "name")?.trim().to_string();
    let role_raw = required_str(&req.params, "role")?;

    if username.is_empty() {
        return Err(HandlerErr::bad_params("username must not be empty"));
    }
    if password.is_empty() {
        return Err(HandlerErr::bad_params("password must not be empty"));
    }
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let Some(role) = UserRole::parse(&role_raw) else {
        return Err(HandlerErr::bad_params("role must be ADMIN or TEACHER")
            .with_details(json!({ "role": role_raw })));
    };
    if db::username_taken(conn, &username).map_err(HandlerErr::query_failed)? {
        return Err(HandlerErr::new("conflict", "username already exists")
            .with_details(json!({ "username": username })));
    }

    let user = db::insert_user(conn, &username, &password, role, &name)
        .map_err(HandlerErr::update_failed)?;
    tracing::info!(username = %user.username, role = role.as_str(), "user created");
    Ok(json!({ "user": user }))
}

fn delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, me) = admin_session(state)?;
    let user_id = required_str(&req.params, "userId")?;
    if user_id == me.id {
        return Err(HandlerErr::bad_params("cannot delete the logged-in user"));
    }
    if !db::delete_user(conn, &user_id).map_err(HandlerErr::update_failed)? {
        return Err(HandlerErr::not_found("user not found"));
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(respond(req, list(state))),
        "users.create" => Some(respond(req, create(state, req))),
        "users.delete" => Some(respond(req, delete(state, req))),
        _ => None,
    }
}
