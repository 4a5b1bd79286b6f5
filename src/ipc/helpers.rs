use crate::grading::ScaleError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{Section, Term, User, ValidationError};
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn query_failed(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn update_failed(e: impl std::fmt::Display) -> Self {
        Self::new("db_update_failed", e.to_string())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        if self.code == "db_query_failed" || self.code == "db_update_failed" {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        } else {
            tracing::debug!(code = self.code, message = %self.message, "request rejected");
        }
        err(id, self.code, self.message, self.details)
    }
}

impl From<ValidationError> for HandlerErr {
    fn from(e: ValidationError) -> Self {
        HandlerErr::bad_params(e.to_string())
    }
}

impl From<ScaleError> for HandlerErr {
    fn from(e: ScaleError) -> Self {
        HandlerErr::bad_params(e.to_string())
    }
}

pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Workspace connection plus the logged-in user.
pub fn session(state: &AppState) -> Result<(&Connection, &User), HandlerErr> {
    let conn = db_conn(state)?;
    let user = state
        .session
        .as_ref()
        .ok_or_else(|| HandlerErr::new("unauthorized", "log in first"))?;
    Ok((conn, user))
}

pub fn admin_session(state: &AppState) -> Result<(&Connection, &User), HandlerErr> {
    let (conn, user) = session(state)?;
    if !user.is_admin() {
        return Err(HandlerErr::new("forbidden", "administrator role required")
            .with_details(json!({ "role": user.role.as_str() })));
    }
    Ok((conn, user))
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn parse_term(params: &serde_json::Value) -> Result<Term, HandlerErr> {
    let raw = required_str(params, "term")?;
    Term::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params("term must be one of: first, second, final")
            .with_details(json!({ "term": raw }))
    })
}

pub fn parse_section(raw: &str) -> Result<Section, HandlerErr> {
    Section::parse(raw).ok_or_else(|| {
        HandlerErr::bad_params("section must be A or B").with_details(json!({ "section": raw }))
    })
}

pub fn optional_section(params: &serde_json::Value) -> Result<Option<Section>, HandlerErr> {
    match params.get("section") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) if s.eq_ignore_ascii_case("ALL") => Ok(None),
            Some(s) => parse_section(s).map(Some),
            None => Err(HandlerErr::bad_params("section must be a string")),
        },
    }
}

/// Deserializes `params[key]` into `T`, mapping serde errors to `bad_params`.
pub fn parse_param<T: serde::de::DeserializeOwned>(
    params: &serde_json::Value,
    key: &str,
) -> Result<T, HandlerErr> {
    let raw = params
        .get(key)
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    serde_json::from_value(raw)
        .map_err(|e| HandlerErr::bad_params(format!("invalid {}: {}", key, e)))
}
