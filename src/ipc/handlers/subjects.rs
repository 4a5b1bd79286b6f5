use crate::db;
use crate::ipc::helpers::{admin_session, required_str, respond, session, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Subject;
use serde_json::json;
use std::collections::HashSet;

fn number(params: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

/// Applies whichever subject fields are present in `patch`.
fn apply_patch(subject: &mut Subject, patch: &serde_json::Value) -> Result<(), HandlerErr> {
    if let Some(v) = patch.get("code").and_then(|v| v.as_str()) {
        subject.code = v.trim().to_string();
    }
    if let Some(v) = patch.get("name").and_then(|v| v.as_str()) {
        subject.name = v.trim().to_string();
    }
    if let Some(v) = number(patch, "creditHour")? {
        subject.credit_hour = v;
    }
    if let Some(v) = number(patch, "fullMarksTheory")? {
        subject.full_marks_theory = v;
    }
    if let Some(v) = number(patch, "fullMarksPractical")? {
        subject.full_marks_practical = v;
    }
    if let Some(v) = number(patch, "passMarksTheory")? {
        subject.pass_marks_theory = v;
    }
    if let Some(v) = number(patch, "passMarksPractical")? {
        subject.pass_marks_practical = v;
    }
    Ok(())
}

fn list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let subjects = db::list_subjects(conn).map_err(HandlerErr::query_failed)?;
    Ok(json!({ "subjects": subjects }))
}

fn create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = admin_session(state)?;
    // Form defaults for a secondary-level subject.
    let mut subject = Subject {
        id: db::new_id(),
        code: required_str(&req.params, "code")?,
        name: required_str(&req.params, "name")?,
        credit_hour: 2.5,
        full_marks_theory: 50.0,
        full_marks_practical: 50.0,
        pass_marks_theory: 18.0,
        pass_marks_practical: 18.0,
        sort_order: 0,
    };
    apply_patch(&mut subject, &req.params)?;
    subject.validate()?;
    db::insert_subject(conn, &mut subject).map_err(HandlerErr::update_failed)?;
    Ok(json!({ "subject": subject }))
}

fn update(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = admin_session(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let Some(mut subject) = db::get_subject(conn, &subject_id).map_err(HandlerErr::query_failed)?
    else {
        return Err(HandlerErr::not_found("subject not found"));
    };
    let before = subject.clone();
    apply_patch(&mut subject, req.params.get("patch").unwrap_or(&req.params))?;
    subject.validate()?;

    // Grading fields are frozen once marks reference the subject.
    let grading_changed = before.credit_hour != subject.credit_hour
        || before.full_marks_theory != subject.full_marks_theory
        || before.full_marks_practical != subject.full_marks_practical
        || before.pass_marks_theory != subject.pass_marks_theory
        || before.pass_marks_practical != subject.pass_marks_practical;
    if grading_changed && db::subject_has_marks(conn, &subject.id).map_err(HandlerErr::query_failed)? {
        return Err(HandlerErr::new(
            "conflict",
            "credit hour and full/pass marks cannot change once marks are recorded",
        )
        .with_details(json!({ "subjectId": subject.id })));
    }
    db::update_subject(conn, &subject).map_err(HandlerErr::update_failed)?;
    Ok(json!({ "subject": subject }))
}

fn delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = admin_session(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    if !db::delete_subject(conn, &subject_id).map_err(HandlerErr::update_failed)? {
        return Err(HandlerErr::not_found("subject not found"));
    }
    tracing::info!(subject_id = %subject_id, "subject deleted with its marks");
    Ok(json!({ "deleted": true }))
}

fn reorder(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = admin_session(state)?;
    let Some(raw) = req.params.get("subjectIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("subjectIds must be an array"));
    };
    let mut ordered: Vec<String> = Vec::with_capacity(raw.len());
    for v in raw {
        let Some(id) = v.as_str() else {
            return Err(HandlerErr::bad_params("subjectIds must contain strings"));
        };
        ordered.push(id.to_string());
    }

    let existing: HashSet<String> = db::list_subjects(conn)
        .map_err(HandlerErr::query_failed)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    let requested: HashSet<String> = ordered.iter().cloned().collect();
    if requested.len() != ordered.len() || requested != existing {
        return Err(HandlerErr::bad_params(
            "subjectIds must list every subject exactly once",
        ));
    }

    db::reorder_subjects(conn, &ordered).map_err(HandlerErr::update_failed)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(respond(req, list(state))),
        "subjects.create" => Some(respond(req, create(state, req))),
        "subjects.update" => Some(respond(req, update(state, req))),
        "subjects.delete" => Some(respond(req, delete(state, req))),
        "subjects.reorder" => Some(respond(req, reorder(state, req))),
        _ => None,
    }
}
