use crate::db;
use crate::ipc::helpers::{
    admin_session, optional_section, parse_section, required_str, respond, session, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use serde_json::json;

fn list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let section = optional_section(&req.params)?;
    let students = db::list_students(conn, section).map_err(HandlerErr::query_failed)?;
    Ok(json!({ "students": students }))
}

fn create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = admin_session(state)?;
    let student = Student {
        id: db::new_id(),
        name: required_str(&req.params, "name")?,
        roll_no: required_str(&req.params, "rollNo")?,
        section: parse_section(&required_str(&req.params, "section")?)?,
    };
    student.validate()?;
    db::insert_student(conn, &student).map_err(HandlerErr::update_failed)?;
    let stored = db::get_student(conn, &student.id)
        .map_err(HandlerErr::query_failed)?
        .unwrap_or(student);
    Ok(json!({ "student": stored }))
}

/// Partial update: absent fields keep their stored value.
fn update(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = admin_session(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let Some(mut student) = db::get_student(conn, &student_id).map_err(HandlerErr::query_failed)?
    else {
        return Err(HandlerErr::not_found("student not found"));
    };

    let patch = req.params.get("patch").unwrap_or(&req.params);
    if let Some(v) = patch.get("name").and_then(|v| v.as_str()) {
        student.name = v.to_string();
    }
    if let Some(v) = patch.get("rollNo").and_then(|v| v.as_str()) {
        student.roll_no = v.to_string();
    }
    if let Some(v) = patch.get("section").and_then(|v| v.as_str()) {
        student.section = parse_section(v)?;
    }
    student.validate()?;
    db::update_student(conn, &student).map_err(HandlerErr::update_failed)?;
    Ok(json!({ "student": student }))
}

fn delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = admin_session(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    if !db::delete_student(conn, &student_id).map_err(HandlerErr::update_failed)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    tracing::info!(student_id = %student_id, "student deleted with marks and term data");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(respond(req, list(state, req))),
        "students.create" => Some(respond(req, create(state, req))),
        "students.update" => Some(respond(req, update(state, req))),
        "students.delete" => Some(respond(req, delete(state, req))),
        _ => None,
    }
}
