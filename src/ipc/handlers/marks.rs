use crate::db;
use crate::ipc::helpers::{optional_section, parse_term, respond, session, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Conduct, Marks, Subject, Term, TermData};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};

fn list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let term = parse_term(&req.params)?;
    let section = optional_section(&req.params)?;

    let students = db::list_students(conn, section).map_err(HandlerErr::query_failed)?;
    let keep: HashSet<&str> = students.iter().map(|s| s.id.as_str()).collect();
    let marks: Vec<Marks> = db::list_marks(conn, term)
        .map_err(HandlerErr::query_failed)?
        .into_iter()
        .filter(|m| keep.contains(m.student_id.as_str()))
        .collect();
    let term_data: Vec<TermData> = db::list_term_data(conn, term)
        .map_err(HandlerErr::query_failed)?
        .into_iter()
        .filter(|td| keep.contains(td.student_id.as_str()))
        .collect();

    Ok(json!({
        "term": term,
        "students": students,
        "marks": marks,
        "termData": term_data,
    }))
}

/// Incoming rows; the batch's `term` applies to every row.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarksRow {
    student_id: String,
    subject_id: String,
    #[serde(default)]
    theory_obtained: f64,
    #[serde(default)]
    practical_obtained: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TermDataRow {
    student_id: String,
    #[serde(default)]
    attendance_present: u32,
    #[serde(default)]
    attendance_total: u32,
    #[serde(default)]
    conduct: Conduct,
}

fn parse_rows<T: serde::de::DeserializeOwned>(
    params: &serde_json::Value,
    key: &str,
) -> Result<Vec<T>, HandlerErr> {
    match params.get(key) {
        None => Ok(Vec::new()),
        Some(v) if v.is_null() => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid {}: {}", key, e))),
    }
}

fn row_error(key: &str, index: usize, message: impl Into<String>) -> HandlerErr {
    HandlerErr::bad_params(message).with_details(json!({ "field": key, "index": index }))
}

/// Checks every row before anything is written; one bad row rejects the batch.
fn validate_batch(
    term: Term,
    marks_rows: Vec<MarksRow>,
    td_rows: Vec<TermDataRow>,
    subjects: &HashMap<String, Subject>,
    student_ids: &HashSet<String>,
) -> Result<(Vec<Marks>, Vec<TermData>), HandlerErr> {
    let mut marks = Vec::with_capacity(marks_rows.len());
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for (i, row) in marks_rows.into_iter().enumerate() {
        if !student_ids.contains(&row.student_id) {
            return Err(row_error("marks", i, format!("unknown student {}", row.student_id)));
        }
        let Some(subject) = subjects.get(&row.subject_id) else {
            return Err(row_error("marks", i, format!("unknown subject {}", row.subject_id)));
        };
        if !seen.insert((row.student_id.clone(), row.subject_id.clone())) {
            return Err(row_error("marks", i, "duplicate student/subject row"));
        }
        let m = Marks {
            student_id: row.student_id,
            subject_id: row.subject_id,
            term,
            theory_obtained: row.theory_obtained,
            practical_obtained: row.practical_obtained,
        };
        m.validate_against(subject)
            .map_err(|e| row_error("marks", i, e.to_string()))?;
        marks.push(m);
    }

    let mut term_data = Vec::with_capacity(td_rows.len());
    let mut seen_students: HashSet<String> = HashSet::new();
    for (i, row) in td_rows.into_iter().enumerate() {
        if !student_ids.contains(&row.student_id) {
            return Err(row_error("termData", i, format!("unknown student {}", row.student_id)));
        }
        if !seen_students.insert(row.student_id.clone()) {
            return Err(row_error("termData", i, "duplicate student row"));
        }
        let td = TermData {
            student_id: row.student_id,
            term,
            attendance_present: row.attendance_present,
            attendance_total: row.attendance_total,
            conduct: row.conduct,
        };
        td.validate()
            .map_err(|e| row_error("termData", i, e.to_string()))?;
        term_data.push(td);
    }

    Ok((marks, term_data))
}

fn save_term(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, user) = session(state)?;
    let term = parse_term(&req.params)?;
    let marks_rows: Vec<MarksRow> = parse_rows(&req.params, "marks")?;
    let td_rows: Vec<TermDataRow> = parse_rows(&req.params, "termData")?;

    let subjects: HashMap<String, Subject> = db::list_subjects(conn)
        .map_err(HandlerErr::query_failed)?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    let student_ids: HashSet<String> = db::list_students(conn, None)
        .map_err(HandlerErr::query_failed)?
        .into_iter()
        .map(|s| s.id)
        .collect();

    let (marks, term_data) = validate_batch(term, marks_rows, td_rows, &subjects, &student_ids)?;
    db::save_term_records(conn, &marks, &term_data).map_err(HandlerErr::update_failed)?;
    tracing::info!(
        term = term.code(),
        marks = marks.len(),
        term_data = term_data.len(),
        user = %user.username,
        "term records saved"
    );
    Ok(json!({
        "term": term,
        "savedMarks": marks.len(),
        "savedTermData": term_data.len(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.list" => Some(respond(req, list(state, req))),
        "marks.saveTerm" => Some(respond(req, save_term(state, req))),
        _ => None,
    }
}
