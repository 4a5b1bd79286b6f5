use crate::db;
use crate::grading::{self, StudentReport};
use crate::ipc::helpers::{
    optional_section, parse_section, parse_term, required_str, respond, session, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Student, Subject, Term};
use crate::reports::{self, ReportView};
use rusqlite::Connection;
use serde_json::json;

/// Recomputes every report for the term from the store. Nothing is cached, so
/// a report can never lag behind the records it came from.
fn term_reports(
    conn: &Connection,
    term: Term,
    students: &[Student],
) -> Result<(Vec<StudentReport>, Vec<Subject>), HandlerErr> {
    let subjects = db::list_subjects(conn).map_err(HandlerErr::query_failed)?;
    let records = db::load_term_records(conn, term).map_err(HandlerErr::query_failed)?;
    let scale = db::load_grade_scale(conn).map_err(HandlerErr::query_failed)?;
    let reports = grading::build_term_reports(students, &subjects, &records, term, &scale);
    Ok((reports, subjects))
}

fn student_reports(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let term = parse_term(&req.params)?;
    let section = optional_section(&req.params)?;
    let students = db::list_students(conn, section).map_err(HandlerErr::query_failed)?;
    let (reports, _) = term_reports(conn, term, &students)?;
    let views: Vec<ReportView<'_>> = reports.iter().map(ReportView::from).collect();
    Ok(json!({
        "term": term,
        "termLabel": term.label(),
        "reports": views,
    }))
}

fn grade_sheet(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let term = parse_term(&req.params)?;
    let student_id = required_str(&req.params, "studentId")?;
    let Some(student) = db::get_student(conn, &student_id).map_err(HandlerErr::query_failed)?
    else {
        return Err(HandlerErr::not_found("student not found"));
    };
    let (reports, _) = term_reports(conn, term, std::slice::from_ref(&student))?;
    let Some(report) = reports.first() else {
        return Err(HandlerErr::not_found("student not found"));
    };
    serde_json::to_value(reports::grade_sheet_model(report)).map_err(HandlerErr::query_failed)
}

fn section_ledger(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let term = parse_term(&req.params)?;
    let section = parse_section(&required_str(&req.params, "section")?)?;
    let students = db::list_students(conn, Some(section)).map_err(HandlerErr::query_failed)?;
    let (reports, subjects) = term_reports(conn, term, &students)?;
    serde_json::to_value(reports::section_ledger_model(&reports, &subjects, term, section))
        .map_err(HandlerErr::query_failed)
}

fn dashboard(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let term = parse_term(&req.params)?;
    let students = db::list_students(conn, None).map_err(HandlerErr::query_failed)?;
    let (reports, _) = term_reports(conn, term, &students)?;
    let total_expense = db::total_expenses(conn).map_err(HandlerErr::query_failed)?;
    serde_json::to_value(reports::dashboard_model(&reports, term, total_expense))
        .map_err(HandlerErr::query_failed)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentReports" => Some(respond(req, student_reports(state, req))),
        "reports.gradeSheetModel" => Some(respond(req, grade_sheet(state, req))),
        "reports.sectionLedgerModel" => Some(respond(req, section_ledger(state, req))),
        "reports.dashboard" => Some(respond(req, dashboard(state, req))),
        _ => None,
    }
}
