use crate::db;
use crate::ipc::helpers::{required_str, respond, session, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Expense;
use serde_json::json;

fn list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let expenses = db::list_expenses(conn).map_err(HandlerErr::query_failed)?;
    let total: f64 = expenses.iter().map(|e| e.amount).sum();
    Ok(json!({
        "expenses": expenses,
        "total": total,
    }))
}

fn create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let Some(amount) = req.params.get("amount").and_then(|v| v.as_f64()) else {
        return Err(HandlerErr::bad_params("amount must be a number"));
    };
    let expense = Expense {
        id: db::new_id(),
        description: required_str(&req.params, "description")?,
        amount,
        category: req
            .params
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        date: required_str(&req.params, "date")?,
    };
    expense.validate()?;
    db::insert_expense(conn, &expense).map_err(HandlerErr::update_failed)?;
    Ok(json!({ "expense": expense }))
}

fn delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (conn, _) = session(state)?;
    let expense_id = required_str(&req.params, "expenseId")?;
    if !db::delete_expense(conn, &expense_id).map_err(HandlerErr::update_failed)? {
        return Err(HandlerErr::not_found("expense not found"));
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "expenses.list" => Some(respond(req, list(state))),
        "expenses.create" => Some(respond(req, create(state, req))),
        "expenses.delete" => Some(respond(req, delete(state, req))),
        _ => None,
    }
}
