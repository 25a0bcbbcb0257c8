use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    date_or_today, get_optional_f64, get_required_bool, get_required_date, get_required_f64,
    get_required_str, get_required_text, require_db,
};
use crate::ipc::types::{AppState, Request};
use crate::model::CasasKind;
use crate::store;
use rusqlite::Connection;
use serde_json::json;

fn require_student(conn: &Connection, params: &serde_json::Value) -> Result<String, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let exists = store::student_exists(conn, &student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if !exists {
        return Err(HandlerErr::not_found("student"));
    }
    Ok(student_id)
}

fn deleted_or_not_found(deleted: bool, what: &str) -> Result<serde_json::Value, HandlerErr> {
    if deleted {
        Ok(json!({ "ok": true }))
    } else {
        Err(HandlerErr::not_found(what))
    }
}

fn attendance_mark(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_student(conn, params)?;
    let date = get_required_date(params, "date")?;
    let present = get_required_bool(params, "present")?;
    let entry = store::upsert_attendance(conn, &student_id, date, present)
        .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "attendance" })))?;
    Ok(json!({ "entry": entry }))
}

fn attendance_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let date = get_required_date(params, "date")?;
    let deleted = store::delete_attendance(conn, &student_id, date)
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    deleted_or_not_found(deleted, "attendance entry")
}

fn scores_add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_student(conn, params)?;
    let subject = get_required_text(params, "subject")?;
    let date = date_or_today(params, "date")?;
    let score = get_required_f64(params, "score")?;
    let max_score = get_optional_f64(params, "maxScore")?.unwrap_or(100.0);
    if max_score <= 0.0 {
        return Err(HandlerErr::bad_params("maxScore must be positive"));
    }
    if !(0.0..=max_score).contains(&score) {
        return Err(HandlerErr::bad_params("score must be between 0 and maxScore"));
    }
    let test = store::add_test_score(conn, &student_id, &subject, date, score, max_score)
        .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "test_scores" })))?;
    Ok(json!({ "score": test }))
}

fn casas_add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_student(conn, params)?;
    let kind_raw = get_required_str(params, "kind")?;
    let kind = CasasKind::parse(&kind_raw)
        .ok_or_else(|| HandlerErr::bad_params("kind must be reading or listening"))?;
    let date = date_or_today(params, "date")?;
    let score = get_required_f64(params, "score")?;
    if score <= 0.0 {
        return Err(HandlerErr::bad_params("score must be positive"));
    }
    let casas = store::add_casas_score(conn, &student_id, kind, date, score)
        .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "casas_scores" })))?;
    Ok(json!({ "score": casas }))
}

fn notes_add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_student(conn, params)?;
    let text = get_required_text(params, "text")?;
    let date = date_or_today(params, "date")?;
    let note = store::add_note(conn, &student_id, date, &text)
        .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "student_notes" })))?;
    Ok(json!({ "note": note }))
}

fn delete_by_id(
    conn: &Connection,
    params: &serde_json::Value,
    what: &str,
    delete: fn(&Connection, &str) -> anyhow::Result<bool>,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let deleted = delete(conn, &id).map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    deleted_or_not_found(deleted, what)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let method = req.method.as_str();
    if !matches!(
        method,
        "attendance.mark"
            | "attendance.delete"
            | "scores.add"
            | "scores.delete"
            | "casas.add"
            | "casas.delete"
            | "notes.add"
            | "notes.delete"
    ) {
        return None;
    }
    let result = require_db(state).and_then(|conn| match method {
        "attendance.mark" => attendance_mark(conn, &req.params),
        "attendance.delete" => attendance_delete(conn, &req.params),
        "scores.add" => scores_add(conn, &req.params),
        "scores.delete" => delete_by_id(conn, &req.params, "test score", store::delete_test_score),
        "casas.add" => casas_add(conn, &req.params),
        "casas.delete" => delete_by_id(conn, &req.params, "CASAS score", store::delete_casas_score),
        "notes.add" => notes_add(conn, &req.params),
        _ => delete_by_id(conn, &req.params, "note", store::delete_note),
    });
    Some(respond(&req.id, result))
}
