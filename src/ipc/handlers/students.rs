use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    date_or_today, get_optional_date, get_optional_str, get_required_bool, get_required_str,
    get_required_text, require_db, resolve_class_id,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, StudentPatch};
use serde_json::json;

fn require_class(conn: &rusqlite::Connection, class_id: &str) -> Result<(), HandlerErr> {
    let exists = store::class_exists(conn, class_id).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if !exists {
        return Err(HandlerErr::not_found("class"));
    }
    Ok(())
}

fn students_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = resolve_class_id(params, &state.context)?;
    require_class(conn, &class_id)?;
    let students = store::list_students(conn, &class_id).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows: Vec<_> = students
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "enrolledOn": s.enrolled_on,
                "dropped": s.dropped,
                "droppedOn": s.dropped_on,
                "sortOrder": s.sort_order,
            })
        })
        .collect();
    Ok(json!({ "classId": class_id, "students": rows }))
}

fn students_get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let student = store::get_student(conn, &student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("student"))?;
    Ok(json!({ "student": student }))
}

fn students_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = resolve_class_id(params, &state.context)?;
    let name = get_required_text(params, "name")?;
    let enrolled_on = date_or_today(params, "enrolledOn")?;
    require_class(conn, &class_id)?;
    let student = store::create_student(conn, &class_id, &name, enrolled_on)
        .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "students" })))?;
    Ok(json!({ "studentId": student.id, "student": student }))
}

fn students_update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let name = match get_optional_str(params, "name")? {
        Some(n) if n.trim().is_empty() => {
            return Err(HandlerErr::bad_params("name must not be empty"))
        }
        Some(n) => Some(n.trim().to_string()),
        None => None,
    };
    let patch = StudentPatch {
        name,
        enrolled_on: get_optional_date(params, "enrolledOn")?,
    };
    let student = store::update_student(conn, &student_id, &patch)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("student"))?;
    Ok(json!({ "student": student }))
}

fn students_set_dropped(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let dropped = get_required_bool(params, "dropped")?;
    let dropped_on = if dropped {
        Some(date_or_today(params, "droppedOn")?)
    } else {
        None
    };
    let student = store::set_student_dropped(conn, &student_id, dropped, dropped_on)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("student"))?;
    Ok(json!({ "student": student }))
}

fn students_delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let deleted = store::delete_student(conn, &student_id)
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    if !deleted {
        return Err(HandlerErr::not_found("student"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, &req.params),
        "students.get" => students_get(state, &req.params),
        "students.create" => students_create(state, &req.params),
        "students.update" => students_update(state, &req.params),
        "students.setDropped" => students_set_dropped(state, &req.params),
        "students.delete" => students_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
