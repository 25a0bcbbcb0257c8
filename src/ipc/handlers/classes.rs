use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_optional_settings, get_optional_str, get_required_str, get_required_text, require_db,
    resolve_class_id, today,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{cace_level, CACE_LEVELS};
use crate::settings::{ClassSettings, ColorThresholds, RankingWeights};
use crate::store::{self, ClassPatch, NewClass};
use rusqlite::Connection;
use serde_json::json;

fn parse_level(params: &serde_json::Value) -> Result<Option<u8>, HandlerErr> {
    match params.get("caceLevel") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let level = v
                .as_i64()
                .and_then(cace_level)
                .ok_or_else(|| HandlerErr::bad_params("caceLevel must be an integer 0-5"))?;
            Ok(Some(level.level))
        }
    }
}

fn parse_academic_year(state: &AppState, raw: Option<String>) -> Result<Option<String>, HandlerErr> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    state
        .config
        .calendar
        .parse_label(&raw)
        .map(|y| Some(y.label))
        .ok_or_else(|| HandlerErr::bad_params("academicYear must look like 2024-2025"))
}

fn classes_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let classes = store::list_classes(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "classes": classes }))
}

fn classes_get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = resolve_class_id(params, &state.context)?;
    let class = store::get_class(conn, &class_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("class"))?;
    Ok(json!({ "class": class, "level": class.level() }))
}

fn classes_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_required_text(params, "name")?;
    let schedule = get_optional_str(params, "schedule")?.unwrap_or_default();
    let academic_year = match parse_academic_year(state, get_optional_str(params, "academicYear")?)? {
        Some(label) => label,
        None => state
            .config
            .calendar
            .academic_year_for(today())
            .map(|y| y.label)
            .ok_or_else(|| HandlerErr::new("internal", "could not resolve current academic year"))?,
    };
    let cace_level = parse_level(params)?.unwrap_or(0);

    let settings = ClassSettings {
        weights: get_optional_settings::<RankingWeights>(params, "weights")?.unwrap_or_default(),
        thresholds: get_optional_settings::<ColorThresholds>(params, "thresholds")?
            .unwrap_or_default(),
    };
    settings.validate()?;

    let class = store::create_class(
        conn,
        &NewClass {
            name,
            schedule,
            academic_year,
            cace_level,
            settings,
        },
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "classes" })))?;
    tracing::info!(class_id = %class.id, name = %class.name, "class created");
    Ok(json!({ "classId": class.id, "class": class }))
}

fn classes_update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = get_required_str(params, "classId")?;
    let name = match get_optional_str(params, "name")? {
        Some(n) if n.trim().is_empty() => {
            return Err(HandlerErr::bad_params("name must not be empty"))
        }
        Some(n) => Some(n.trim().to_string()),
        None => None,
    };
    let patch = ClassPatch {
        name,
        schedule: get_optional_str(params, "schedule")?,
        academic_year: parse_academic_year(state, get_optional_str(params, "academicYear")?)?,
        cace_level: parse_level(params)?,
    };
    let class = store::update_class(conn, &class_id, &patch)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("class"))?;
    Ok(json!({ "class": class }))
}

fn classes_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let conn = require_db(state)?;
    let deleted = store::delete_class(conn, &class_id)
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    if !deleted {
        return Err(HandlerErr::not_found("class"));
    }
    tracing::info!(class_id = %class_id, "class deleted with its students");
    state.context.forget_class(&class_id);
    Ok(json!({ "ok": true }))
}

fn classes_levels() -> serde_json::Value {
    json!({ "levels": CACE_LEVELS })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => match state.db.as_ref() {
            Some(conn) => classes_list(conn),
            None => Ok(json!({ "classes": [] })),
        },
        "classes.get" => classes_get(state, &req.params),
        "classes.create" => classes_create(state, &req.params),
        "classes.update" => classes_update(state, &req.params),
        "classes.delete" => classes_delete(state, &req.params),
        "classes.levels" => Ok(classes_levels()),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
