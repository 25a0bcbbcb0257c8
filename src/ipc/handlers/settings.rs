use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_settings, require_db, resolve_class_id};
use crate::ipc::types::{AppState, Request};
use crate::settings::{ClassSettings, ColorThresholds, RankingWeights};
use crate::store;
use serde_json::json;

fn settings_get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = resolve_class_id(params, &state.context)?;
    let class = store::get_class(conn, &class_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("class"))?;
    Ok(json!({
        "classId": class.id,
        "weights": class.weights,
        "thresholds": class.thresholds,
    }))
}

/// Either part may be omitted; whatever is sent is validated together with
/// the stored remainder and nothing is written unless all of it passes.
fn settings_update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = resolve_class_id(params, &state.context)?;
    let weights = get_optional_settings::<RankingWeights>(params, "weights")?;
    let thresholds = get_optional_settings::<ColorThresholds>(params, "thresholds")?;
    if weights.is_none() && thresholds.is_none() {
        return Err(HandlerErr::bad_params("expected weights and/or thresholds"));
    }

    let class = store::get_class(conn, &class_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("class"))?;
    let settings = ClassSettings {
        weights: weights.unwrap_or(class.weights),
        thresholds: thresholds.unwrap_or(class.thresholds),
    };
    if let Err(e) = settings.validate() {
        tracing::info!(class_id = %class_id, error = %e, "settings rejected");
        return Err(e.into());
    }

    let class = store::update_class_settings(conn, &class_id, &settings)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("class"))?;
    tracing::info!(class_id = %class_id, "settings saved");
    Ok(json!({
        "classId": class.id,
        "weights": class.weights,
        "thresholds": class.thresholds,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "settings.get" => settings_get(state, &req.params),
        "settings.update" => settings_update(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
