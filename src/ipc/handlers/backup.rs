use crate::backup;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use std::path::PathBuf;

fn backup_export(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let out_path = PathBuf::from(get_required_str(params, "path")?);
    let bundle = match params.get("bundle") {
        None | Some(serde_json::Value::Null) => out_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip")),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params("bundle must be a boolean"))?,
    };
    let summary = if bundle {
        backup::write_bundle(conn, &out_path)
    } else {
        backup::write_json(conn, &out_path)
    }
    .map_err(|e| HandlerErr::new("backup_failed", format!("{e:#}")))?;
    tracing::info!(
        path = %out_path.display(),
        format = %summary.format,
        classes = summary.class_count,
        students = summary.student_count,
        "backup exported"
    );
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "format": summary.format,
        "classCount": summary.class_count,
        "studentCount": summary.student_count,
    }))
}

fn backup_import(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let in_path = PathBuf::from(get_required_str(params, "path")?);
    let conn = require_db(state)?;
    let summary = match backup::import_file(conn, &in_path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %in_path.display(), error = %format!("{e:#}"), "backup import rejected");
            return Err(HandlerErr::new("import_failed", format!("{e:#}")));
        }
    };

    // A selection that did not survive the import is dropped.
    let stale = match state.context.selected_class_id() {
        Some(id) => !store::class_exists(conn, id).map_err(|e| HandlerErr::db("db_query_failed", e))?,
        None => false,
    };
    if stale {
        state.context.select_class(None);
    }

    tracing::info!(
        path = %in_path.display(),
        format = %summary.format_detected,
        classes = summary.class_count,
        students = summary.student_count,
        "backup imported"
    );
    Ok(json!({
        "formatDetected": summary.format_detected,
        "classCount": summary.class_count,
        "studentCount": summary.student_count,
        "selectedClassId": state.context.selected_class_id(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.export" => backup_export(state, &req.params),
        "backup.import" => backup_import(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
