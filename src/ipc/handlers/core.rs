use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "selectedClassId": state.context.selected_class_id(),
        })),
    )
}

/// Opens (or creates) the workspace database. Also used at start-up when
/// a workspace is configured.
pub fn open_workspace(state: &mut AppState, path: PathBuf) -> Result<serde_json::Value, HandlerErr> {
    let conn = db::open_db(&path).map_err(|e| HandlerErr::db("db_open_failed", e))?;
    tracing::info!(workspace = %path.display(), "workspace opened");
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    // Selection belongs to the previous workspace.
    state.context.reset();
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

fn workspace_select(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(path) = get_optional_str(params, "path")? else {
        return Err(HandlerErr::bad_params("missing params.path"));
    };
    open_workspace(state, PathBuf::from(path))
}

fn context_json(state: &AppState) -> serde_json::Value {
    json!({
        "selectedClassId": state.context.selected_class_id(),
        "revision": state.context.revision(),
    })
}

fn context_select_class(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?;
    if let Some(id) = &class_id {
        let conn = require_db(state)?;
        let exists = store::class_exists(conn, id).map_err(|e| HandlerErr::db("db_query_failed", e))?;
        if !exists {
            return Err(HandlerErr::not_found("class"));
        }
    }
    let changed = state.context.select_class(class_id).is_some();
    let mut out = context_json(state);
    out["changed"] = json!(changed);
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => return Some(handle_health(state, req)),
        "workspace.select" => workspace_select(state, &req.params),
        "context.get" => Ok(context_json(state)),
        "context.selectClass" => context_select_class(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
