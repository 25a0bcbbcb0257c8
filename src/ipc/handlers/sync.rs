use crate::ipc::error::respond;
use crate::ipc::types::{AppState, Request};

fn sync_status(state: &AppState) -> serde_json::Value {
    let status = state.probe.probe();
    if let Some(e) = &status.error {
        tracing::warn!(error = %e, "sync probe failed");
    }
    serde_json::to_value(status).unwrap_or_else(|_| serde_json::json!({ "configured": false }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sync.status" => Some(respond(&req.id, Ok(sync_status(state)))),
        _ => None,
    }
}
