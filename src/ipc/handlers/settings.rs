use crate::config::PrintSettings;
use crate::ipc::error::{app_err, err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match PrintSettings::load(conn) {
        Ok(print) => ok(&req.id, json!({ "print": print })),
        Err(e) => app_err(&req.id, e),
    }
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("print") else {
        return err(&req.id, "bad_params", "missing print", None);
    };
    let current = match PrintSettings::load(conn) {
        Ok(v) => v,
        Err(e) => return app_err(&req.id, e),
    };
    let next = match current.merged(patch) {
        Ok(v) => v,
        Err(e) => return app_err(&req.id, e),
    };
    if let Err(e) = next.save(conn) {
        return app_err(&req.id, e);
    }
    tracing::info!(max_entries = next.max_entries, "print settings updated");
    ok(&req.id, json!({ "print": next }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
