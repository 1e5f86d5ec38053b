use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Trimmed string param; blank counts as absent.
pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn optional_path(req: &Request, key: &str) -> Option<PathBuf> {
    optional_str(req, key).map(PathBuf::from)
}

/// Write an export payload to `out`, creating parent directories.
pub fn write_output(req: &Request, out: &Path, contents: &str) -> Result<(), serde_json::Value> {
    if let Some(parent) = out.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return Err(err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(serde_json::json!({ "path": out.to_string_lossy() })),
            ));
        }
    }
    std::fs::write(out, contents).map_err(|e| {
        err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(serde_json::json!({ "path": out.to_string_lossy() })),
        )
    })
}
