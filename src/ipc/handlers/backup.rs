use crate::backup;
use crate::db;
use crate::error::AppError;
use crate::ipc::error::{app_err, err, ok};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

fn current_workspace(state: &AppState, req: &Request) -> Result<PathBuf, serde_json::Value> {
    state
        .workspace
        .clone()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match current_workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match db::settings_snapshot(conn) {
        Ok(v) => v,
        Err(e) => return app_err(&req.id, AppError::db("db_query_failed", e)),
    };

    match backup::export_workspace_bundle(&workspace, Path::new(&out_path), settings) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "path": out_path,
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "dbSha256": summary.db_sha256,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "bundle export failed");
            app_err(
                &req.id,
                AppError::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path })),
            )
        }
    }
}

/// Restore the selected workspace from a bundle or SQLite file. The source is
/// fully verified while the current database stays open; a rejected source
/// leaves the session as it was.
fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = db_conn(state, req) {
        return e;
    }
    let workspace = match current_workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let in_path = match required_str(req, "inPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !Path::new(&in_path).is_file() {
        return app_err(
            &req.id,
            AppError::not_found("backup file not found").with_details(json!({ "path": in_path })),
        );
    }

    let source = match backup::read_restore_source(Path::new(&in_path)) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "backup rejected");
            return app_err(
                &req.id,
                AppError::new("bad_bundle", format!("{e:#}")).with_details(json!({ "path": in_path })),
            );
        }
    };

    // The live handle has to go before its file is replaced.
    state.db = None;
    let restored = backup::restore_database(&workspace, &source);
    let reopened = open_workspace(state, &workspace);
    if let Err(e) = restored {
        return app_err(
            &req.id,
            AppError::new("io_failed", format!("{e:#}"))
                .with_details(json!({ "workspacePath": workspace.to_string_lossy() })),
        );
    }
    if let Err(e) = reopened {
        return err(&req.id, "db_open_failed", format!("{e:#}"), None);
    }

    let settings_keys: Vec<&String> = source
        .manifest
        .as_ref()
        .map(|m| m.settings.keys().collect())
        .unwrap_or_default();
    ok(
        &req.id,
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "bundleFormatDetected": source.format,
            "dbSha256": source.db_sha256,
            "settingsKeys": settings_keys,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        _ => None,
    }
}
