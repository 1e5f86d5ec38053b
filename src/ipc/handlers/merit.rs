use crate::config::PrintSettings;
use crate::export;
use crate::filter::{self, MeritFilters, RankMode};
use crate::ipc::error::{app_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_path, optional_str, write_output};
use crate::ipc::types::{AppState, Request};
use crate::merit::{self, MeritEntry};
use crate::store;
use rusqlite::Connection;
use serde_json::json;

struct MeritView {
    entries: Vec<MeritEntry>,
    filters: MeritFilters,
    rank_mode: RankMode,
    semesters: Vec<String>,
    batches: Vec<String>,
    total_ranked: usize,
}

/// Load, rank, then filter. Ranking always runs over the whole population;
/// filters only narrow the result.
fn build_view(conn: &Connection, req: &Request) -> Result<MeritView, serde_json::Value> {
    let filters =
        filter::parse_merit_filters(req.params.get("filters")).map_err(|e| app_err(&req.id, e))?;
    let rank_mode = RankMode::parse(req.params.get("rankMode")).map_err(|e| app_err(&req.id, e))?;

    let inputs = store::load_merit_inputs(conn).map_err(|e| {
        tracing::error!(error = %e, "merit inputs could not be loaded");
        app_err(&req.id, e)
    })?;
    let ranked = merit::compute_merit_list(&inputs.students, &inputs.subjects, &inputs.marks);
    let entries = filter::filter_merit_list(&ranked, &filters, rank_mode);
    tracing::debug!(
        ranked = ranked.len(),
        shown = entries.len(),
        filtered = !filters.is_empty(),
        "merit list computed"
    );

    Ok(MeritView {
        total_ranked: ranked.len(),
        entries,
        filters,
        rank_mode,
        semesters: merit::semesters(&inputs.students),
        batches: merit::batches(&inputs.students),
    })
}

fn handle_merit_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let view = match build_view(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "entries": view.entries,
            "summary": merit::summarize(&view.entries),
            "totalRanked": view.total_ranked,
            "filters": view.filters,
            "rankMode": view.rank_mode,
            "semesters": view.semesters,
            "batches": view.batches,
        }),
    )
}

fn handle_merit_export_tabular(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let view = match build_view(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let doc = export::tabular_document(&view.entries);
    let csv = doc.to_csv();

    let out_path = optional_path(req, "outPath");
    if let Some(out) = &out_path {
        if let Err(e) = write_output(req, out, &csv) {
            return e;
        }
    }

    ok(
        &req.id,
        json!({
            "rowsExported": doc.rows.len(),
            "headers": doc.headers,
            "rows": doc.rows,
            "csv": csv,
            "path": out_path.map(|p| p.to_string_lossy().to_string()),
        }),
    )
}

fn parse_max_entries(req: &Request) -> Result<Option<usize>, serde_json::Value> {
    match req.params.get("maxEntries") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) => Ok(Some(n as usize)),
            None => Err(err(
                &req.id,
                "bad_params",
                "maxEntries must be a non-negative integer",
                Some(json!({ "maxEntries": v })),
            )),
        },
    }
}

fn handle_merit_export_printable(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let max_entries = match parse_max_entries(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match PrintSettings::load(conn) {
        Ok(v) => v,
        Err(e) => return app_err(&req.id, e),
    };
    let view = match build_view(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    // Without an explicit suffix, name the active semester filter.
    let title_suffix = optional_str(req, "titleSuffix").or_else(|| {
        view.filters
            .semester
            .as_ref()
            .map(|s| format!("Semester: {}", s))
    });
    let opts = settings.to_options(title_suffix, max_entries);
    let doc = export::printable_document(&view.entries, &opts);
    let text = doc.to_text();

    let out_path = optional_path(req, "outPath");
    if let Some(out) = &out_path {
        if let Err(e) = write_output(req, out, &text) {
            return e;
        }
    }

    ok(
        &req.id,
        json!({
            "rowsExported": doc.row_count,
            "omitted": doc.omitted,
            "maxEntries": opts.max_entries,
            "pageCount": doc.pages.len(),
            "document": doc,
            "text": text,
            "path": out_path.map(|p| p.to_string_lossy().to_string()),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "merit.list" => Some(handle_merit_list(state, req)),
        "merit.exportTabular" => Some(handle_merit_export_tabular(state, req)),
        "merit.exportPrintable" => Some(handle_merit_export_printable(state, req)),
        _ => None,
    }
}
