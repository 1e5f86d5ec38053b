use crate::ipc::error::{app_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{MarkFilter, MarkInput};
use crate::store;
use serde_json::json;

fn handle_marks_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filter = MarkFilter {
        student_id: optional_str(req, "studentId"),
        semester: optional_str(req, "semester"),
    };
    match store::list_marks(conn, &filter) {
        Ok(marks) => ok(&req.id, json!({ "marks": marks })),
        Err(e) => app_err(&req.id, e),
    }
}

fn whole_number(v: &serde_json::Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    let f = v.as_f64()?;
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_mark_inputs(req: &Request) -> Result<Vec<MarkInput<'_>>, serde_json::Value> {
    let Some(items) = req.params.get("marks").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "marks must be an array", None));
    };
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(subject_id) = item
            .get("subjectId")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
        else {
            return Err(err(
                &req.id,
                "bad_params",
                "marks[].subjectId is required",
                Some(json!({ "index": i })),
            ));
        };
        let Some(marks) = item.get("marks").and_then(whole_number) else {
            return Err(err(
                &req.id,
                "bad_params",
                "marks[].marks must be a whole number",
                Some(json!({ "index": i, "subjectId": subject_id })),
            ));
        };
        out.push(MarkInput {
            subject_id: subject_id.trim(),
            marks,
        });
    }
    Ok(out)
}

fn handle_marks_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let inputs = match parse_mark_inputs(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::save_marks(conn, &student_id, &inputs) {
        Ok(marks) => ok(&req.id, json!({ "saved": marks.len(), "marks": marks })),
        Err(e) => app_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.list" => Some(handle_marks_list(state, req)),
        "marks.save" => Some(handle_marks_save(state, req)),
        _ => None,
    }
}
