//! Typed access to the `students`, `subjects` and `marks` relations.
//!
//! Every row leaving this module has been mapped into a [`model`] record, and
//! every write has been validated before it reaches SQLite.

use crate::error::{AppError, AppResult};
use crate::filter;
use crate::model::{
    Mark, MarkFilter, MarkInput, NewStudent, NewSubject, Student, StudentPatch, Subject,
    MARK_COLUMNS, STUDENT_COLUMNS, SUBJECT_COLUMNS,
};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct StudentQuery {
    pub semester: Option<String>,
    pub batch: Option<String>,
    pub search: Option<String>,
}

/// Everything the merit pipeline needs, read as one consistent snapshot.
#[derive(Debug, Clone, Default)]
pub struct MeritInputs {
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
    pub marks: Vec<Mark>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub student_count: i64,
    pub subject_count: i64,
    pub mark_count: i64,
    pub semesters: Vec<String>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn list_students(conn: &Connection, query: &StudentQuery) -> AppResult<Vec<Student>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(sem) = &query.semester {
        clauses.push("semester = ?");
        binds.push(Value::Text(sem.clone()));
    }
    if let Some(batch) = &query.batch {
        clauses.push("batch = ?");
        binds.push(Value::Text(batch.clone()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM students {where_sql}
         ORDER BY name COLLATE NOCASE, roll_number"
    );

    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map(params_from_iter(binds), Student::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);
    Ok(match needle {
        Some(n) => students
            .into_iter()
            .filter(|s| filter::matches_search(s, &n))
            .collect(),
        None => students,
    })
}

pub fn get_student(conn: &Connection, student_id: &str) -> AppResult<Option<Student>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    Ok(conn
        .query_row(&sql, [student_id], Student::from_row)
        .optional()?)
}

pub fn create_student(conn: &Connection, input: NewStudent) -> AppResult<Student> {
    let input = input.normalized()?;
    let id = Uuid::new_v4().to_string();
    let ts = now();
    conn.execute(
        "INSERT INTO students(id, name, roll_number, email, phone, semester, batch, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &input.name,
            &input.roll_number,
            input.email.as_deref(),
            input.phone.as_deref(),
            &input.semester,
            &input.batch,
            &ts,
            &ts,
        ),
    )
    .map_err(|e| {
        AppError::db("db_insert_failed", e)
            .with_details(json!({ "table": "students", "rollNumber": &input.roll_number }))
    })?;
    tracing::debug!(student_id = %id, roll_number = %input.roll_number, "student created");

    get_student(conn, &id)?.ok_or_else(|| AppError::not_found("student not found"))
}

pub fn update_student(
    conn: &Connection,
    student_id: &str,
    patch: &StudentPatch,
) -> AppResult<Student> {
    let current =
        get_student(conn, student_id)?.ok_or_else(|| AppError::not_found("student not found"))?;
    if patch.is_empty() {
        return Ok(current);
    }
    let next = patch.apply(&current)?;
    conn.execute(
        "UPDATE students
         SET name = ?, roll_number = ?, email = ?, phone = ?, semester = ?, batch = ?, updated_at = ?
         WHERE id = ?",
        (
            &next.name,
            &next.roll_number,
            next.email.as_deref(),
            next.phone.as_deref(),
            &next.semester,
            &next.batch,
            now(),
            student_id,
        ),
    )
    .map_err(|e| {
        AppError::db("db_update_failed", e).with_details(json!({ "table": "students" }))
    })?;

    get_student(conn, student_id)?.ok_or_else(|| AppError::not_found("student not found"))
}

/// Delete a student; marks go with it through the foreign-key cascade.
/// Returns how many marks were removed.
pub fn delete_student(conn: &Connection, student_id: &str) -> AppResult<i64> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| AppError::db("db_tx_failed", e))?;
    let mark_count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM marks WHERE student_id = ?",
        [student_id],
        |r| r.get(0),
    )?;
    let changed = tx
        .execute("DELETE FROM students WHERE id = ?", [student_id])
        .map_err(|e| {
            AppError::db("db_delete_failed", e).with_details(json!({ "table": "students" }))
        })?;
    if changed == 0 {
        return Err(AppError::not_found("student not found"));
    }
    tx.commit().map_err(|e| AppError::db("db_tx_failed", e))?;
    tracing::info!(student_id, marks_removed = mark_count, "student deleted");
    Ok(mark_count)
}

pub fn list_subjects(conn: &Connection, semester: Option<&str>) -> AppResult<Vec<Subject>> {
    let subjects = match semester {
        Some(sem) => {
            let sql = format!(
                "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE semester = ? ORDER BY code"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([sem], Subject::from_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
            rows
        }
        None => {
            let sql = format!("SELECT {SUBJECT_COLUMNS} FROM subjects ORDER BY semester, code");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], Subject::from_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
            rows
        }
    };
    Ok(subjects)
}

pub fn get_subject(conn: &Connection, subject_id: &str) -> AppResult<Option<Subject>> {
    let sql = format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = ?");
    Ok(conn
        .query_row(&sql, [subject_id], Subject::from_row)
        .optional()?)
}

pub fn create_subject(conn: &Connection, input: NewSubject) -> AppResult<Subject> {
    let input = input.normalized()?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, name, code, max_marks, semester, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &input.name,
            &input.code,
            input.max_marks,
            &input.semester,
            now(),
        ),
    )
    .map_err(|e| {
        AppError::db("db_insert_failed", e)
            .with_details(json!({ "table": "subjects", "code": &input.code }))
    })?;
    tracing::debug!(subject_id = %id, code = %input.code, "subject created");

    get_subject(conn, &id)?.ok_or_else(|| AppError::not_found("subject not found"))
}

pub fn delete_subject(conn: &Connection, subject_id: &str) -> AppResult<i64> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| AppError::db("db_tx_failed", e))?;
    let mark_count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM marks WHERE subject_id = ?",
        [subject_id],
        |r| r.get(0),
    )?;
    let changed = tx
        .execute("DELETE FROM subjects WHERE id = ?", [subject_id])
        .map_err(|e| {
            AppError::db("db_delete_failed", e).with_details(json!({ "table": "subjects" }))
        })?;
    if changed == 0 {
        return Err(AppError::not_found("subject not found"));
    }
    tx.commit().map_err(|e| AppError::db("db_tx_failed", e))?;
    tracing::info!(subject_id, marks_removed = mark_count, "subject deleted");
    Ok(mark_count)
}

pub fn list_marks(conn: &Connection, filter: &MarkFilter) -> AppResult<Vec<Mark>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(id) = &filter.student_id {
        clauses.push("student_id = ?");
        binds.push(Value::Text(id.clone()));
    }
    if let Some(sem) = &filter.semester {
        clauses.push("semester = ?");
        binds.push(Value::Text(sem.clone()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    // rowid keeps entry order stable for the aggregation's subject lists.
    let sql = format!("SELECT {MARK_COLUMNS} FROM marks {where_sql} ORDER BY rowid");

    let mut stmt = conn.prepare(&sql)?;
    let marks = stmt
        .query_map(params_from_iter(binds), Mark::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(marks)
}

/// Replace every mark the student holds for their current semester with
/// `entries`. Each entry is checked against its subject's `max_marks`
/// before anything is written; the swap happens in one transaction.
pub fn save_marks(
    conn: &Connection,
    student_id: &str,
    entries: &[MarkInput<'_>],
) -> AppResult<Vec<Mark>> {
    let student =
        get_student(conn, student_id)?.ok_or_else(|| AppError::not_found("student not found"))?;

    let mut seen: HashSet<&str> = HashSet::new();
    for (i, entry) in entries.iter().enumerate() {
        if !seen.insert(entry.subject_id) {
            return Err(AppError::bad_params("duplicate subjectId in marks")
                .with_details(json!({ "index": i, "subjectId": entry.subject_id })));
        }
        let subject = get_subject(conn, entry.subject_id)?.ok_or_else(|| {
            AppError::not_found("subject not found")
                .with_details(json!({ "index": i, "subjectId": entry.subject_id }))
        })?;
        if entry.marks < 0 || entry.marks > subject.max_marks {
            return Err(AppError::bad_params(format!(
                "marks must be between 0 and {}",
                subject.max_marks
            ))
            .with_details(json!({
                "index": i,
                "subjectId": entry.subject_id,
                "marks": entry.marks,
                "maxMarks": subject.max_marks
            })));
        }
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| AppError::db("db_tx_failed", e))?;
    tx.execute(
        "DELETE FROM marks WHERE student_id = ? AND semester = ?",
        (student_id, &student.semester),
    )
    .map_err(|e| AppError::db("db_delete_failed", e).with_details(json!({ "table": "marks" })))?;

    let ts = now();
    for entry in entries {
        tx.execute(
            "INSERT INTO marks(id, student_id, subject_id, marks, semester, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                student_id,
                entry.subject_id,
                entry.marks,
                &student.semester,
                &ts,
                &ts,
            ),
        )
        .map_err(|e| {
            AppError::db("db_insert_failed", e).with_details(json!({ "table": "marks" }))
        })?;
    }
    tx.commit().map_err(|e| AppError::db("db_tx_failed", e))?;
    tracing::info!(
        student_id,
        semester = %student.semester,
        count = entries.len(),
        "marks saved"
    );

    list_marks(
        conn,
        &MarkFilter {
            student_id: Some(student_id.to_string()),
            semester: Some(student.semester),
        },
    )
}

/// Read all three relations inside one transaction. Any failure aborts the
/// whole read so the merit list is never built from a partial snapshot.
pub fn load_merit_inputs(conn: &Connection) -> AppResult<MeritInputs> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| AppError::db("db_tx_failed", e))?;
    let students = list_students(&tx, &StudentQuery::default())?;
    let subjects = list_subjects(&tx, None)?;
    let marks = list_marks(&tx, &MarkFilter::default())?;
    tx.commit().map_err(|e| AppError::db("db_tx_failed", e))?;
    Ok(MeritInputs {
        students,
        subjects,
        marks,
    })
}

pub fn overview(conn: &Connection) -> AppResult<Overview> {
    let count = |table: &str| -> AppResult<i64> {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get(0)
        })?)
    };
    let mut stmt = conn.prepare(
        "SELECT DISTINCT semester FROM students WHERE trim(semester) <> '' ORDER BY semester",
    )?;
    let semesters = stmt
        .query_map([], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(Overview {
        student_count: count("students")?,
        subject_count: count("subjects")?,
        mark_count: count("marks")?,
        semesters,
    })
}
