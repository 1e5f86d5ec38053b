use crate::error::{AppError, AppResult};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_MARKS: i64 = 100;
pub const MAX_SUBJECT_MARKS: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub roll_number: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub semester: String,
    pub batch: String,
    pub created_at: String,
    pub updated_at: String,
}

pub const STUDENT_COLUMNS: &str =
    "id, name, roll_number, email, phone, semester, batch, created_at, updated_at";

impl Student {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            roll_number: r.get(2)?,
            email: non_empty(r.get(3)?),
            phone: non_empty(r.get(4)?),
            semester: r.get(5)?,
            batch: r.get(6)?,
            created_at: r.get(7)?,
            updated_at: r.get(8)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
    pub max_marks: i64,
    pub semester: String,
    pub created_at: String,
}

pub const SUBJECT_COLUMNS: &str = "id, name, code, max_marks, semester, created_at";

impl Subject {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            code: r.get(2)?,
            max_marks: r.get(3)?,
            semester: r.get(4)?,
            created_at: r.get(5)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub marks: i64,
    pub semester: String,
    pub created_at: String,
    pub updated_at: String,
}

pub const MARK_COLUMNS: &str =
    "id, student_id, subject_id, marks, semester, created_at, updated_at";

impl Mark {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            student_id: r.get(1)?,
            subject_id: r.get(2)?,
            marks: r.get(3)?,
            semester: r.get(4)?,
            created_at: r.get(5)?,
            updated_at: r.get(6)?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub roll_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub semester: String,
    #[serde(default)]
    pub batch: String,
}

impl NewStudent {
    /// Trim every field and reject blanks in the required ones.
    pub fn normalized(self) -> AppResult<Self> {
        let out = Self {
            name: self.name.trim().to_string(),
            roll_number: self.roll_number.trim().to_string(),
            email: non_empty(self.email),
            phone: non_empty(self.phone),
            semester: self.semester.trim().to_string(),
            batch: self.batch.trim().to_string(),
        };
        if out.name.is_empty() {
            return Err(AppError::bad_params("name must not be empty"));
        }
        if out.roll_number.is_empty() {
            return Err(AppError::bad_params("rollNumber must not be empty"));
        }
        if out.semester.is_empty() {
            return Err(AppError::bad_params("semester must not be empty"));
        }
        Ok(out)
    }
}

/// Partial update for a student. `email`/`phone` use a nested option so an
/// explicit `null` clears the value while an absent key leaves it alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    pub name: Option<String>,
    pub roll_number: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    pub semester: Option<String>,
    pub batch: Option<String>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.roll_number.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.semester.is_none()
            && self.batch.is_none()
    }

    pub fn apply(&self, current: &Student) -> AppResult<NewStudent> {
        NewStudent {
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            roll_number: self
                .roll_number
                .clone()
                .unwrap_or_else(|| current.roll_number.clone()),
            email: match &self.email {
                Some(v) => v.clone(),
                None => current.email.clone(),
            },
            phone: match &self.phone {
                Some(v) => v.clone(),
                None => current.phone.clone(),
            },
            semester: self
                .semester
                .clone()
                .unwrap_or_else(|| current.semester.clone()),
            batch: self.batch.clone().unwrap_or_else(|| current.batch.clone()),
        }
        .normalized()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub max_marks: Option<i64>,
    pub semester: String,
}

impl NewSubject {
    pub fn normalized(self) -> AppResult<Self> {
        let out = Self {
            name: self.name.trim().to_string(),
            code: self.code.trim().to_string(),
            max_marks: Some(self.max_marks.unwrap_or(DEFAULT_MAX_MARKS)),
            semester: self.semester.trim().to_string(),
        };
        if out.name.is_empty() {
            return Err(AppError::bad_params("name must not be empty"));
        }
        if out.code.is_empty() {
            return Err(AppError::bad_params("code must not be empty"));
        }
        if out.semester.is_empty() {
            return Err(AppError::bad_params("semester must not be empty"));
        }
        let max_marks = out.max_marks.unwrap_or(0);
        if max_marks <= 0 || max_marks > MAX_SUBJECT_MARKS {
            return Err(AppError::bad_params(format!(
                "maxMarks must be between 1 and {MAX_SUBJECT_MARKS}"
            )));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkInput<'a> {
    pub subject_id: &'a str,
    pub marks: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkFilter {
    pub student_id: Option<String>,
    pub semester: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.and_then(|s| {
        let t = s.trim().to_string();
        if t.is_empty() {
            None
        } else {
            Some(t)
        }
    })
}

fn double_option<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(d).map(Some)
}
