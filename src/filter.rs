use crate::error::AppError;
use crate::merit::MeritEntry;
use crate::model::Student;
use serde::{Deserialize, Serialize};

/// How ranks read after a list has been narrowed down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMode {
    /// Keep each entry's rank from the full list.
    #[default]
    Preserve,
    /// Renumber 1..n within the filtered subset.
    Rerank,
}

impl RankMode {
    pub fn parse(raw: Option<&serde_json::Value>) -> Result<Self, AppError> {
        match raw {
            None | Some(serde_json::Value::Null) => Ok(RankMode::Preserve),
            Some(v @ serde_json::Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "" | "preserve" => Ok(RankMode::Preserve),
                "rerank" => Ok(RankMode::Rerank),
                _ => Err(Self::unknown(v)),
            },
            Some(other) => Err(Self::unknown(other)),
        }
    }

    fn unknown(value: &serde_json::Value) -> AppError {
        AppError::bad_params("rankMode must be preserve or rerank")
            .with_details(serde_json::json!({ "rankMode": value }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeritFilters {
    pub semester: Option<String>,
    pub batch: Option<String>,
    /// Stored lowercased.
    pub search: Option<String>,
    pub min_percentage: Option<f64>,
    pub max_percentage: Option<f64>,
}

impl MeritFilters {
    pub fn is_empty(&self) -> bool {
        self.semester.is_none()
            && self.batch.is_none()
            && self.search.is_none()
            && self.min_percentage.is_none()
            && self.max_percentage.is_none()
    }

    pub fn matches(&self, entry: &MeritEntry) -> bool {
        let student = &entry.student;
        if let Some(sem) = &self.semester {
            if student.semester != *sem {
                return false;
            }
        }
        if let Some(batch) = &self.batch {
            if student.batch != *batch {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            if !matches_search(student, needle) {
                return false;
            }
        }
        if let Some(min) = self.min_percentage {
            if entry.percentage < min {
                return false;
            }
        }
        if let Some(max) = self.max_percentage {
            if entry.percentage > max {
                return false;
            }
        }
        true
    }
}

/// `needle` must already be lowercased.
pub fn matches_search(student: &Student, needle: &str) -> bool {
    student.name.to_lowercase().contains(needle)
        || student.roll_number.to_lowercase().contains(needle)
}

pub fn filter_merit_list(
    entries: &[MeritEntry],
    filters: &MeritFilters,
    rank_mode: RankMode,
) -> Vec<MeritEntry> {
    let mut out: Vec<MeritEntry> = entries
        .iter()
        .filter(|e| filters.matches(e))
        .cloned()
        .collect();
    if rank_mode == RankMode::Rerank {
        for (i, e) in out.iter_mut().enumerate() {
            e.rank = i + 1;
        }
    }
    out
}

/// Label meaning "every semester" or "every batch".
pub const ALL_LABEL: &str = "ALL";

/// Build filters from a request payload.
///
/// Text predicates that are blank or exactly `"ALL"` are dropped; `"ALL"` is
/// reserved, while labels like `"all"` still filter. Percentage bounds
/// accept numbers or numeric strings; anything else leaves the bound unset
/// rather than failing the request.
pub fn parse_merit_filters(raw: Option<&serde_json::Value>) -> Result<MeritFilters, AppError> {
    let Some(raw) = raw else {
        return Ok(MeritFilters::default());
    };
    if raw.is_null() {
        return Ok(MeritFilters::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(AppError::bad_params("filters must be an object"));
    };

    let label = |key: &str| -> Option<String> {
        let t = obj.get(key)?.as_str()?.trim();
        if t.is_empty() || t == ALL_LABEL {
            None
        } else {
            Some(t.to_string())
        }
    };
    let bound = |key: &str| -> Option<f64> {
        let v = obj.get(key)?;
        let n = match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        if n.is_finite() {
            Some(n)
        } else {
            None
        }
    };

    let search = obj
        .get("search")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    Ok(MeritFilters {
        semester: label("semester"),
        batch: label("batch"),
        search,
        min_percentage: bound("minPercentage"),
        max_percentage: bound("maxPercentage"),
    })
}
