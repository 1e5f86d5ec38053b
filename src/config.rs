use crate::db;
use crate::error::{AppError, AppResult};
use crate::export::PrintOptions;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const LOG_ENV: &str = "MERITD_LOG";
pub const WORKSPACE_ENV: &str = "MERITD_WORKSPACE";
pub const DEFAULT_LOG_FILTER: &str = "info";

const PRINT_SETTINGS_KEY: &str = "export.print";
const MAX_PRINT_ENTRIES: usize = 10_000;

/// Process-level configuration, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupConfig {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
}

impl StartupConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let workspace = lookup(WORKSPACE_ENV)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let log_filter = lookup(LOG_ENV)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        Self {
            workspace,
            log_filter,
        }
    }
}

/// Print-export layout persisted per workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrintSettings {
    pub title: String,
    pub max_entries: usize,
    pub name_width: usize,
    pub page_height: u32,
    pub line_height: u32,
    pub start_y: u32,
}

impl Default for PrintSettings {
    fn default() -> Self {
        let d = PrintOptions::default();
        Self {
            title: d.title,
            max_entries: d.max_entries,
            name_width: d.name_width,
            page_height: d.page_height,
            line_height: d.line_height,
            start_y: d.start_y,
        }
    }
}

impl PrintSettings {
    pub fn validate(&self) -> AppResult<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::bad_params("title must not be empty"));
        }
        if self.max_entries > MAX_PRINT_ENTRIES {
            return Err(AppError::bad_params("maxEntries must not exceed 10000"));
        }
        if let Some(problem) = self.to_options(None, None).layout_problem() {
            return Err(AppError::bad_params(problem).with_details(serde_json::json!({
                "pageHeight": self.page_height,
                "startY": self.start_y,
                "lineHeight": self.line_height,
                "nameWidth": self.name_width,
            })));
        }
        Ok(())
    }

    /// Layout for one export call; `max_entries` overrides the stored cap.
    pub fn to_options(
        &self,
        title_suffix: Option<String>,
        max_entries: Option<usize>,
    ) -> PrintOptions {
        PrintOptions {
            title: self.title.clone(),
            title_suffix,
            max_entries: max_entries.unwrap_or(self.max_entries),
            name_width: self.name_width,
            page_height: self.page_height,
            line_height: self.line_height,
            start_y: self.start_y,
        }
    }

    pub fn load(conn: &Connection) -> AppResult<Self> {
        let stored = db::settings_get_json(conn, PRINT_SETTINGS_KEY)?;
        let Some(value) = stored else {
            return Ok(Self::default());
        };
        match serde_json::from_value::<PrintSettings>(value) {
            Ok(s) if s.validate().is_ok() => Ok(s),
            _ => {
                tracing::warn!("stored print settings are invalid; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, conn: &Connection) -> AppResult<()> {
        self.validate()?;
        let value = serde_json::to_value(self)
            .map_err(|e| AppError::new("serialize_failed", e.to_string()))?;
        db::settings_set_json(conn, PRINT_SETTINGS_KEY, &value)
            .map_err(|e| AppError::db("db_update_failed", e))
    }

    /// Merge a partial JSON object over these settings.
    pub fn merged(&self, patch: &serde_json::Value) -> AppResult<Self> {
        let Some(patch) = patch.as_object() else {
            return Err(AppError::bad_params("print settings must be an object"));
        };
        let mut base = serde_json::to_value(self)
            .map_err(|e| AppError::new("serialize_failed", e.to_string()))?;
        if let Some(obj) = base.as_object_mut() {
            for (k, v) in patch {
                obj.insert(k.clone(), v.clone());
            }
        }
        let next: PrintSettings = serde_json::from_value(base)
            .map_err(|e| AppError::bad_params(format!("invalid print settings: {e}")))?;
        next.validate()?;
        Ok(next)
    }
}
