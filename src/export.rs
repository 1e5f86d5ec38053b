//! Export documents built from an already ranked and filtered merit list.
//!
//! Nothing here recomputes totals, percentages or ranks; both documents are
//! plain formatting passes over the entries in the order given.

use crate::merit::{format_percentage, MeritEntry};
use serde::Serialize;

pub const TABULAR_HEADERS: [&str; 8] = [
    "Rank",
    "Name",
    "Roll Number",
    "Semester",
    "Batch",
    "Total Marks",
    "Max Marks",
    "Percentage",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabularDocument {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularDocument {
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        push_csv_record(&mut csv, self.headers.iter().map(String::as_str));
        for row in &self.rows {
            push_csv_record(&mut csv, row.iter().map(String::as_str));
        }
        csv
    }
}

fn push_csv_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let line = fields.map(csv_quote).collect::<Vec<_>>().join(",");
    out.push_str(&line);
    out.push('\n');
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn tabular_document(entries: &[MeritEntry]) -> TabularDocument {
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.rank.to_string(),
                e.student.name.clone(),
                e.student.roll_number.clone(),
                e.student.semester.clone(),
                e.student.batch.clone(),
                e.total_marks.to_string(),
                e.max_marks.to_string(),
                format_percentage(e.percentage),
            ]
        })
        .collect();
    TabularDocument {
        headers: TABULAR_HEADERS.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

/// Layout for the print-style export. Vertical positions are abstract units
/// tracked by a running counter; a page ends once the next line would cross
/// `page_height`.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOptions {
    pub title: String,
    pub title_suffix: Option<String>,
    /// Only the first `max_entries` entries are printed.
    pub max_entries: usize,
    pub name_width: usize,
    pub page_height: u32,
    pub line_height: u32,
    pub start_y: u32,
}

pub const DEFAULT_PRINT_MAX_ENTRIES: usize = 30;

/// Title, subtitle, blank line, column header, rule and one entry.
pub const MIN_LINES_PER_PAGE: u64 = 6;
pub const MAX_PAGE_HEIGHT: u32 = 100_000;
pub const MAX_LINE_HEIGHT: u32 = 1_000;
pub const MAX_NAME_WIDTH: usize = 200;

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            title: "Merit List".to_string(),
            title_suffix: None,
            max_entries: DEFAULT_PRINT_MAX_ENTRIES,
            name_width: 24,
            page_height: 280,
            line_height: 10,
            start_y: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintPage {
    pub number: usize,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintDocument {
    pub title: String,
    pub subtitle: Option<String>,
    pub pages: Vec<PrintPage>,
    /// Entry lines printed, across all pages.
    pub row_count: usize,
    /// Entries left out by `max_entries`.
    pub omitted: usize,
}

impl PrintDocument {
    /// Plain-text rendering; pages are separated by a form feed.
    pub fn to_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| {
                let mut s = p.lines.join("\n");
                s.push('\n');
                s
            })
            .collect::<Vec<_>>()
            .join("\u{000C}")
    }
}

const RANK_WIDTH: usize = 6;
const ROLL_WIDTH: usize = 14;
const TOTAL_WIDTH: usize = 12;
const PERCENT_WIDTH: usize = 10;

fn truncate_chars(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

fn column_header(name_width: usize) -> String {
    format!(
        "{:<rw$}{:<nw$}{:<ow$}{:>tw$}{:>pw$}",
        "Rank",
        "Name",
        "Roll Number",
        "Total",
        "Percentage",
        rw = RANK_WIDTH,
        nw = name_width + 2,
        ow = ROLL_WIDTH,
        tw = TOTAL_WIDTH,
        pw = PERCENT_WIDTH,
    )
}

fn entry_line(e: &MeritEntry, name_width: usize) -> String {
    format!(
        "{:<rw$}{:<nw$}{:<ow$}{:>tw$}{:>pw$}",
        e.rank,
        truncate_chars(&e.student.name, name_width),
        truncate_chars(&e.student.roll_number, ROLL_WIDTH - 2),
        format!("{}/{}", e.total_marks, e.max_marks),
        format_percentage(e.percentage),
        rw = RANK_WIDTH,
        nw = name_width + 2,
        ow = ROLL_WIDTH,
        tw = TOTAL_WIDTH,
        pw = PERCENT_WIDTH,
    )
}

impl PrintOptions {
    /// Why this layout cannot be printed, if it cannot. A usable layout fits
    /// the whole first-page block plus one entry below `start_y`.
    pub fn layout_problem(&self) -> Option<&'static str> {
        if self.name_width == 0 || self.name_width > MAX_NAME_WIDTH {
            return Some("nameWidth must be between 1 and 200");
        }
        if self.line_height == 0 || self.line_height > MAX_LINE_HEIGHT {
            return Some("lineHeight must be between 1 and 1000");
        }
        if self.page_height > MAX_PAGE_HEIGHT {
            return Some("pageHeight must not exceed 100000");
        }
        let needed = u64::from(self.start_y) + MIN_LINES_PER_PAGE * u64::from(self.line_height);
        if needed > u64::from(self.page_height) {
            return Some("pageHeight must leave room for the title block, header and one entry");
        }
        None
    }
}

// Positions are tracked in u64 so no u32 layout can overflow them.
struct PageCursor {
    pages: Vec<PrintPage>,
    y: u64,
    start_y: u64,
    line_height: u64,
    page_height: u64,
}

impl PageCursor {
    fn new(opts: &PrintOptions) -> Self {
        Self {
            pages: vec![PrintPage {
                number: 1,
                lines: Vec::new(),
            }],
            y: u64::from(opts.start_y),
            start_y: u64::from(opts.start_y),
            // A zero step would never advance the counter.
            line_height: u64::from(opts.line_height.max(1)),
            page_height: u64::from(opts.page_height),
        }
    }

    fn fits(&self, lines: u64) -> bool {
        self.y + lines * self.line_height <= self.page_height
    }

    fn new_page(&mut self) {
        let number = self.pages.len() + 1;
        self.pages.push(PrintPage {
            number,
            lines: Vec::new(),
        });
        self.y = self.start_y;
    }

    fn push(&mut self, line: String) {
        if let Some(page) = self.pages.last_mut() {
            page.lines.push(line);
        }
        self.y += self.line_height;
    }
}

pub fn printable_document(entries: &[MeritEntry], opts: &PrintOptions) -> PrintDocument {
    let subtitle = opts
        .title_suffix
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let header = column_header(opts.name_width);
    let rule = "-".repeat(header.chars().count());

    let mut cursor = PageCursor::new(opts);
    cursor.push(opts.title.clone());
    if let Some(sub) = &subtitle {
        cursor.push(sub.clone());
    }
    cursor.push(String::new());
    cursor.push(header.clone());
    cursor.push(rule.clone());

    let printed = entries.len().min(opts.max_entries);
    for e in entries.iter().take(printed) {
        if !cursor.fits(1) {
            // A continuation page opens with the header, the rule and this entry.
            cursor.new_page();
            cursor.push(header.clone());
            cursor.push(rule.clone());
        }
        cursor.push(entry_line(e, opts.name_width));
    }

    PrintDocument {
        title: opts.title.clone(),
        subtitle,
        pages: cursor.pages,
        row_count: printed,
        omitted: entries.len() - printed,
    }
}
