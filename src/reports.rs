//! Attendance report filters, table rendering and export URLs.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

use crate::api::{AttendanceApi, AttendanceRecord};
use crate::ValidationError;

pub const HEADERS: [&str; 8] = [
    "Date",
    "Time",
    "Lecture",
    "Student",
    "Enrollment",
    "Class",
    "Status",
    "Faculty",
];

const NO_RECORDS: &str = "No records found";

fn date_regex() -> &'static Regex {
    static DATE: OnceLock<Regex> = OnceLock::new();
    DATE.get_or_init(|| Regex::new(r"^(\d{4})-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$").unwrap())
}

/// Report query. Blank fields are left out of the request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub class_name: Option<String>,
}

impl ReportFilter {
    pub fn new(start_date: Option<&str>, end_date: Option<&str>, class_name: Option<&str>) -> Self {
        let keep = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        Self {
            start_date: keep(start_date),
            end_date: keep(end_date),
            class_name: keep(class_name),
        }
    }

    /// Dates are `YYYY-MM-DD` and the range is not inverted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for date in [&self.start_date, &self.end_date].into_iter().flatten() {
            if !date_regex().is_match(date) {
                return Err(ValidationError::InvalidDate(date.clone()));
            }
        }
        if let (Some(start), Some(end)) = (&self.start_date, &self.end_date) {
            // ISO dates order lexicographically.
            if start > end {
                return Err(ValidationError::DateOrder);
            }
        }
        Ok(())
    }

    fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("start_date", &self.start_date),
            ("end_date", &self.end_date),
            ("class_name", &self.class_name),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        })
    }

    /// Append the non-empty fields as query parameters.
    pub fn append_query(&self, url: &mut Url) {
        let mut pairs = self.pairs().peekable();
        if pairs.peek().is_none() {
            return;
        }
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn as_query(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "excel",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            other => Err(anyhow!("unknown export format '{}'; expected csv or excel", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

/// One table row; `present` drives the status colour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportRow {
    pub cells: [String; 8],
    pub present: bool,
}

impl From<&AttendanceRecord> for ReportRow {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            cells: [
                record.date.clone(),
                record.time.clone(),
                record.lecture_number.clone(),
                record.student_name.clone(),
                record.enrollment_number.clone(),
                record.class_name.clone(),
                record.status.clone(),
                record.faculty_name.clone(),
            ],
            present: record.is_present(),
        }
    }
}

/// Validate the filter, then fetch matching records.
pub fn load_report(api: &dyn AttendanceApi, filter: &ReportFilter) -> Result<Vec<AttendanceRecord>> {
    filter.validate()?;
    let report = api.get_attendance(filter)?;
    if !report.success {
        return Err(anyhow!(
            "Error loading reports: {}",
            report.error.as_deref().unwrap_or("Unknown error")
        ));
    }
    Ok(report.data)
}

/// Plain-text table with aligned columns, or "No records found".
pub fn render_table(records: &[AttendanceRecord]) -> String {
    if records.is_empty() {
        return NO_RECORDS.to_string();
    }
    let rows: Vec<ReportRow> = records.iter().map(ReportRow::from).collect();
    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.cells.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, HEADERS.iter().copied(), &widths);
    push_line(
        &mut out,
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().iter().map(String::as_str),
        &widths,
    );
    for row in &rows {
        push_line(&mut out, row.cells.iter().map(String::as_str), &widths);
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize; 8]) {
    let line: Vec<String> = cells
        .zip(widths.iter())
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}
