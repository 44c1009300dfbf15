//! Message metadata export
//!
//! Rows carry `id, date, from, to, subject` as raw header values. Writers
//! create missing parent directories.

use anyhow::Context;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::error::{CleanupError, Result};
use crate::gmail::header_value;
use crate::mailbox::Mailbox;
use crate::pages::MessagePages;

const EXPORT_HEADERS: &[&str] = &["Date", "From", "To", "Subject"];
const CSV_COLUMNS: &[&str] = &["id", "date", "from", "to", "subject"];

/// One exported message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub id: String,
    pub date: String,
    pub from: String,
    pub to: String,
    pub subject: String,
}

impl ExportRow {
    fn fields(&self) -> [&str; 5] {
        [&self.id, &self.date, &self.from, &self.to, &self.subject]
    }
}

/// Output format for [`write_rows`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = CleanupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(CleanupError::validation("fmt must be csv or json")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Json => "json",
        })
    }
}

/// Fetch export rows for at most `limit` messages matching `query`
pub fn fetch_export_rows<M: Mailbox + ?Sized>(
    mailbox: &M,
    query: &str,
    limit: usize,
) -> Result<Vec<ExportRow>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut rows = Vec::new();
    for batch in MessagePages::with_limit(mailbox, query, limit) {
        for id in batch? {
            let message = mailbox
                .get_message_metadata(&id, EXPORT_HEADERS)
                .map_err(CleanupError::Provider)?;
            rows.push(ExportRow {
                date: header_value(&message, "Date"),
                from: header_value(&message, "From"),
                to: header_value(&message, "To"),
                subject: header_value(&message, "Subject"),
                id,
            });
        }
    }
    Ok(rows)
}

/// Write rows to `path` in the given format
pub fn write_rows(rows: &[ExportRow], path: &Path, format: ExportFormat) -> Result<()> {
    write_file(rows, path, format).map_err(CleanupError::Storage)
}

fn write_file(rows: &[ExportRow], path: &Path, format: ExportFormat) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    match format {
        ExportFormat::Csv => write_csv(rows, &mut out)?,
        ExportFormat::Json => write_json(rows, &mut out)?,
    }
    out.flush()?;
    Ok(())
}

/// Write rows as CSV with a header line
pub fn write_csv<W: Write>(rows: &[ExportRow], out: &mut W) -> std::io::Result<()> {
    write!(out, "{}\r\n", CSV_COLUMNS.join(","))?;
    for row in rows {
        let line: Vec<String> = row.fields().iter().map(|f| csv_field(f)).collect();
        write!(out, "{}\r\n", line.join(","))?;
    }
    Ok(())
}

/// Write rows as a pretty-printed JSON array
pub fn write_json<W: Write>(rows: &[ExportRow], out: &mut W) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, rows)?;
    writeln!(out)
}

/// Quote a field when it contains a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
