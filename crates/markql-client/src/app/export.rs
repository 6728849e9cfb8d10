//! CSV and JSON rendering of query results.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::domain::errors::ExportError;
use crate::domain::model::QueryResult;
use crate::infra::clipboard::ClipboardSink;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma separated values with a header row.
    Csv,
    /// Pretty-printed array of objects keyed by column name.
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    /// Label used in status messages.
    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "CSV",
            ExportFormat::Json => "JSON",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn render(&self, result: &QueryResult) -> String {
        match self {
            ExportFormat::Csv => build_csv(result),
            ExportFormat::Json => build_json(result),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportFormatParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExportFormatParseError::UnknownFormat(other.to_string())),
        }
    }
}

/// Error returned when parsing an [`ExportFormat`] fails.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ExportFormatParseError {
    #[error("unknown export format '{0}'")]
    UnknownFormat(String),
}

/// Text of a single cell: null is empty, strings are verbatim, arrays and
/// objects are compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number_to_text(number),
    }
}

/// Integral floats print without a fraction, so `1.0` becomes `1`.
fn number_to_text(number: &serde_json::Number) -> String {
    match number.as_f64() {
        Some(float) if number.is_f64() && float == 0.0 => "0".to_string(),
        Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() < 1e21 => {
            format!("{float}")
        }
        _ => number.to_string(),
    }
}

/// Quote a CSV field if it contains a quote, comma, or line break.
pub fn csv_escape(text: &str) -> String {
    if text.contains(['"', ',', '\r', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// Header row followed by one line per result row, joined with `\n`.
pub fn build_csv(result: &QueryResult) -> String {
    let header = result
        .columns
        .iter()
        .map(|column| csv_escape(&column.name))
        .collect::<Vec<_>>()
        .join(",");

    let mut lines = Vec::with_capacity(result.rows.len() + 1);
    lines.push(header);
    for row in &result.rows {
        let line = result
            .padded_row(row)
            .map(|value| csv_escape(&value_to_text(value)))
            .collect::<Vec<_>>()
            .join(",");
        lines.push(line);
    }
    lines.join("\n")
}

/// Pretty-printed JSON array with one object per row. A repeated column name
/// keeps its first position and takes the value of its last occurrence.
pub fn build_json(result: &QueryResult) -> String {
    let objects = result
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (idx, column) in result.columns.iter().enumerate() {
                let value = row.get(idx).cloned().unwrap_or(Value::Null);
                object.insert(column.name.clone(), value);
            }
            Value::Object(object)
        })
        .collect();
    format!("{:#}", Value::Array(objects))
}

/// Runtime options controlling an export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub output_path: Option<PathBuf>,
    pub copy_to_clipboard: bool,
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            output_path: None,
            copy_to_clipboard: false,
        }
    }
}

/// Result of an export operation.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub rendered: String,
    pub rows: usize,
    pub output_path: Option<PathBuf>,
    pub copied_to_clipboard: bool,
}

/// Renders results and hands them to the clipboard and the filesystem.
pub struct Exporter {
    clipboard: Box<dyn ClipboardSink>,
}

impl Exporter {
    pub fn new(clipboard: Box<dyn ClipboardSink>) -> Self {
        Self { clipboard }
    }

    /// Render `result` and write/copy it as `options` asks. Without a result
    /// nothing is rendered.
    pub fn export(
        &mut self,
        result: Option<&QueryResult>,
        options: &ExportOptions,
    ) -> Result<ExportResult, ExportError> {
        let result = result.ok_or(ExportError::NoResult)?;
        let rendered = options.format.render(result);

        if let Some(path) = &options.output_path {
            write_export(path, &rendered).map_err(|err| ExportError::Write(format!("{err:#}")))?;
        }

        if options.copy_to_clipboard {
            self.clipboard
                .copy(&rendered)
                .map_err(|err| ExportError::Clipboard(format!("{err:#}")))?;
        }

        Ok(ExportResult {
            rendered,
            rows: result.rows.len(),
            output_path: options.output_path.clone(),
            copied_to_clipboard: options.copy_to_clipboard,
        })
    }
}

fn write_export(path: &Path, rendered: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create export directory: {}", parent.display()))?;
    }
    fs::write(path, rendered)
        .with_context(|| format!("failed to write export output to {}", path.display()))
}

/// `markql-results-<timestamp>.<ext>` inside `dir`.
pub fn default_export_path(dir: &Path, format: ExportFormat, now: OffsetDateTime) -> PathBuf {
    let stamp = now
        .format(format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    dir.join(format!("markql-results-{stamp}.{}", format.extension()))
}
