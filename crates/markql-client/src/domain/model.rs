//! Domain models for query tokens, page snapshots, and agent results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of a span of query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Comment,
    String,
    Operator,
    Punctuation,
    Number,
    Keyword,
    Function,
    Identifier,
    Whitespace,
    Other,
}

/// A classified, contiguous span of query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// Length of the token in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Which portion of a page a capture should serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum ScopeSelection {
    /// The whole document element.
    Full,
    /// The detected main content region.
    Main,
}

impl ScopeSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeSelection::Full => "full",
            ScopeSelection::Main => "main",
        }
    }
}

impl fmt::Display for ScopeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeSelection {
    type Err = ScopeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(ScopeSelection::Full),
            "main" => Ok(ScopeSelection::Main),
            other => Err(ScopeParseError::UnknownScope(other.to_string())),
        }
    }
}

/// Error returned when parsing a [`ScopeSelection`] fails.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ScopeParseError {
    #[error("unknown capture scope '{0}'")]
    UnknownScope(String),
}

/// Which strategy produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Preferred,
    Heuristic,
    FullFallback,
    Empty,
    Full,
    /// The capture reply did not say.
    Unknown,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Preferred => "preferred",
            SnapshotSource::Heuristic => "heuristic",
            SnapshotSource::FullFallback => "full_fallback",
            SnapshotSource::Empty => "empty",
            SnapshotSource::Full => "full",
            SnapshotSource::Unknown => "unknown",
        }
    }

    /// Parse a wire tag, mapping anything unrecognised to [`SnapshotSource::Unknown`].
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "preferred" => SnapshotSource::Preferred,
            "heuristic" => SnapshotSource::Heuristic,
            "full_fallback" => SnapshotSource::FullFallback,
            "empty" => SnapshotSource::Empty,
            "full" => SnapshotSource::Full,
            _ => SnapshotSource::Unknown,
        }
    }
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured markup plus provenance metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub html: String,
    pub scope: ScopeSelection,
    pub source: SnapshotSource,
    pub size_bytes: usize,
}

impl Snapshot {
    pub fn new(html: String, scope: ScopeSelection, source: SnapshotSource) -> Self {
        let size_bytes = html.len();
        Self {
            html,
            scope,
            source,
            size_bytes,
        }
    }

    pub fn empty(scope: ScopeSelection) -> Self {
        Self::new(String::new(), scope, SnapshotSource::Empty)
    }
}

/// A result column as reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Query-level error embedded in an otherwise successful agent response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Tabular result returned by the agent for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryResult {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub error: Option<QueryErrorDetail>,
}

impl QueryResult {
    /// Iterate a row's cells right-padded with `null` up to the column count.
    ///
    /// Cells beyond the column count are kept.
    pub fn padded_row<'a>(&'a self, row: &'a [Value]) -> impl Iterator<Item = &'a Value> + 'a {
        static NULL: Value = Value::Null;
        let width = self.columns.len().max(row.len());
        (0..width).map(move |idx| row.get(idx).unwrap_or(&NULL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_parses_case_insensitively() {
        assert_eq!("FULL".parse::<ScopeSelection>(), Ok(ScopeSelection::Full));
        assert_eq!(" main ".parse::<ScopeSelection>(), Ok(ScopeSelection::Main));
        assert!("page".parse::<ScopeSelection>().is_err());
    }

    #[test]
    fn result_accepts_null_error_and_missing_fields() {
        let result: QueryResult = serde_json::from_value(json!({
            "columns": [{"name": "a"}, {"name": "a"}],
            "rows": [[1]],
            "error": null
        }))
        .unwrap();
        assert_eq!(result.columns.len(), 2);
        assert_eq!(result.elapsed_ms, 0);
        assert!(!result.truncated);
        assert!(result.error.is_none());
    }

    #[test]
    fn padded_row_fills_trailing_nulls() {
        let result = QueryResult {
            columns: vec![Column::new("x"), Column::new("y"), Column::new("z")],
            rows: vec![vec![json!(1)]],
            ..QueryResult::default()
        };
        let cells: Vec<_> = result.padded_row(&result.rows[0]).cloned().collect();
        assert_eq!(cells, vec![json!(1), Value::Null, Value::Null]);
    }
}
