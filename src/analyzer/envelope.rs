//! Result envelopes returned by the CSV operations.
//!
//! Each successful operation produces one of these structs; failures produce
//! an [`ErrorEnvelope`]. [`render`] turns either into indented JSON text.

use indexmap::IndexMap;
use serde::Serialize;

use crate::data::describe::Summary;
use crate::data::{DType, Record};

use super::error::AnalyzerResult;

/// One CSV file in the listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    /// File name.
    pub name: String,
    /// Full path.
    pub path: String,
    /// Size in KiB, unrounded.
    pub size_kb: f64,
}

/// First rows of a file plus its schema.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub filename: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub preview: Vec<Record>,
    pub dtypes: IndexMap<String, DType>,
}

/// File contents, optionally truncated.
#[derive(Debug, Clone, Serialize)]
pub struct FileContents {
    pub filename: String,
    pub total_rows: usize,
    pub columns: Vec<String>,
    pub data: Vec<Record>,
}

/// Row and column counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Shape {
    pub rows: usize,
    pub columns: usize,
}

/// Structural information about a file.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub shape: Shape,
    pub columns: Vec<String>,
    pub dtypes: IndexMap<String, DType>,
    pub missing_values: IndexMap<String, usize>,
    pub memory_usage_mb: f64,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
}

/// Rows matching a filter expression.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub filename: String,
    pub query: String,
    pub matched_rows: usize,
    pub data: Vec<Record>,
}

/// Descriptive statistics for one column or the whole file.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Statistics {
    /// A single column was requested.
    Column {
        filename: String,
        column: String,
        statistics: Summary,
    },
    /// All columns.
    Frame {
        filename: String,
        statistics: IndexMap<String, Summary>,
    },
}

/// The failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
}

/// A serialised envelope ready to hand to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Indented JSON text.
    pub text: String,
    /// Whether `text` is an [`ErrorEnvelope`].
    pub is_error: bool,
}

/// Serialises an operation outcome as indented JSON.
///
/// Errors become `{"error": message}`; this never fails.
pub fn render<T: Serialize>(result: &AnalyzerResult<T>) -> Rendered {
    let outcome = match result {
        Ok(value) => serde_json::to_string_pretty(value).map(|text| Rendered {
            text,
            is_error: false,
        }),
        Err(e) => {
            tracing::debug!(error = %e, "Operation failed");
            error_text(&e.to_string())
        }
    };

    outcome.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialise result");
        Rendered {
            text: format!("{{\"error\": {:?}}}", e.to_string()),
            is_error: true,
        }
    })
}

fn error_text(message: &str) -> serde_json::Result<Rendered> {
    serde_json::to_string_pretty(&ErrorEnvelope {
        error: message.to_string(),
    })
    .map(|text| Rendered {
        text,
        is_error: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::error::AnalyzerError;

    #[test]
    fn error_envelope_shape() {
        let result: AnalyzerResult<Shape> = Err(AnalyzerError::FileNotFound {
            filename: "x.csv".to_string(),
        });
        let rendered = render(&result);
        assert!(rendered.is_error);
        assert_eq!(rendered.text, "{\n  \"error\": \"File x.csv not found\"\n}");
    }

    #[test]
    fn success_is_pretty_printed() {
        let rendered = render(&Ok(Shape {
            rows: 3,
            columns: 2,
        }));
        assert!(!rendered.is_error);
        assert_eq!(rendered.text, "{\n  \"rows\": 3,\n  \"columns\": 2\n}");
    }

    #[test]
    fn untagged_statistics_omit_variant_name() {
        let stats = Statistics::Frame {
            filename: "a.csv".to_string(),
            statistics: IndexMap::new(),
        };
        let json: serde_json::Value = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["filename"], "a.csv");
        assert!(json.get("Frame").is_none());
        assert!(json.get("column").is_none());
    }
}
