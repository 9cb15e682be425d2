//! Errors surfaced by the CSV operations.
//!
//! Every variant's message is what the caller sees in the `error` field of
//! the result envelope, so the wording is part of the tool contract.

use std::path::PathBuf;

use thiserror::Error;

use crate::data::DataError;

/// Result type for analyzer operations.
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

/// Errors that can occur while serving a CSV operation.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The requested file does not exist in the CSV directory.
    #[error("File {filename} not found")]
    FileNotFound {
        /// Filename as supplied by the caller.
        filename: String,
    },

    /// The CSV directory itself is missing.
    #[error("Directory {} does not exist", path.display())]
    DirectoryMissing {
        /// Configured directory.
        path: PathBuf,
    },

    /// The requested column does not exist in the file.
    #[error("Column {column} not found")]
    ColumnNotFound {
        /// Column name as supplied by the caller.
        column: String,
    },

    /// The filename resolves outside the CSV directory.
    #[error("Access denied: path is outside the CSV directory")]
    AccessDenied,

    /// A required tool argument was not supplied.
    #[error("Missing required parameter: {name}")]
    MissingParameter {
        /// Parameter name.
        name: &'static str,
    },

    /// The client called a tool this server does not provide.
    #[error("Unknown tool: {name}")]
    UnknownTool {
        /// Tool name as supplied by the caller.
        name: String,
    },

    /// Anything that went wrong while filtering, including loading the file.
    #[error("Query error: {message}")]
    Query {
        /// Underlying failure message.
        message: String,
    },

    /// Loading or transforming the table failed.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Filesystem access failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl AnalyzerError {
    /// Wraps any displayable failure as a query error.
    pub fn query(source: impl std::fmt::Display) -> Self {
        Self::Query {
            message: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages() {
        let err = AnalyzerError::FileNotFound {
            filename: "missing.csv".to_string(),
        };
        assert_eq!(err.to_string(), "File missing.csv not found");

        let err = AnalyzerError::ColumnNotFound {
            column: "age".to_string(),
        };
        assert_eq!(err.to_string(), "Column age not found");
    }

    #[test]
    fn directory_missing_message() {
        let err = AnalyzerError::DirectoryMissing {
            path: PathBuf::from("/data/csv"),
        };
        assert_eq!(err.to_string(), "Directory /data/csv does not exist");
    }

    #[test]
    fn unknown_tool_message() {
        let err = AnalyzerError::UnknownTool {
            name: "drop_table".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown tool: drop_table");
    }

    #[test]
    fn query_prefix() {
        let err = AnalyzerError::query("name 'x' is not defined");
        assert_eq!(err.to_string(), "Query error: name 'x' is not defined");
    }
}
