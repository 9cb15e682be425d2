//! Error types for loading and transforming tables.

use std::path::PathBuf;

use thiserror::Error;

use super::query::QueryError;

/// Result type for tabular operations.
pub type DataResult<T> = Result<T, DataError>;

/// Errors that can occur while loading or transforming a table.
#[derive(Debug, Error)]
pub enum DataError {
    /// The CSV file could not be opened.
    #[error("Failed to read file {}: {source}", path.display())]
    FileRead {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The CSV reader rejected the input (invalid UTF-8, I/O failure mid-read).
    #[error("{0}")]
    Csv(#[from] csv::Error),

    /// The input has no header line.
    #[error("No columns to parse from file")]
    NoColumns,

    /// A data row has more fields than the header.
    #[error("Error tokenizing data. Expected {expected} fields in line {line}, saw {found}")]
    Tokenizing {
        /// Number of header fields.
        expected: usize,
        /// 1-based line number of the offending row.
        line: u64,
        /// Number of fields found on that row.
        found: usize,
    },

    /// The filter expression could not be parsed or evaluated.
    #[error(transparent)]
    Query(#[from] QueryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizing_error_display() {
        let error = DataError::Tokenizing {
            expected: 2,
            line: 3,
            found: 3,
        };
        assert_eq!(
            error.to_string(),
            "Error tokenizing data. Expected 2 fields in line 3, saw 3"
        );
    }

    #[test]
    fn file_read_reports_io_reason() {
        let error = DataError::FileRead {
            path: PathBuf::from("/data/locked.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied"),
        };
        assert_eq!(
            error.to_string(),
            "Failed to read file /data/locked.csv: Permission denied"
        );
    }

    #[test]
    fn query_error_is_transparent() {
        let error = DataError::from(QueryError::UndefinedName {
            name: "bogus".to_string(),
        });
        assert_eq!(error.to_string(), "name 'bogus' is not defined");
    }
}
