//! Read-only CSV operations over a single directory.
//!
//! [`CsvAnalyzer`] is the facade the MCP server calls into. Every operation
//! resolves a filename inside the configured directory, loads the file fresh,
//! applies one transformation and returns a typed envelope. [`render`] turns
//! the outcome into the JSON text handed back to the client; failures become
//! `{"error": "..."}` rather than protocol faults.
//!
//! # Path Confinement
//!
//! Filenames are joined onto the CSV directory. Absolute paths, `..`
//! components and symlinks resolving outside the directory are rejected with
//! [`AnalyzerError::AccessDenied`].

pub mod envelope;
pub mod error;

pub use envelope::{
    render, ErrorEnvelope, FileContents, FileEntry, FileInfo, Preview, QueryResult, Rendered,
    Shape, Statistics,
};
pub use error::{AnalyzerError, AnalyzerResult};

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::data::describe::{describe_column, describe_frame};
use crate::data::{DType, DataFrame, Query};

/// Number of rows included in a preview.
pub const PREVIEW_ROWS: i64 = 10;

/// Glob pattern for CSV files in the directory.
const CSV_PATTERN: &str = "*.csv";

/// Bytes per megabyte in memory reports.
#[allow(clippy::cast_precision_loss)]
const BYTES_PER_MB: f64 = (1024 * 1024) as f64;

/// Read-only access to the CSV files in one directory.
#[derive(Debug, Clone)]
pub struct CsvAnalyzer {
    directory: PathBuf,
}

impl CsvAnalyzer {
    /// Creates an analyzer rooted at `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The configured CSV directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Creates the CSV directory (and parents) if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_directory(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.directory)
    }

    /// Resolves `filename` to an existing path inside the CSV directory.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyzerError::AccessDenied`] if the name escapes the
    /// directory, or [`AnalyzerError::FileNotFound`] if no regular file
    /// exists there.
    pub fn resolve(&self, filename: &str) -> AnalyzerResult<PathBuf> {
        let relative = Path::new(filename);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            warn!(filename, "Rejected path outside the CSV directory");
            return Err(AnalyzerError::AccessDenied);
        }

        let path = self.directory.join(relative);
        if filename.is_empty() || !path.is_file() {
            return Err(AnalyzerError::FileNotFound {
                filename: filename.to_string(),
            });
        }

        // Symlinks may still point elsewhere
        let canonical = path.canonicalize()?;
        let root = self.directory.canonicalize()?;
        if !canonical.starts_with(&root) {
            warn!(filename, "Rejected symlink outside the CSV directory");
            return Err(AnalyzerError::AccessDenied);
        }

        Ok(path)
    }

    fn load(&self, filename: &str) -> AnalyzerResult<DataFrame> {
        let path = self.resolve(filename)?;
        let frame = DataFrame::from_path(&path)?;
        debug!(
            filename,
            rows = frame.len(),
            columns = frame.width(),
            "Loaded CSV file"
        );
        Ok(frame)
    }

    /// Lists the `*.csv` files directly inside the directory.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyzerError::DirectoryMissing`] if the directory does not
    /// exist, or an I/O error if it cannot be enumerated.
    #[allow(clippy::cast_precision_loss)]
    pub fn list_files(&self) -> AnalyzerResult<Vec<FileEntry>> {
        if !self.directory.exists() {
            return Err(AnalyzerError::DirectoryMissing {
                path: self.directory.clone(),
            });
        }

        let escaped = glob::Pattern::escape(&self.directory.to_string_lossy());
        let pattern = Path::new(&escaped).join(CSV_PATTERN);
        let paths = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut entries = Vec::new();
        for path in paths {
            let path = path.map_err(glob::GlobError::into_error)?;
            let metadata = std::fs::metadata(&path)?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(FileEntry {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: path.display().to_string(),
                size_kb: metadata.len() as f64 / 1024.0,
            });
        }

        debug!(
            directory = %self.directory.display(),
            count = entries.len(),
            "Listed CSV files"
        );
        Ok(entries)
    }

    /// Returns the first rows of a file together with its schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, outside the directory, or
    /// cannot be parsed.
    pub fn preview(&self, filename: &str) -> AnalyzerResult<Preview> {
        let frame = self.load(filename)?;
        Ok(Preview {
            filename: filename.to_string(),
            rows: frame.len(),
            columns: frame.column_names(),
            preview: frame.head(PREVIEW_ROWS).records(),
            dtypes: frame.dtypes(),
        })
    }

    /// Returns the rows of a file.
    ///
    /// `rows` of `None` or `Some(0)` returns everything; otherwise the frame is
    /// truncated with [`DataFrame::head`] semantics.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, outside the directory, or
    /// cannot be parsed.
    pub fn read(&self, filename: &str, rows: Option<i64>) -> AnalyzerResult<FileContents> {
        let mut frame = self.load(filename)?;
        if let Some(n) = rows.filter(|n| *n != 0) {
            frame = frame.head(n);
        }
        Ok(FileContents {
            filename: filename.to_string(),
            total_rows: frame.len(),
            columns: frame.column_names(),
            data: frame.records(),
        })
    }

    /// Returns structural information about a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, outside the directory, or
    /// cannot be parsed.
    #[allow(clippy::cast_precision_loss)]
    pub fn info(&self, filename: &str) -> AnalyzerResult<FileInfo> {
        let frame = self.load(filename)?;
        let names_where = |pred: fn(DType) -> bool| -> Vec<String> {
            frame
                .columns()
                .iter()
                .filter(|c| pred(c.dtype))
                .map(|c| c.name.clone())
                .collect()
        };

        Ok(FileInfo {
            filename: filename.to_string(),
            shape: Shape {
                rows: frame.len(),
                columns: frame.width(),
            },
            columns: frame.column_names(),
            dtypes: frame.dtypes(),
            missing_values: frame.null_counts(),
            memory_usage_mb: frame.memory_usage_bytes() as f64 / BYTES_PER_MB,
            numeric_columns: names_where(DType::is_numeric),
            categorical_columns: names_where(|d| d == DType::Object),
        })
    }

    /// Returns the rows matching a filter expression.
    ///
    /// Failures after the existence check are reported as
    /// [`AnalyzerError::Query`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or outside the directory, or
    /// if loading or filtering fails.
    pub fn query(&self, filename: &str, query: &str) -> AnalyzerResult<QueryResult> {
        let path = self.resolve(filename)?;
        let frame = DataFrame::from_path(&path).map_err(AnalyzerError::query)?;
        let filtered = Query::parse(query)
            .and_then(|q| q.filter(&frame))
            .map_err(AnalyzerError::query)?;

        debug!(
            filename,
            query,
            matched = filtered.len(),
            total = frame.len(),
            "Filtered CSV file"
        );
        Ok(QueryResult {
            filename: filename.to_string(),
            query: query.to_string(),
            matched_rows: filtered.len(),
            data: filtered.records(),
        })
    }

    /// Returns descriptive statistics for one column or the whole file.
    ///
    /// An empty `column` is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyzerError::ColumnNotFound`] for an unknown column, or
    /// the usual file errors.
    pub fn statistics(&self, filename: &str, column: Option<&str>) -> AnalyzerResult<Statistics> {
        let frame = self.load(filename)?;

        match column.filter(|c| !c.is_empty()) {
            Some(name) => {
                let col = frame
                    .column(name)
                    .ok_or_else(|| AnalyzerError::ColumnNotFound {
                        column: name.to_string(),
                    })?;
                Ok(Statistics::Column {
                    filename: filename.to_string(),
                    column: name.to_string(),
                    statistics: describe_column(col),
                })
            }
            None => Ok(Statistics::Frame {
                filename: filename.to_string(),
                statistics: describe_frame(&frame),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_parent_components() {
        let dir = tempdir().unwrap();
        let analyzer = CsvAnalyzer::new(dir.path());
        assert!(matches!(
            analyzer.resolve("../etc/passwd"),
            Err(AnalyzerError::AccessDenied)
        ));
        assert!(matches!(
            analyzer.resolve("/etc/passwd"),
            Err(AnalyzerError::AccessDenied)
        ));
    }

    #[test]
    fn empty_filename_is_not_found() {
        let dir = tempdir().unwrap();
        let analyzer = CsvAnalyzer::new(dir.path());
        assert!(matches!(
            analyzer.resolve(""),
            Err(AnalyzerError::FileNotFound { .. })
        ));
    }

    #[test]
    fn directories_are_not_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let analyzer = CsvAnalyzer::new(dir.path());
        assert!(matches!(
            analyzer.resolve("sub"),
            Err(AnalyzerError::FileNotFound { .. })
        ));
        assert!(matches!(
            analyzer.resolve("."),
            Err(AnalyzerError::FileNotFound { .. })
        ));
    }

    #[test]
    fn resolves_nested_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/a.csv"), "x\n1\n").unwrap();
        let analyzer = CsvAnalyzer::new(dir.path());
        assert!(analyzer.resolve("sub/a.csv").is_ok());
        assert!(analyzer.resolve("./sub/a.csv").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("secret.csv"), "x\n1\n").unwrap();
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.csv"),
            dir.path().join("link.csv"),
        )
        .unwrap();

        let analyzer = CsvAnalyzer::new(dir.path());
        assert!(matches!(
            analyzer.resolve("link.csv"),
            Err(AnalyzerError::AccessDenied)
        ));
    }

    #[test]
    fn ensure_directory_creates_parents() {
        let dir = tempdir().unwrap();
        let analyzer = CsvAnalyzer::new(dir.path().join("a/b/c"));
        analyzer.ensure_directory().unwrap();
        assert!(analyzer.directory().is_dir());
    }
}
