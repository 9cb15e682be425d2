//! In-memory table loaded from a CSV file.
//!
//! Columns are stored column-major. Each column's type is inferred once at
//! load time from its raw text cells; see [`infer_column`].

use std::fs::File;
use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;

use super::error::{DataError, DataResult};
use super::value::{DType, Value};

/// Text markers treated as missing cells.
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const TRUE_VALUES: &[&str] = &["True", "TRUE", "true"];
const FALSE_VALUES: &[&str] = &["False", "FALSE", "false"];

/// Bytes attributed to the row index in memory estimates.
const INDEX_BYTES: usize = 132;
/// Bytes per reference in an object column.
const POINTER_BYTES: usize = 8;
/// Boxed text object header size.
const STR_OBJECT_BYTES: usize = 49;
/// Boxed boolean object size.
const BOOL_OBJECT_BYTES: usize = 28;
/// Boxed missing-value object size.
const NULL_OBJECT_BYTES: usize = 24;

/// A row as an ordered `{column: value}` mapping.
pub type Record = IndexMap<String, Value>;

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name (after de-duplication).
    pub name: String,
    /// Inferred type.
    pub dtype: DType,
    /// Cells in row order.
    pub values: Vec<Value>,
}

impl Column {
    /// Number of missing cells.
    #[must_use]
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Non-missing cells.
    pub fn non_null(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().filter(|v| !v.is_null())
    }

    /// Deep memory estimate for this column in bytes.
    #[must_use]
    pub fn memory_usage_bytes(&self) -> usize {
        match self.dtype {
            DType::Int64 | DType::Float64 => self.values.len() * 8,
            DType::Bool => self.values.len(),
            DType::Object => self
                .values
                .iter()
                .map(|v| {
                    POINTER_BYTES
                        + match v {
                            Value::Str(s) => STR_OBJECT_BYTES + s.len(),
                            Value::Bool(_) => BOOL_OBJECT_BYTES,
                            _ => NULL_OBJECT_BYTES,
                        }
                })
                .sum(),
        }
    }

    fn take(&self, mask: &[bool]) -> Self {
        Self {
            name: self.name.clone(),
            dtype: self.dtype,
            values: self
                .values
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(v, _)| v.clone())
                .collect(),
        }
    }
}

/// A column's name and inferred type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Inferred type.
    pub dtype: DType,
}

/// A table loaded from CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    columns: Vec<Column>,
    rows: usize,
}

impl DataFrame {
    /// Loads a CSV file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is not valid CSV, has
    /// no header, or contains a row wider than the header.
    pub fn from_path(path: impl AsRef<Path>) -> DataResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DataError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// Loads CSV data from any reader.
    ///
    /// # Errors
    ///
    /// Same as [`DataFrame::from_path`], minus the open failure.
    pub fn from_reader<R: Read>(reader: R) -> DataResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(DataError::NoColumns);
        }
        let names = column_names(&headers);
        let width = names.len();

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); width];
        let mut record = csv::StringRecord::new();
        while reader.read_record(&mut record)? {
            if record.len() == 1 && record[0].is_empty() {
                // Blank line
                continue;
            }
            if record.len() > width {
                return Err(DataError::Tokenizing {
                    expected: width,
                    line: record.position().map_or(0, csv::Position::line),
                    found: record.len(),
                });
            }
            for (i, cells) in raw.iter_mut().enumerate() {
                cells.push(record.get(i).unwrap_or_default().to_string());
            }
        }

        let rows = raw.first().map_or(0, Vec::len);
        let columns = names
            .into_iter()
            .zip(raw)
            .map(|(name, cells)| infer_column(name, &cells))
            .collect();

        Ok(Self { columns, rows })
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows
    }

    /// Whether the frame has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Number of columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Columns in file order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in file order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// The discovered schema.
    #[must_use]
    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns
            .iter()
            .map(|c| ColumnSchema {
                name: c.name.clone(),
                dtype: c.dtype,
            })
            .collect()
    }

    /// `{column: dtype}` in column order.
    #[must_use]
    pub fn dtypes(&self) -> IndexMap<String, DType> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.dtype))
            .collect()
    }

    /// `{column: missing_cell_count}` in column order.
    #[must_use]
    pub fn null_counts(&self) -> IndexMap<String, usize> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.null_count()))
            .collect()
    }

    /// Deep memory estimate in bytes, row index included.
    #[must_use]
    pub fn memory_usage_bytes(&self) -> usize {
        INDEX_BYTES
            + self
                .columns
                .iter()
                .map(Column::memory_usage_bytes)
                .sum::<usize>()
    }

    /// Returns the leading rows.
    ///
    /// A positive `n` keeps the first `n` rows; a negative `n` keeps all but
    /// the last `|n|` rows.
    #[must_use]
    pub fn head(&self, n: i64) -> Self {
        let keep = if n >= 0 {
            usize::try_from(n).unwrap_or(usize::MAX).min(self.rows)
        } else {
            let drop = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
            self.rows.saturating_sub(drop)
        };
        let mask: Vec<bool> = (0..self.rows).map(|i| i < keep).collect();
        self.filter(&mask)
    }

    /// Keeps the rows whose mask entry is `true`.
    #[must_use]
    pub fn filter(&self, mask: &[bool]) -> Self {
        debug_assert_eq!(mask.len(), self.rows);
        let columns: Vec<Column> = self.columns.iter().map(|c| c.take(mask)).collect();
        let rows = mask.iter().filter(|keep| **keep).count();
        Self { columns, rows }
    }

    /// Rows as `{column: value}` records.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        (0..self.rows)
            .map(|i| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[i].clone()))
                    .collect()
            })
            .collect()
    }
}

/// Normalises header names: strips a BOM, names empty headers and
/// de-duplicates repeats as `name.1`, `name.2`, ...
fn column_names(headers: &csv::StringRecord) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(headers.len());
    for (i, raw) in headers.iter().enumerate() {
        let raw = if i == 0 {
            raw.trim_start_matches('\u{feff}')
        } else {
            raw
        };
        let base = if raw.is_empty() {
            format!("Unnamed: {i}")
        } else {
            raw.to_string()
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while names.contains(&name) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        names.push(name);
    }
    names
}

fn is_na(cell: &str) -> bool {
    NA_VALUES.contains(&cell)
}

fn parse_bool(cell: &str) -> Option<bool> {
    if TRUE_VALUES.contains(&cell) {
        Some(true)
    } else if FALSE_VALUES.contains(&cell) {
        Some(false)
    } else {
        None
    }
}

fn parse_float(cell: &str) -> Option<f64> {
    // Rust accepts "inf"/"infinity"/"nan" in any case; keep only plain numerals
    // plus the spelled-out infinities.
    let lower = cell.to_ascii_lowercase();
    let body = lower.trim_start_matches(['+', '-']);
    if body.starts_with("nan") {
        return None;
    }
    if body.starts_with("inf") && body != "inf" && body != "infinity" {
        return None;
    }
    cell.parse::<f64>().ok()
}

/// Infers a column's type from its raw text cells.
fn infer_column(name: String, cells: &[String]) -> Column {
    let present: Vec<&str> = cells
        .iter()
        .map(String::as_str)
        .filter(|c| !is_na(c))
        .collect();
    let has_missing = present.len() < cells.len();

    let (dtype, values) = if cells.is_empty() {
        (DType::Object, Vec::new())
    } else if present.is_empty() {
        (DType::Float64, vec![Value::Null; cells.len()])
    } else if !has_missing && present.iter().all(|c| c.parse::<i64>().is_ok()) {
        let values = cells
            .iter()
            .map(|c| c.parse::<i64>().map_or(Value::Null, Value::Int))
            .collect();
        (DType::Int64, values)
    } else if present.iter().all(|c| parse_float(c).is_some()) {
        let values = cells
            .iter()
            .map(|c| {
                if is_na(c) {
                    Value::Null
                } else {
                    parse_float(c).map_or(Value::Null, Value::Float)
                }
            })
            .collect();
        (DType::Float64, values)
    } else if present.iter().all(|c| parse_bool(c).is_some()) {
        let values = cells
            .iter()
            .map(|c| parse_bool(c).map_or(Value::Null, Value::Bool))
            .collect();
        let dtype = if has_missing {
            DType::Object
        } else {
            DType::Bool
        };
        (dtype, values)
    } else {
        let values = cells
            .iter()
            .map(|c| {
                if is_na(c) {
                    Value::Null
                } else {
                    Value::Str(c.clone())
                }
            })
            .collect();
        (DType::Object, values)
    };

    Column {
        name,
        dtype,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> DataFrame {
        DataFrame::from_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn infers_basic_types() {
        let df = load("id,score,name,active\n1,1.5,Alice,True\n2,2,Bob,false\n");
        assert_eq!(df.len(), 2);
        let dtypes: Vec<_> = df.columns().iter().map(|c| c.dtype).collect();
        assert_eq!(
            dtypes,
            vec![DType::Int64, DType::Float64, DType::Object, DType::Bool]
        );
        assert_eq!(df.columns()[1].values[1], Value::Float(2.0));
        assert_eq!(df.columns()[3].values[0], Value::Bool(true));
    }

    #[test]
    fn integers_with_missing_become_float() {
        let df = load("a\n1\n\n3\nNA\n");
        let col = df.column("a").unwrap();
        assert_eq!(col.dtype, DType::Float64);
        // Blank line is skipped, "NA" is missing
        assert_eq!(col.values, vec![Value::Float(1.0), Value::Float(3.0), Value::Null]);
        assert_eq!(col.null_count(), 1);
    }

    #[test]
    fn all_missing_column_is_float() {
        let df = load("a,b\n1,\n2,\n");
        assert_eq!(df.column("b").unwrap().dtype, DType::Float64);
        assert_eq!(df.column("b").unwrap().null_count(), 2);
    }

    #[test]
    fn header_only_is_object() {
        let df = load("a,b\n");
        assert!(df.is_empty());
        assert_eq!(df.width(), 2);
        assert!(df.columns().iter().all(|c| c.dtype == DType::Object));
    }

    #[test]
    fn booleans_with_missing_are_object() {
        let df = load("flag,x\nTrue,1\n,2\n");
        let col = df.column("flag").unwrap();
        assert_eq!(col.dtype, DType::Object);
        assert_eq!(col.values, vec![Value::Bool(true), Value::Null]);
    }

    #[test]
    fn mixed_column_keeps_text() {
        let df = load("v\n1\nabc\n");
        let col = df.column("v").unwrap();
        assert_eq!(col.dtype, DType::Object);
        assert_eq!(col.values[0], Value::Str("1".to_string()));
    }

    #[test]
    fn nan_text_is_not_a_float_literal() {
        assert_eq!(parse_float("nan"), None);
        assert_eq!(parse_float("infinite"), None);
        assert_eq!(parse_float("-inf"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_float("1e3"), Some(1000.0));
    }

    #[test]
    fn duplicate_and_empty_headers() {
        let df = load("\u{feff}a,a,,a\n1,2,3,4\n");
        assert_eq!(df.column_names(), vec!["a", "a.1", "Unnamed: 2", "a.2"]);
    }

    #[test]
    fn short_rows_are_padded() {
        let df = load("a,b,c\n1,2\n");
        assert_eq!(df.column("c").unwrap().values, vec![Value::Null]);
    }

    #[test]
    fn long_rows_are_rejected() {
        let err = DataFrame::from_reader("a,b\n1,2\n1,2,3\n".as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            DataError::Tokenizing {
                expected: 2,
                line: 3,
                found: 3
            }
        ));
    }

    #[test]
    fn empty_input_has_no_columns() {
        let err = DataFrame::from_reader("".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "No columns to parse from file");
    }

    #[test]
    fn head_positive_and_negative() {
        let df = load("a\n1\n2\n3\n");
        assert_eq!(df.head(2).len(), 2);
        assert_eq!(df.head(10).len(), 3);
        assert_eq!(df.head(-1).len(), 2);
        assert_eq!(df.head(-5).len(), 0);
        assert_eq!(df.head(0).len(), 0);
    }

    #[test]
    fn records_preserve_column_order() {
        let df = load("z,a\n1,x\n");
        let json = serde_json::to_string(&df.records()).unwrap();
        assert_eq!(json, r#"[{"z":1,"a":"x"}]"#);
    }

    #[test]
    fn memory_estimate() {
        let df = load("n,s\n1,ab\n2,c\n");
        // 132 index + 2*8 ints + 2*(8+49) + 2 + 1 bytes of text
        assert_eq!(df.memory_usage_bytes(), 132 + 16 + 114 + 3);
    }

    #[test]
    fn schema_matches_columns() {
        let df = load("a,b\n1,x\n");
        let schema = df.schema();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema[0].name, "a");
        assert_eq!(schema[0].dtype, DType::Int64);
        assert_eq!(schema[1].dtype, DType::Object);
    }
}
