//! Descriptive statistics.
//!
//! Numeric columns are summarised as `count, mean, std, min, 25%, 50%, 75%,
//! max`; everything else as `count, unique, top, freq`. When a frame mixes
//! both kinds, every column carries the union of the two sets with a missing
//! value for statistics that do not apply.

use indexmap::IndexMap;

use super::frame::{Column, DataFrame};
use super::value::Value;

/// Statistic names for numeric columns, in output order.
pub const NUMERIC_STATS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// Statistic names for non-numeric columns, in output order.
pub const CATEGORICAL_STATS: [&str; 4] = ["count", "unique", "top", "freq"];

/// Statistic names for a frame that mixes both kinds.
pub const MIXED_STATS: [&str; 11] = [
    "count", "unique", "top", "freq", "mean", "std", "min", "25%", "50%", "75%", "max",
];

/// `{statistic: value}` for one column.
pub type Summary = IndexMap<String, Value>;

/// Summarises a single column.
#[must_use]
pub fn describe_column(column: &Column) -> Summary {
    if column.dtype.is_numeric() {
        describe_numeric(column)
    } else {
        describe_categorical(column)
    }
}

/// Summarises every column of the frame, keyed by column name.
#[must_use]
pub fn describe_frame(frame: &DataFrame) -> IndexMap<String, Summary> {
    let numeric = frame.columns().iter().filter(|c| c.dtype.is_numeric()).count();
    let mixed = numeric > 0 && numeric < frame.width();

    frame
        .columns()
        .iter()
        .map(|column| {
            let summary = describe_column(column);
            let summary = if mixed {
                MIXED_STATS
                    .iter()
                    .map(|stat| {
                        let value = summary.get(*stat).cloned().unwrap_or(Value::Null);
                        ((*stat).to_string(), value)
                    })
                    .collect()
            } else {
                summary
            };
            (column.name.clone(), summary)
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn describe_numeric(column: &Column) -> Summary {
    let mut values: Vec<f64> = column.non_null().filter_map(Value::as_f64).collect();
    values.sort_by(f64::total_cmp);

    let count = values.len();
    let n = count as f64;
    let mean = (count > 0).then(|| values.iter().sum::<f64>() / n);
    let std = mean.filter(|_| count > 1).map(|m| {
        let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    });

    let stats = [
        Some(n),
        mean,
        std,
        values.first().copied(),
        quantile(&values, 0.25),
        quantile(&values, 0.5),
        quantile(&values, 0.75),
        values.last().copied(),
    ];

    NUMERIC_STATS
        .iter()
        .zip(stats)
        .map(|(name, stat)| ((*name).to_string(), stat.map_or(Value::Null, Value::Float)))
        .collect()
}

/// Linear interpolation at position `(n - 1) * q` of sorted values.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = (sorted.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Hashable view of a categorical cell.
#[derive(Debug, PartialEq, Eq, Hash)]
enum CellKey<'a> {
    Bool(bool),
    Str(&'a str),
    Other(String),
}

impl<'a> CellKey<'a> {
    fn of(value: &'a Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::Str(s) => Self::Str(s),
            other => Self::Other(other.to_string()),
        }
    }
}

fn describe_categorical(column: &Column) -> Summary {
    // Insertion order is first appearance, so ties resolve to the earliest value
    let mut counts: IndexMap<CellKey<'_>, (&Value, usize)> = IndexMap::new();
    let mut count = 0;
    for value in column.non_null() {
        count += 1;
        counts.entry(CellKey::of(value)).or_insert((value, 0)).1 += 1;
    }

    let mut top: Option<(&Value, usize)> = None;
    for &(value, n) in counts.values() {
        if top.map_or(true, |(_, best)| n > best) {
            top = Some((value, n));
        }
    }

    let mut summary = Summary::new();
    summary.insert("count".to_string(), Value::Int(to_i64(count)));
    summary.insert("unique".to_string(), Value::Int(to_i64(counts.len())));
    summary.insert(
        "top".to_string(),
        top.map_or(Value::Null, |(v, _)| v.clone()),
    );
    summary.insert(
        "freq".to_string(),
        top.map_or(Value::Null, |(_, n)| Value::Int(to_i64(n))),
    );
    summary
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
