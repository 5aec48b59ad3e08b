//! Shared dataset helpers used by every stage.
//!
//! Stages exchange `polars` [`DataFrame`]s. These helpers give them a small,
//! uniform vocabulary for reading columns as numbers or text, checking schema
//! requirements and selecting rows by position.

use crate::error::{PipelineError, Result};
use polars::prelude::*;

// =============================================================================
// Column Semantics
// =============================================================================

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Integer or floating point numbers
    Numeric,
    /// Labels (strings, booleans)
    Categorical,
    /// Date or datetime types
    Datetime,
}

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is a datetime type.
#[inline]
pub fn is_datetime_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Datetime(_, _) | DataType::Date | DataType::Time
    )
}

/// Semantic kind of a DataType.
pub fn column_kind(dtype: &DataType) -> ColumnKind {
    if is_numeric_dtype(dtype) {
        ColumnKind::Numeric
    } else if is_datetime_dtype(dtype) {
        ColumnKind::Datetime
    } else {
        ColumnKind::Categorical
    }
}

// =============================================================================
// Cell Conversion
// =============================================================================

/// Convert a cell to `f64`, `None` for nulls and non-numeric cells.
pub fn any_value_to_f64(value: &AnyValue) -> Option<f64> {
    match value {
        AnyValue::Float32(f) => Some(f64::from(*f)),
        AnyValue::Float64(f) => Some(*f),
        AnyValue::Int8(i) => Some(f64::from(*i)),
        AnyValue::Int16(i) => Some(f64::from(*i)),
        AnyValue::Int32(i) => Some(f64::from(*i)),
        AnyValue::Int64(i) => Some(*i as f64),
        AnyValue::UInt8(u) => Some(f64::from(*u)),
        AnyValue::UInt16(u) => Some(f64::from(*u)),
        AnyValue::UInt32(u) => Some(f64::from(*u)),
        AnyValue::UInt64(u) => Some(*u as f64),
        AnyValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Render a cell as text, `None` for nulls.
pub fn any_value_to_text(value: &AnyValue) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::String(s) => Some(s.to_string()),
        AnyValue::StringOwned(s) => Some(s.to_string()),
        other => Some(format!("{}", other)),
    }
}

/// Compare two labels, treating numeric renderings of the same value as equal
/// (`"5"` matches `"5.0"`).
pub fn labels_match(left: &str, right: &str) -> bool {
    if left == right {
        return true;
    }
    match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// =============================================================================
// Column Access
// =============================================================================

/// Names of all columns, in order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

/// Whether the dataset has a column named `name`.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|col| col.as_str() == name)
}

/// Fail with a schema violation unless every name is a column.
pub fn require_columns(df: &DataFrame, names: &[String], purpose: &str) -> Result<()> {
    let missing: Vec<&str> = names
        .iter()
        .filter(|name| !has_column(df, name))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::SchemaViolation(format!(
            "{} column(s) not found: {}",
            purpose,
            missing.join(", ")
        )))
    }
}

/// Borrow a column as a series, with a schema error when absent.
pub fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|col| col.as_materialized_series())
        .map_err(|_| PipelineError::SchemaViolation(format!("column '{}' not found", name)))
}

/// Read a column as optional numbers.
///
/// Fails if the column is absent or not numeric.
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = series(df, name)?;
    if !is_numeric_dtype(series.dtype()) && series.dtype() != &DataType::Boolean {
        return Err(PipelineError::SchemaViolation(format!(
            "column '{}' is {:?}, expected a numeric column",
            name,
            series.dtype()
        )));
    }

    let mut values = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        values.push(any_value_to_f64(&series.get(i)?));
    }
    Ok(values)
}

/// Read a column as optional text labels.
pub fn text_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = series(df, name)?;
    let mut values = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        values.push(any_value_to_text(&series.get(i)?));
    }
    Ok(values)
}

/// Number of missing values in a column.
pub fn null_count(df: &DataFrame, name: &str) -> Result<usize> {
    Ok(series(df, name)?.null_count())
}

// =============================================================================
// Row Selection
// =============================================================================

/// Select rows by position, in the given order.
pub fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let indices: Vec<IdxSize> = rows
        .iter()
        .map(|&row| {
            IdxSize::try_from(row).map_err(|_| {
                PipelineError::InsufficientRows(format!("row index {} exceeds index range", row))
            })
        })
        .collect::<Result<_>>()?;
    let idx = IdxCa::from_vec("idx".into(), indices);
    Ok(df.take(&idx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_column_kind() {
        assert_eq!(column_kind(&DataType::Int64), ColumnKind::Numeric);
        assert_eq!(column_kind(&DataType::Date), ColumnKind::Datetime);
        assert_eq!(column_kind(&DataType::String), ColumnKind::Categorical);
        assert_eq!(column_kind(&DataType::Boolean), ColumnKind::Categorical);
    }

    #[test]
    fn test_labels_match() {
        assert!(labels_match("5", "5.0"));
        assert!(labels_match("Sunday", "Sunday"));
        assert!(!labels_match("Sunday", "sunday"));
        assert!(!labels_match("5", "6"));
    }

    #[test]
    fn test_numeric_values() {
        let df = df![
            "sales" => [Some(1i64), None, Some(3)],
            "weather" => ["Sunny", "Rain", "Sunny"],
        ]
        .unwrap();

        assert_eq!(
            numeric_values(&df, "sales").unwrap(),
            vec![Some(1.0), None, Some(3.0)]
        );
        assert!(matches!(
            numeric_values(&df, "weather"),
            Err(PipelineError::SchemaViolation(_))
        ));
        assert!(matches!(
            numeric_values(&df, "missing"),
            Err(PipelineError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_text_values() {
        let df = df![
            "weather" => [Some("Sunny"), None],
            "day" => [5i64, 6],
        ]
        .unwrap();
        assert_eq!(
            text_values(&df, "weather").unwrap(),
            vec![Some("Sunny".to_string()), None]
        );
        assert_eq!(
            text_values(&df, "day").unwrap(),
            vec![Some("5".to_string()), Some("6".to_string())]
        );
    }

    #[test]
    fn test_require_columns() {
        let df = df!["a" => [1i64], "b" => [2i64]].unwrap();
        assert!(require_columns(&df, &["a".to_string()], "feature").is_ok());
        let err = require_columns(&df, &["a".to_string(), "c".to_string()], "feature")
            .unwrap_err();
        assert!(err.to_string().contains("feature column(s) not found: c"));
    }

    #[test]
    fn test_take_rows_in_given_order() {
        let df = df!["a" => [10i64, 20, 30, 40]].unwrap();
        let taken = take_rows(&df, &[3, 0, 2]).unwrap();
        assert_eq!(
            numeric_values(&taken, "a").unwrap(),
            vec![Some(40.0), Some(10.0), Some(30.0)]
        );
    }
}
