//! Row normalisation.
//!
//! Whatever shape a driver produces, callers always receive `Vec<Row>`: one
//! column-keyed object per row, rows in driver order.

use crate::db::types::{KeyedRow, PositionalRow};
use crate::models::Row;
use serde_json::Value as JsonValue;

/// Pair positional values with the result's column names.
///
/// Extra values without a column name are dropped; a repeated column name keeps
/// the last value.
pub fn zip_columns(columns: &[String], values: Vec<JsonValue>) -> Row {
    columns.iter().cloned().zip(values).collect()
}

/// Normalise rows that are already column-keyed.
pub fn keyed_rows<R: KeyedRow>(rows: &[R]) -> Vec<Row> {
    rows.iter().map(KeyedRow::to_keyed).collect()
}

/// Normalise positional rows using the descriptor of the result set.
pub fn positional_rows<R: PositionalRow>(rows: &[R]) -> Vec<Row> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let columns = first.descriptor();
    rows.iter()
        .map(|row| zip_columns(&columns, row.to_positional()))
        .collect()
}
