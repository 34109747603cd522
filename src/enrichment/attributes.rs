//! Joining fetched attribute records onto the grouped history.

use std::collections::HashMap;

use serde_json::Value;

use crate::catalog_client::AttributeRecord;
use crate::dataset::Table;

use super::aggregate::KeyColumns;

const COLLISION_SUFFIX: &str = "_catalog";

/// Splits records into those the service identified and those it could not.
pub fn partition_records(
    records: Vec<AttributeRecord>,
) -> (Vec<AttributeRecord>, Vec<AttributeRecord>) {
    records
        .into_iter()
        .partition(|record| record.catalog_id.is_some())
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Left-joins `valid` records onto `base` by catalog id.
///
/// Attribute columns are the union of record fields in first-appearance order. A
/// field that shares its name with a base column is written as `<name>_catalog`.
/// Rows without a matching record keep empty attribute cells.
pub fn join_attributes(base: &Table, id_column: usize, valid: &[AttributeRecord]) -> Table {
    let mut joined = base.clone();
    let mut field_columns: HashMap<&str, usize> = HashMap::new();
    for record in valid {
        for field in record.fields.keys() {
            if field_columns.contains_key(field.as_str()) {
                continue;
            }
            let column_name = if base.column_index(field).is_some() {
                format!("{field}{COLLISION_SUFFIX}")
            } else {
                field.clone()
            };
            field_columns.insert(field.as_str(), joined.ensure_column(&column_name));
        }
    }

    let mut by_id: HashMap<&str, &AttributeRecord> = HashMap::new();
    for record in valid {
        if let Some(catalog_id) = record.catalog_id.as_deref() {
            by_id.entry(catalog_id).or_insert(record);
        }
        by_id.entry(record.requested_id.as_str()).or_insert(record);
    }

    for row in 0..joined.len() {
        let catalog_id = base.cell(row, id_column);
        if catalog_id.is_empty() {
            continue;
        }
        let Some(record) = by_id.get(catalog_id).copied() else {
            continue;
        };
        for (field, value) in &record.fields {
            if let Some(column) = field_columns.get(field.as_str()) {
                joined.set_cell(row, *column, render_cell(value));
            }
        }
    }
    joined
}

/// Lists the history rows whose identifiers came back without attributes, so
/// they can be reconciled by hand.
pub fn missing_tracks_table(
    base: &Table,
    keys: KeyColumns,
    id_column: usize,
    missing: &[AttributeRecord],
) -> Table {
    let headers: Vec<String> = [keys.artist, keys.album, keys.track, id_column]
        .iter()
        .map(|column| base.headers()[*column].clone())
        .collect();
    let mut table = Table::new(headers);
    for record in missing {
        let matching_row =
            (0..base.len()).find(|row| base.cell(*row, id_column) == record.requested_id);
        let row = match matching_row {
            Some(row) => vec![
                base.cell(row, keys.artist).to_string(),
                base.cell(row, keys.album).to_string(),
                base.cell(row, keys.track).to_string(),
                record.requested_id.clone(),
            ],
            None => vec![
                String::new(),
                String::new(),
                String::new(),
                record.requested_id.clone(),
            ],
        };
        table.push_row(row);
    }
    table
}
