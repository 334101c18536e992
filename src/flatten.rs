use crate::models::{Cell, FlattenedGrid, ReportRecord};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::warn;

/// Attribute columns written ahead of the per-warehouse quantities.
pub const LEADING_COLUMNS: [&str; 7] = [
    "brand",
    "subjectName",
    "vendorCode",
    "nmId",
    "barcode",
    "techSize",
    "volume",
];

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("report payload is {0}, expected a list of records")]
    NotAList(&'static str),
}

#[derive(Debug, Default)]
pub struct ParsedRecords {
    pub records: Vec<ReportRecord>,
    pub skipped: usize,
}

/// Decodes the download payload record by record. A malformed record is
/// logged and dropped; only a payload that is not a list fails outright.
pub fn parse_records(payload: Value) -> Result<ParsedRecords, TransformError> {
    let items = match payload {
        Value::Array(items) => items,
        other => return Err(TransformError::NotAList(json_kind(&other))),
    };

    let mut parsed = ParsedRecords {
        records: Vec::with_capacity(items.len()),
        skipped: 0,
    };
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<ReportRecord>(item) {
            Ok(record) => parsed.records.push(record),
            Err(err) => {
                parsed.skipped += 1;
                warn!(target: "remains.flatten", index, error = %err, "malformed_record_skipped");
            }
        }
    }
    Ok(parsed)
}

pub fn flatten(records: &[ReportRecord]) -> FlattenedGrid {
    let warehouses: Vec<&str> = records
        .iter()
        .flat_map(|record| record.warehouses.iter())
        .map(|stock| stock.warehouse_name.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut header: Vec<String> = LEADING_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(warehouses.iter().map(|name| name.to_string()));

    let rows = records
        .iter()
        .map(|record| {
            // Later entries for the same warehouse win.
            let quantities: HashMap<&str, i64> = record
                .warehouses
                .iter()
                .map(|stock| (stock.warehouse_name.as_str(), stock.quantity))
                .collect();

            let mut row = leading_cells(record);
            row.extend(
                warehouses
                    .iter()
                    .map(|name| Cell::Int(quantities.get(name).copied().unwrap_or(0))),
            );
            row
        })
        .collect();

    FlattenedGrid { header, rows }
}

fn leading_cells(record: &ReportRecord) -> Vec<Cell> {
    [
        &record.brand,
        &record.subject_name,
        &record.vendor_code,
        &record.nm_id,
        &record.barcode,
        &record.tech_size,
        &record.volume,
    ]
    .into_iter()
    .map(|value| value.clone().unwrap_or_else(Cell::empty))
    .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
