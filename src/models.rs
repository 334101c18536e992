use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DefaultOnNull, serde_as};
use std::fmt;

/// One seller cabinet: an opaque analytics token plus the tab name it publishes to.
#[derive(Clone, PartialEq, Eq)]
pub struct Tenant {
    pub token: String,
    pub cabinet_name: String,
}

impl Tenant {
    pub fn new(token: impl Into<String>, cabinet_name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            cabinet_name: cabinet_name.into(),
        }
    }
}

// Tokens stay out of logs and panic messages.
impl fmt::Debug for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tenant")
            .field("token", &"<redacted>")
            .field("cabinet_name", &self.cabinet_name)
            .finish()
    }
}

/// A scalar spreadsheet value. Report attributes arrive as either JSON
/// strings or numbers and are written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    pub fn empty() -> Self {
        Cell::Text(String::new())
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    #[serde(default)]
    pub brand: Option<Cell>,
    #[serde(default)]
    pub subject_name: Option<Cell>,
    #[serde(default)]
    pub vendor_code: Option<Cell>,
    #[serde(default)]
    pub nm_id: Option<Cell>,
    #[serde(default)]
    pub barcode: Option<Cell>,
    #[serde(default)]
    pub tech_size: Option<Cell>,
    #[serde(default)]
    pub volume: Option<Cell>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub warehouses: Vec<WarehouseStock>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseStock {
    pub warehouse_name: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub quantity: i64,
}

/// Rectangular output of the flattening transform: every row has
/// `header.len()` cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlattenedGrid {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl FlattenedGrid {
    pub fn width(&self) -> usize {
        self.header.len()
    }

    /// Header row first, then data rows; the layout written to a sheet.
    pub fn to_values(&self) -> Vec<Vec<Cell>> {
        let mut values = Vec::with_capacity(self.rows.len() + 1);
        values.push(self.header.iter().map(|name| Cell::from(name.as_str())).collect());
        values.extend(self.rows.iter().cloned());
        values
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}
