pub mod client;
pub mod tenants;

pub use client::{SheetsClient, SheetsError};

use crate::models::{FlattenedGrid, Tenant};

/// Supplies the ordered list of cabinets to process.
#[allow(async_fn_in_trait)]
pub trait TenantSource {
    async fn list_tenants(&self) -> Result<Vec<Tenant>, SheetsError>;
}

/// Receives one grid per cabinet. A write replaces everything previously
/// stored under `target`, creating it when absent.
#[allow(async_fn_in_trait)]
pub trait SheetSink {
    async fn write_grid(&self, target: &str, grid: &FlattenedGrid) -> Result<(), SheetsError>;
}
