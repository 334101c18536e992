use crate::models::Tenant;
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

/// Builds tenants from `[token, cabinet, ...]` rows. Rows missing either
/// value are dropped, and a cabinet name seen before keeps its first row.
pub fn tenants_from_rows(rows: &[Vec<Value>]) -> Vec<Tenant> {
    let mut seen = HashSet::new();
    let mut tenants = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let token = cell_text(row.first());
        let cabinet = cell_text(row.get(1));
        let (Some(token), Some(cabinet)) = (token, cabinet) else {
            continue;
        };
        if !seen.insert(cabinet.clone()) {
            warn!(target: "remains.sheets", row = index, cabinet = %cabinet, "duplicate_cabinet_ignored");
            continue;
        }
        tenants.push(Tenant::new(token, cabinet));
    }
    tenants
}

fn cell_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
