mod acquire;
mod config;
mod flatten;
mod http;
mod metrics;
mod models;
mod sheets;
mod sync;
mod wb;

use config::AppConfig;
use eyre::WrapErr;
use sheets::{SheetsClient, TenantSource};
use sync::{SyncPipeline, TenantOutcome};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use wb::WbReportClient;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target: "remains.main", "sync aborted: {err:#}");
    }
}

async fn run() -> eyre::Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Ok(path) = dotenv {
        debug!(target: "remains.main", path = %path.display(), "dotenv_loaded");
    }

    let config = AppConfig::from_env().wrap_err("loading configuration")?;
    let http = http::build_client(&config.http).wrap_err("building http client")?;
    let sheets = SheetsClient::new(http.clone(), config.sheets.clone());
    let wb = WbReportClient::new(http, config.wb_root.clone());

    let tenants = sheets
        .list_tenants()
        .await
        .wrap_err("reading cabinet list")?;
    if tenants.is_empty() {
        warn!(target: "remains.main", "no cabinets configured in source sheet");
        return Ok(());
    }

    let summary = SyncPipeline::new(&wb, &sheets, config.retry)
        .run(&tenants)
        .await;

    for report in &summary.tenants {
        match &report.outcome {
            TenantOutcome::Written { rows, warehouses } => info!(
                target: "remains.main",
                cabinet = %report.cabinet,
                rows,
                warehouses,
                "cabinet_written"
            ),
            TenantOutcome::Skipped {
                stage,
                kind,
                detail,
            } => warn!(
                target: "remains.main",
                cabinet = %report.cabinet,
                stage,
                kind = ?kind,
                detail = %detail,
                "cabinet_skipped"
            ),
        }
    }
    if let Ok(json) = serde_json::to_string(&summary) {
        debug!(target: "remains.main", summary = %json, "run_summary");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
