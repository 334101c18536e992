pub mod config;
pub mod remains;

pub use remains::{DownloadResponse, ReportError, WbReportClient};

/// The two calls the acquisition loops make against the report service.
#[allow(async_fn_in_trait)]
pub trait ReportApi {
    /// Requests a new warehouse-remains report and returns its task id.
    async fn create_report(&self, token: &str) -> Result<String, ReportError>;

    /// Fetches the current state of a report task. Any HTTP response is
    /// returned as-is; only transport failures are errors.
    async fn download_report(
        &self,
        token: &str,
        task_id: &str,
    ) -> Result<DownloadResponse, ReportError>;
}
