use crate::wb::ReportApi;
use crate::wb::config::{REMAINS_PATH, REPORT_PARAMS};
use reqwest::{Client, StatusCode, header::ACCEPT};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use urlencoding::encode;

#[derive(Debug, Clone, Error)]
pub enum ReportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(StatusCode),
    #[error("response carried no task id")]
    MissingTaskId,
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Raw answer of the download endpoint, classified later by the poll loop.
#[derive(Debug, Clone)]
pub struct DownloadResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct WbReportClient {
    root: String,
    http: Client,
}

impl WbReportClient {
    pub fn new(http: Client, root: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_end_matches('/').to_string(),
            http,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    #[serde(default)]
    data: Option<TaskData>,
    #[serde(default, rename = "taskId")]
    task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    #[serde(default, rename = "taskId")]
    task_id: Option<String>,
}

impl CreateTaskResponse {
    fn into_task_id(self) -> Option<String> {
        self.data
            .and_then(|data| data.task_id)
            .filter(|id| !id.is_empty())
            .or(self.task_id)
            .filter(|id| !id.is_empty())
    }
}

impl ReportApi for WbReportClient {
    async fn create_report(&self, token: &str) -> Result<String, ReportError> {
        let url = format!("{}{}", self.root, REMAINS_PATH);
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .query(REPORT_PARAMS)
            .send()
            .await
            .map_err(|err| ReportError::Request(err.to_string()))?;

        let status = response.status();
        debug!(target: "remains.wb", status = status.as_u16(), "create_report_response");
        if !status.is_success() {
            return Err(ReportError::Status(status));
        }

        let payload: CreateTaskResponse = response
            .json()
            .await
            .map_err(|err| ReportError::Decode(err.to_string()))?;
        payload.into_task_id().ok_or(ReportError::MissingTaskId)
    }

    async fn download_report(
        &self,
        token: &str,
        task_id: &str,
    ) -> Result<DownloadResponse, ReportError> {
        let url = format!(
            "{}{}/tasks/{}/download",
            self.root,
            REMAINS_PATH,
            encode(task_id)
        );
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| ReportError::Request(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ReportError::Request(err.to_string()))?;
        debug!(
            target: "remains.wb",
            status = status.as_u16(),
            bytes = body.len(),
            "download_report_response"
        );
        Ok(DownloadResponse { status, body })
    }
}
