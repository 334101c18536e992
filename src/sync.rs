use crate::acquire::{AcquireError, RetryPolicy, await_report, submit_report};
use crate::flatten::{flatten, parse_records};
use crate::metrics;
use crate::models::{StageReport, Tenant};
use crate::sheets::SheetSink;
use crate::wb::ReportApi;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::{future::Future, time::Instant};
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs the submit, poll, flatten and write steps for each cabinet in turn.
pub struct SyncPipeline<'a, A, S> {
    api: &'a A,
    sink: &'a S,
    policy: RetryPolicy,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub tenants: Vec<TenantReport>,
}

impl RunSummary {
    pub fn written(&self) -> usize {
        self.tenants
            .iter()
            .filter(|t| matches!(t.outcome, TenantOutcome::Written { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.tenants.len() - self.written()
    }
}

#[derive(Debug, Serialize)]
pub struct TenantReport {
    pub cabinet: String,
    pub outcome: TenantOutcome,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TenantOutcome {
    Written {
        rows: usize,
        warehouses: usize,
    },
    Skipped {
        stage: &'static str,
        kind: SyncErrorKind,
        detail: String,
    },
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct SyncError {
    stage: &'static str,
    message: String,
    kind: SyncErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    SubmitExhausted,
    Unauthorized,
    NotReady,
    Fatal,
    Transform,
    Sink,
}

impl SyncErrorKind {
    fn label(&self) -> &'static str {
        match self {
            SyncErrorKind::SubmitExhausted => "submit_exhausted",
            SyncErrorKind::Unauthorized => "unauthorized",
            SyncErrorKind::NotReady => "not_ready",
            SyncErrorKind::Fatal => "fatal",
            SyncErrorKind::Transform => "transform",
            SyncErrorKind::Sink => "sink",
        }
    }
}

impl SyncError {
    pub fn new(stage: &'static str, kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    fn acquire(stage: &'static str, err: AcquireError) -> Self {
        let kind = match &err {
            AcquireError::SubmitExhausted { .. } => SyncErrorKind::SubmitExhausted,
            AcquireError::Unauthorized { .. } => SyncErrorKind::Unauthorized,
            AcquireError::NotReady { .. } => SyncErrorKind::NotReady,
            AcquireError::Fatal { .. } => SyncErrorKind::Fatal,
        };
        Self::new(stage, kind, err.to_string())
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> SyncErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
struct StageOutcome<T> {
    value: T,
    output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

impl<'a, A: ReportApi, S: SheetSink> SyncPipeline<'a, A, S> {
    pub fn new(api: &'a A, sink: &'a S, policy: RetryPolicy) -> Self {
        Self { api, sink, policy }
    }

    /// Processes every tenant in list order. Failures are contained per
    /// tenant and show up only in the logs and the returned summary.
    pub async fn run(&self, tenants: &[Tenant]) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(target: "remains.sync", %run_id, tenants = tenants.len(), "sync_run_started");

        let mut reports = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            let span = info_span!("tenant", cabinet = %tenant.cabinet_name);
            let report = self.run_tenant(tenant).instrument(span).await;
            reports.push(report);
        }

        let summary = RunSummary {
            run_id,
            started_at,
            tenants: reports,
        };
        info!(
            target: "remains.sync",
            %run_id,
            written = summary.written(),
            skipped = summary.skipped(),
            "sync_run_finished"
        );
        summary
    }

    async fn run_tenant(&self, tenant: &Tenant) -> TenantReport {
        let mut stages = Vec::new();
        let outcome = match self.sync_tenant(tenant, &mut stages).await {
            Ok(outcome) => {
                metrics::tenant_finished("written");
                info!(target: "remains.sync", cabinet = %tenant.cabinet_name, "tenant_synced");
                outcome
            }
            Err(err) => {
                metrics::tenant_finished(err.kind().label());
                if err.kind() == SyncErrorKind::Sink {
                    error!(target: "remains.sync", cabinet = %tenant.cabinet_name, error = %err, "tenant_write_failed");
                } else {
                    warn!(target: "remains.sync", cabinet = %tenant.cabinet_name, error = %err, "tenant_skipped");
                }
                TenantOutcome::Skipped {
                    stage: err.stage(),
                    kind: err.kind(),
                    detail: err.detail().to_string(),
                }
            }
        };
        TenantReport {
            cabinet: tenant.cabinet_name.clone(),
            outcome,
            stages,
        }
    }

    async fn sync_tenant(
        &self,
        tenant: &Tenant,
        stages: &mut Vec<StageReport>,
    ) -> Result<TenantOutcome, SyncError> {
        let job = self
            .capture_stage("submit_report", stages, async {
                let job = submit_report(self.api, tenant, &self.policy)
                    .await
                    .map_err(|err| SyncError::acquire("submit_report", err))?;
                Ok::<_, SyncError>(StageOutcome::new(job, json!({ "submitted": true })))
            })
            .await?;

        let payload = self
            .capture_stage("await_report", stages, async {
                let payload = await_report(self.api, &job, &self.policy)
                    .await
                    .map_err(|err| SyncError::acquire("await_report", err))?;
                Ok::<_, SyncError>(StageOutcome::new(payload, json!({ "ready": true })))
            })
            .await?;

        let grid = self
            .capture_stage("flatten", stages, async {
                let parsed = parse_records(payload).map_err(|err| {
                    SyncError::new("flatten", SyncErrorKind::Transform, err.to_string())
                })?;
                let grid = flatten(&parsed.records);
                let output = json!({
                    "records": parsed.records.len(),
                    "skipped": parsed.skipped,
                    "columns": grid.width(),
                });
                Ok::<_, SyncError>(StageOutcome::new(grid, output))
            })
            .await?;

        let rows = grid.rows.len();
        let warehouses = grid.width() - crate::flatten::LEADING_COLUMNS.len();
        self.capture_stage("write_sheet", stages, async {
            self.sink
                .write_grid(&tenant.cabinet_name, &grid)
                .await
                .map_err(|err| SyncError::new("write_sheet", SyncErrorKind::Sink, err.to_string()))?;
            Ok::<_, SyncError>(StageOutcome::new((), json!({ "rows": rows, "warehouses": warehouses })))
        })
        .await?;

        Ok(TenantOutcome::Written { rows, warehouses })
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, SyncError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, SyncError>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let elapsed_ms = started.elapsed().as_millis();
        metrics::stage_elapsed(name, elapsed_ms);
        match result {
            Ok(outcome) => {
                stages.push(StageReport::new(name, elapsed_ms, outcome.output));
                Ok(outcome.value)
            }
            Err(err) => {
                stages.push(StageReport::new(
                    name,
                    elapsed_ms,
                    json!({ "error": err.detail() }),
                ));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cell, FlattenedGrid};
    use crate::sheets::SheetsError;
    use crate::wb::{DownloadResponse, ReportError};
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Per-token behaviour: a task id (or none) and a download script.
    #[derive(Default)]
    struct FakeApi {
        tasks: HashMap<&'static str, Option<&'static str>>,
        downloads: Mutex<HashMap<String, Vec<(u16, String)>>>,
        submit_calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn tenant(mut self, token: &'static str, task: Option<&'static str>, script: Vec<(u16, &str)>) -> Self {
            self.tasks.insert(token, task);
            self.downloads.get_mut().unwrap().insert(
                token.to_string(),
                script.into_iter().map(|(s, b)| (s, b.to_string())).collect(),
            );
            self
        }
    }

    impl ReportApi for FakeApi {
        async fn create_report(&self, token: &str) -> Result<String, ReportError> {
            self.submit_calls.lock().unwrap().push(token.to_string());
            match self.tasks.get(token).copied().flatten() {
                Some(task) => Ok(task.to_string()),
                None => Err(ReportError::Status(StatusCode::BAD_GATEWAY)),
            }
        }

        async fn download_report(
            &self,
            token: &str,
            _task_id: &str,
        ) -> Result<DownloadResponse, ReportError> {
            let mut downloads = self.downloads.lock().unwrap();
            let script = downloads.entry(token.to_string()).or_default();
            let (status, body) = if script.is_empty() {
                (404, String::new())
            } else {
                script.remove(0)
            };
            Ok(DownloadResponse {
                status: StatusCode::from_u16(status).unwrap(),
                body,
            })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        writes: Mutex<Vec<(String, FlattenedGrid)>>,
        failing: Vec<&'static str>,
    }

    impl SheetSink for MemorySink {
        async fn write_grid(&self, target: &str, grid: &FlattenedGrid) -> Result<(), SheetsError> {
            if self.failing.iter().any(|name| *name == target) {
                return Err(SheetsError::Request("sheet unavailable".into()));
            }
            self.writes
                .lock()
                .unwrap()
                .push((target.to_string(), grid.clone()));
            Ok(())
        }
    }

    impl MemorySink {
        fn targets(&self) -> Vec<String> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .map(|(t, _)| t.clone())
                .collect()
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            submit_attempts: 3,
            submit_delay: Duration::ZERO,
            poll_initial_delay: Duration::ZERO,
            poll_attempts: 4,
            poll_delay: Duration::ZERO,
        }
    }

    const REPORT: &str = r#"[{"nmId": 1, "warehouses": [{"warehouseName": "X", "quantity": 3}]}]"#;

    #[tokio::test]
    async fn exhausted_submission_skips_tenant_and_continues() {
        let api = FakeApi::default()
            .tenant("dead", None, vec![])
            .tenant("live", Some("task-live"), vec![(404, ""), (200, REPORT)]);
        let sink = MemorySink::default();
        let tenants = vec![Tenant::new("dead", "Dead"), Tenant::new("live", "Live")];

        let summary = SyncPipeline::new(&api, &sink, policy()).run(&tenants).await;

        let calls = api.submit_calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["dead", "dead", "dead", "live"]);
        assert_eq!(sink.targets(), vec!["Live"]);
        assert!(matches!(
            summary.tenants[0].outcome,
            TenantOutcome::Skipped {
                stage: "submit_report",
                kind: SyncErrorKind::SubmitExhausted,
                ..
            }
        ));
        assert_eq!(
            summary.tenants[1].outcome,
            TenantOutcome::Written {
                rows: 1,
                warehouses: 1
            }
        );
        assert_eq!(summary.written(), 1);
        assert_eq!(summary.skipped(), 1);
    }

    #[tokio::test]
    async fn unauthorized_and_timed_out_tenants_are_not_written() {
        let api = FakeApi::default()
            .tenant("revoked", Some("t1"), vec![(401, "")])
            .tenant("slow", Some("t2"), vec![])
            .tenant("ok", Some("t3"), vec![(200, REPORT)]);
        let sink = MemorySink::default();
        let tenants = vec![
            Tenant::new("revoked", "Revoked"),
            Tenant::new("slow", "Slow"),
            Tenant::new("ok", "Ok"),
        ];

        let summary = SyncPipeline::new(&api, &sink, policy()).run(&tenants).await;

        assert_eq!(sink.targets(), vec!["Ok"]);
        let kinds: Vec<_> = summary
            .tenants
            .iter()
            .map(|t| match &t.outcome {
                TenantOutcome::Skipped { kind, .. } => Some(*kind),
                TenantOutcome::Written { .. } => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(SyncErrorKind::Unauthorized),
                Some(SyncErrorKind::NotReady),
                None
            ]
        );
    }

    #[tokio::test]
    async fn empty_report_still_rewrites_the_sheet() {
        let api = FakeApi::default().tenant("tok", Some("t"), vec![(200, "[]")]);
        let sink = MemorySink::default();
        let tenants = vec![Tenant::new("tok", "Empty")];

        let summary = SyncPipeline::new(&api, &sink, policy()).run(&tenants).await;

        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "Empty");
        assert!(writes[0].1.rows.is_empty());
        assert_eq!(writes[0].1.to_values().len(), 1);
        assert_eq!(
            summary.tenants[0].outcome,
            TenantOutcome::Written {
                rows: 0,
                warehouses: 0
            }
        );
    }

    #[tokio::test]
    async fn sink_failure_does_not_stop_later_tenants() {
        let api = FakeApi::default()
            .tenant("a", Some("ta"), vec![(200, REPORT)])
            .tenant("b", Some("tb"), vec![(200, REPORT)]);
        let sink = MemorySink {
            failing: vec!["A"],
            ..Default::default()
        };
        let tenants = vec![Tenant::new("a", "A"), Tenant::new("b", "B")];

        let summary = SyncPipeline::new(&api, &sink, policy()).run(&tenants).await;

        assert_eq!(sink.targets(), vec!["B"]);
        assert!(matches!(
            summary.tenants[0].outcome,
            TenantOutcome::Skipped {
                stage: "write_sheet",
                kind: SyncErrorKind::Sink,
                ..
            }
        ));
        let stage_names: Vec<_> = summary.tenants[1]
            .stages
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(
            stage_names,
            vec!["submit_report", "await_report", "flatten", "write_sheet"]
        );
    }

    #[tokio::test]
    async fn non_list_payload_skips_tenant_without_writing() {
        let api = FakeApi::default()
            .tenant("odd", Some("t"), vec![(200, r#"{"error": "unexpected"}"#)])
            .tenant("ok", Some("t2"), vec![(200, REPORT)]);
        let sink = MemorySink::default();
        let tenants = vec![Tenant::new("odd", "Odd"), Tenant::new("ok", "Ok")];

        let summary = SyncPipeline::new(&api, &sink, policy()).run(&tenants).await;

        assert_eq!(sink.targets(), vec!["Ok"]);
        assert!(matches!(
            summary.tenants[0].outcome,
            TenantOutcome::Skipped {
                kind: SyncErrorKind::Transform,
                ..
            }
        ));
        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes[0].1.rows[0][3], Cell::Int(1));
    }
}
