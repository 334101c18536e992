use crate::config::SheetsConfig;
use crate::models::{Cell, FlattenedGrid, Tenant};
use crate::sheets::tenants::tenants_from_rows;
use crate::sheets::{SheetSink, TenantSource};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use serde_with::skip_serializing_none;
use thiserror::Error;
use tracing::{debug, info};
use urlencoding::encode;

const MIN_NEW_SHEET_ROWS: usize = 1000;
const MIN_NEW_SHEET_COLUMNS: usize = 20;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Google Sheets v4 REST client: reads the cabinet list from the source
/// spreadsheet and publishes grids into tabs of the target spreadsheet.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    http: Client,
    config: SheetsConfig,
}

#[derive(Debug, Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: Vec<Vec<Cell>>,
}

#[derive(Debug, Serialize)]
struct BatchUpdateBody {
    requests: Vec<BatchRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
    add_sheet: AddSheetRequest,
}

#[derive(Debug, Serialize)]
struct AddSheetRequest {
    properties: NewSheetProperties,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewSheetProperties {
    title: String,
    grid_properties: Option<GridProperties>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    row_count: usize,
    column_count: usize,
}

impl SheetsClient {
    pub fn new(http: Client, config: SheetsConfig) -> Self {
        Self { http, config }
    }

    fn spreadsheet_url(&self, spreadsheet_id: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}",
            self.config.api_root.trim_end_matches('/'),
            encode(spreadsheet_id)
        )
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(spreadsheet_id),
            encode(range)
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SheetsError> {
        let response = request
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|err| SheetsError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Status { status, body });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SheetsError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|err| SheetsError::Decode(err.to_string()))
    }

    async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>, SheetsError> {
        let request = self
            .http
            .get(self.spreadsheet_url(spreadsheet_id))
            .query(&[("fields", "sheets.properties.title")]);
        let payload: SpreadsheetResponse = self.send_json(request).await?;
        Ok(payload
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect())
    }

    async fn add_sheet(&self, title: &str, grid: &FlattenedGrid) -> Result<(), SheetsError> {
        let body = BatchUpdateBody {
            requests: vec![BatchRequest {
                add_sheet: AddSheetRequest {
                    properties: NewSheetProperties {
                        title: title.to_string(),
                        grid_properties: Some(GridProperties {
                            row_count: (grid.rows.len() + 1).max(MIN_NEW_SHEET_ROWS),
                            column_count: grid.width().max(MIN_NEW_SHEET_COLUMNS),
                        }),
                    },
                },
            }],
        };
        let url = format!("{}:batchUpdate", self.spreadsheet_url(&self.config.target_sheet_id));
        self.send(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    async fn clear_sheet(&self, title: &str) -> Result<(), SheetsError> {
        let url = format!(
            "{}:clear",
            self.values_url(&self.config.target_sheet_id, &quote_title(title))
        );
        self.send(self.http.post(url).json(&serde_json::json!({})))
            .await?;
        Ok(())
    }
}

impl TenantSource for SheetsClient {
    async fn list_tenants(&self) -> Result<Vec<Tenant>, SheetsError> {
        let request = self.http.get(self.values_url(
            &self.config.source_sheet_id,
            &self.config.source_range,
        ));
        let payload: ValueRangeResponse = self.send_json(request).await?;
        let tenants = tenants_from_rows(&payload.values);
        info!(
            target: "remains.sheets",
            rows = payload.values.len(),
            tenants = tenants.len(),
            "tenants_loaded"
        );
        Ok(tenants)
    }
}

impl SheetSink for SheetsClient {
    async fn write_grid(&self, target: &str, grid: &FlattenedGrid) -> Result<(), SheetsError> {
        let titles = self.sheet_titles(&self.config.target_sheet_id).await?;
        if titles.iter().any(|title| title == target) {
            self.clear_sheet(target).await?;
            debug!(target: "remains.sheets", sheet = %target, "sheet_cleared");
        } else {
            self.add_sheet(target, grid).await?;
            info!(target: "remains.sheets", sheet = %target, "sheet_created");
        }

        let range = format!("{}!A1", quote_title(target));
        let body = ValueRangeBody {
            range: &range,
            major_dimension: "ROWS",
            values: grid.to_values(),
        };
        let request = self
            .http
            .put(self.values_url(&self.config.target_sheet_id, &range))
            .query(&[("valueInputOption", "RAW")])
            .json(&body);
        self.send(request).await?;
        info!(
            target: "remains.sheets",
            sheet = %target,
            rows = grid.rows.len(),
            columns = grid.width(),
            "sheet_written"
        );
        Ok(())
    }
}

/// A1-notation sheet reference: wrapped in single quotes, inner quotes doubled.
fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::flatten;
    use crate::models::{ReportRecord, WarehouseStock};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> SheetsClient {
        SheetsClient::new(
            Client::new(),
            SheetsConfig {
                api_root: server.uri(),
                access_token: "g-token".into(),
                source_sheet_id: "src".into(),
                target_sheet_id: "dst".into(),
                source_range: "A2:B".into(),
            },
        )
    }

    fn sample_grid() -> FlattenedGrid {
        flatten(&[ReportRecord {
            nm_id: Some(Cell::Int(1)),
            warehouses: vec![WarehouseStock {
                warehouse_name: "X".into(),
                quantity: 5,
            }],
            ..Default::default()
        }])
    }

    fn titles(names: &[&str]) -> Value {
        json!({"sheets": names.iter().map(|t| json!({"properties": {"title": t}})).collect::<Vec<_>>()})
    }

    #[test]
    fn quote_title_escapes_quotes() {
        assert_eq!(quote_title("Main"), "'Main'");
        assert_eq!(quote_title("Bob's"), "'Bob''s'");
    }

    #[tokio::test]
    async fn list_tenants_reads_source_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v4/spreadsheets/src/values/A2(:|%3A)B$"))
            .and(header("Authorization", "Bearer g-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Sheet1!A2:B3",
                "values": [["tok-1", "One"], ["", "Skipped"], ["tok-2", "Two"]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tenants = test_client(&server).list_tenants().await.expect("tenants");
        assert_eq!(
            tenants,
            vec![Tenant::new("tok-1", "One"), Tenant::new("tok-2", "Two")]
        );
    }

    #[tokio::test]
    async fn list_tenants_handles_empty_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v4/spreadsheets/src/values/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"range": "Sheet1!A2:B"})))
            .mount(&server)
            .await;

        let tenants = test_client(&server).list_tenants().await.expect("tenants");
        assert!(tenants.is_empty());
    }

    #[tokio::test]
    async fn write_grid_creates_missing_sheet_then_writes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/dst"))
            .and(query_param("fields", "sheets.properties.title"))
            .respond_with(ResponseTemplate::new(200).set_body_json(titles(&["Other"])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/dst:batchUpdate"))
            .and(body_partial_json(json!({
                "requests": [{"addSheet": {"properties": {"title": "Cab"}}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r":clear$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/v4/spreadsheets/dst/values/"))
            .and(query_param("valueInputOption", "RAW"))
            .and(body_partial_json(json!({
                "majorDimension": "ROWS",
                "values": [
                    ["brand", "subjectName", "vendorCode", "nmId", "barcode", "techSize", "volume", "X"],
                    ["", "", "", 1, "", "", "", 5]
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server)
            .write_grid("Cab", &sample_grid())
            .await
            .expect("write");
    }

    #[tokio::test]
    async fn write_grid_clears_existing_sheet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/dst"))
            .respond_with(ResponseTemplate::new(200).set_body_json(titles(&["Cab"])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"/values/.+:clear$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/dst:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/v4/spreadsheets/dst/values/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server)
            .write_grid("Cab", &flatten(&[]))
            .await
            .expect("write");
    }

    #[tokio::test]
    async fn write_grid_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/dst"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .write_grid("Cab", &sample_grid())
            .await
            .unwrap_err();
        match err {
            SheetsError::Status { status, body } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "forbidden");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }
}
