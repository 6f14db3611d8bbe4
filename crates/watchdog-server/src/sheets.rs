//! Google Sheets collaborator: row source and display sink over the
//! REST API.

use async_trait::async_trait;
use common::{Error, Result};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use watchdog::{
    ChangeRecord, Collection, ColorHint, DisplaySink, MonitoredRow, RetryPolicy, RowSource,
    retry_with_backoff,
};

/// Provides a bearer token for the Sheets API. Token acquisition
/// (service-account JWT exchange, refresh) lives outside this crate.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Token provider backed by a fixed, pre-acquired token.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// One tab of the monitored spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub sheet_id: i64,
    pub title: String,
}

#[derive(Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    #[serde(rename = "sheetId", default)]
    sheet_id: i64,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Sheets REST client implementing the row source and display sink
/// contracts for one spreadsheet.
pub struct SheetsClient {
    http: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    /// Cell part of the monitored range, e.g. `A2:D`.
    cell_range: String,
    tokens: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
    metadata: RwLock<Option<Vec<SheetInfo>>>,
}

impl SheetsClient {
    pub fn new(
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        cell_range: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(Error::config)?;

        Ok(Self {
            http,
            api_base: api_base.into(),
            spreadsheet_id: spreadsheet_id.into(),
            cell_range: cell_range.into(),
            tokens,
            retry,
            metadata: RwLock::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base).map_err(Error::config)?;
        url.path_segments_mut()
            .map_err(|_| Error::config("api_base cannot be a base URL"))?
            .extend(segments);
        Ok(url)
    }

    /// Deep link to one tab of the spreadsheet.
    pub fn sheet_link(&self, sheet_id: i64) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/edit#gid={}",
            self.spreadsheet_id, sheet_id
        )
    }

    /// All tabs of the spreadsheet. The metadata call is quota-heavy,
    /// so the result is cached for the client's lifetime and the fetch
    /// retries rate-limit rejections with backoff.
    pub async fn sheet_metadata(&self) -> Result<Vec<SheetInfo>> {
        if let Some(cached) = self.metadata.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let fetched = retry_with_backoff(&self.retry, is_rate_limited, || {
            self.fetch_metadata()
        })
        .await?;

        let mut cache = self.metadata.write().await;
        *cache = Some(fetched.clone());
        Ok(fetched)
    }

    async fn fetch_metadata(&self) -> Result<Vec<SheetInfo>> {
        let url = self.endpoint(&["v4", "spreadsheets", &self.spreadsheet_id])?;
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(Error::row_source)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::row_source(format!(
                "metadata fetch failed with status {status}: {body}"
            )));
        }

        let data: MetadataResponse = response.json().await.map_err(Error::row_source)?;
        if data.sheets.is_empty() {
            return Err(Error::row_source("no sheets found in spreadsheet"));
        }
        let sheets: Vec<SheetInfo> = data
            .sheets
            .into_iter()
            .map(|entry| SheetInfo {
                sheet_id: entry.properties.sheet_id,
                title: entry.properties.title,
            })
            .collect();
        debug!(count = sheets.len(), "fetched sheet metadata");
        Ok(sheets)
    }

    async fn sheet_id_for(&self, title: &str) -> Result<i64> {
        self.sheet_metadata()
            .await?
            .into_iter()
            .find(|sheet| sheet.title == title)
            .map(|sheet| sheet.sheet_id)
            .ok_or_else(|| Error::row_source(format!("sheet {title} not found in spreadsheet")))
    }

    async fn fetch_values(&self, title: &str) -> Result<Vec<Vec<String>>> {
        let range = format!("{}!{}", title, self.cell_range);
        let url = self.endpoint(&["v4", "spreadsheets", &self.spreadsheet_id, "values", &range])?;
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(Error::row_source)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::row_source(format!(
                "values fetch failed with status {status}: {body}"
            )));
        }

        let data: ValuesResponse = response.json().await.map_err(Error::row_source)?;
        Ok(data.values)
    }
}

fn is_rate_limited(error: &Error) -> bool {
    matches!(error, Error::RowSource(msg) if msg.contains("status 429"))
}

#[async_trait]
impl RowSource for SheetsClient {
    async fn fetch_rows(&self, collection: &Collection) -> Result<Vec<MonitoredRow>> {
        let values = self.fetch_values(&collection.label).await?;
        Ok(values
            .iter()
            .map(|cells| MonitoredRow::from_cells(cells))
            .collect())
    }
}

#[async_trait]
impl DisplaySink for SheetsClient {
    async fn write_status_cells(
        &self,
        collection: &Collection,
        changes: &[ChangeRecord],
    ) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let sheet_id = self
            .sheet_id_for(&collection.label)
            .await
            .map_err(|e| Error::display(e.to_string()))?;
        let origin = parse_a1_origin(&self.cell_range)?;

        let requests: Vec<Value> = changes
            .iter()
            .map(|change| build_cell_update(change, sheet_id, origin))
            .collect();
        let body = json!({ "requests": requests });

        let url = self.endpoint(&[
            "v4",
            "spreadsheets",
            &format!("{}:batchUpdate", self.spreadsheet_id),
        ])?;
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(Error::display)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::display(format!(
                "batch update failed with status {status}: {body}"
            )));
        }
        info!(
            collection = %collection.label,
            rows = changes.len(),
            "status cells updated"
        );
        Ok(())
    }
}

/// Zero-based (column, row) origin of a cell range like `A2:D`.
fn parse_a1_origin(cell_range: &str) -> Result<(usize, usize)> {
    let start = cell_range.split(':').next().unwrap_or(cell_range);
    let letters: String = start
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let digits: String = start
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return Err(Error::config(format!("invalid cell range: {cell_range}")));
    }
    let column = letters.chars().fold(0usize, |acc, c| {
        acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1)
    }) - 1;
    let row = if digits.is_empty() {
        0
    } else {
        digits
            .parse::<usize>()
            .map_err(|_| Error::config(format!("invalid cell range: {cell_range}")))?
            .saturating_sub(1)
    };
    Ok((column, row))
}

/// One `updateCells` request writing the status and timestamp columns
/// (and their background color) for a single changed row.
fn build_cell_update(change: &ChangeRecord, sheet_id: i64, origin: (usize, usize)) -> Value {
    let (start_column, start_row) = origin;
    let status_column = start_column + 2;
    let end_column = start_column + 4;
    let row = start_row + change.row_index;

    let white = json!({ "red": 1.0, "green": 1.0, "blue": 1.0 });
    let red = json!({ "red": 0.956, "green": 0.8, "blue": 0.8 });

    let values = if change.clear_columns {
        json!([
            { "userEnteredValue": null, "userEnteredFormat": { "backgroundColor": white } },
            { "userEnteredValue": null, "userEnteredFormat": { "backgroundColor": white } },
        ])
    } else {
        let status_color = match change.color_hint {
            ColorHint::White => &white,
            ColorHint::Red => &red,
        };
        json!([
            {
                "userEnteredValue": { "stringValue": change.new_status },
                "userEnteredFormat": { "backgroundColor": status_color },
            },
            {
                "userEnteredValue": { "stringValue": change.last_update },
                "userEnteredFormat": { "backgroundColor": white },
            },
        ])
    };

    json!({
        "updateCells": {
            "range": {
                "sheetId": sheet_id,
                "startRowIndex": row,
                "endRowIndex": row + 1,
                "startColumnIndex": status_column,
                "endColumnIndex": end_column,
            },
            "rows": [{ "values": values }],
            "fields": "userEnteredValue,userEnteredFormat.backgroundColor",
        }
    })
}
