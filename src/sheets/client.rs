//! Usage: SheetsClient - authenticated typed operations against the Sheets v4 API.

use crate::auth::{Credentials, TokenProvider};
use crate::shared::error::{AppError, AppResult};
use crate::sheets::types::{CellFormat, CellRange, SheetInfo, SpreadsheetInfo};
use crate::sheets::wire;
use reqwest::{Method, StatusCode, Url};
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

/// Thin client over the Sheets v4 REST API. One instance is cheap to clone
/// conceptually but is normally shared behind the crate facade.
#[derive(Debug)]
pub struct SheetsClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    base_url: Url,
}

impl SheetsClient {
    pub fn new(credentials: Credentials) -> AppResult<Self> {
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| format!("SYSTEM_ERROR: invalid api base url: {e}"))?;
        Ok(Self {
            http: super::build_http_client()?,
            tokens: TokenProvider::new(credentials),
            base_url,
        })
    }

    /// Build a client from `SHEETLINK_*` environment variables.
    pub fn from_env() -> AppResult<Self> {
        Self::new(Credentials::from_env()?)
    }

    /// Point the client at a different API origin (tests, API-compatible
    /// proxies). The token endpoint is redirected alongside it.
    pub fn with_base_url(mut self, base_url: &str) -> AppResult<Self> {
        self.base_url = Url::parse(base_url.trim())
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid api base url: {e}"))?;
        Ok(self)
    }

    /// Redirect the OAuth token endpoint (tests only; production always talks
    /// to Google).
    pub fn with_token_url(mut self, token_url: &str) -> AppResult<Self> {
        self.tokens = self.tokens.with_token_url(token_url)?;
        Ok(self)
    }

    // -- Spreadsheet operations --

    pub async fn create_spreadsheet(&self, title: &str) -> AppResult<SpreadsheetInfo> {
        let url = self.endpoint(&["v4", "spreadsheets"])?;
        let body = json!({ "properties": { "title": title } });
        let data: wire::Spreadsheet = self.request_json(Method::POST, url, Some(body)).await?;
        wire::map_spreadsheet(data)
    }

    pub async fn get_spreadsheet(&self, spreadsheet_id: &str) -> AppResult<SpreadsheetInfo> {
        let url = self.endpoint(&["v4", "spreadsheets", spreadsheet_id])?;
        let data: wire::Spreadsheet = self.request_json(Method::GET, url, None).await?;
        wire::map_spreadsheet(data)
    }

    // -- Sheet (tab) operations --

    pub async fn list_sheets(&self, spreadsheet_id: &str) -> AppResult<Vec<SheetInfo>> {
        Ok(self.get_spreadsheet(spreadsheet_id).await?.sheets)
    }

    pub async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> AppResult<SheetInfo> {
        let body = json!({
            "requests": [ { "addSheet": { "properties": { "title": title } } } ]
        });
        let response: wire::BatchUpdateResponse =
            self.batch_update(spreadsheet_id, body).await?;
        let properties = response
            .replies
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|reply| reply.add_sheet)
            .and_then(|reply| reply.properties)
            .ok_or_else(|| {
                "SYSTEM_ERROR: addSheet returned no sheet properties".to_string()
            })?;
        Ok(wire::map_sheet_properties(properties))
    }

    pub async fn delete_sheet(&self, spreadsheet_id: &str, sheet_id: i64) -> AppResult<()> {
        let body = json!({
            "requests": [ { "deleteSheet": { "sheetId": sheet_id } } ]
        });
        let _: wire::BatchUpdateResponse = self.batch_update(spreadsheet_id, body).await?;
        Ok(())
    }

    // -- Data operations --

    pub async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> AppResult<Vec<Vec<Value>>> {
        let mut url = self.endpoint(&["v4", "spreadsheets", spreadsheet_id, "values", range])?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");
        let data: wire::ValueRange = self.request_json(Method::GET, url, None).await?;
        Ok(data.values.unwrap_or_default())
    }

    pub async fn write_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> AppResult<i64> {
        let mut url = self.endpoint(&["v4", "spreadsheets", spreadsheet_id, "values", range])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let body = json!({ "values": rows });
        let data: wire::UpdateValuesResponse =
            self.request_json(Method::PUT, url, Some(body)).await?;
        Ok(data.updated_cells.unwrap_or(0))
    }

    pub async fn append_rows(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> AppResult<i64> {
        let segment = format!("{range}:append");
        let mut url =
            self.endpoint(&["v4", "spreadsheets", spreadsheet_id, "values", &segment])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let body = json!({ "values": rows });
        let data: wire::AppendValuesResponse =
            self.request_json(Method::POST, url, Some(body)).await?;
        Ok(data
            .updates
            .and_then(|u| u.updated_cells)
            .unwrap_or(0))
    }

    pub async fn clear_range(&self, spreadsheet_id: &str, range: &str) -> AppResult<()> {
        let segment = format!("{range}:clear");
        let url = self.endpoint(&["v4", "spreadsheets", spreadsheet_id, "values", &segment])?;
        let _: Value = self
            .request_json(Method::POST, url, Some(json!({})))
            .await?;
        Ok(())
    }

    // -- Formatting --

    pub async fn format_cells(
        &self,
        spreadsheet_id: &str,
        sheet_id: i64,
        range: CellRange,
        format: &CellFormat,
    ) -> AppResult<()> {
        let (cell_format, fields) = build_repeat_cell_format(format)?;
        let body = json!({
            "requests": [ {
                "repeatCell": {
                    "range": {
                        "sheetId": sheet_id,
                        "startRowIndex": range.start_row_index,
                        "endRowIndex": range.end_row_index,
                        "startColumnIndex": range.start_column_index,
                        "endColumnIndex": range.end_column_index
                    },
                    "cell": { "userEnteredFormat": cell_format },
                    "fields": fields
                }
            } ]
        });
        let _: wire::BatchUpdateResponse = self.batch_update(spreadsheet_id, body).await?;
        Ok(())
    }

    // -- Plumbing --

    async fn batch_update<T: serde::de::DeserializeOwned>(
        &self,
        spreadsheet_id: &str,
        body: Value,
    ) -> AppResult<T> {
        let segment = format!("{spreadsheet_id}:batchUpdate");
        let url = self.endpoint(&["v4", "spreadsheets", &segment])?;
        self.request_json(Method::POST, url, Some(body)).await
    }

    fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| "SEC_INVALID_INPUT: api base url cannot be a base".to_string())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> AppResult<T> {
        let access_token = self.tokens.access_token(&self.http).await?;
        let mut builder = self
            .http
            .request(method, url)
            .bearer_auth(access_token)
            .header("Accept", "application/json");
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: sheets api request failed: {e}"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: sheets api response read failed: {e}"))?;
        if !status.is_success() {
            return Err(api_error(status, &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| format!("SYSTEM_ERROR: sheets api response json invalid: {e}").into())
    }
}

fn api_error(status: StatusCode, body: &str) -> AppError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(240).collect());

    let code = if status == StatusCode::UNAUTHORIZED {
        "AUTH_RELOGIN_REQUIRED"
    } else if status.is_client_error() {
        "UPSTREAM_4XX"
    } else {
        "UPSTREAM_5XX"
    };
    AppError::new(code, format!("status={} {}", status.as_u16(), message))
}

/// Build the `userEnteredFormat` body and the matching `fields` mask from
/// exactly the format fields that were set.
fn build_repeat_cell_format(format: &CellFormat) -> AppResult<(Value, String)> {
    let mut text_format = serde_json::Map::new();
    let mut fields: Vec<&str> = Vec::new();

    if let Some(bold) = format.bold {
        text_format.insert("bold".into(), Value::Bool(bold));
        fields.push("userEnteredFormat.textFormat.bold");
    }
    if let Some(italic) = format.italic {
        text_format.insert("italic".into(), Value::Bool(italic));
        fields.push("userEnteredFormat.textFormat.italic");
    }
    if let Some(size) = format.font_size {
        text_format.insert("fontSize".into(), Value::from(size));
        fields.push("userEnteredFormat.textFormat.fontSize");
    }
    if let Some(color) = format.foreground_color {
        text_format.insert(
            "foregroundColorStyle".into(),
            json!({ "rgbColor": color }),
        );
        fields.push("userEnteredFormat.textFormat.foregroundColorStyle");
    }

    let mut cell_format = serde_json::Map::new();
    if !text_format.is_empty() {
        cell_format.insert("textFormat".into(), Value::Object(text_format));
    }
    if let Some(color) = format.background_color {
        cell_format.insert(
            "backgroundColorStyle".into(),
            json!({ "rgbColor": color }),
        );
        fields.push("userEnteredFormat.backgroundColorStyle");
    }
    if let Some(alignment) = format.horizontal_alignment {
        cell_format.insert(
            "horizontalAlignment".into(),
            Value::String(alignment.as_api_str().to_string()),
        );
        fields.push("userEnteredFormat.horizontalAlignment");
    }

    if fields.is_empty() {
        return Err("SEC_INVALID_INPUT: cell format has no fields set"
            .to_string()
            .into());
    }

    Ok((Value::Object(cell_format), fields.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::types::{Color, HorizontalAlignment};

    fn test_client() -> SheetsClient {
        SheetsClient::new(Credentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: "refresh".into(),
        })
        .expect("client")
    }

    #[test]
    fn endpoint_percent_encodes_range_segment() {
        let client = test_client();
        let url = client
            .endpoint(&["v4", "spreadsheets", "sheet-1", "values", "My Tab!A1:B2"])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-1/values/My%20Tab!A1:B2"
        );
    }

    #[test]
    fn endpoint_keeps_batch_update_suffix() {
        let client = test_client();
        let url = client
            .endpoint(&["v4", "spreadsheets", "sheet-1:batchUpdate"])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-1:batchUpdate"
        );
    }

    #[test]
    fn api_error_maps_status_classes() {
        assert_eq!(
            api_error(StatusCode::UNAUTHORIZED, "{}").code(),
            "AUTH_RELOGIN_REQUIRED"
        );
        assert_eq!(api_error(StatusCode::NOT_FOUND, "{}").code(), "UPSTREAM_4XX");
        assert_eq!(
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "{}").code(),
            "UPSTREAM_5XX"
        );
    }

    #[test]
    fn api_error_extracts_google_error_message() {
        let body = r#"{"error": {"code": 404, "message": "Requested entity was not found."}}"#;
        let err = api_error(StatusCode::NOT_FOUND, body);
        assert!(err
            .message()
            .contains("Requested entity was not found."));
        assert!(err.message().contains("status=404"));
    }

    #[test]
    fn repeat_cell_fields_track_set_format_fields() {
        let format = CellFormat {
            bold: Some(true),
            font_size: Some(12),
            background_color: Some(Color {
                red: Some(1.0),
                ..Color::default()
            }),
            horizontal_alignment: Some(HorizontalAlignment::Center),
            ..CellFormat::default()
        };
        let (cell, fields) = build_repeat_cell_format(&format).expect("format");

        assert_eq!(
            fields,
            "userEnteredFormat.textFormat.bold,userEnteredFormat.textFormat.fontSize,\
             userEnteredFormat.backgroundColorStyle,userEnteredFormat.horizontalAlignment"
        );
        assert_eq!(cell["textFormat"]["bold"], Value::Bool(true));
        assert_eq!(cell["textFormat"]["fontSize"], Value::from(12));
        assert_eq!(cell["backgroundColorStyle"]["rgbColor"]["red"], 1.0);
        assert_eq!(cell["horizontalAlignment"], "CENTER");
        assert!(cell["textFormat"].get("italic").is_none());
    }

    #[test]
    fn repeat_cell_format_rejects_empty_format() {
        assert!(build_repeat_cell_format(&CellFormat::default()).is_err());
    }
}
