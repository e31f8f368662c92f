//! Thin Google Sheets client: OAuth2-authenticated typed operations plus a
//! one-shot interactive browser login that mints a refresh token.
//!
//! The free functions below share a process-wide client built lazily from
//! `SHEETLINK_*` environment variables; construct a [`SheetsClient`] directly
//! to manage credentials yourself.

pub(crate) mod auth;
pub mod login;
pub mod sheets;
pub(crate) mod shared;

pub use auth::Credentials;
pub use login::LoginResult;
pub use shared::error::{AppError, AppResult};
pub use sheets::{
    CellFormat, CellRange, Color, HorizontalAlignment, SheetInfo, SheetsClient, SpreadsheetInfo,
};

use serde_json::Value;
use std::sync::OnceLock;

static GLOBAL_CLIENT: OnceLock<SheetsClient> = OnceLock::new();

fn global_client() -> AppResult<&'static SheetsClient> {
    if let Some(client) = GLOBAL_CLIENT.get() {
        return Ok(client);
    }
    let client = SheetsClient::from_env()?;
    // First build wins; a concurrent loser is just dropped.
    Ok(GLOBAL_CLIENT.get_or_init(|| client))
}

/// Run the interactive browser login flow. See [`login::login`].
pub async fn login() -> AppResult<LoginResult> {
    login::login().await
}

// -- Spreadsheet operations --

pub async fn create_spreadsheet(title: &str) -> AppResult<SpreadsheetInfo> {
    global_client()?.create_spreadsheet(title).await
}

pub async fn get_spreadsheet(spreadsheet_id: &str) -> AppResult<SpreadsheetInfo> {
    global_client()?.get_spreadsheet(spreadsheet_id).await
}

// -- Sheet (tab) operations --

pub async fn list_sheets(spreadsheet_id: &str) -> AppResult<Vec<SheetInfo>> {
    global_client()?.list_sheets(spreadsheet_id).await
}

pub async fn add_sheet(spreadsheet_id: &str, title: &str) -> AppResult<SheetInfo> {
    global_client()?.add_sheet(spreadsheet_id, title).await
}

pub async fn delete_sheet(spreadsheet_id: &str, sheet_id: i64) -> AppResult<()> {
    global_client()?.delete_sheet(spreadsheet_id, sheet_id).await
}

// -- Data operations --

pub async fn read_range(spreadsheet_id: &str, range: &str) -> AppResult<Vec<Vec<Value>>> {
    global_client()?.read_range(spreadsheet_id, range).await
}

pub async fn write_range(
    spreadsheet_id: &str,
    range: &str,
    rows: &[Vec<String>],
) -> AppResult<i64> {
    global_client()?.write_range(spreadsheet_id, range, rows).await
}

pub async fn append_rows(
    spreadsheet_id: &str,
    range: &str,
    rows: &[Vec<String>],
) -> AppResult<i64> {
    global_client()?.append_rows(spreadsheet_id, range, rows).await
}

pub async fn clear_range(spreadsheet_id: &str, range: &str) -> AppResult<()> {
    global_client()?.clear_range(spreadsheet_id, range).await
}

// -- Formatting --

pub async fn format_cells(
    spreadsheet_id: &str,
    sheet_id: i64,
    range: CellRange,
    format: &CellFormat,
) -> AppResult<()> {
    global_client()?
        .format_cells(spreadsheet_id, sheet_id, range, format)
        .await
}
