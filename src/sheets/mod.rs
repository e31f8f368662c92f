//! Usage: Typed wrapper over the Google Sheets v4 REST API.

pub(crate) mod client;
pub(crate) mod types;
pub(crate) mod wire;

pub use client::SheetsClient;
pub use types::{CellFormat, CellRange, Color, HorizontalAlignment, SheetInfo, SpreadsheetInfo};

use crate::shared::error::AppResult;
use tokio::time::Duration;

pub(crate) fn build_http_client() -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("sheetlink/{}", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| format!("SYSTEM_ERROR: http client init failed: {e}").into())
}
