//! Usage: Serde shapes for Sheets v4 JSON bodies and mapping into public types.

use crate::shared::error::AppResult;
use crate::sheets::types::{SheetInfo, SpreadsheetInfo};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Spreadsheet {
    pub(crate) spreadsheet_id: Option<String>,
    pub(crate) properties: Option<SpreadsheetProperties>,
    pub(crate) spreadsheet_url: Option<String>,
    pub(crate) sheets: Option<Vec<Sheet>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SpreadsheetProperties {
    pub(crate) title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Sheet {
    pub(crate) properties: Option<SheetProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SheetProperties {
    pub(crate) sheet_id: Option<i64>,
    pub(crate) title: Option<String>,
    pub(crate) index: Option<i64>,
    pub(crate) grid_properties: Option<GridProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GridProperties {
    pub(crate) row_count: Option<i64>,
    pub(crate) column_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValueRange {
    pub(crate) values: Option<Vec<Vec<Value>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateValuesResponse {
    pub(crate) updated_cells: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AppendValuesResponse {
    pub(crate) updates: Option<UpdateValuesResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchUpdateResponse {
    pub(crate) replies: Option<Vec<BatchUpdateReply>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchUpdateReply {
    pub(crate) add_sheet: Option<AddSheetReply>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddSheetReply {
    pub(crate) properties: Option<SheetProperties>,
}

pub(crate) fn map_spreadsheet(data: Spreadsheet) -> AppResult<SpreadsheetInfo> {
    let spreadsheet_id = data
        .spreadsheet_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "SYSTEM_ERROR: spreadsheet response missing spreadsheetId".to_string())?;
    Ok(SpreadsheetInfo {
        spreadsheet_id,
        title: data
            .properties
            .and_then(|p| p.title)
            .unwrap_or_default(),
        url: data.spreadsheet_url.unwrap_or_default(),
        sheets: data
            .sheets
            .unwrap_or_default()
            .into_iter()
            .map(map_sheet)
            .collect(),
    })
}

pub(crate) fn map_sheet(sheet: Sheet) -> SheetInfo {
    map_sheet_properties(sheet.properties.unwrap_or(SheetProperties {
        sheet_id: None,
        title: None,
        index: None,
        grid_properties: None,
    }))
}

pub(crate) fn map_sheet_properties(props: SheetProperties) -> SheetInfo {
    let grid = props.grid_properties;
    SheetInfo {
        sheet_id: props.sheet_id.unwrap_or(0),
        title: props.title.unwrap_or_default(),
        index: props.index.unwrap_or(0),
        row_count: grid.as_ref().and_then(|g| g.row_count).unwrap_or(0),
        column_count: grid.as_ref().and_then(|g| g.column_count).unwrap_or(0),
    }
}
