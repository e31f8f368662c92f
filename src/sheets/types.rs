//! Usage: Public mapped types for spreadsheet metadata and cell formatting.

use serde::Serialize;

/// Spreadsheet metadata mapped from the API response.
#[derive(Debug, Clone, Serialize)]
pub struct SpreadsheetInfo {
    pub spreadsheet_id: String,
    pub title: String,
    pub url: String,
    pub sheets: Vec<SheetInfo>,
}

/// A single sheet (tab) inside a spreadsheet.
#[derive(Debug, Clone, Serialize)]
pub struct SheetInfo {
    pub sheet_id: i64,
    pub title: String,
    pub index: i64,
    pub row_count: i64,
    pub column_count: i64,
}

/// Half-open grid rectangle (end indexes are exclusive) within one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellRange {
    pub start_row_index: i64,
    pub end_row_index: i64,
    pub start_column_index: i64,
    pub end_column_index: i64,
}

/// RGB channels in `0.0..=1.0`; unset channels are left to the API default.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Color {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub red: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub green: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blue: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HorizontalAlignment {
    Left,
    Center,
    Right,
}

impl HorizontalAlignment {
    pub(crate) fn as_api_str(self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Center => "CENTER",
            Self::Right => "RIGHT",
        }
    }
}

impl std::str::FromStr for HorizontalAlignment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "center" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            other => Err(format!("unknown alignment '{other}' (left|center|right)")),
        }
    }
}

/// Partial cell format; only set fields are written, everything else is left
/// untouched on the sheet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CellFormat {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub font_size: Option<i64>,
    pub foreground_color: Option<Color>,
    pub background_color: Option<Color>,
    pub horizontal_alignment: Option<HorizontalAlignment>,
}
