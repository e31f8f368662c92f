//! sheetlink - Google Sheets from the command line (OAuth2 browser login + typed operations).

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sheetlink::{CellFormat, CellRange, Color, HorizontalAlignment};

#[derive(Parser)]
#[command(name = "sheetlink")]
#[command(about = "Google Sheets from the command line")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize via the browser and print credentials for your .env
    Login,

    /// Create a new spreadsheet
    Create {
        /// Spreadsheet title
        title: String,
    },

    /// Show spreadsheet metadata
    Info {
        /// Spreadsheet id
        spreadsheet_id: String,
    },

    /// List sheets (tabs)
    Tabs {
        /// Spreadsheet id
        spreadsheet_id: String,
    },

    /// Add a sheet (tab)
    AddTab {
        /// Spreadsheet id
        spreadsheet_id: String,
        /// Title for the new sheet
        title: String,
    },

    /// Delete a sheet (tab) by numeric sheet id
    DeleteTab {
        /// Spreadsheet id
        spreadsheet_id: String,
        /// Numeric sheet id (see `tabs`)
        sheet_id: i64,
    },

    /// Read a range and print it
    Read {
        /// Spreadsheet id
        spreadsheet_id: String,
        /// A1-notation range, e.g. 'Sheet1!A1:C10'
        range: String,
        /// Print as JSON instead of tab-separated text
        #[arg(long)]
        json: bool,
    },

    /// Write rows to a range (each row argument is comma-separated cells)
    Write {
        /// Spreadsheet id
        spreadsheet_id: String,
        /// A1-notation range, e.g. 'Sheet1!A1'
        range: String,
        /// Rows, e.g. 'alpha,1,2' 'beta,3,4'
        #[arg(required = true)]
        rows: Vec<String>,
    },

    /// Append rows after the last row of a table
    Append {
        /// Spreadsheet id
        spreadsheet_id: String,
        /// A1-notation range locating the table, e.g. 'Sheet1!A1'
        range: String,
        /// Rows, e.g. 'alpha,1,2' 'beta,3,4'
        #[arg(required = true)]
        rows: Vec<String>,
    },

    /// Clear values in a range (formatting is kept)
    Clear {
        /// Spreadsheet id
        spreadsheet_id: String,
        /// A1-notation range
        range: String,
    },

    /// Format a cell rectangle on one sheet
    Format {
        /// Spreadsheet id
        spreadsheet_id: String,
        /// Numeric sheet id (see `tabs`)
        sheet_id: i64,
        /// First row index (0-based, inclusive)
        #[arg(long)]
        start_row: i64,
        /// Last row index (exclusive)
        #[arg(long)]
        end_row: i64,
        /// First column index (0-based, inclusive)
        #[arg(long)]
        start_col: i64,
        /// Last column index (exclusive)
        #[arg(long)]
        end_col: i64,
        /// Set bold; pass --bold=false to clear it
        #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
        bold: Option<bool>,
        /// Set italic; pass --italic=false to clear it
        #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
        italic: Option<bool>,
        /// Font size in points
        #[arg(long)]
        font_size: Option<i64>,
        /// Text color as 'r,g,b' floats in 0..=1
        #[arg(long)]
        fg: Option<String>,
        /// Background color as 'r,g,b' floats in 0..=1
        #[arg(long)]
        bg: Option<String>,
        /// Horizontal alignment: left|center|right
        #[arg(long)]
        align: Option<HorizontalAlignment>,
    },
}

fn parse_row(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_string).collect()
}

fn parse_color(raw: &str) -> anyhow::Result<Color> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        anyhow::bail!("color must be 'r,g,b' floats in 0..=1, got '{raw}'");
    }
    let channel = |s: &str| -> anyhow::Result<Option<f64>> {
        let v: f64 = s
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid color channel '{s}'"))?;
        if !(0.0..=1.0).contains(&v) {
            anyhow::bail!("color channel {v} out of 0..=1");
        }
        Ok(Some(v))
    };
    Ok(Color {
        red: channel(parts[0])?,
        green: channel(parts[1])?,
        blue: channel(parts[2])?,
    })
}

fn cell_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn print_sheet_table(sheets: &[sheetlink::SheetInfo]) {
    println!("{:>10}  {:>5}  {:>6}x{:<6}  {}", "sheet_id", "index", "rows", "cols", "title");
    for sheet in sheets {
        println!(
            "{:>10}  {:>5}  {:>6}x{:<6}  {}",
            sheet.sheet_id, sheet.index, sheet.row_count, sheet.column_count, sheet.title
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("sheetlink={log_level}"))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let _ = dotenvy::dotenv();

    match cli.command {
        Commands::Login => {
            let result = sheetlink::login().await?;
            println!("\nAuthorization complete. Add these to your environment or .env file:\n");
            println!("SHEETLINK_CLIENT_ID={}", result.client_id);
            println!("SHEETLINK_CLIENT_SECRET={}", result.client_secret);
            println!("SHEETLINK_REFRESH_TOKEN={}", result.refresh_token);
        }

        Commands::Create { title } => {
            let info = sheetlink::create_spreadsheet(&title).await?;
            println!("Created '{}'", info.title);
            println!("  id:  {}", info.spreadsheet_id);
            println!("  url: {}", info.url);
        }

        Commands::Info { spreadsheet_id } => {
            let info = sheetlink::get_spreadsheet(&spreadsheet_id).await?;
            println!("{} ({})", info.title, info.spreadsheet_id);
            println!("{}", info.url);
            print_sheet_table(&info.sheets);
        }

        Commands::Tabs { spreadsheet_id } => {
            let sheets = sheetlink::list_sheets(&spreadsheet_id).await?;
            print_sheet_table(&sheets);
        }

        Commands::AddTab {
            spreadsheet_id,
            title,
        } => {
            let sheet = sheetlink::add_sheet(&spreadsheet_id, &title).await?;
            println!("Added '{}' (sheet_id {})", sheet.title, sheet.sheet_id);
        }

        Commands::DeleteTab {
            spreadsheet_id,
            sheet_id,
        } => {
            sheetlink::delete_sheet(&spreadsheet_id, sheet_id).await?;
            println!("Deleted sheet {sheet_id}");
        }

        Commands::Read {
            spreadsheet_id,
            range,
            json,
        } => {
            let rows = sheetlink::read_range(&spreadsheet_id, &range).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for row in &rows {
                    let line: Vec<String> = row.iter().map(cell_to_text).collect();
                    println!("{}", line.join("\t"));
                }
            }
        }

        Commands::Write {
            spreadsheet_id,
            range,
            rows,
        } => {
            let rows: Vec<Vec<String>> = rows.iter().map(|r| parse_row(r)).collect();
            let updated = sheetlink::write_range(&spreadsheet_id, &range, &rows).await?;
            println!("Updated {updated} cells");
        }

        Commands::Append {
            spreadsheet_id,
            range,
            rows,
        } => {
            let rows: Vec<Vec<String>> = rows.iter().map(|r| parse_row(r)).collect();
            let updated = sheetlink::append_rows(&spreadsheet_id, &range, &rows).await?;
            println!("Appended {updated} cells");
        }

        Commands::Clear {
            spreadsheet_id,
            range,
        } => {
            sheetlink::clear_range(&spreadsheet_id, &range).await?;
            println!("Cleared {range}");
        }

        Commands::Format {
            spreadsheet_id,
            sheet_id,
            start_row,
            end_row,
            start_col,
            end_col,
            bold,
            italic,
            font_size,
            fg,
            bg,
            align,
        } => {
            let range = CellRange {
                start_row_index: start_row,
                end_row_index: end_row,
                start_column_index: start_col,
                end_column_index: end_col,
            };
            let format = CellFormat {
                bold,
                italic,
                font_size,
                foreground_color: fg.as_deref().map(parse_color).transpose()?,
                background_color: bg.as_deref().map(parse_color).transpose()?,
                horizontal_alignment: align,
            };
            sheetlink::format_cells(&spreadsheet_id, sheet_id, range, &format).await?;
            println!("Formatted rows {start_row}..{end_row}, cols {start_col}..{end_col}");
        }
    }

    Ok(())
}
