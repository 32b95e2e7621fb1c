use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use calamine::{Data, Reader, Xlsx};
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::schema::RawTable;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Non-blank lines inspected when guessing the CSV delimiter.
const DELIMITER_SAMPLE_LINES: usize = 20;
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Html,
    Xlsx,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(InputFormat::Csv),
            "html" | "htm" => Some(InputFormat::Html),
            "xlsx" | "xlsm" => Some(InputFormat::Xlsx),
            _ => None,
        }
    }

    /// Reports served over HTTP carry no extension we can trust.
    pub fn sniff(content: &[u8]) -> Self {
        if content.starts_with(ZIP_MAGIC) {
            return InputFormat::Xlsx;
        }
        let first = content
            .iter()
            .copied()
            .find(|b| !b.is_ascii_whitespace());
        if first == Some(b'<') {
            InputFormat::Html
        } else {
            InputFormat::Csv
        }
    }
}

pub struct InventoryLoader {
    client: reqwest::Client,
}

impl Default for InventoryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn load_file(&self, path: &Path) -> Result<RawTable> {
        let format = InputFormat::from_path(path)
            .with_context(|| format!("Unsupported input file type: {}", path.display()))?;
        let content = fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        parse_bytes(&content, format, &path.display().to_string())
    }

    pub async fn load_url(&self, url: &str) -> Result<RawTable> {
        info!(url, "fetching inventory report");

        let response = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("HTTP request failed with status: {}", response.status()));
        }

        let content = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from: {}", url))?;

        parse_bytes(&content, InputFormat::sniff(&content), url)
    }

    /// Every supported file directly inside `dir`, sorted by name.
    pub fn discover_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
            let path = entry?.path();
            if path.is_file() && InputFormat::from_path(&path).is_some() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

pub fn parse_bytes(content: &[u8], format: InputFormat, source: &str) -> Result<RawTable> {
    match format {
        InputFormat::Xlsx => {
            let rows = parse_xlsx(content)
                .with_context(|| format!("Failed to read workbook from {}", source))?;
            Ok(table_from_rows(rows, source))
        }
        InputFormat::Csv | InputFormat::Html => {
            parse_content(&String::from_utf8_lossy(content), format, source)
        }
    }
}

pub fn parse_content(content: &str, format: InputFormat, source: &str) -> Result<RawTable> {
    let rows = match format {
        InputFormat::Csv => parse_csv(content)
            .with_context(|| format!("Failed to parse CSV from {}", source))?,
        InputFormat::Html => parse_html_table(content),
        InputFormat::Xlsx => {
            return Err(anyhow::anyhow!("Workbook {} must be read as bytes", source));
        }
    };

    Ok(table_from_rows(rows, source))
}

fn table_from_rows(rows: Vec<Vec<String>>, source: &str) -> RawTable {
    if rows.is_empty() {
        warn!(source, "no table rows found");
    }

    RawTable {
        source: source.to_string(),
        rows,
    }
}

/// Counts `;` against `,` over the first few non-blank lines, so a title
/// line above the header does not decide the delimiter on its own.
/// Comma-decimal exports are usually semicolon separated.
fn detect_delimiter(content: &str) -> u8 {
    let (semicolons, commas) = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(DELIMITER_SAMPLE_LINES)
        .fold((0, 0), |(semi, comma), line| {
            (semi + line.matches(';').count(), comma + line.matches(',').count())
        });
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn parse_csv(content: &str) -> Result<Vec<Vec<String>>> {
    let content = content.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(detect_delimiter(content))
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }
    Ok(rows)
}

fn cell_text(cell: ElementRef) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_html_table(content: &str) -> Vec<Vec<String>> {
    let document = Html::parse_document(content);
    let (Ok(table_selector), Ok(row_selector), Ok(cell_selector)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("th, td"),
    ) else {
        return Vec::new();
    };

    let Some(table) = document.select(&table_selector).next() else {
        return Vec::new();
    };

    table
        .select(&row_selector)
        .map(|row| row.select(&cell_selector).map(cell_text).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect()
}

fn workbook_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// First worksheet of the workbook, one `Vec<String>` per used row.
fn parse_xlsx(content: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(content))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => return Ok(Vec::new()),
    };

    Ok(range
        .rows()
        .map(|row| row.iter().map(workbook_cell).collect())
        .collect())
}
