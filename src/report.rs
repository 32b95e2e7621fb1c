use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::info;

use crate::analyzer::AnalysisReport;
use crate::error::{PacingError, Result};
use crate::models::{ClassifiedFlight, FlightStatus};

pub const FULL_REPORT_CSV: &str = "pacing_report.csv";
pub const ATTENTION_REPORT_CSV: &str = "needs_attention.csv";
pub const XLSX_REPORT: &str = "pacing_report.xlsx";

const HEADERS: [&str; 22] = [
    "Flight",
    "Flight Date",
    "Flight Number",
    "Route",
    "Days To Flight",
    "Total Seats",
    "Available Seats",
    "Sold Total",
    "Remaining Seats",
    "Sold Yesterday",
    "Daily Needed",
    "Diff Vs Plan",
    "Load Factor %",
    "Target Load Factor %",
    "Recent Daily Rate",
    "Prior Daily Rate",
    "Speed Ratio",
    "Coverage Ratio",
    "Status Code",
    "Status",
    "Needs Attention",
    "Reviewed",
];

/// Flights someone has already looked at. Owned by the presentation side;
/// classification never consults it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewLedger {
    keys: BTreeSet<String>,
}

impl ReviewLedger {
    /// One flight key per line; blank lines and `#` comments are ignored.
    pub fn parse(content: &str) -> Self {
        let keys = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { keys }
    }

    /// A missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| PacingError::io(format!("reading {}", path.display()), e))?;
        Ok(Self::parse(&content))
    }

    pub fn is_reviewed(&self, flight_key: &str) -> bool {
        self.keys.contains(flight_key.trim())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn csv_row(flight: &ClassifiedFlight, ledger: &ReviewLedger) -> Vec<String> {
    let r = &flight.record;
    let p = &flight.pacing;
    let speed = p.speed;
    vec![
        r.raw_flight_key.clone(),
        r.flight_date.format("%Y-%m-%d").to_string(),
        r.flight_number.clone(),
        r.route.clone(),
        r.days_to_flight.to_string(),
        format!("{}", r.total_seats),
        format!("{}", r.available_seats),
        format!("{}", p.sold_total),
        format!("{}", p.remaining_seats),
        format!("{}", r.sold_yesterday),
        format!("{:.2}", p.daily_needed),
        format!("{:.2}", p.diff_vs_plan),
        format!("{:.1}", r.load_factor_pct),
        format!("{:.0}", flight.target_load_factor),
        fmt_opt(speed.map(|s| s.recent_daily_rate)),
        fmt_opt(speed.and_then(|s| s.prior_daily_rate)),
        fmt_opt(speed.and_then(|s| s.speed_ratio)),
        fmt_opt(speed.and_then(|s| s.coverage_ratio)),
        flight.status.code().to_string(),
        flight.status.label().to_string(),
        yes_no(flight.status.needs_attention()).to_string(),
        yes_no(ledger.is_reviewed(&r.raw_flight_key)).to_string(),
    ]
}

fn write_csv<'a>(
    path: &Path,
    flights: impl Iterator<Item = &'a ClassifiedFlight>,
    ledger: &ReviewLedger,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADERS)?;
    for flight in flights {
        writer.write_record(csv_row(flight, ledger))?;
    }
    writer
        .flush()
        .map_err(|e| PacingError::io(format!("flushing {}", path.display()), e))?;
    Ok(())
}

/// Full view and needs-attention view as two CSV files.
pub fn write_csv_reports(report: &AnalysisReport, ledger: &ReviewLedger, output_dir: &Path) -> Result<()> {
    write_csv(&output_dir.join(FULL_REPORT_CSV), report.flights.iter(), ledger)?;
    write_csv(&output_dir.join(ATTENTION_REPORT_CSV), report.needs_attention(), ledger)?;
    info!(dir = %output_dir.display(), "wrote CSV reports");
    Ok(())
}

fn write_number(sheet: &mut Worksheet, row: u32, col: u16, value: f64) -> Result<()> {
    sheet.write_number(row, col, value)?;
    Ok(())
}

fn write_optional(sheet: &mut Worksheet, row: u32, col: u16, value: Option<f64>) -> Result<()> {
    if let Some(v) = value {
        sheet.write_number(row, col, v)?;
    }
    Ok(())
}

fn fill_sheet<'a>(
    sheet: &mut Worksheet,
    flights: impl Iterator<Item = &'a ClassifiedFlight>,
    ledger: &ReviewLedger,
) -> Result<()> {
    let bold = Format::new().set_bold();
    let two_places = Format::new().set_num_format("0.00");

    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    for (i, flight) in flights.enumerate() {
        let row = (i + 1) as u32;
        let r = &flight.record;
        let p = &flight.pacing;
        let speed = p.speed;

        sheet.write_string(row, 0, &r.raw_flight_key)?;
        sheet.write_string(row, 1, r.flight_date.format("%Y-%m-%d").to_string())?;
        sheet.write_string(row, 2, &r.flight_number)?;
        sheet.write_string(row, 3, &r.route)?;
        write_number(sheet, row, 4, r.days_to_flight as f64)?;
        write_number(sheet, row, 5, r.total_seats)?;
        write_number(sheet, row, 6, r.available_seats)?;
        write_number(sheet, row, 7, p.sold_total)?;
        write_number(sheet, row, 8, p.remaining_seats)?;
        write_number(sheet, row, 9, r.sold_yesterday)?;
        sheet.write_number_with_format(row, 10, p.daily_needed, &two_places)?;
        sheet.write_number_with_format(row, 11, p.diff_vs_plan, &two_places)?;
        write_number(sheet, row, 12, r.load_factor_pct)?;
        write_number(sheet, row, 13, flight.target_load_factor)?;
        write_optional(sheet, row, 14, speed.map(|s| s.recent_daily_rate))?;
        write_optional(sheet, row, 15, speed.and_then(|s| s.prior_daily_rate))?;
        write_optional(sheet, row, 16, speed.and_then(|s| s.speed_ratio))?;
        write_optional(sheet, row, 17, speed.and_then(|s| s.coverage_ratio))?;
        sheet.write_string(row, 18, flight.status.code())?;
        sheet.write_string(row, 19, flight.status.label())?;
        sheet.write_string(row, 20, yes_no(flight.status.needs_attention()))?;
        sheet.write_string(row, 21, yes_no(ledger.is_reviewed(&r.raw_flight_key)))?;
    }

    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Both views as sheets of one workbook, returned as bytes.
pub fn build_xlsx(report: &AnalysisReport, ledger: &ReviewLedger) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    let all = workbook.add_worksheet();
    all.set_name("All flights")?;
    fill_sheet(all, report.flights.iter(), ledger)?;

    let attention = workbook.add_worksheet();
    attention.set_name("Needs attention")?;
    fill_sheet(attention, report.needs_attention(), ledger)?;

    Ok(workbook.save_to_buffer()?)
}

pub fn write_xlsx_report(report: &AnalysisReport, ledger: &ReviewLedger, output_dir: &Path) -> Result<()> {
    let path = output_dir.join(XLSX_REPORT);
    let buffer = build_xlsx(report, ledger)?;
    fs::write(&path, buffer).map_err(|e| PacingError::io(format!("writing {}", path.display()), e))?;
    info!(path = %path.display(), "wrote XLSX report");
    Ok(())
}

pub fn print_summary(report: &AnalysisReport, ledger: &ReviewLedger) {
    println!("\n📊 SUMMARY: {}", report.source);
    println!("==========\n");
    println!("📅 Reference date: {}", report.today);
    println!("✈️  Flights analyzed: {}", report.flights.len());
    if report.drops.total() > 0 {
        println!("⚠️  {}", report.drops);
    }

    println!("\n📈 Status breakdown:");
    for status in FlightStatus::ALL {
        let count = report.count(status);
        if count > 0 {
            println!("   {} ({}): {}", status.label(), status.code(), count);
        }
    }

    let attention: Vec<&ClassifiedFlight> = report.needs_attention().collect();
    let unreviewed = attention
        .iter()
        .filter(|f| !ledger.is_reviewed(&f.record.raw_flight_key))
        .count();
    println!(
        "\n🔎 Needs attention: {} ({} not yet reviewed)",
        attention.len(),
        unreviewed
    );

    let lagging = report.most_lagging(5);
    if !lagging.is_empty() {
        println!("\n🐢 Most lagging flights:");
        for (i, flight) in lagging.iter().enumerate() {
            println!(
                "   {}. {} - {:+.1} vs plan ({:.1}/day needed, LF {:.1}% vs target {:.0}%)",
                i + 1,
                flight.record.raw_flight_key,
                flight.pacing.diff_vs_plan,
                flight.pacing.daily_needed,
                flight.record.load_factor_pct,
                flight.target_load_factor
            );
        }
    }
}
