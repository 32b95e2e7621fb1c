use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Arg, Command};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flight_pacing::analyzer::PacingAnalyzer;
use flight_pacing::loader::InventoryLoader;
use flight_pacing::models::Config;
use flight_pacing::report::{self, ReviewLedger, FULL_REPORT_CSV};
use flight_pacing::schema::{RawTable, SchemaAdapter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = Command::new("flight-pacing-analyzer")
        .version("1.0")
        .about("Checks whether ticket sales per flight keep pace with the booking curve")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("date")
                .short('d')
                .long("date")
                .value_name("YYYY-MM-DD")
                .help("Reference date used as \"today\""),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Analyze this CSV/HTML file instead of the configured sources"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory (overrides the configuration)"),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Invalid configuration file: {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!(
            "⚠️  Please review {} (data sources, policy, booking curve), then run the program again.",
            config_file
        );
        return Ok(());
    };

    let today = match matches.get_one::<String>("date") {
        Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid --date value: {}", date))?,
        None => config
            .reference_date
            .unwrap_or_else(|| Local::now().date_naive()),
    };

    let output_dir = matches
        .get_one::<String>("output")
        .cloned()
        .or_else(|| config.output_directory.clone())
        .unwrap_or_else(|| "output".to_string());
    let output_dir = PathBuf::from(output_dir);

    fs::create_dir_all(&output_dir)?;
    clean_output_directory(&output_dir)?;

    let ledger = match &config.reviewed_flights_file {
        Some(path) => ReviewLedger::load(Path::new(path))?,
        None => ReviewLedger::default(),
    };

    println!("🔍 Analyzing sales pacing as of {}", today);
    println!("📄 Output directory: {} (cleaned)", output_dir.display());
    if !ledger.is_empty() {
        println!("✅ {} flights already marked as reviewed", ledger.len());
    }

    let tables = collect_tables(&config, matches.get_one::<String>("input")).await?;
    if tables.is_empty() {
        println!("❌ No input tables found");
        return Ok(());
    }

    let adapter = SchemaAdapter::new(&config.schema)?;
    let analyzer = PacingAnalyzer::new(&config.policy, &config.curve, today);

    let mut used_names = HashSet::new();
    let mut analyzed = 0;
    for table in &tables {
        let dir = output_dir.join(report_dir_name(&table.source, &mut used_names));
        match analyze_table(&adapter, &analyzer, table, &ledger, &dir) {
            Ok(()) => analyzed += 1,
            Err(e) => {
                error!(source = %table.source, "{:#}", e);
                println!("   ❌ {}: {:#}", table.source, e);
            }
        }
    }

    println!("\n✅ Analysis complete! {} of {} tables reported.", analyzed, tables.len());
    println!("📂 Results: {}", output_dir.display());
    Ok(())
}

async fn collect_tables(config: &Config, input: Option<&String>) -> Result<Vec<RawTable>> {
    let loader = InventoryLoader::new();

    if let Some(input) = input {
        return Ok(vec![loader.load_file(Path::new(input))?]);
    }

    let mut tables = Vec::new();

    if config.uses_local() {
        let data_dir = Path::new(config.data_directory.as_deref().unwrap_or("data-source"));
        println!("📂 Reading inventory files from: {}", data_dir.display());
        if data_dir.exists() {
            for path in InventoryLoader::discover_files(data_dir)? {
                println!("📄 Processing: {}", path.display());
                match loader.load_file(&path) {
                    Ok(table) => tables.push(table),
                    Err(e) => println!("   ❌ Error reading file: {:#}", e),
                }
            }
        } else {
            warn!(dir = %data_dir.display(), "data directory does not exist");
        }
    }

    if config.uses_internet() {
        for url in config.internet_urls.iter().flatten() {
            match loader.load_url(url).await {
                Ok(table) => tables.push(table),
                Err(e) => println!("   ❌ Error fetching {}: {:#}", url, e),
            }
        }
    }

    Ok(tables)
}

fn analyze_table(
    adapter: &SchemaAdapter,
    analyzer: &PacingAnalyzer,
    table: &RawTable,
    ledger: &ReviewLedger,
    dir: &Path,
) -> Result<()> {
    let canonical = adapter.adapt(table)?;
    let analysis = analyzer.analyze_table(&canonical)?;

    fs::create_dir_all(dir)?;
    report::write_csv_reports(&analysis, ledger, dir)?;
    report::write_xlsx_report(&analysis, ledger, dir)?;
    report::print_summary(&analysis, ledger);
    info!(source = %table.source, dir = %dir.display(), "reports written");
    Ok(())
}

/// Sub-directory per input, named after the file or URL stem.
fn report_dir_name(source: &str, used: &mut HashSet<String>) -> String {
    let stem = Path::new(source.trim_end_matches('/'))
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("report")
        .to_string();

    let mut name = stem.clone();
    let mut n = 2;
    while !used.insert(name.clone()) {
        name = format!("{}_{}", stem, n);
        n += 1;
    }
    name
}

/// Remove report directories left over from previous runs.
fn clean_output_directory(output_dir: &Path) -> Result<()> {
    if !output_dir.exists() {
        return Ok(());
    }

    println!("🧹 Cleaning previous results...");

    for entry in fs::read_dir(output_dir)? {
        let path = entry?.path();
        if path.is_dir() && path.join(FULL_REPORT_CSV).exists() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }

    Ok(())
}
