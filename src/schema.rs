//! Maps whatever header layout an inventory export uses onto the canonical
//! column set the record parser works with.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PacingError, Result};

/// A grid of cell texts as read from a file or URL, header row included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub source: String,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    FlightKey,
    TotalSeats,
    AvailableSeats,
    SoldTotal,
    SoldYesterday,
    LoadFactor,
    SalesToday,
    Sales2To3,
    Sales4To6,
    Sales7To13,
    SalesLast14,
}

impl Column {
    pub const ALL: [Column; 11] = [
        Column::FlightKey,
        Column::TotalSeats,
        Column::AvailableSeats,
        Column::SoldTotal,
        Column::SoldYesterday,
        Column::LoadFactor,
        Column::SalesToday,
        Column::Sales2To3,
        Column::Sales4To6,
        Column::Sales7To13,
        Column::SalesLast14,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::FlightKey => "flight_key",
            Column::TotalSeats => "total_seats",
            Column::AvailableSeats => "available_seats",
            Column::SoldTotal => "sold_total",
            Column::SoldYesterday => "sold_yesterday",
            Column::LoadFactor => "load_factor",
            Column::SalesToday => "sales_today",
            Column::Sales2To3 => "sales_2_3_days",
            Column::Sales4To6 => "sales_4_6_days",
            Column::Sales7To13 => "sales_7_13_days",
            Column::SalesLast14 => "sales_last_14_days",
        }
    }

    fn from_name(name: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Built-in header spellings, already normalized.
    fn builtin_aliases(&self) -> &'static [&'static str] {
        match self {
            Column::FlightKey => &["flt_date&num", "flt_date_num", "flight", "flight_key", "рейс"],
            Column::TotalSeats => &["cap", "capacity", "total_seats", "total_capacity"],
            Column::AvailableSeats => &[
                "avail",
                "available",
                "available_seats",
                "seats_available",
                "open_seats",
            ],
            Column::SoldTotal => &["ind_ss", "sold_total", "seats_sold", "sold", "ss"],
            Column::SoldYesterday => &[
                "ind_ss_yesterday",
                "sold_yesterday",
                "ss_yesterday",
                "sales_yesterday",
                "yesterday",
            ],
            Column::LoadFactor => &["lf", "ind_lf", "load_factor", "load_factor_pct"],
            Column::SalesToday => &["today", "sales_today", "sold_today", "ss_today"],
            Column::Sales2To3 => &["2_3_days", "sales_2_3_days", "days_2_3", "2_3d"],
            Column::Sales4To6 => &["4_6_days", "sales_4_6_days", "days_4_6", "4_6d"],
            Column::Sales7To13 => &["7_13_days", "sales_7_13_days", "days_7_13", "7_13d"],
            Column::SalesLast14 => &[
                "last_14_days",
                "sales_last_14_days",
                "14_days",
                "last_14d",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// How many leading rows may precede the header row.
    pub header_scan_rows: usize,
    /// Extra header spellings keyed by canonical column name.
    pub extra_aliases: BTreeMap<String, Vec<String>>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            header_scan_rows: 10,
            extra_aliases: BTreeMap::new(),
        }
    }
}

/// Lowercase and collapse every run of separators into `_`.
pub fn normalize_header(header: &str) -> String {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    let noise = NOISE.get_or_init(|| {
        Regex::new(r"[^\p{L}\p{N}&]+").expect("header noise pattern is valid")
    });
    noise
        .replace_all(&header.trim().to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    /// 1-based row number in the source table.
    pub line: usize,
    cells: BTreeMap<Column, String>,
}

impl CanonicalRow {
    pub fn new(line: usize, cells: BTreeMap<Column, String>) -> Self {
        Self { line, cells }
    }

    /// Cell text, `None` when the column is absent or the cell is blank.
    pub fn get(&self, column: Column) -> Option<&str> {
        self.cells
            .get(&column)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    pub source: String,
    pub columns: BTreeSet<Column>,
    pub rows: Vec<CanonicalRow>,
}

impl CanonicalTable {
    pub fn has(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }
}

pub struct SchemaAdapter {
    aliases: Vec<(String, Column)>,
    header_scan_rows: usize,
}

impl SchemaAdapter {
    pub fn new(config: &SchemaConfig) -> Result<Self> {
        let mut aliases: Vec<(String, Column)> = Vec::new();
        for (name, extras) in &config.extra_aliases {
            let column = Column::from_name(name).ok_or_else(|| {
                PacingError::Config(format!("unknown column in schema.extra_aliases: {}", name))
            })?;
            for extra in extras {
                aliases.push((normalize_header(extra), column));
            }
        }
        for column in Column::ALL {
            for alias in column.builtin_aliases() {
                aliases.push((alias.to_string(), column));
            }
        }

        Ok(Self {
            aliases,
            header_scan_rows: config.header_scan_rows.max(1),
        })
    }

    fn resolve(&self, header: &str) -> Option<Column> {
        let normalized = normalize_header(header);
        self.aliases
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map(|(_, column)| *column)
    }

    fn find_header_row(&self, table: &RawTable) -> Option<usize> {
        table
            .rows
            .iter()
            .take(self.header_scan_rows)
            .position(|row| row.iter().any(|cell| self.resolve(cell) == Some(Column::FlightKey)))
    }

    /// Locate the header row, map its cells onto canonical columns and
    /// re-key every data row below it.
    pub fn adapt(&self, table: &RawTable) -> Result<CanonicalTable> {
        let header_index = self.find_header_row(table).ok_or_else(|| PacingError::Schema {
            missing: vec![Column::FlightKey.name()],
            found: table.rows.first().cloned().unwrap_or_default(),
        })?;
        let header = &table.rows[header_index];

        let mut positions: BTreeMap<Column, usize> = BTreeMap::new();
        for (index, cell) in header.iter().enumerate() {
            if let Some(column) = self.resolve(cell) {
                positions.entry(column).or_insert(index);
            }
        }
        debug!(source = %table.source, header_row = header_index + 1, ?positions, "resolved header");

        let mut missing = Vec::new();
        if !positions.contains_key(&Column::TotalSeats) {
            missing.push(Column::TotalSeats.name());
        }
        if !positions.contains_key(&Column::AvailableSeats)
            && !positions.contains_key(&Column::SoldTotal)
        {
            missing.push(Column::AvailableSeats.name());
        }
        if !missing.is_empty() {
            return Err(PacingError::Schema {
                missing,
                found: header.clone(),
            });
        }

        let rows = table
            .rows
            .iter()
            .enumerate()
            .skip(header_index + 1)
            .filter(|(_, row)| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|(index, row)| {
                let cells = positions
                    .iter()
                    .filter_map(|(column, pos)| row.get(*pos).map(|cell| (*column, cell.clone())))
                    .collect();
                CanonicalRow::new(index + 1, cells)
            })
            .collect();

        Ok(CanonicalTable {
            source: table.source.clone(),
            columns: positions.keys().copied().collect(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> RawTable {
        RawTable {
            source: "test".to_string(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn normalizes_headers() {
        assert_eq!(normalize_header("flt_date&num"), "flt_date&num");
        assert_eq!(normalize_header(" Ind SS yesterday "), "ind_ss_yesterday");
        assert_eq!(normalize_header("LF, %"), "lf");
        assert_eq!(normalize_header("2-3 days"), "2_3_days");
    }

    #[test]
    fn maps_source_headers_after_title_rows() {
        let raw = table(&[
            &["Inventory report", "", ""],
            &[""],
            &["flt_date&num", "Cap", "Avail", "Ind SS yesterday", "LF"],
            &["2026.10.24 - 101 - SVO-LED", "227", "3", "4", "98,7%"],
            &["", "", "", "", ""],
        ]);
        let adapter = SchemaAdapter::new(&SchemaConfig::default()).unwrap();
        let canonical = adapter.adapt(&raw).unwrap();

        assert_eq!(canonical.rows.len(), 1);
        let row = &canonical.rows[0];
        assert_eq!(row.line, 4);
        assert_eq!(row.get(Column::FlightKey), Some("2026.10.24 - 101 - SVO-LED"));
        assert_eq!(row.get(Column::AvailableSeats), Some("3"));
        assert_eq!(row.get(Column::LoadFactor), Some("98,7%"));
        assert!(!canonical.has(Column::SoldTotal));
    }

    #[test]
    fn missing_capacity_is_a_schema_error() {
        let raw = table(&[&["flight", "Avail"], &["2026.10.24 - 1 - A-B", "3"]]);
        let adapter = SchemaAdapter::new(&SchemaConfig::default()).unwrap();
        match adapter.adapt(&raw) {
            Err(PacingError::Schema { missing, found }) => {
                assert_eq!(missing, vec!["total_seats"]);
                assert_eq!(found, vec!["flight".to_string(), "Avail".to_string()]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn no_flight_column_is_a_schema_error() {
        let raw = table(&[&["a", "b"], &["1", "2"]]);
        let adapter = SchemaAdapter::new(&SchemaConfig::default()).unwrap();
        assert!(matches!(adapter.adapt(&raw), Err(PacingError::Schema { .. })));
    }

    #[test]
    fn extra_aliases_extend_builtin_ones() {
        let mut config = SchemaConfig::default();
        config
            .extra_aliases
            .insert("total_seats".to_string(), vec!["Seats (config)".to_string()]);
        let adapter = SchemaAdapter::new(&config).unwrap();
        let raw = table(&[&["Flight", "Seats (config)", "Ind SS"], &["k", "180", "90"]]);
        let canonical = adapter.adapt(&raw).unwrap();
        assert!(canonical.has(Column::TotalSeats));
        assert!(canonical.has(Column::SoldTotal));
    }

    #[test]
    fn unknown_extra_alias_column_is_rejected() {
        let mut config = SchemaConfig::default();
        config.extra_aliases.insert("bogus".to_string(), vec!["x".to_string()]);
        assert!(matches!(SchemaAdapter::new(&config), Err(PacingError::Config(_))));
    }
}
