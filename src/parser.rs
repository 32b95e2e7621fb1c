use chrono::NaiveDate;

use crate::analyzer::PastFlightPolicy;
use crate::models::{DropReason, FlightRecord, SalesBuckets};
use crate::normalize::parse_number;
use crate::schema::{CanonicalRow, Column};

pub const FLIGHT_KEY_SEPARATOR: &str = " - ";
pub const FLIGHT_DATE_FORMAT: &str = "%Y.%m.%d";

/// The three parts of a `YYYY.MM.DD - <flight number> - <route>` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightKeyParts<'a> {
    pub date: &'a str,
    pub flight_number: &'a str,
    pub route: &'a str,
}

pub fn split_flight_key(key: &str) -> Result<FlightKeyParts<'_>, DropReason> {
    let parts: Vec<&str> = key.trim().split(FLIGHT_KEY_SEPARATOR).collect();
    match parts.as_slice() {
        [date, flight_number, route] => Ok(FlightKeyParts {
            date: date.trim(),
            flight_number: flight_number.trim(),
            route: route.trim(),
        }),
        _ => Err(DropReason::MalformedKey),
    }
}

pub fn parse_flight_date(text: &str) -> Result<NaiveDate, DropReason> {
    NaiveDate::parse_from_str(text.trim(), FLIGHT_DATE_FORMAT).map_err(|_| DropReason::InvalidDate)
}

/// Whole days from `today` to departure, never below 1.
pub fn days_to_flight(flight_date: NaiveDate, today: NaiveDate) -> i64 {
    (flight_date - today).num_days().max(1)
}

/// Turns canonical rows into [`FlightRecord`]s relative to a fixed "today".
pub struct RecordParser {
    today: NaiveDate,
    past_flights: PastFlightPolicy,
}

impl RecordParser {
    pub fn new(today: NaiveDate, past_flights: PastFlightPolicy) -> Self {
        Self { today, past_flights }
    }

    /// `load_factor` comes from the column-wide percent parse, and
    /// `has_available_column` tells whether available seats are read directly
    /// or derived from capacity minus sold.
    pub fn parse(
        &self,
        row: &CanonicalRow,
        load_factor: Option<f64>,
        has_available_column: bool,
    ) -> Result<FlightRecord, DropReason> {
        let raw_key = row.get(Column::FlightKey).ok_or(DropReason::MalformedKey)?;
        let parts = split_flight_key(raw_key)?;
        let flight_date = parse_flight_date(parts.date)?;

        let departed = flight_date < self.today;
        if departed && self.past_flights == PastFlightPolicy::Exclude {
            return Err(DropReason::AlreadyDeparted);
        }

        let total_seats = number(row, Column::TotalSeats).ok_or(DropReason::MissingCapacity)?;
        let available_seats = if has_available_column {
            number(row, Column::AvailableSeats).ok_or(DropReason::MissingAvailable)?
        } else {
            let sold = number(row, Column::SoldTotal).ok_or(DropReason::MissingAvailable)?;
            total_seats - sold
        };

        let sold_yesterday = number(row, Column::SoldYesterday);

        Ok(FlightRecord {
            raw_flight_key: raw_key.to_string(),
            flight_date,
            flight_number: parts.flight_number.to_string(),
            route: parts.route.to_string(),
            total_seats,
            available_seats,
            sold_yesterday: sold_yesterday.unwrap_or(0.0),
            load_factor_pct: load_factor.unwrap_or(0.0),
            days_to_flight: days_to_flight(flight_date, self.today),
            departed,
            sales: SalesBuckets {
                today: number(row, Column::SalesToday),
                yesterday: sold_yesterday,
                days_2_3: number(row, Column::Sales2To3),
                days_4_6: number(row, Column::Sales4To6),
                days_7_13: number(row, Column::Sales7To13),
                last_14: number(row, Column::SalesLast14),
            },
        })
    }
}

fn number(row: &CanonicalRow, column: Column) -> Option<f64> {
    row.get(column).and_then(parse_number)
}
