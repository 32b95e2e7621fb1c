use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PacingError, Result};
use crate::models::{ClassifiedFlight, DropCounts, FlightRecord, FlightStatus, PacingMetrics};
use crate::normalize::parse_percent_column;
use crate::pacing::compute_pacing;
use crate::parser::RecordParser;
use crate::schema::{CanonicalTable, Column};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PastFlightPolicy {
    /// Drop flights dated before today.
    #[default]
    Exclude,
    /// Keep them with one day to go and report them as departed.
    Retain,
}

/// Knobs that switch between the full five-label cascade and the reduced
/// variants that only look at yesterday's deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationPolicy {
    /// Check cumulative load factor against the booking curve.
    pub load_factor_gate: bool,
    pub far_out_bucket: bool,
    /// When off, moderate lag is reported as behind.
    pub moderate_lag: bool,
    pub past_flights: PastFlightPolicy,
    /// Any flight needing fewer than `low_demand_daily_needed` seats a day
    /// is on track regardless of yesterday's sales.
    pub low_demand_shortcut: bool,
    pub min_deviation: f64,
    pub deviation_share: f64,
    pub far_out_days: i64,
    pub far_out_max_daily_needed: f64,
    pub low_demand_daily_needed: f64,
    pub sellout_load_factor: f64,
    pub early_strong_load_factor: f64,
    pub early_strong_days: i64,
    pub late_window_days: i64,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self::full()
    }
}

impl ClassificationPolicy {
    pub fn full() -> Self {
        Self {
            load_factor_gate: true,
            far_out_bucket: true,
            moderate_lag: true,
            past_flights: PastFlightPolicy::Exclude,
            low_demand_shortcut: true,
            min_deviation: 5.0,
            deviation_share: 0.3,
            far_out_days: 30,
            far_out_max_daily_needed: 4.0,
            low_demand_daily_needed: 3.0,
            sellout_load_factor: 90.0,
            early_strong_load_factor: 80.0,
            early_strong_days: 40,
            late_window_days: 10,
        }
    }

    /// ON_TRACK / OVERSOLD / BEHIND / FAR_OUT, judged on yesterday's
    /// deviation alone.
    pub fn reduced() -> Self {
        Self {
            load_factor_gate: false,
            moderate_lag: false,
            low_demand_shortcut: false,
            ..Self::full()
        }
    }

    /// ON_TRACK / OVERSOLD / BEHIND only.
    pub fn minimal() -> Self {
        Self {
            far_out_bucket: false,
            ..Self::reduced()
        }
    }

    /// Deviation from plan that counts as a real swing for this flight.
    pub fn deviation_threshold(&self, daily_needed: f64) -> f64 {
        self.min_deviation.max(daily_needed * self.deviation_share)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveStep {
    /// The step applies from this many days out (inclusive) upwards.
    pub from_days: i64,
    pub target_load_factor: f64,
}

/// Piecewise-constant target load factor by days to departure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingCurve {
    pub band_below: f64,
    pub band_above: f64,
    pub steps: Vec<CurveStep>,
}

impl Default for BookingCurve {
    fn default() -> Self {
        Self {
            band_below: 10.0,
            band_above: 15.0,
            steps: vec![
                CurveStep { from_days: 61, target_load_factor: 30.0 },
                CurveStep { from_days: 31, target_load_factor: 50.0 },
                CurveStep { from_days: 8, target_load_factor: 70.0 },
                CurveStep { from_days: 0, target_load_factor: 85.0 },
            ],
        }
    }
}

impl BookingCurve {
    pub fn target_load_factor(&self, days_to_flight: i64) -> f64 {
        let best = self
            .steps
            .iter()
            .filter(|step| days_to_flight >= step.from_days)
            .max_by_key(|step| step.from_days);
        // Horizons shorter than every configured step use the closest-in one.
        let step = best.or_else(|| self.steps.iter().min_by_key(|step| step.from_days));
        step.map(|s| s.target_load_factor).unwrap_or(0.0)
    }

    pub fn lower_bound(&self, target: f64) -> f64 {
        target - self.band_below
    }

    pub fn upper_bound(&self, target: f64) -> f64 {
        target + self.band_above
    }

    pub fn within_band(&self, load_factor: f64, target: f64) -> bool {
        load_factor >= self.lower_bound(target) && load_factor <= self.upper_bound(target)
    }
}

/// Apply the prioritized cascade; the first matching rule decides.
pub fn classify(
    record: &FlightRecord,
    pacing: &PacingMetrics,
    target: f64,
    policy: &ClassificationPolicy,
    curve: &BookingCurve,
) -> FlightStatus {
    if record.departed {
        return FlightStatus::Departed;
    }

    let days = record.days_to_flight;
    let lf = record.load_factor_pct;
    let sold_yesterday = record.sold_yesterday;
    let needed = pacing.daily_needed;
    let diff = pacing.diff_vs_plan;
    let threshold = policy.deviation_threshold(needed);
    let gate = policy.load_factor_gate;
    let low_demand = policy.low_demand_shortcut && needed < policy.low_demand_daily_needed;

    if policy.far_out_bucket
        && days > policy.far_out_days
        && needed < policy.far_out_max_daily_needed
        && sold_yesterday <= needed
        && (!gate || curve.within_band(lf, target))
    {
        return FlightStatus::FarOut;
    }

    let on_track = if gate {
        low_demand
            || (sold_yesterday == 0.0 && lf > policy.sellout_load_factor)
            || (diff.abs() <= threshold && curve.within_band(lf, target))
            || (lf > policy.early_strong_load_factor && days > policy.early_strong_days)
    } else {
        low_demand || diff.abs() <= threshold
    };
    if on_track {
        return FlightStatus::OnTrack;
    }

    if diff > threshold
        && (!gate || lf <= curve.upper_bound(target) || days > policy.late_window_days)
    {
        return FlightStatus::Oversold;
    }

    if diff < -threshold {
        if !gate || !policy.moderate_lag {
            return FlightStatus::Behind;
        }
        if lf < curve.lower_bound(target) && days <= policy.late_window_days {
            return FlightStatus::Behind;
        }
        return FlightStatus::ModerateLag;
    }

    FlightStatus::OnTrack
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub source: String,
    pub today: NaiveDate,
    pub flights: Vec<ClassifiedFlight>,
    pub drops: DropCounts,
}

impl AnalysisReport {
    pub fn count(&self, status: FlightStatus) -> usize {
        self.flights.iter().filter(|f| f.status == status).count()
    }

    pub fn needs_attention(&self) -> impl Iterator<Item = &ClassifiedFlight> + '_ {
        self.flights.iter().filter(|f| f.status.needs_attention())
    }

    /// Attention flights, worst deviation first.
    pub fn most_lagging(&self, limit: usize) -> Vec<&ClassifiedFlight> {
        let mut lagging: Vec<&ClassifiedFlight> = self
            .flights
            .iter()
            .filter(|f| matches!(f.status, FlightStatus::Behind | FlightStatus::ModerateLag))
            .collect();
        lagging.sort_by(|a, b| {
            a.pacing
                .diff_vs_plan
                .partial_cmp(&b.pacing.diff_vs_plan)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        lagging.truncate(limit);
        lagging
    }
}

pub struct PacingAnalyzer<'a> {
    pub policy: &'a ClassificationPolicy,
    pub curve: &'a BookingCurve,
    pub today: NaiveDate,
}

impl<'a> PacingAnalyzer<'a> {
    pub fn new(policy: &'a ClassificationPolicy, curve: &'a BookingCurve, today: NaiveDate) -> Self {
        Self { policy, curve, today }
    }

    pub fn classify_record(&self, record: FlightRecord) -> ClassifiedFlight {
        let pacing = compute_pacing(&record);
        let target_load_factor = self.curve.target_load_factor(record.days_to_flight);
        let status = classify(&record, &pacing, target_load_factor, self.policy, self.curve);
        ClassifiedFlight {
            record,
            pacing,
            target_load_factor,
            status,
        }
    }

    /// Run the whole pipeline over one canonical table.
    pub fn analyze_table(&self, table: &CanonicalTable) -> Result<AnalysisReport> {
        // Step 1: load factor is normalized column-wide, before any row is dropped
        let load_factor_cells: Vec<Option<&str>> = table
            .rows
            .iter()
            .map(|row| row.get(Column::LoadFactor))
            .collect();
        let load_factors = parse_percent_column(&load_factor_cells);

        // Step 2: parse rows, counting every drop by reason
        let parser = RecordParser::new(self.today, self.policy.past_flights);
        let has_available_column = table.has(Column::AvailableSeats);
        let mut drops = DropCounts::default();
        let mut flights = Vec::with_capacity(table.rows.len());

        for (row, load_factor) in table.rows.iter().zip(load_factors) {
            match parser.parse(row, load_factor, has_available_column) {
                // Step 3: pacing and classification
                Ok(record) => flights.push(self.classify_record(record)),
                Err(reason) => {
                    debug!(source = %table.source, line = row.line, %reason, "row dropped");
                    drops.record(reason);
                }
            }
        }

        for (reason, count) in drops.iter() {
            warn!(source = %table.source, %reason, count, "rows excluded from analysis");
        }

        if flights.is_empty() {
            return Err(PacingError::EmptyResult { drops });
        }

        info!(
            source = %table.source,
            flights = flights.len(),
            dropped = drops.total(),
            "classified flights"
        );

        Ok(AnalysisReport {
            source: table.source.clone(),
            today: self.today,
            flights,
            drops,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SalesBuckets;

    fn record(available: f64, total: f64, yesterday: f64, days: i64, lf: f64) -> FlightRecord {
        FlightRecord {
            raw_flight_key: "2026.10.24 - 101 - SVO-LED".to_string(),
            flight_date: NaiveDate::from_ymd_opt(2026, 10, 24).unwrap(),
            flight_number: "101".to_string(),
            route: "SVO-LED".to_string(),
            total_seats: total,
            available_seats: available,
            sold_yesterday: yesterday,
            load_factor_pct: lf,
            days_to_flight: days,
            departed: false,
            sales: SalesBuckets::default(),
        }
    }

    fn run(record: FlightRecord, policy: &ClassificationPolicy) -> ClassifiedFlight {
        let curve = BookingCurve::default();
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        PacingAnalyzer::new(policy, &curve, today).classify_record(record)
    }

    fn status(record: FlightRecord) -> FlightStatus {
        run(record, &ClassificationPolicy::full()).status
    }

    #[test]
    fn curve_steps() {
        let curve = BookingCurve::default();
        assert_eq!(curve.target_load_factor(90), 30.0);
        assert_eq!(curve.target_load_factor(61), 30.0);
        assert_eq!(curve.target_load_factor(60), 50.0);
        assert_eq!(curve.target_load_factor(31), 50.0);
        assert_eq!(curve.target_load_factor(30), 70.0);
        assert_eq!(curve.target_load_factor(8), 70.0);
        assert_eq!(curve.target_load_factor(7), 85.0);
        assert_eq!(curve.target_load_factor(1), 85.0);
    }

    #[test]
    fn curve_without_short_step_uses_closest() {
        let curve = BookingCurve {
            steps: vec![CurveStep { from_days: 10, target_load_factor: 60.0 }],
            ..BookingCurve::default()
        };
        assert_eq!(curve.target_load_factor(3), 60.0);
    }

    #[test]
    fn band_is_asymmetric() {
        let curve = BookingCurve::default();
        assert!(curve.within_band(60.0, 70.0));
        assert!(curve.within_band(85.0, 70.0));
        assert!(!curve.within_band(59.9, 70.0));
        assert!(!curve.within_band(85.1, 70.0));
    }

    #[test]
    fn scenario_nearly_full_flight_is_on_track() {
        let flight = run(record(3.0, 227.0, 4.0, 5, 98.7), &ClassificationPolicy::full());
        assert_eq!(flight.pacing.sold_total, 224.0);
        assert!((flight.pacing.daily_needed - 0.6).abs() < 1e-9);
        assert!((flight.pacing.diff_vs_plan - 3.4).abs() < 1e-9);
        assert_eq!(flight.status, FlightStatus::OnTrack);
    }

    #[test]
    fn scenario_low_daily_need_wins_over_large_deviation() {
        let flight = run(record(100.0, 150.0, 40.0, 40, 20.0), &ClassificationPolicy::full());
        assert_eq!(flight.pacing.daily_needed, 2.5);
        assert_eq!(flight.pacing.diff_vs_plan, 37.5);
        assert_eq!(flight.status, FlightStatus::OnTrack);
    }

    #[test]
    fn scenario_no_sales_but_nearly_sold_out() {
        // LF 95 is above the far-out band, so the sell-out rule decides
        assert_eq!(status(record(120.0, 200.0, 0.0, 45, 95.0)), FlightStatus::OnTrack);
    }

    #[test]
    fn scenario_late_and_low_load_factor_is_behind() {
        let flight = run(record(50.0, 100.0, 2.0, 5, 50.0), &ClassificationPolicy::full());
        assert_eq!(flight.pacing.daily_needed, 10.0);
        assert_eq!(flight.pacing.diff_vs_plan, -8.0);
        assert_eq!(flight.target_load_factor, 85.0);
        assert_eq!(flight.status, FlightStatus::Behind);
    }

    #[test]
    fn far_out_when_demand_is_light_and_curve_is_met() {
        // 35 days: target 50, needed 105/35 = 3.0
        assert_eq!(status(record(105.0, 180.0, 2.0, 35, 45.0)), FlightStatus::FarOut);
        // selling faster than needed is not "far out"
        assert_eq!(status(record(105.0, 180.0, 3.5, 35, 45.0)), FlightStatus::OnTrack);
    }

    #[test]
    fn oversold_when_selling_well_above_need() {
        // 20 days: target 70, needed 200/20 = 10, threshold 5, diff 4
        assert_eq!(status(record(200.0, 300.0, 14.0, 20, 40.0)), FlightStatus::OnTrack);
        // diff 12 > 5, LF 40 <= 85
        assert_eq!(status(record(200.0, 300.0, 22.0, 20, 40.0)), FlightStatus::Oversold);
    }

    #[test]
    fn close_in_overheating_is_not_oversold() {
        // 5 days: target 85, upper bound 100
        assert_eq!(status(record(50.0, 400.0, 20.0, 5, 100.0)), FlightStatus::Oversold);
        // target 60: LF 79 is above the band and departure is within 10 days
        let policy = ClassificationPolicy::full();
        let curve = BookingCurve {
            steps: vec![CurveStep { from_days: 0, target_load_factor: 60.0 }],
            ..BookingCurve::default()
        };
        let r = record(50.0, 400.0, 20.0, 5, 79.0);
        let pacing = compute_pacing(&r);
        assert_eq!(classify(&r, &pacing, 60.0, &policy, &curve), FlightStatus::OnTrack);
    }

    #[test]
    fn lag_far_from_departure_is_moderate() {
        // 20 days: target 70, needed 10, diff -9, LF 40 < 60 but days > 10
        assert_eq!(status(record(200.0, 300.0, 1.0, 20, 40.0)), FlightStatus::ModerateLag);
        // close in, LF within reach of target
        assert_eq!(status(record(50.0, 100.0, 2.0, 5, 76.0)), FlightStatus::ModerateLag);
    }

    #[test]
    fn reduced_policy_ignores_load_factor() {
        let policy = ClassificationPolicy::reduced();
        // would be MODERATE_LAG with the full cascade
        let flight = run(record(200.0, 300.0, 1.0, 20, 40.0), &policy);
        assert_eq!(flight.status, FlightStatus::Behind);
        // LF > 90 with no sales yesterday no longer rescues a lagging flight
        let flight = run(record(50.0, 100.0, 0.0, 5, 95.0), &policy);
        assert_eq!(flight.status, FlightStatus::Behind);
        // far out is still reported
        let flight = run(record(105.0, 180.0, 2.0, 35, 0.0), &policy);
        assert_eq!(flight.status, FlightStatus::FarOut);
    }

    #[test]
    fn minimal_policy_uses_three_labels() {
        let policy = ClassificationPolicy::minimal();
        let flight = run(record(105.0, 180.0, 2.0, 35, 45.0), &policy);
        assert_eq!(flight.status, FlightStatus::OnTrack);
        let flight = run(record(200.0, 300.0, 22.0, 20, 40.0), &policy);
        assert_eq!(flight.status, FlightStatus::Oversold);
    }

    #[test]
    fn reduced_policies_judge_low_demand_flights_by_deviation() {
        let r = record(100.0, 150.0, 40.0, 40, 20.0);
        assert_eq!(run(r.clone(), &ClassificationPolicy::full()).status, FlightStatus::OnTrack);
        assert_eq!(run(r.clone(), &ClassificationPolicy::reduced()).status, FlightStatus::Oversold);
        assert_eq!(run(r, &ClassificationPolicy::minimal()).status, FlightStatus::Oversold);
    }

    #[test]
    fn minimal_policy_without_tolerance_is_a_sign_rule() {
        let policy = ClassificationPolicy {
            min_deviation: 0.0,
            deviation_share: 0.0,
            ..ClassificationPolicy::minimal()
        };
        // 20 days out, 200 seats left: 10 a day needed
        assert_eq!(run(record(200.0, 300.0, 10.0, 20, 40.0), &policy).status, FlightStatus::OnTrack);
        assert_eq!(run(record(200.0, 300.0, 11.0, 20, 40.0), &policy).status, FlightStatus::Oversold);
        assert_eq!(run(record(200.0, 300.0, 9.0, 20, 40.0), &policy).status, FlightStatus::Behind);
        // light demand no longer hides a swing
        assert_eq!(run(record(20.0, 300.0, 0.0, 20, 40.0), &policy).status, FlightStatus::Behind);
    }

    #[test]
    fn departed_flights_get_their_own_status() {
        let mut r = record(10.0, 100.0, 0.0, 1, 90.0);
        r.departed = true;
        assert_eq!(status(r), FlightStatus::Departed);
    }

    #[test]
    fn classification_is_order_independent() {
        let records = vec![
            record(3.0, 227.0, 4.0, 5, 98.7),
            record(50.0, 100.0, 2.0, 5, 50.0),
            record(200.0, 300.0, 22.0, 20, 40.0),
            record(105.0, 180.0, 2.0, 35, 45.0),
        ];
        let forward: Vec<FlightStatus> = records.iter().cloned().map(status).collect();
        let mut backward: Vec<FlightStatus> = records.iter().rev().cloned().map(status).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }
}
