use crate::models::{FlightRecord, PacingMetrics, SalesBuckets, SalesSpeed};

/// Days covered by the today/yesterday/2-3/4-6 buckets together.
const RECENT_WINDOW_DAYS: f64 = 7.0;
/// Days covered by the 7-13 bucket.
const PRIOR_WINDOW_DAYS: f64 = 7.0;

/// Derive the hard-block-aware pacing figures for one flight.
pub fn compute_pacing(record: &FlightRecord) -> PacingMetrics {
    let sold_total = (record.total_seats - record.available_seats).max(0.0);
    let remaining_seats = record.available_seats.max(0.0);
    let days = record.days_to_flight as f64;

    let daily_needed = if days > 0.0 && remaining_seats > 0.0 {
        remaining_seats / days
    } else {
        0.0
    };

    PacingMetrics {
        sold_total,
        remaining_seats,
        daily_needed,
        diff_vs_plan: record.sold_yesterday - daily_needed,
        speed: sales_speed(&record.sales, daily_needed),
    }
}

/// Recent-week sales rate against the week before, from the day buckets.
/// `None` when the input carried no bucket columns.
pub fn sales_speed(sales: &SalesBuckets, daily_needed: f64) -> Option<SalesSpeed> {
    if sales.is_empty() {
        return None;
    }

    let recent_sum = [sales.today, sales.yesterday, sales.days_2_3, sales.days_4_6]
        .iter()
        .flatten()
        .sum::<f64>();
    let recent_daily_rate = recent_sum / RECENT_WINDOW_DAYS;

    let prior_sum = match (sales.days_7_13, sales.last_14) {
        (Some(prior), _) => Some(prior),
        (None, Some(last_14)) => Some((last_14 - recent_sum).max(0.0)),
        (None, None) => None,
    };
    let prior_daily_rate = prior_sum.map(|sum| sum / PRIOR_WINDOW_DAYS);

    let speed_ratio = prior_daily_rate
        .filter(|rate| *rate > 0.0)
        .map(|rate| recent_daily_rate / rate);
    let coverage_ratio = (daily_needed > 0.0).then(|| recent_daily_rate / daily_needed);

    Some(SalesSpeed {
        recent_daily_rate,
        prior_daily_rate,
        speed_ratio,
        coverage_ratio,
    })
}
