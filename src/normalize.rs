//! Parsing of locale-formatted numbers and percentages as they come out of
//! spreadsheet exports: `1 234,5`, `98,7%`, `0.987`.

/// Columns whose parsed mean falls below this are treated as fractions.
pub const FRACTION_MEAN_THRESHOLD: f64 = 2.0;

fn strip_noise(text: &str) -> String {
    text.trim()
        .chars()
        .filter(|c| !matches!(c, '\u{a0}' | '\u{202f}' | ' ' | '%'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect()
}

/// Parse a number that may carry spaces, non-breaking spaces, a comma
/// decimal separator or a trailing `%`. `None` when nothing numeric is left.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned = strip_noise(text);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a single percentage value. No fraction detection happens here;
/// see [`parse_percent_column`] for the batch form.
pub fn parse_percent(text: &str) -> Option<f64> {
    parse_number(text).map(clamp_percent)
}

/// Parse a whole load-factor column.
///
/// If the mean of the parsed values is below [`FRACTION_MEAN_THRESHOLD`] the
/// column is assumed to hold fractions (`0.987` for 98.7%) and every value is
/// scaled by 100. The decision is made once for the column, so a column of
/// genuinely tiny percentages is rescaled as well.
pub fn parse_percent_column<S: AsRef<str>>(cells: &[Option<S>]) -> Vec<Option<f64>> {
    let parsed: Vec<Option<f64>> = cells
        .iter()
        .map(|cell| cell.as_ref().and_then(|c| parse_number(c.as_ref())))
        .collect();

    let values: Vec<f64> = parsed.iter().flatten().copied().collect();
    let rescale = if values.is_empty() {
        false
    } else {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        mean < FRACTION_MEAN_THRESHOLD
    };

    parsed
        .into_iter()
        .map(|value| value.map(|v| if rescale { v * 100.0 } else { v }).map(clamp_percent))
        .collect()
}

fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}
