//! Bar builders shared by unit tests.

use crate::domain::ohlcv::PriceBar;
use chrono::{Duration, NaiveDate, NaiveDateTime};

pub fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::hours(i as i64)
}

/// Hourly bars with open = high = low = close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            time: ts(i),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect()
}

/// Hourly bars from (high, low, close) triples; open = close.
pub fn bars_from_hlc(rows: &[(f64, f64, f64)]) -> Vec<PriceBar> {
    rows.iter()
        .enumerate()
        .map(|(i, &(high, low, close))| PriceBar {
            time: ts(i),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        })
        .collect()
}
