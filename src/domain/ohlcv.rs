//! Price candle representation.

use crate::domain::error::SqzError;
use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn high_low_range(&self) -> f64 {
        self.high - self.low
    }
}

/// Checks that bars are strictly ascending by time (which also rules out
/// duplicate timestamps).
pub fn validate_series(bars: &[PriceBar]) -> Result<(), SqzError> {
    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].time <= pair[0].time {
            return Err(SqzError::UnsortedSeries {
                index: i + 1,
                time: pair[1].time,
            });
        }
    }
    Ok(())
}

/// Sorts bars ascending and keeps the first bar seen for each timestamp.
pub fn sort_and_dedup(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.sort_by_key(|b| b.time);
    bars.dedup_by_key(|b| b.time);
    bars
}

/// Inclusive calendar-day bounds; `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, time: NaiveDateTime) -> bool {
        let day = time.date();
        self.start.is_none_or(|s| day >= s) && self.end.is_none_or(|e| day <= e)
    }
}
