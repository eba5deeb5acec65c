//! True range and its rolling average.
//!
//! TR[i] = max(H[i]-L[i], |H[i]-C[i-1]|, |L[i]-C[i-1]|), undefined at bar 0.
//! The average range is a plain rolling mean (not Wilder smoothing) of either
//! the true range or the bar's own high-low range, selected by `RangeKind`.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, RangeKind, rolling_mean};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_true_range(bars: &[PriceBar]) -> IndicatorSeries {
    IndicatorSeries::from_parts(
        IndicatorType::TrueRange,
        bars.iter().map(|b| b.time),
        range_values(bars, RangeKind::TrueRange),
    )
}

pub fn calculate_average_range(bars: &[PriceBar], period: usize, kind: RangeKind) -> IndicatorSeries {
    let indicator_type = IndicatorType::AverageRange { period, kind };
    if period == 0 || bars.is_empty() {
        return IndicatorSeries::empty(indicator_type);
    }

    IndicatorSeries::from_parts(
        indicator_type,
        bars.iter().map(|b| b.time),
        rolling_mean(&range_values(bars, kind), period),
    )
}

fn range_values(bars: &[PriceBar], kind: RangeKind) -> Vec<Option<f64>> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| match kind {
            RangeKind::TrueRange if i == 0 => None,
            RangeKind::TrueRange => Some(bar.true_range(bars[i - 1].close)),
            RangeKind::HighLow => Some(bar.high_low_range()),
        })
        .collect()
}
