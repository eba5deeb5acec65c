//! Simple Moving Average of close.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i]). Warmup: first (n-1) bars are undefined.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, rolling_mean};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_sma(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    if period == 0 || bars.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Sma(period));
    }

    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    IndicatorSeries::from_parts(
        IndicatorType::Sma(period),
        bars.iter().map(|b| b.time),
        rolling_mean(&closes, period),
    )
}

/// Close prices as a fully defined series, for charting and export.
pub fn close_series(bars: &[PriceBar]) -> IndicatorSeries {
    IndicatorSeries::from_parts(
        IndicatorType::Close,
        bars.iter().map(|b| b.time),
        bars.iter().map(|b| Some(b.close)).collect(),
    )
}
