//! Standard Deviation indicator.
//!
//! Deviation of the trailing n closes around their mean, either population
//! (divide by n) or sample (divide by n-1).
//! Warmup: first (n-1) bars are undefined. Sample stddev with n=1 is undefined
//! everywhere.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, StddevKind, rolling};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_stddev(bars: &[PriceBar], period: usize, kind: StddevKind) -> IndicatorSeries {
    let indicator_type = IndicatorType::Stddev { period, kind };
    if period == 0 || bars.is_empty() {
        return IndicatorSeries::empty(indicator_type);
    }

    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    IndicatorSeries::from_parts(
        indicator_type,
        bars.iter().map(|b| b.time),
        rolling_stddev(&closes, period, kind),
    )
}

pub(crate) fn rolling_stddev(
    values: &[Option<f64>],
    period: usize,
    kind: StddevKind,
) -> Vec<Option<f64>> {
    let divisor = match kind {
        StddevKind::Population => period as f64,
        StddevKind::Sample if period > 1 => (period - 1) as f64,
        StddevKind::Sample => return vec![None; values.len()],
    };

    rolling(values, period, |window| {
        let mean = window.iter().sum::<f64>() / period as f64;
        let sum_sq: f64 = window
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum();
        (sum_sq / divisor).sqrt()
    })
}
