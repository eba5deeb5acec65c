//! Bollinger Bands indicator.
//!
//! - Middle: SMA of close over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! The deviation kind is caller-specified; pandas-style rolling std is
//! `StddevKind::Sample`.
//! Warmup: first (period-1) bars are undefined.

use crate::domain::indicator::stddev::rolling_stddev;
use crate::domain::indicator::{
    Band, Bands, IndicatorSeries, IndicatorType, StddevKind, mult_from_x100, rolling_mean,
};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_bollinger(
    bars: &[PriceBar],
    period: usize,
    stddev_mult_x100: u32,
    kind: StddevKind,
) -> Bands {
    let band_type = |band| IndicatorType::Bollinger {
        period,
        stddev_mult_x100,
        band,
    };

    if period == 0 || bars.is_empty() {
        return Bands {
            upper: IndicatorSeries::empty(band_type(Band::Upper)),
            middle: IndicatorSeries::empty(band_type(Band::Middle)),
            lower: IndicatorSeries::empty(band_type(Band::Lower)),
        };
    }

    let mult = mult_from_x100(stddev_mult_x100);
    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    let middle = rolling_mean(&closes, period);
    let deviation = rolling_stddev(&closes, period, kind);

    let offset = |sign: f64| -> Vec<Option<f64>> {
        middle
            .iter()
            .zip(&deviation)
            .map(|(m, d)| match (m, d) {
                (Some(m), Some(d)) => Some(m + sign * mult * d),
                _ => None,
            })
            .collect()
    };
    let upper = offset(1.0);
    let lower = offset(-1.0);

    let times = || bars.iter().map(|b| b.time);
    Bands {
        upper: IndicatorSeries::from_parts(band_type(Band::Upper), times(), upper),
        middle: IndicatorSeries::from_parts(band_type(Band::Middle), times(), middle),
        lower: IndicatorSeries::from_parts(band_type(Band::Lower), times(), lower),
    }
}
