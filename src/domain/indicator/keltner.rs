//! Keltner Channels.
//!
//! Middle = SMA(close, period); bands = Middle ± multiplier × average range over
//! `atr_period`. `RangeKind` picks true range or plain high-low range.

use crate::domain::indicator::range::calculate_average_range;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::{
    Band, Bands, IndicatorSeries, IndicatorType, RangeKind, mult_from_x100,
};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_keltner(
    bars: &[PriceBar],
    period: usize,
    atr_period: usize,
    mult_x100: u32,
    range_kind: RangeKind,
) -> Bands {
    let band_type = |band| IndicatorType::Keltner {
        period,
        atr_period,
        mult_x100,
        band,
    };

    if period == 0 || atr_period == 0 || bars.is_empty() {
        return Bands {
            upper: IndicatorSeries::empty(band_type(Band::Upper)),
            middle: IndicatorSeries::empty(band_type(Band::Middle)),
            lower: IndicatorSeries::empty(band_type(Band::Lower)),
        };
    }

    let mult = mult_from_x100(mult_x100);
    let middle = calculate_sma(bars, period).raw_values();
    let range = calculate_average_range(bars, atr_period, range_kind).raw_values();

    let offset = |sign: f64| -> Vec<Option<f64>> {
        middle
            .iter()
            .zip(&range)
            .map(|(m, r)| match (m, r) {
                (Some(m), Some(r)) => Some(m + sign * mult * r),
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
