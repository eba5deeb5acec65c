//! Exponential Moving Average indicator.
//!
//! alpha = 2/(span+1), seeded with the first close, then
//! EMA[i] = C[i]*alpha + EMA[i-1]*(1-alpha).
//! The recursion runs from bar 0; the first (span-1) bars are reported undefined.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_ema(bars: &[PriceBar], span: usize) -> IndicatorSeries {
    if span == 0 || bars.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Ema(span));
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut values = Vec::with_capacity(bars.len());
    let mut ema = bars[0].close;

    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            ema = bar.close * alpha + ema * (1.0 - alpha);
        }
        values.push(if i + 1 >= span { Some(ema) } else { None });
    }

    IndicatorSeries::from_parts(IndicatorType::Ema(span), bars.iter().map(|b| b.time), values)
}
