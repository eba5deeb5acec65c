//! Squeeze detection and squeeze momentum.
//!
//! Squeeze on: Bollinger Bands sit fully inside the Keltner Channel
//! (lower_bb > lower_kc && upper_bb < upper_kc). Squeeze off is the mirror
//! (lower_bb < lower_kc && upper_bb > upper_kc). Both are undefined wherever a
//! band is undefined.
//!
//! Momentum source: close - SMA(typical price, n). The raw momentum at bar i is
//! the least-squares line through the trailing n source values, evaluated at
//! the window's last point. The raw series is then scaled by a max absolute
//! value chosen by `MomentumNormalization`.

use crate::domain::error::SqzError;
use crate::domain::indicator::{
    Bands, FlagPoint, FlagSeries, IndicatorSeries, IndicatorType, MomentumNormalization, rolling,
    rolling_mean,
};
use crate::domain::ohlcv::PriceBar;
use crate::domain::timeline::check_aligned;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct Squeeze {
    pub on: FlagSeries,
    pub off: FlagSeries,
}

pub fn calculate_squeeze(bollinger: &Bands, keltner: &Bands) -> Result<Squeeze, SqzError> {
    check_aligned(&bollinger.upper, &keltner.upper)?;
    check_aligned(&bollinger.lower, &keltner.lower)?;
    check_aligned(&bollinger.upper, &bollinger.lower)?;

    let mut on = Vec::with_capacity(bollinger.upper.len());
    let mut off = Vec::with_capacity(bollinger.upper.len());

    for i in 0..bollinger.upper.len() {
        let time = bollinger.upper.values[i].time;
        let bands = (
            bollinger.lower.get(i),
            bollinger.upper.get(i),
            keltner.lower.get(i),
            keltner.upper.get(i),
        );
        let (is_on, is_off) = match bands {
            (Some(lower_bb), Some(upper_bb), Some(lower_kc), Some(upper_kc)) => (
                Some(lower_bb > lower_kc && upper_bb < upper_kc),
                Some(lower_bb < lower_kc && upper_bb > upper_kc),
            ),
            _ => (None, None),
        };
        on.push(FlagPoint { time, value: is_on });
        off.push(FlagPoint { time, value: is_off });
    }

    Ok(Squeeze {
        on: FlagSeries {
            name: "SQUEEZE_ON".to_string(),
            values: on,
        },
        off: FlagSeries {
            name: "SQUEEZE_OFF".to_string(),
            values: off,
        },
    })
}

pub fn calculate_squeeze_momentum(
    bars: &[PriceBar],
    period: usize,
    normalization: MomentumNormalization,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::SqueezeMomentum {
        period,
        normalization,
    };
    if period == 0 || bars.is_empty() {
        return IndicatorSeries::empty(indicator_type);
    }

    let typical: Vec<Option<f64>> = bars.iter().map(|b| Some(b.typical_price())).collect();
    let source: Vec<Option<f64>> = rolling_mean(&typical, period)
        .into_iter()
        .zip(bars)
        .map(|(avg, bar)| avg.map(|avg| bar.close - avg))
        .collect();

    let raw = rolling(&source, period, linreg_last);
    let values = normalize(&raw, normalization);

    IndicatorSeries::from_parts(indicator_type, bars.iter().map(|b| b.time), values)
}

/// Least-squares fit over x = 0..n-1, evaluated at x = n-1.
fn linreg_last(window: &[f64]) -> f64 {
    let n = window.len() as f64;
    if window.len() < 2 {
        return window.first().copied().unwrap_or(0.0);
    }

    let sum_x = n * (n - 1.0) / 2.0;
    let sum_x2 = (n - 1.0) * n * (2.0 * n - 1.0) / 6.0;
    let (sum_y, sum_xy) = window
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sy, sxy), (x, &y)| (sy + y, sxy + x as f64 * y));

    let slope = (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x);
    let intercept = (sum_y - slope * sum_x) / n;
    intercept + slope * (n - 1.0)
}

fn scale(value: f64, max_abs: f64) -> f64 {
    if max_abs > 0.0 { value / max_abs } else { 0.0 }
}

fn normalize(raw: &[Option<f64>], normalization: MomentumNormalization) -> Vec<Option<f64>> {
    match normalization {
        MomentumNormalization::WholeSeries => {
            let max_abs = raw.iter().flatten().fold(0.0_f64, |m, v| m.max(v.abs()));
            raw.iter().map(|v| v.map(|v| scale(v, max_abs))).collect()
        }
        MomentumNormalization::Expanding => {
            let mut max_abs = 0.0_f64;
            raw.iter()
                .map(|v| {
                    v.map(|v| {
                        max_abs = max_abs.max(v.abs());
                        scale(v, max_abs)
                    })
                })
                .collect()
        }
        MomentumNormalization::Trailing(window) => {
            let window = window.max(1);
            let mut recent: VecDeque<f64> = VecDeque::with_capacity(window);
            raw.iter()
                .map(|v| {
                    v.map(|v| {
                        if recent.len() == window {
                            recent.pop_front();
                        }
                        recent.push_back(v.abs());
                        let max_abs = recent.iter().fold(0.0_f64, |m, x| m.max(*x));
                        scale(v, max_abs)
                    })
                })
                .collect()
        }
    }
}
