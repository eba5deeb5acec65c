//! Signal generation from indicator series.
//!
//! # Semantics
//!
//! - Crossover: `Buy` when short crosses strictly above long
//!   (`short[i] > long[i] && short[i-1] <= long[i-1]`), `Sell` on the mirror,
//!   `Hold` otherwise. Index 0 and any bar touching an undefined value are `Hold`.
//! - Threshold: while the condition flag is active, `Buy` when magnitude > T and
//!   `Sell` when magnitude < -T. Anything else carries no signal at all.
//!
//! Inputs are checked for timestamp alignment before any scanning.

use crate::domain::error::SqzError;
use crate::domain::indicator::{FlagSeries, IndicatorSeries};
use crate::domain::timeline::{Timeline, check_aligned};
use chrono::NaiveDateTime;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "buy"),
            Signal::Sell => write!(f, "sell"),
            Signal::Hold => write!(f, "hold"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalPoint {
    pub time: NaiveDateTime,
    /// `None` means no signal was emitted, which is distinct from `Hold`.
    pub signal: Option<Signal>,
}

impl SignalPoint {
    pub fn is_buy(&self) -> bool {
        self.signal == Some(Signal::Buy)
    }

    pub fn is_sell(&self) -> bool {
        self.signal == Some(Signal::Sell)
    }
}

impl Timeline for [SignalPoint] {
    fn label(&self) -> String {
        "signals".to_string()
    }

    fn len(&self) -> usize {
        <[SignalPoint]>::len(self)
    }

    fn time_at(&self, index: usize) -> NaiveDateTime {
        self[index].time
    }
}

pub fn crossover_signals(
    short: &IndicatorSeries,
    long: &IndicatorSeries,
) -> Result<Vec<SignalPoint>, SqzError> {
    check_aligned(short, long)?;

    let signals: Vec<SignalPoint> = (0..short.len())
        .map(|i| {
            let signal = if i == 0 {
                Signal::Hold
            } else {
                cross_at(short, long, i)
            };
            SignalPoint {
                time: short.values[i].time,
                signal: Some(signal),
            }
        })
        .collect();

    debug!(
        short = %short.indicator_type,
        long = %long.indicator_type,
        buys = signals.iter().filter(|s| s.is_buy()).count(),
        sells = signals.iter().filter(|s| s.is_sell()).count(),
        "crossover scan complete"
    );

    Ok(signals)
}

fn cross_at(short: &IndicatorSeries, long: &IndicatorSeries, i: usize) -> Signal {
    let window = (
        short.get(i - 1),
        long.get(i - 1),
        short.get(i),
        long.get(i),
    );
    let (Some(short_prev), Some(long_prev), Some(short_curr), Some(long_curr)) = window else {
        return Signal::Hold;
    };

    if short_curr > long_curr && short_prev <= long_prev {
        Signal::Buy
    } else if short_curr < long_curr && short_prev >= long_prev {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

pub fn threshold_signals(
    condition: &FlagSeries,
    magnitude: &IndicatorSeries,
    threshold: f64,
) -> Result<Vec<SignalPoint>, SqzError> {
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(SqzError::InvalidThreshold(threshold));
    }
    check_aligned(condition, magnitude)?;

    let signals: Vec<SignalPoint> = (0..magnitude.len())
        .map(|i| {
            let signal = match magnitude.get(i) {
                Some(m) if condition.is_active(i) && m > threshold => Some(Signal::Buy),
                Some(m) if condition.is_active(i) && m < -threshold => Some(Signal::Sell),
                _ => None,
            };
            SignalPoint {
                time: magnitude.values[i].time,
                signal,
            }
        })
        .collect();

    debug!(
        condition = %condition.name,
        magnitude = %magnitude.indicator_type,
        threshold,
        emitted = signals.iter().filter(|s| s.signal.is_some()).count(),
        "threshold scan complete"
    );

    Ok(signals)
}
