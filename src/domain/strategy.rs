//! Strategy configuration and signal pipeline.
//!
//! A strategy names which indicators to compute and which signal mode turns
//! them into actions. `generate_signals` runs the indicator engine and the
//! signal generator and returns every intermediate series for export and
//! charting.

use std::fmt;

use crate::domain::error::SqzError;
use crate::domain::indicator::bollinger::calculate_bollinger;
use crate::domain::indicator::ema::calculate_ema;
use crate::domain::indicator::keltner::calculate_keltner;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::squeeze::{calculate_squeeze, calculate_squeeze_momentum};
use crate::domain::indicator::{
    FlagSeries, IndicatorSeries, MomentumNormalization, RangeKind, StddevKind,
};
use crate::domain::ohlcv::PriceBar;
use crate::domain::signal::{SignalPoint, crossover_signals, threshold_signals};

/// 10 days of 5-minute bars.
pub const DEFAULT_SHORT_PERIOD: usize = 10 * 24 * 12;
/// 20 days of 5-minute bars.
pub const DEFAULT_LONG_PERIOD: usize = 20 * 24 * 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaKind {
    Sma,
    Ema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovingAverage {
    pub kind: MaKind,
    pub period: usize,
}

impl MovingAverage {
    pub fn sma(period: usize) -> Self {
        Self {
            kind: MaKind::Sma,
            period,
        }
    }

    pub fn ema(period: usize) -> Self {
        Self {
            kind: MaKind::Ema,
            period,
        }
    }

    pub fn calculate(&self, bars: &[PriceBar]) -> IndicatorSeries {
        match self.kind {
            MaKind::Sma => calculate_sma(bars, self.period),
            MaKind::Ema => calculate_ema(bars, self.period),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqueezeParams {
    pub bb_period: usize,
    pub bb_mult_x100: u32,
    pub kc_period: usize,
    pub kc_mult_x100: u32,
    pub atr_period: usize,
    pub range: RangeKind,
    pub stddev: StddevKind,
    pub momentum_period: usize,
    pub threshold: f64,
    pub normalization: MomentumNormalization,
}

impl Default for SqueezeParams {
    fn default() -> Self {
        SqueezeParams {
            bb_period: 20,
            bb_mult_x100: 200,
            kc_period: 20,
            kc_mult_x100: 200,
            atr_period: 14,
            range: RangeKind::TrueRange,
            stddev: StddevKind::Sample,
            momentum_period: 20,
            threshold: 0.5,
            normalization: MomentumNormalization::Expanding,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyMode {
    Crossover {
        short: MovingAverage,
        long: MovingAverage,
    },
    Squeeze(SqueezeParams),
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyMode::Crossover { .. } => write!(f, "crossover"),
            StrategyMode::Squeeze(_) => write!(f, "squeeze"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub mode: StrategyMode,
}

impl Strategy {
    /// Bars needed before every indicator the strategy reads is defined.
    pub fn warmup_bars(&self) -> usize {
        match &self.mode {
            StrategyMode::Crossover { short, long } => short.period.max(long.period),
            StrategyMode::Squeeze(p) => {
                let atr_warmup = match p.range {
                    RangeKind::TrueRange => p.atr_period + 1,
                    RangeKind::HighLow => p.atr_period,
                };
                let momentum_warmup = (2 * p.momentum_period).saturating_sub(1);
                p.bb_period
                    .max(p.kc_period)
                    .max(atr_warmup)
                    .max(momentum_warmup)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    /// Series on the price scale (moving averages, bands).
    pub overlays: Vec<IndicatorSeries>,
    /// Series on their own scale (momentum).
    pub oscillators: Vec<IndicatorSeries>,
    pub flags: Vec<FlagSeries>,
    pub signals: Vec<SignalPoint>,
}

pub fn generate_signals(bars: &[PriceBar], strategy: &Strategy) -> Result<StrategyOutput, SqzError> {
    match &strategy.mode {
        StrategyMode::Crossover { short, long } => {
            let short_series = short.calculate(bars);
            let long_series = long.calculate(bars);
            let signals = crossover_signals(&short_series, &long_series)?;
            Ok(StrategyOutput {
                overlays: vec![short_series, long_series],
                oscillators: Vec::new(),
                flags: Vec::new(),
                signals,
            })
        }
        StrategyMode::Squeeze(p) => {
            let bb = calculate_bollinger(bars, p.bb_period, p.bb_mult_x100, p.stddev);
            let kc = calculate_keltner(bars, p.kc_period, p.atr_period, p.kc_mult_x100, p.range);
            let squeeze = calculate_squeeze(&bb, &kc)?;
            let momentum = calculate_squeeze_momentum(bars, p.momentum_period, p.normalization);
            let signals = threshold_signals(&squeeze.on, &momentum, p.threshold)?;
            Ok(StrategyOutput {
                overlays: vec![bb.upper, bb.middle, bb.lower, kc.upper, kc.lower],
                oscillators: vec![momentum],
                flags: vec![squeeze.on, squeeze.off],
                signals,
            })
        }
    }
}
