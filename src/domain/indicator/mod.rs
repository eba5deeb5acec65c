//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: a single point in a numeric indicator series
//! - `IndicatorType`: indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: a numeric series aligned 1:1 with the price bars
//! - `FlagSeries`: a boolean series (squeeze on/off)
//! - `Bands`: upper/middle/lower envelope (Bollinger, Keltner)
//!
//! Warm-up points are `None`, never a numeric zero, so downstream signal logic
//! cannot misfire on a spurious crossing.

pub mod bollinger;
pub mod ema;
pub mod keltner;
pub mod range;
pub mod sma;
pub mod squeeze;
pub mod stddev;

use crate::domain::error::SqzError;
use crate::domain::timeline::Timeline;
use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPoint {
    pub time: NaiveDateTime,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StddevKind {
    /// Divide by N.
    Population,
    /// Divide by N - 1.
    Sample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeKind {
    TrueRange,
    HighLow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Upper,
    Middle,
    Lower,
}

/// How raw squeeze momentum is scaled into [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MomentumNormalization {
    /// Max |raw| over the whole series. Uses future data.
    WholeSeries,
    /// Max |raw| over every point up to and including the current one.
    Expanding,
    /// Max |raw| over the last `n` defined raw values.
    Trailing(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Close,
    Sma(usize),
    Ema(usize),
    Stddev {
        period: usize,
        kind: StddevKind,
    },
    TrueRange,
    AverageRange {
        period: usize,
        kind: RangeKind,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
        band: Band,
    },
    Keltner {
        period: usize,
        atr_period: usize,
        mult_x100: u32,
        band: Band,
    },
    SqueezeMomentum {
        period: usize,
        normalization: MomentumNormalization,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn new(indicator_type: IndicatorType, values: Vec<IndicatorPoint>) -> Self {
        Self {
            indicator_type,
            values,
        }
    }

    pub(crate) fn from_parts(
        indicator_type: IndicatorType,
        times: impl IntoIterator<Item = NaiveDateTime>,
        values: Vec<Option<f64>>,
    ) -> Self {
        let values = times
            .into_iter()
            .zip(values)
            .map(|(time, value)| IndicatorPoint { time, value })
            .collect();
        Self::new(indicator_type, values)
    }

    pub fn empty(indicator_type: IndicatorType) -> Self {
        Self::new(indicator_type, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at `index`, or `None` when undefined or out of range.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).and_then(|p| p.value)
    }

    /// The value at `index`, failing when it is still in the warm-up window.
    pub fn value_at(&self, index: usize) -> Result<f64, SqzError> {
        self.get(index).ok_or_else(|| SqzError::UndefinedValue {
            indicator: self.indicator_type.to_string(),
            index,
        })
    }

    pub fn raw_values(&self) -> Vec<Option<f64>> {
        self.values.iter().map(|p| p.value).collect()
    }

    /// Index of the first defined point.
    pub fn first_defined(&self) -> Option<usize> {
        self.values.iter().position(|p| p.value.is_some())
    }
}

impl Timeline for IndicatorSeries {
    fn label(&self) -> String {
        self.indicator_type.to_string()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn time_at(&self, index: usize) -> NaiveDateTime {
        self.values[index].time
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlagPoint {
    pub time: NaiveDateTime,
    pub value: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlagSeries {
    pub name: String,
    pub values: Vec<FlagPoint>,
}

impl FlagSeries {
    /// True only when the flag is defined and set.
    pub fn is_active(&self, index: usize) -> bool {
        self.values
            .get(index)
            .and_then(|p| p.value)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Timeline for FlagSeries {
    fn label(&self) -> String {
        self.name.clone()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn time_at(&self, index: usize) -> NaiveDateTime {
        self.values[index].time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub upper: IndicatorSeries,
    pub middle: IndicatorSeries,
    pub lower: IndicatorSeries,
}

/// Mean of each trailing window of `period` values. A window containing an
/// undefined value is undefined.
pub(crate) fn rolling_mean(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |window| {
        window.iter().sum::<f64>() / period as f64
    })
}

/// Applies `f` to each complete, fully defined trailing window.
pub(crate) fn rolling<F>(values: &[Option<f64>], period: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let mut window: Vec<f64> = Vec::with_capacity(period);

    for i in 0..values.len() {
        if i + 1 < period {
            out.push(None);
            continue;
        }
        window.clear();
        let complete = values[i + 1 - period..=i].iter().all(|v| match v {
            Some(x) => {
                window.push(*x);
                true
            }
            None => false,
        });
        out.push(if complete { Some(f(&window)) } else { None });
    }

    out
}

pub(crate) fn mult_from_x100(mult_x100: u32) -> f64 {
    mult_x100 as f64 / 100.0
}

/// Converts a floating multiplier (2.0) to the hashable x100 form (200).
///
/// Returns `None` unless the multiplier is positive and exact to hundredths,
/// so the key always reproduces the value the caller asked for.
pub fn mult_to_x100(mult: f64) -> Option<u32> {
    if !mult.is_finite() || mult <= 0.0 {
        return None;
    }
    let scaled = (mult * 100.0).round();
    if scaled < 1.0 || scaled > u32::MAX as f64 {
        return None;
    }
    let x100 = scaled as u32;
    ((mult_from_x100(x100) - mult).abs() <= f64::EPSILON * mult.max(1.0)).then_some(x100)
}

impl fmt::Display for StddevKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StddevKind::Population => write!(f, "population"),
            StddevKind::Sample => write!(f, "sample"),
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Band::Upper => write!(f, "UPPER"),
            Band::Middle => write!(f, "MIDDLE"),
            Band::Lower => write!(f, "LOWER"),
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Close => write!(f, "CLOSE"),
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Stddev { period, kind } => write!(f, "STDDEV({},{})", period, kind),
            IndicatorType::TrueRange => write!(f, "TR"),
            IndicatorType::AverageRange { period, kind } => match kind {
                RangeKind::TrueRange => write!(f, "ATR({})", period),
                RangeKind::HighLow => write!(f, "AHLR({})", period),
            },
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
                band,
            } => write!(
                f,
                "BB_{}({},{})",
                band,
                period,
                mult_from_x100(*stddev_mult_x100)
            ),
            IndicatorType::Keltner {
                period,
                atr_period,
                mult_x100,
                band,
            } => write!(
                f,
                "KC_{}({},{},{})",
                band,
                period,
                atr_period,
                mult_from_x100(*mult_x100)
            ),
            IndicatorType::SqueezeMomentum { period, .. } => write!(f, "SQZMOM({})", period),
        }
    }
}
