#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
pub use sqztrader::domain::ohlcv::{DateRange, PriceBar};
use sqztrader::domain::error::SqzError;
use sqztrader::domain::strategy::{MovingAverage, Strategy, StrategyMode};
use sqztrader::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, product: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(product.to_string(), bars);
        self
    }

    pub fn with_error(mut self, product: &str, reason: &str) -> Self {
        self.errors.insert(product.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, product: &str, range: &DateRange) -> Result<Vec<PriceBar>, SqzError> {
        if let Some(reason) = self.errors.get(product) {
            return Err(SqzError::Fetch {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(product)
            .map(|bars| bars.iter().filter(|b| range.contains(b.time)).cloned().collect())
            .unwrap_or_default())
    }

    fn list_products(&self) -> Result<Vec<String>, SqzError> {
        let mut products: Vec<String> = self.data.keys().cloned().collect();
        products.sort();
        Ok(products)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn ts(i: usize) -> NaiveDateTime {
    date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap() + Duration::hours(i as i64)
}

pub fn make_bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> PriceBar {
    PriceBar {
        time: ts(i),
        open,
        high,
        low,
        close,
        volume: 1.0,
    }
}

/// Hourly bars with open = high = low = close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(i, c, c, c, c))
        .collect()
}

/// Hourly bars with a fixed spread around each close.
pub fn bars_with_spread(closes: &[f64], spread: f64) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(i, c, c + spread, c - spread, c))
        .collect()
}

/// Quiet sideways drift followed by a strong breakout.
pub fn breakout_closes(quiet: usize, breakout: usize) -> Vec<f64> {
    let mut closes: Vec<f64> = (0..quiet)
        .map(|i| 100.0 + if i % 2 == 0 { 0.05 } else { -0.05 })
        .collect();
    closes.extend((1..=breakout).map(|i| 100.0 + 2.0 * i as f64));
    closes
}

pub fn crossover_strategy(short: usize, long: usize) -> Strategy {
    Strategy {
        name: "Test Crossover".to_string(),
        mode: StrategyMode::Crossover {
            short: MovingAverage::sma(short),
            long: MovingAverage::sma(long),
        },
    }
}
