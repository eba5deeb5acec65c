//! Core domain types and logic: indicators, signals and the backtest engine.

pub mod ohlcv;
pub mod timeline;
pub mod indicator;
pub mod signal;
pub mod backtest;
pub mod metrics;
pub mod strategy;
pub mod config_validation;
pub mod error;

#[cfg(test)]
pub mod test_support;
