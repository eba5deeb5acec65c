//! Configuration validation.
//!
//! Validates every config field before a run and provides the typed readers
//! the CLI builders use. A key that is absent falls back to its default; a key
//! that is present but malformed is a `ConfigInvalid` error, never silently
//! replaced.

use crate::domain::error::SqzError;
use crate::domain::indicator::{mult_from_x100, mult_to_x100};
use crate::domain::strategy::{DEFAULT_LONG_PERIOD, DEFAULT_SHORT_PERIOD, SqueezeParams};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

/// Candle widths the Coinbase Exchange API accepts, in seconds.
pub const GRANULARITIES: [u32; 6] = [60, 300, 900, 3600, 21600, 86400];

pub const MODES: [&str; 2] = ["crossover", "squeeze"];
pub const MA_KINDS: [&str; 2] = ["sma", "ema"];
pub const RANGE_KINDS: [&str; 2] = ["true_range", "high_low"];
pub const STDDEV_KINDS: [&str; 2] = ["sample", "population"];
pub const NORMALIZATIONS: [&str; 3] = ["expanding", "whole_series", "trailing"];

/// Window used by `normalization = trailing` when none is given.
pub const DEFAULT_NORMALIZATION_WINDOW: usize = 100;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), SqzError> {
    validate_initial_balance(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), SqzError> {
    if let Some(product) = config.get_string("data", "product") {
        if product.trim().is_empty() {
            return Err(SqzError::config_invalid("data", "product", "product must not be empty"));
        }
    }

    let granularity = read_number::<u32>(config, "data", "granularity", 3600)?;
    if !GRANULARITIES.contains(&granularity) {
        return Err(SqzError::config_invalid(
            "data",
            "granularity",
            format!("granularity must be one of {GRANULARITIES:?}"),
        ));
    }

    require_positive_period(config, "data", "days", 30)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), SqzError> {
    match read_choice(config, "strategy", "mode", "crossover", &MODES)?.as_str() {
        "squeeze" => validate_squeeze(config),
        _ => validate_crossover(config),
    }
}

fn validate_initial_balance(config: &dyn ConfigPort) -> Result<(), SqzError> {
    let value = read_number::<f64>(config, "backtest", "initial_balance", 10_000.0)?;
    if !value.is_finite() || value <= 0.0 {
        return Err(SqzError::config_invalid(
            "backtest",
            "initial_balance",
            "initial_balance must be positive",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), SqzError> {
    let start = read_date(config, "backtest", "start")?;
    let end = read_date(config, "backtest", "end")?;

    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(SqzError::config_invalid(
                "backtest",
                "start",
                "start must not be after end",
            ));
        }
    }
    Ok(())
}

fn validate_crossover(config: &dyn ConfigPort) -> Result<(), SqzError> {
    read_choice(config, "strategy", "short_ma", "sma", &MA_KINDS)?;
    read_choice(config, "strategy", "long_ma", "sma", &MA_KINDS)?;
    require_positive_period(config, "strategy", "short_period", DEFAULT_SHORT_PERIOD)?;
    require_positive_period(config, "strategy", "long_period", DEFAULT_LONG_PERIOD)?;
    Ok(())
}

fn validate_squeeze(config: &dyn ConfigPort) -> Result<(), SqzError> {
    let d = SqueezeParams::default();
    let bb_period = require_positive_period(config, "strategy", "bb_period", d.bb_period)?;
    require_positive_period(config, "strategy", "kc_period", d.kc_period)?;
    require_positive_period(config, "strategy", "atr_period", d.atr_period)?;
    require_positive_period(config, "strategy", "momentum_period", d.momentum_period)?;

    read_multiplier(config, "strategy", "bb_mult", d.bb_mult_x100)?;
    read_multiplier(config, "strategy", "kc_mult", d.kc_mult_x100)?;
    require_positive_f64(config, "strategy", "threshold", d.threshold)?;

    read_choice(config, "strategy", "range", "true_range", &RANGE_KINDS)?;
    let stddev = read_choice(config, "strategy", "stddev", "sample", &STDDEV_KINDS)?;
    if stddev == "sample" && bb_period < 2 {
        return Err(SqzError::config_invalid(
            "strategy",
            "bb_period",
            "bb_period must be at least 2 with sample stddev",
        ));
    }

    let normalization =
        read_choice(config, "strategy", "normalization", "expanding", &NORMALIZATIONS)?;
    if normalization == "trailing" {
        require_positive_period(
            config,
            "strategy",
            "normalization_window",
            DEFAULT_NORMALIZATION_WINDOW,
        )?;
    }
    Ok(())
}

fn require_positive_period(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, SqzError> {
    let value = read_number::<usize>(config, section, key, default)?;
    if value == 0 {
        return Err(SqzError::config_invalid(
            section,
            key,
            format!("{key} must be at least 1"),
        ));
    }
    Ok(value)
}

fn require_positive_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, SqzError> {
    let value = read_number::<f64>(config, section, key, default)?;
    if !value.is_finite() || value <= 0.0 {
        return Err(SqzError::config_invalid(
            section,
            key,
            format!("{key} must be positive"),
        ));
    }
    Ok(value)
}

/// Reads a band multiplier in its x100 key form. Multipliers finer than
/// hundredths are rejected rather than rounded.
pub fn read_multiplier(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default_x100: u32,
) -> Result<u32, SqzError> {
    let value = read_number::<f64>(config, section, key, mult_from_x100(default_x100))?;
    mult_to_x100(value).ok_or_else(|| {
        SqzError::config_invalid(
            section,
            key,
            format!("{key} must be positive with at most two decimal places, got {value}"),
        )
    })
}

/// Reads a number, falling back to `default` when the key is absent or blank.
pub fn read_number<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, SqzError> {
    match config.get_string(section, key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            SqzError::config_invalid(section, key, format!("not a valid number: {raw}"))
        }),
        _ => Ok(default),
    }
}

/// Reads a `YYYY-MM-DD` date; absent or blank means no bound.
pub fn read_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, SqzError> {
    match config.get_string(section, key) {
        Some(raw) if !raw.trim().is_empty() => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                SqzError::config_invalid(
                    section,
                    key,
                    format!("invalid {key} format, expected YYYY-MM-DD"),
                )
            }),
        _ => Ok(None),
    }
}

/// Reads a lowercase keyword that must be one of `allowed`.
pub fn read_choice(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: &str,
    allowed: &[&str],
) -> Result<String, SqzError> {
    let value = config
        .get_string(section, key)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string());

    if allowed.contains(&value.as_str()) {
        Ok(value)
    } else {
        Err(SqzError::config_invalid(
            section,
            key,
            format!("expected one of {}, got {value}", allowed.join(", ")),
        ))
    }
}
