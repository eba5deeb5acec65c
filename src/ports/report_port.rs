//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SqzError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::strategy::{Strategy, StrategyOutput};
use std::path::Path;

/// Everything a report may draw on for one run.
pub struct ReportContext<'a> {
    pub product: &'a str,
    pub strategy: &'a Strategy,
    pub bars: &'a [PriceBar],
    pub output: &'a StrategyOutput,
    pub result: &'a BacktestResult,
}

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(&self, ctx: &ReportContext<'_>, output_path: &Path) -> Result<(), SqzError>;
}
