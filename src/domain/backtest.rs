//! Single-asset, long-only backtest engine.
//!
//! Two states: `Flat` (all cash) and `Long` (fully invested). Bars are processed
//! in order:
//!
//! - Flat + Buy: all cash becomes shares at the bar's close.
//! - Long + Sell: all shares become cash at the close; the balance is recorded.
//! - Anything else is a no-op.
//!
//! A position still open after the last bar is marked to market at the last
//! close and recorded as a `Liquidation` point.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::domain::error::SqzError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::signal::{Signal, SignalPoint};
use crate::domain::timeline::check_aligned;

pub const DEFAULT_INITIAL_BALANCE: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_balance: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_balance: DEFAULT_INITIAL_BALANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionState {
    Flat { cash: f64 },
    Long { shares: f64 },
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        matches!(self, PositionState::Long { .. })
    }

    pub fn cash(&self) -> f64 {
        match self {
            PositionState::Flat { cash } => *cash,
            PositionState::Long { .. } => 0.0,
        }
    }

    pub fn shares(&self) -> f64 {
        match self {
            PositionState::Flat { .. } => 0.0,
            PositionState::Long { shares } => *shares,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Closed by a sell signal.
    Realized,
    /// Marked to market after the last bar.
    Liquidation,
}

impl CloseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseKind::Realized => "realized",
            CloseKind::Liquidation => "liquidation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "realized" => Some(CloseKind::Realized),
            "liquidation" => Some(CloseKind::Liquidation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalancePoint {
    pub time: NaiveDateTime,
    pub balance: f64,
    pub kind: CloseKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub shares: f64,
    pub pnl: f64,
    pub liquidated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub profit_loss: f64,
    pub trajectory: Vec<BalancePoint>,
    pub trades: Vec<Trade>,
}

struct OpenEntry {
    time: NaiveDateTime,
    price: f64,
    cost: f64,
}

/// Simulation state for one run. Built fresh by `run_backtest`.
pub struct Backtester {
    state: PositionState,
    entry: Option<OpenEntry>,
    trajectory: Vec<BalancePoint>,
    trades: Vec<Trade>,
}

impl Backtester {
    pub fn new(initial_balance: f64) -> Result<Self, SqzError> {
        if !initial_balance.is_finite() || initial_balance <= 0.0 {
            return Err(SqzError::InvalidBalance(initial_balance));
        }
        Ok(Backtester {
            state: PositionState::Flat {
                cash: initial_balance,
            },
            entry: None,
            trajectory: Vec::new(),
            trades: Vec::new(),
        })
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn trajectory(&self) -> &[BalancePoint] {
        &self.trajectory
    }

    /// Applies one bar's signal. `None` and `Hold` leave the state untouched.
    pub fn step(&mut self, bar: &PriceBar, signal: Option<Signal>) -> Result<(), SqzError> {
        match (self.state, signal) {
            (PositionState::Flat { cash }, Some(Signal::Buy)) => {
                if cash <= 0.0 {
                    debug!(time = %bar.time, "no cash to enter with, staying flat");
                    return Ok(());
                }
                if !bar.close.is_finite() || bar.close <= 0.0 {
                    return Err(SqzError::Division {
                        time: bar.time,
                        price: bar.close,
                    });
                }
                let shares = cash / bar.close;
                debug!(time = %bar.time, price = bar.close, shares, "enter long");
                self.state = PositionState::Long { shares };
                self.entry = Some(OpenEntry {
                    time: bar.time,
                    price: bar.close,
                    cost: cash,
                });
            }
            (PositionState::Long { shares }, Some(Signal::Sell)) => {
                let cash = exit_value(bar, shares)?;
                debug!(time = %bar.time, price = bar.close, balance = cash, "exit long");
                self.close_position(bar, shares, cash, CloseKind::Realized);
                self.state = PositionState::Flat { cash };
            }
            _ => {}
        }
        Ok(())
    }

    /// Marks an open position to market at the last bar and produces the result.
    pub fn finish(
        mut self,
        last_bar: Option<&PriceBar>,
        initial_balance: f64,
    ) -> Result<BacktestResult, SqzError> {
        let final_balance = match (self.state, last_bar) {
            (PositionState::Long { shares }, Some(bar)) => {
                let value = exit_value(bar, shares)?;
                debug!(time = %bar.time, price = bar.close, balance = value, "liquidate at end");
                self.close_position(bar, shares, value, CloseKind::Liquidation);
                value
            }
            (state, _) => state.cash(),
        };

        Ok(BacktestResult {
            initial_balance,
            final_balance,
            profit_loss: final_balance - initial_balance,
            trajectory: self.trajectory,
            trades: self.trades,
        })
    }

    fn close_position(&mut self, bar: &PriceBar, shares: f64, proceeds: f64, kind: CloseKind) {
        self.trajectory.push(BalancePoint {
            time: bar.time,
            balance: proceeds,
            kind,
        });
        if let Some(entry) = self.entry.take() {
            self.trades.push(Trade {
                entry_time: entry.time,
                entry_price: entry.price,
                exit_time: bar.time,
                exit_price: bar.close,
                shares,
                pnl: proceeds - entry.cost,
                liquidated: kind == CloseKind::Liquidation,
            });
        }
    }
}

/// Cash received for `shares` at the bar's close. A zero close is a total loss;
/// a negative or non-finite close would leave cash outside `[0, inf)`.
fn exit_value(bar: &PriceBar, shares: f64) -> Result<f64, SqzError> {
    if !bar.close.is_finite() || bar.close < 0.0 {
        return Err(SqzError::InvalidData {
            reason: format!("cannot sell at price {} at {}", bar.close, bar.time),
        });
    }
    Ok(shares * bar.close)
}

/// Runs one backtest over `bars` driven by the aligned `signals`.
///
/// Fails before simulating on a bad balance or misaligned input, and aborts on
/// a buy at a non-positive price or an exit at a negative or non-finite one.
/// No partial result is returned on failure.
pub fn run_backtest(
    bars: &[PriceBar],
    signals: &[SignalPoint],
    config: &BacktestConfig,
) -> Result<BacktestResult, SqzError> {
    let mut backtester = Backtester::new(config.initial_balance)?;
    check_aligned(bars, signals)?;

    for (bar, point) in bars.iter().zip(signals) {
        backtester.step(bar, point.signal)?;
    }

    let result = backtester.finish(bars.last(), config.initial_balance)?;
    info!(
        bars = bars.len(),
        trades = result.trades.len(),
        final_balance = result.final_balance,
        profit_loss = result.profit_loss,
        "backtest complete"
    );
    Ok(result)
}
