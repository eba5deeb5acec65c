//! Summary statistics over a backtest result.

use super::backtest::{BacktestResult, BalancePoint};

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub profit_loss: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub ended_in_position: bool,
}

impl Metrics {
    pub fn compute(result: &BacktestResult) -> Self {
        let initial = result.initial_balance;

        let total_return = if initial > 0.0 {
            result.profit_loss / initial
        } else {
            0.0
        };

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;

        for trade in &result.trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
        }

        let total_trades = result.trades.len();
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Metrics {
            profit_loss: result.profit_loss,
            total_return,
            max_drawdown: compute_drawdown(initial, &result.trajectory),
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            largest_win,
            largest_loss,
            ended_in_position: result.trades.iter().any(|t| t.liquidated),
        }
    }
}

/// Largest peak-to-trough fall of the closed balances, starting from the
/// initial balance.
fn compute_drawdown(initial: f64, trajectory: &[BalancePoint]) -> f64 {
    let mut peak = initial;
    let mut max_dd = 0.0_f64;

    for point in trajectory {
        if point.balance > peak {
            peak = point.balance;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.balance) / peak);
        }
    }

    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{CloseKind, Trade};
    use crate::domain::test_support::ts;
    use approx::assert_relative_eq;

    fn trade(pnl: f64, liquidated: bool) -> Trade {
        Trade {
            entry_time: ts(0),
            entry_price: 100.0,
            exit_time: ts(1),
            exit_price: 100.0 + pnl / 10.0,
            shares: 10.0,
            pnl,
            liquidated,
        }
    }

    fn point(i: usize, balance: f64) -> BalancePoint {
        BalancePoint {
            time: ts(i),
            balance,
            kind: CloseKind::Realized,
        }
    }

    fn result(initial: f64, balances: &[f64], trades: Vec<Trade>) -> BacktestResult {
        let final_balance = balances.last().copied().unwrap_or(initial);
        BacktestResult {
            initial_balance: initial,
            final_balance,
            profit_loss: final_balance - initial,
            trajectory: balances
                .iter()
                .enumerate()
                .map(|(i, &b)| point(i, b))
                .collect(),
            trades,
        }
    }

    #[test]
    fn metrics_empty_result() {
        let m = Metrics::compute(&result(1000.0, &[], vec![]));
        assert_relative_eq!(m.total_return, 0.0);
        assert_eq!(m.total_trades, 0);
        assert_relative_eq!(m.win_rate, 0.0);
        assert_relative_eq!(m.profit_factor, 0.0);
        assert_relative_eq!(m.max_drawdown, 0.0);
    }

    #[test]
    fn metrics_total_return() {
        let m = Metrics::compute(&result(1000.0, &[1200.0], vec![trade(200.0, false)]));
        assert_relative_eq!(m.total_return, 0.2);
        assert_relative_eq!(m.profit_loss, 200.0);
    }

    #[test]
    fn metrics_trade_stats() {
        let trades = vec![
            trade(100.0, false),
            trade(-50.0, false),
            trade(200.0, false),
            trade(0.0, true),
        ];
        let m = Metrics::compute(&result(1000.0, &[1250.0], trades));
        assert_eq!(m.trades_won, 2);
        assert_eq!(m.trades_lost, 1);
        assert_eq!(m.trades_breakeven, 1);
        assert_relative_eq!(m.win_rate, 0.5);
        assert_relative_eq!(m.profit_factor, 6.0);
        assert_relative_eq!(m.largest_win, 200.0);
        assert_relative_eq!(m.largest_loss, 50.0);
        assert!(m.ended_in_position);
    }

    #[test]
    fn metrics_profit_factor_without_losses() {
        let m = Metrics::compute(&result(1000.0, &[1100.0], vec![trade(100.0, false)]));
        assert!(m.profit_factor.is_infinite());
    }

    #[test]
    fn drawdown_counts_from_initial_balance() {
        let dd = compute_drawdown(1000.0, &[point(0, 800.0), point(1, 1200.0), point(2, 900.0)]);
        assert_relative_eq!(dd, 0.25);
    }

    #[test]
    fn drawdown_zero_when_monotonic() {
        let dd = compute_drawdown(100.0, &[point(0, 110.0), point(1, 120.0)]);
        assert_relative_eq!(dd, 0.0);
    }
}
