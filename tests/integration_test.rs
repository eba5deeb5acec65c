//! End-to-end pipeline tests: prices -> indicators -> signals -> backtest.

mod common;

use approx::assert_relative_eq;
use common::*;
use proptest::prelude::*;
use sqztrader::adapters::csv_adapter::{
    CsvAdapter, CsvReportAdapter, read_trajectory, write_bars, write_indicators, write_trajectory,
};
use sqztrader::cli::run_pipeline;
use sqztrader::domain::backtest::{BacktestConfig, BalancePoint, CloseKind, run_backtest};
use sqztrader::domain::error::SqzError;
use sqztrader::domain::indicator::bollinger::calculate_bollinger;
use sqztrader::domain::indicator::keltner::calculate_keltner;
use sqztrader::domain::indicator::sma::calculate_sma;
use sqztrader::domain::indicator::squeeze::calculate_squeeze_momentum;
use sqztrader::domain::indicator::stddev::calculate_stddev;
use sqztrader::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, MomentumNormalization, RangeKind, StddevKind,
};
use sqztrader::domain::metrics::Metrics;
use sqztrader::domain::signal::{Signal, SignalPoint, crossover_signals};
use sqztrader::domain::strategy::{SqueezeParams, Strategy, StrategyMode, generate_signals};
use sqztrader::ports::data_port::DataPort;
use sqztrader::ports::report_port::{ReportContext, ReportPort};

fn series(indicator_type: IndicatorType, values: &[f64]) -> IndicatorSeries {
    IndicatorSeries::new(
        indicator_type,
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| IndicatorPoint {
                time: ts(i),
                value: Some(v),
            })
            .collect(),
    )
}

fn squeeze_strategy(normalization: MomentumNormalization) -> Strategy {
    Strategy {
        name: "Test Squeeze".to_string(),
        mode: StrategyMode::Squeeze(SqueezeParams {
            normalization,
            ..SqueezeParams::default()
        }),
    }
}

// ===========================================================================
// Crossover
// ===========================================================================

#[test]
fn short_crossing_above_long_buys_on_crossing_bar() {
    let short = series(IndicatorType::Sma(1), &[1.0, 1.0, 3.0, 3.0]);
    let long = series(IndicatorType::Sma(4), &[2.0, 2.0, 2.0, 2.0]);

    let signals: Vec<Option<Signal>> = crossover_signals(&short, &long)
        .unwrap()
        .iter()
        .map(|s| s.signal)
        .collect();

    assert_eq!(
        signals,
        vec![
            Some(Signal::Hold),
            Some(Signal::Hold),
            Some(Signal::Buy),
            Some(Signal::Hold)
        ]
    );
}

#[test]
fn crossover_pipeline_trades_once() {
    let closes = [
        10.0, 9.0, 8.0, 7.0, 6.0, 7.0, 9.0, 11.0, 13.0, 12.0, 10.0, 8.0, 6.0,
    ];
    let data = MockDataPort::new().with_bars("BTC-USD", bars_from_closes(&closes));
    let strategy = crossover_strategy(2, 4);
    let config = BacktestConfig {
        initial_balance: 1000.0,
    };

    let run = run_pipeline(&data, "BTC-USD", &DateRange::default(), &strategy, &config).unwrap();

    // SMA2 crosses above SMA4 at bar 6 (close 9) and back below at bar 10 (close 10)
    assert!(run.output.signals[6].is_buy());
    assert!(run.output.signals[10].is_sell());
    assert_eq!(run.result.trades.len(), 1);
    assert_relative_eq!(run.result.final_balance, 1000.0 / 9.0 * 10.0, epsilon = 1e-9);
    assert_eq!(run.result.trajectory.len(), 1);
    assert_eq!(run.result.trajectory[0].kind, CloseKind::Realized);
    assert_eq!(run.metrics.trades_won, 1);
    assert!(!run.metrics.ended_in_position);
}

#[test]
fn pipeline_respects_date_range() {
    let closes: Vec<f64> = (0..72).map(|i| 100.0 + i as f64).collect();
    let data = MockDataPort::new().with_bars("ETH-USD", bars_from_closes(&closes));
    let range = DateRange::new(Some(date(2024, 1, 2)), Some(date(2024, 1, 2)));

    let run = run_pipeline(
        &data,
        "ETH-USD",
        &range,
        &crossover_strategy(2, 4),
        &BacktestConfig::default(),
    )
    .unwrap();

    assert_eq!(run.bars.len(), 24);
    assert_eq!(run.bars[0].time, ts(24));
}

#[test]
fn pipeline_with_no_bars_is_no_data() {
    let data = MockDataPort::new().with_bars("BTC-USD", Vec::new());
    let err = run_pipeline(
        &data,
        "BTC-USD",
        &DateRange::default(),
        &crossover_strategy(2, 4),
        &BacktestConfig::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SqzError::NoData { ref product } if product == "BTC-USD"));
}

#[test]
fn pipeline_propagates_data_port_errors() {
    let data = MockDataPort::new().with_error("BTC-USD", "connection refused");
    let err = run_pipeline(
        &data,
        "BTC-USD",
        &DateRange::default(),
        &crossover_strategy(2, 4),
        &BacktestConfig::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SqzError::Fetch { .. }));
}

// ===========================================================================
// Squeeze
// ===========================================================================

#[test]
fn squeeze_pipeline_outputs_are_consistent() {
    let bars = bars_with_spread(&breakout_closes(60, 30), 0.5);
    let data = MockDataPort::new().with_bars("BTC-USD", bars.clone());
    let strategy = squeeze_strategy(MomentumNormalization::Expanding);

    let run = run_pipeline(
        &data,
        "BTC-USD",
        &DateRange::default(),
        &strategy,
        &BacktestConfig::default(),
    )
    .unwrap();
    let out = &run.output;

    assert_eq!(out.overlays.len(), 5);
    assert_eq!(out.oscillators.len(), 1);
    assert_eq!(out.flags.len(), 2);
    assert_eq!(out.signals.len(), bars.len());

    let on = &out.flags[0];
    let momentum = &out.oscillators[0];
    // Bands are tight against a one-point high/low spread during the drift
    assert!(on.is_active(40));

    let threshold = SqueezeParams::default().threshold;
    for (i, point) in out.signals.iter().enumerate() {
        if let Some(m) = momentum.get(i) {
            assert!((-1.0..=1.0).contains(&m), "momentum {m} at {i}");
        }
        match point.signal {
            Some(Signal::Buy) => {
                assert!(on.is_active(i));
                assert!(momentum.get(i).unwrap() > threshold);
            }
            Some(Signal::Sell) => {
                assert!(on.is_active(i));
                assert!(momentum.get(i).unwrap() < -threshold);
            }
            Some(Signal::Hold) => panic!("threshold signals never emit hold"),
            None => {}
        }
    }
    assert!(run.result.final_balance > 0.0);
}

#[test]
fn squeeze_flags_are_undefined_during_warmup() {
    let bars = bars_with_spread(&breakout_closes(40, 10), 0.5);
    let out = generate_signals(&bars, &squeeze_strategy(MomentumNormalization::Expanding)).unwrap();

    for flag in &out.flags {
        assert_eq!(flag.values[0].value, None);
        assert_eq!(flag.values[18].value, None);
        assert!(flag.values[30].value.is_some());
    }
    assert!(out.signals[..20].iter().all(|s| s.signal.is_none()));
}

#[test]
fn whole_series_normalization_touches_unit_magnitude() {
    let bars = bars_with_spread(&breakout_closes(60, 30), 0.5);
    let momentum = calculate_squeeze_momentum(&bars, 20, MomentumNormalization::WholeSeries);

    let max_abs = momentum
        .raw_values()
        .into_iter()
        .flatten()
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    assert_relative_eq!(max_abs, 1.0, epsilon = 1e-12);
}

// ===========================================================================
// Backtest
// ===========================================================================

fn signal_points(kinds: &[Option<Signal>]) -> Vec<SignalPoint> {
    kinds
        .iter()
        .enumerate()
        .map(|(i, &signal)| SignalPoint { time: ts(i), signal })
        .collect()
}

#[test]
fn buy_at_100_sell_at_120_ends_at_1200() {
    let bars = bars_from_closes(&[100.0, 120.0]);
    let signals = signal_points(&[Some(Signal::Buy), Some(Signal::Sell)]);
    let result = run_backtest(
        &bars,
        &signals,
        &BacktestConfig {
            initial_balance: 1000.0,
        },
    )
    .unwrap();

    assert_relative_eq!(result.final_balance, 1200.0, epsilon = 1e-9);
    assert_relative_eq!(result.profit_loss, 200.0, epsilon = 1e-9);
    assert_eq!(result.trajectory.len(), 1);
    assert_relative_eq!(result.trajectory[0].balance, 1200.0, epsilon = 1e-9);
}

#[test]
fn open_position_is_liquidated_at_last_close() {
    let bars = bars_from_closes(&[50.0, 75.0, 100.0]);
    let signals = signal_points(&[Some(Signal::Buy), None, Some(Signal::Hold)]);
    let result = run_backtest(
        &bars,
        &signals,
        &BacktestConfig {
            initial_balance: 1000.0,
        },
    )
    .unwrap();

    assert_relative_eq!(result.final_balance, 2000.0, epsilon = 1e-9);
    assert_eq!(result.trajectory.last().unwrap().kind, CloseKind::Liquidation);
    assert!(Metrics::compute(&result).ended_in_position);
}

#[test]
fn second_buy_while_long_keeps_first_entry() {
    let bars = bars_from_closes(&[100.0, 50.0, 200.0]);
    let signals = signal_points(&[Some(Signal::Buy), Some(Signal::Buy), Some(Signal::Sell)]);
    let result = run_backtest(
        &bars,
        &signals,
        &BacktestConfig {
            initial_balance: 1000.0,
        },
    )
    .unwrap();

    assert_relative_eq!(result.final_balance, 2000.0, epsilon = 1e-9);
    assert_eq!(result.trades.len(), 1);
    assert_relative_eq!(result.trades[0].entry_price, 100.0);
}

// ===========================================================================
// CSV storage and reports
// ===========================================================================

#[test]
fn stored_prices_feed_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let closes = [
        10.0, 9.0, 8.0, 7.0, 6.0, 7.0, 9.0, 11.0, 13.0, 12.0, 10.0, 8.0, 6.0,
    ];
    let store = CsvAdapter::new(dir.path().to_path_buf());
    store.save_bars("SOL-USD", &bars_from_closes(&closes)).unwrap();

    assert_eq!(store.list_products().unwrap(), vec!["SOL-USD".to_string()]);

    let run = run_pipeline(
        &store,
        "SOL-USD",
        &DateRange::default(),
        &crossover_strategy(2, 4),
        &BacktestConfig {
            initial_balance: 1000.0,
        },
    )
    .unwrap();
    assert_eq!(run.bars.len(), closes.len());
    assert_eq!(run.result.trades.len(), 1);
}

#[test]
fn unsorted_price_file_is_sorted_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut bars = bars_from_closes(&[1.0, 2.0, 3.0, 4.0]);
    bars.reverse();
    bars.push(bars[0].clone());

    let file = std::fs::File::create(dir.path().join("BTC-USD.csv")).unwrap();
    write_bars(file, &bars).unwrap();

    let loaded = CsvAdapter::new(dir.path().to_path_buf())
        .fetch_bars("BTC-USD", &DateRange::default())
        .unwrap();
    let closes: Vec<f64> = loaded.iter().map(|b| b.close).collect();
    assert_eq!(closes, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn trajectory_report_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("balance.csv");
    let bars = bars_from_closes(&[100.0, 120.0, 90.0, 130.0]);
    let strategy = crossover_strategy(1, 2);
    let output = generate_signals(&bars, &strategy).unwrap();
    let signals = signal_points(&[
        Some(Signal::Buy),
        Some(Signal::Sell),
        Some(Signal::Buy),
        None,
    ]);
    let result = run_backtest(&bars, &signals, &BacktestConfig::default()).unwrap();

    let ctx = ReportContext {
        product: "BTC-USD",
        strategy: &strategy,
        bars: &bars,
        output: &output,
        result: &result,
    };
    CsvReportAdapter.write(&ctx, &path).unwrap();

    let read = read_trajectory(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(read, result.trajectory);
    assert_eq!(read[0].kind, CloseKind::Realized);
    assert_eq!(read[1].kind, CloseKind::Liquidation);
}

#[test]
fn indicator_export_has_one_column_per_series() {
    let bars = bars_with_spread(&breakout_closes(30, 5), 0.5);
    let out = generate_signals(&bars, &squeeze_strategy(MomentumNormalization::Trailing(10))).unwrap();

    let series: Vec<&IndicatorSeries> = out.overlays.iter().chain(&out.oscillators).collect();
    let flags: Vec<_> = out.flags.iter().collect();
    let mut buf = Vec::new();
    write_indicators(&mut buf, &bars, &series, &flags).unwrap();

    let mut reader = csv::Reader::from_reader(buf.as_slice());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.len(), 2 + 6 + 2);
    assert_eq!(&headers[0], "time");
    assert_eq!(&headers[1], "close");
    assert_eq!(reader.records().count(), bars.len());
}

// ===========================================================================
// Properties
// ===========================================================================

fn windowed(bars: &[PriceBar], period: usize) -> Vec<IndicatorSeries> {
    let bb = calculate_bollinger(bars, period, 200, StddevKind::Population);
    let kc = calculate_keltner(bars, period, period, 150, RangeKind::HighLow);
    vec![
        calculate_sma(bars, period),
        calculate_stddev(bars, period, StddevKind::Population),
        bb.upper,
        bb.lower,
        kc.upper,
        kc.lower,
    ]
}

fn closes() -> impl proptest::strategy::Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0f64..1000.0, 12..60)
}

proptest! {
    #[test]
    fn windowed_indicators_undefined_before_warmup(
        closes in closes(),
        period in 1usize..10,
    ) {
        let bars = bars_with_spread(&closes, 0.5);
        for s in windowed(&bars, period) {
            prop_assert_eq!(s.len(), bars.len());
            for i in 0..period - 1 {
                prop_assert_eq!(s.get(i), None, "{} at {}", s.indicator_type, i);
            }
            prop_assert!(s.get(period - 1).is_some(), "{}", s.indicator_type);
        }
    }

    #[test]
    fn windowed_indicators_ignore_bars_outside_window(
        closes in closes(),
        period in 1usize..10,
        bump in 1.0f64..500.0,
    ) {
        let bars = bars_with_spread(&closes, 0.5);
        let mut changed = bars.clone();
        changed[0].close += bump;
        changed[0].high += bump;
        changed[0].low += bump;
        changed[0].open += bump;

        let before = windowed(&bars, period);
        let after = windowed(&changed, period);
        for (a, b) in before.iter().zip(&after) {
            for i in period..bars.len() {
                let (x, y) = (a.get(i).unwrap(), b.get(i).unwrap());
                prop_assert!(
                    (x - y).abs() <= 1e-6 * x.abs().max(1.0),
                    "{} at {}",
                    a.indicator_type,
                    i
                );
            }
        }
    }

    #[test]
    fn causal_indicators_match_on_prefix(
        closes in closes(),
        cut in 5usize..12,
    ) {
        let bars = bars_with_spread(&closes, 0.5);
        let prefix = &bars[..cut];
        let strategy = Strategy {
            name: "Short Squeeze".to_string(),
            mode: StrategyMode::Squeeze(SqueezeParams {
                bb_period: 3,
                kc_period: 3,
                atr_period: 3,
                momentum_period: 3,
                ..SqueezeParams::default()
            }),
        };

        let full = generate_signals(&bars, &strategy).unwrap();
        let part = generate_signals(prefix, &strategy).unwrap();
        let full_series = full.oscillators.iter().chain(&full.overlays);
        let part_series = part.oscillators.iter().chain(&part.overlays);
        for (a, b) in full_series.zip(part_series) {
            for i in 0..cut {
                match (a.get(i), b.get(i)) {
                    (Some(x), Some(y)) => prop_assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0)),
                    (x, y) => prop_assert_eq!(x, y),
                }
            }
        }
        prop_assert_eq!(&full.signals[..cut], &part.signals[..]);
    }

    #[test]
    fn flat_prices_never_trade(
        price in 1.0f64..1000.0,
        len in 30usize..80,
    ) {
        let bars = bars_from_closes(&vec![price; len]);
        for strategy in [crossover_strategy(3, 7), squeeze_strategy(MomentumNormalization::Expanding)] {
            let out = generate_signals(&bars, &strategy).unwrap();
            prop_assert!(out
                .signals
                .iter()
                .all(|s| matches!(s.signal, None | Some(Signal::Hold))));

            let result = run_backtest(&bars, &out.signals, &BacktestConfig::default()).unwrap();
            prop_assert!(result.trades.is_empty());
            prop_assert_eq!(result.final_balance, BacktestConfig::default().initial_balance);
        }
    }

    #[test]
    fn trajectory_csv_round_trips_exactly(
        rows in prop::collection::vec(
            (
                0i64..100_000_000,
                0i64..1_000_000_000,
                prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO,
                any::<bool>(),
            ),
            0..20,
        ),
    ) {
        let trajectory: Vec<BalancePoint> = rows
            .into_iter()
            .map(|(secs, nanos, balance, liquidated)| BalancePoint {
                time: ts(0) + chrono::Duration::seconds(secs) + chrono::Duration::nanoseconds(nanos),
                balance,
                kind: if liquidated { CloseKind::Liquidation } else { CloseKind::Realized },
            })
            .collect();

        let mut buf = Vec::new();
        write_trajectory(&mut buf, &trajectory).unwrap();
        let read = read_trajectory(buf.as_slice()).unwrap();
        prop_assert_eq!(read, trajectory);
    }
}
