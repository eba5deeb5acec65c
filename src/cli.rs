//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::chart_svg::SvgChartAdapter;
use crate::adapters::csv_adapter::{CsvAdapter, CsvReportAdapter, write_indicators};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{
    DEFAULT_NORMALIZATION_WINDOW, MA_KINDS, MODES, NORMALIZATIONS, RANGE_KINDS, STDDEV_KINDS,
    read_choice, read_date, read_multiplier, read_number, validate_backtest_config,
    validate_data_config, validate_strategy_config,
};
use crate::domain::error::SqzError;
use crate::domain::indicator::{MomentumNormalization, RangeKind, StddevKind};
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::{DateRange, PriceBar, validate_series};
use crate::domain::strategy::{
    DEFAULT_LONG_PERIOD, DEFAULT_SHORT_PERIOD, MaKind, MovingAverage, SqueezeParams, Strategy,
    StrategyMode, StrategyOutput, generate_signals,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportContext, ReportPort};

pub const DEFAULT_PRODUCT: &str = "BTC-USD";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_TRAJECTORY: &str = "balance.csv";
pub const DEFAULT_INDICATORS: &str = "indicators.csv";

#[derive(Parser, Debug)]
#[command(
    name = "sqztrader",
    about = "Crypto indicator, squeeze signal and backtest toolkit"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Price CSV to use instead of <data.dir>/<product>.csv
        #[arg(short, long)]
        prices: Option<PathBuf>,
        /// Balance trajectory CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// SVG chart
        #[arg(long)]
        chart: Option<PathBuf>,
        #[arg(long)]
        product: Option<String>,
    },
    /// Export the strategy's indicator series as CSV
    Indicators {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        prices: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        product: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List products with stored price data
    Products {
        #[arg(short, long)]
        config: PathBuf,
        /// Ask the exchange instead of the data directory
        #[arg(long)]
        remote: bool,
    },
    /// Download candles from Coinbase into the data directory
    Fetch {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        product: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            prices,
            output,
            chart,
            product,
        } => run_backtest(
            &config,
            prices.as_ref(),
            output.as_ref(),
            chart.as_ref(),
            product.as_deref(),
        ),
        Command::Indicators {
            config,
            prices,
            output,
            product,
        } => run_indicators(&config, prices.as_ref(), output.as_ref(), product.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Products { config, remote } => run_products(&config, remote),
        Command::Fetch {
            config,
            days,
            product,
        } => run_fetch(&config, days, product.as_deref()),
    }
}

fn fail(err: SqzError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), SqzError> {
    validate_backtest_config(config)?;
    validate_data_config(config)?;
    validate_strategy_config(config)?;
    Ok(())
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, SqzError> {
    let defaults = BacktestConfig::default();
    Ok(BacktestConfig {
        initial_balance: read_number(
            config,
            "backtest",
            "initial_balance",
            defaults.initial_balance,
        )?,
    })
}

pub fn build_date_range(config: &dyn ConfigPort) -> Result<DateRange, SqzError> {
    Ok(DateRange::new(
        read_date(config, "backtest", "start")?,
        read_date(config, "backtest", "end")?,
    ))
}

fn build_moving_average(
    config: &dyn ConfigPort,
    kind_key: &str,
    period_key: &str,
    default_period: usize,
) -> Result<MovingAverage, SqzError> {
    let kind = match read_choice(config, "strategy", kind_key, "sma", &MA_KINDS)?.as_str() {
        "ema" => MaKind::Ema,
        _ => MaKind::Sma,
    };
    Ok(MovingAverage {
        kind,
        period: read_number(config, "strategy", period_key, default_period)?,
    })
}

fn build_squeeze_params(config: &dyn ConfigPort) -> Result<SqueezeParams, SqzError> {
    let d = SqueezeParams::default();

    let range = match read_choice(config, "strategy", "range", "true_range", &RANGE_KINDS)?.as_str()
    {
        "high_low" => RangeKind::HighLow,
        _ => RangeKind::TrueRange,
    };
    let stddev = match read_choice(config, "strategy", "stddev", "sample", &STDDEV_KINDS)?.as_str()
    {
        "population" => StddevKind::Population,
        _ => StddevKind::Sample,
    };
    let normalization =
        match read_choice(config, "strategy", "normalization", "expanding", &NORMALIZATIONS)?
            .as_str()
        {
            "whole_series" => MomentumNormalization::WholeSeries,
            "trailing" => MomentumNormalization::Trailing(read_number(
                config,
                "strategy",
                "normalization_window",
                DEFAULT_NORMALIZATION_WINDOW,
            )?),
            _ => MomentumNormalization::Expanding,
        };

    Ok(SqueezeParams {
        bb_period: read_number(config, "strategy", "bb_period", d.bb_period)?,
        bb_mult_x100: read_multiplier(config, "strategy", "bb_mult", d.bb_mult_x100)?,
        kc_period: read_number(config, "strategy", "kc_period", d.kc_period)?,
        kc_mult_x100: read_multiplier(config, "strategy", "kc_mult", d.kc_mult_x100)?,
        atr_period: read_number(config, "strategy", "atr_period", d.atr_period)?,
        range,
        stddev,
        momentum_period: read_number(config, "strategy", "momentum_period", d.momentum_period)?,
        threshold: read_number(config, "strategy", "threshold", d.threshold)?,
        normalization,
    })
}

pub fn build_strategy(config: &dyn ConfigPort) -> Result<Strategy, SqzError> {
    let mode = match read_choice(config, "strategy", "mode", "crossover", &MODES)?.as_str() {
        "squeeze" => StrategyMode::Squeeze(build_squeeze_params(config)?),
        _ => StrategyMode::Crossover {
            short: build_moving_average(config, "short_ma", "short_period", DEFAULT_SHORT_PERIOD)?,
            long: build_moving_average(config, "long_ma", "long_period", DEFAULT_LONG_PERIOD)?,
        },
    };
    let name = config
        .get_string("strategy", "name")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| mode.to_string());
    Ok(Strategy { name, mode })
}

pub fn resolve_product(product_override: Option<&str>, config: &dyn ConfigPort) -> String {
    product_override
        .map(str::to_string)
        .or_else(|| config.get_string("data", "product"))
        .map(|p| p.trim().to_uppercase())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PRODUCT.to_string())
}

/// A price file given on the command line is read through a `CsvAdapter`
/// rooted at its directory, with the file stem as product.
fn resolve_data_source(
    prices: Option<&PathBuf>,
    config: &dyn ConfigPort,
    product: String,
) -> (CsvAdapter, String) {
    match prices {
        Some(path) => {
            let dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or(product);
            (CsvAdapter::new(dir), stem)
        }
        None => {
            let dir = config
                .get_string("data", "dir")
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
            (CsvAdapter::new(PathBuf::from(dir)), product)
        }
    }
}

fn output_path(flag: Option<&PathBuf>, config: &dyn ConfigPort, key: &str) -> Option<PathBuf> {
    flag.cloned().or_else(|| {
        config
            .get_string("output", key)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    })
}

/// Everything one backtest produces, before any output is written.
pub struct PipelineRun {
    pub bars: Vec<PriceBar>,
    pub output: StrategyOutput,
    pub result: BacktestResult,
    pub metrics: Metrics,
}

pub fn load_bars(
    data_port: &dyn DataPort,
    product: &str,
    range: &DateRange,
) -> Result<Vec<PriceBar>, SqzError> {
    let bars = data_port.fetch_bars(product, range)?;
    if bars.is_empty() {
        return Err(SqzError::NoData {
            product: product.to_string(),
        });
    }
    validate_series(&bars)?;
    Ok(bars)
}

pub fn run_pipeline(
    data_port: &dyn DataPort,
    product: &str,
    range: &DateRange,
    strategy: &Strategy,
    bt_config: &BacktestConfig,
) -> Result<PipelineRun, SqzError> {
    let bars = load_bars(data_port, product, range)?;
    info!(product, bars = bars.len(), strategy = %strategy.name, "prices loaded");

    let warmup = strategy.warmup_bars();
    if bars.len() < warmup {
        warn!(
            bars = bars.len(),
            warmup, "fewer bars than the strategy's warm-up; expect no trades"
        );
    }

    let output = generate_signals(&bars, strategy)?;
    let result = backtest_engine::run_backtest(&bars, &output.signals, bt_config)?;
    let metrics = Metrics::compute(&result);

    Ok(PipelineRun {
        bars,
        output,
        result,
        metrics,
    })
}

fn print_summary(product: &str, strategy: &Strategy, run: &PipelineRun) {
    let m = &run.metrics;
    eprintln!("\n=== {} on {} ===", strategy.name, product);
    eprintln!("Bars:             {}", run.bars.len());
    eprintln!("Initial Balance:  {:.2}", run.result.initial_balance);
    eprintln!("Final Balance:    {:.2}", run.result.final_balance);
    let sign = if m.profit_loss >= 0.0 { "+" } else { "" };
    eprintln!("Profit/Loss:      {}{:.2}", sign, m.profit_loss);
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!("Max Drawdown:     -{:.1}%", m.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!("Win Rate:         {:.1}%", m.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", m.profit_factor);
    if m.ended_in_position {
        eprintln!("Open position liquidated at the last close.");
    }
}

fn export_indicators(path: &Path, bars: &[PriceBar], output: &StrategyOutput) -> Result<(), SqzError> {
    let series: Vec<_> = output.overlays.iter().chain(&output.oscillators).collect();
    let flags: Vec<_> = output.flags.iter().collect();
    write_indicators(fs::File::create(path)?, bars, &series, &flags)
}

fn run_backtest(
    config_path: &Path,
    prices: Option<&PathBuf>,
    output: Option<&PathBuf>,
    chart: Option<&PathBuf>,
    product_override: Option<&str>,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&config) {
        return fail(e);
    }

    // Stage 2: Build strategy and run parameters
    let (strategy, bt_config, range) = match (
        build_strategy(&config),
        build_backtest_config(&config),
        build_date_range(&config),
    ) {
        (Ok(s), Ok(b), Ok(r)) => (s, b, r),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return fail(e),
    };
    eprintln!("Strategy: {} ({})", strategy.name, strategy.mode);

    // Stage 3: Prices, signals, backtest
    let product = resolve_product(product_override, &config);
    let (data_port, product) = resolve_data_source(prices, &config, product);
    let run = match run_pipeline(&data_port, &product, &range, &strategy, &bt_config) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    // Stage 4: Summary
    print_summary(&product, &strategy, &run);

    // Stage 5: Outputs
    let ctx = ReportContext {
        product: &product,
        strategy: &strategy,
        bars: &run.bars,
        output: &run.output,
        result: &run.result,
    };

    let trajectory_path = output_path(output, &config, "trajectory")
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TRAJECTORY));
    if let Err(e) = CsvReportAdapter.write(&ctx, &trajectory_path) {
        return fail(e);
    }
    eprintln!("\nTrajectory written to: {}", trajectory_path.display());

    if let Some(chart_path) = output_path(chart, &config, "chart") {
        if let Err(e) = SvgChartAdapter.write(&ctx, &chart_path) {
            return fail(e);
        }
        eprintln!("Chart written to: {}", chart_path.display());
    }

    if let Some(indicators_path) = output_path(None, &config, "indicators") {
        if let Err(e) = export_indicators(&indicators_path, &run.bars, &run.output) {
            return fail(e);
        }
        eprintln!("Indicators written to: {}", indicators_path.display());
    }

    ExitCode::SUCCESS
}

fn run_indicators(
    config_path: &Path,
    prices: Option<&PathBuf>,
    output: Option<&PathBuf>,
    product_override: Option<&str>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&config) {
        return fail(e);
    }

    let (strategy, range) = match (build_strategy(&config), build_date_range(&config)) {
        (Ok(s), Ok(r)) => (s, r),
        (Err(e), _) | (_, Err(e)) => return fail(e),
    };

    let product = resolve_product(product_override, &config);
    let (data_port, product) = resolve_data_source(prices, &config, product);
    let bars = match load_bars(&data_port, &product, &range) {
        Ok(b) => b,
        Err(e) => return fail(e),
    };
    let strategy_output = match generate_signals(&bars, &strategy) {
        Ok(o) => o,
        Err(e) => return fail(e),
    };

    let path = output_path(output, &config, "indicators")
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INDICATORS));
    if let Err(e) = export_indicators(&path, &bars, &strategy_output) {
        return fail(e);
    }

    let columns = strategy_output.overlays.len()
        + strategy_output.oscillators.len()
        + strategy_output.flags.len();
    eprintln!(
        "{} bars x {} indicator columns written to: {}",
        bars.len(),
        columns,
        path.display()
    );
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&config) {
        return fail(e);
    }

    let strategy = match build_strategy(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let range = match build_date_range(&config) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    eprintln!("\nStrategy: {}", strategy.name);
    match &strategy.mode {
        StrategyMode::Crossover { short, long } => {
            eprintln!("  mode:  crossover");
            eprintln!("  short: {:?}({})", short.kind, short.period);
            eprintln!("  long:  {:?}({})", long.kind, long.period);
        }
        StrategyMode::Squeeze(p) => {
            eprintln!("  mode:          squeeze");
            eprintln!("  bollinger:     {} x {}", p.bb_period, p.bb_mult_x100 as f64 / 100.0);
            eprintln!(
                "  keltner:       {} / {} x {}",
                p.kc_period,
                p.atr_period,
                p.kc_mult_x100 as f64 / 100.0
            );
            eprintln!("  momentum:      {} ({:?})", p.momentum_period, p.normalization);
            eprintln!("  threshold:     {}", p.threshold);
        }
    }
    eprintln!("  warm-up bars:  {}", strategy.warmup_bars());

    let fmt_bound = |d: Option<chrono::NaiveDate>| d.map_or("open".to_string(), |d| d.to_string());
    eprintln!("\nRange: {} to {}", fmt_bound(range.start), fmt_bound(range.end));
    eprintln!("Product: {}", resolve_product(None, &config));

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_products(config_path: &Path, remote: bool) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let products = if remote {
        #[cfg(feature = "coinbase")]
        {
            use crate::adapters::coinbase_adapter::CoinbaseAdapter;
            CoinbaseAdapter::from_config(&config).and_then(|a| a.list_products())
        }

        #[cfg(not(feature = "coinbase"))]
        {
            eprintln!("error: coinbase feature is required for --remote");
            return ExitCode::from(1);
        }
    } else {
        let (data_port, _) = resolve_data_source(None, &config, String::new());
        data_port.list_products()
    };

    match products {
        Ok(products) if products.is_empty() => {
            eprintln!("No products found");
            ExitCode::SUCCESS
        }
        Ok(products) => {
            for product in &products {
                println!("{}", product);
            }
            eprintln!("{} products found", products.len());
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_fetch(config_path: &Path, days: Option<u32>, product_override: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_data_config(&config) {
        return fail(e);
    }

    let product = resolve_product(product_override, &config);
    let days = match days {
        Some(d) if d > 0 => d,
        Some(_) => {
            return fail(SqzError::config_invalid("data", "days", "days must be at least 1"));
        }
        None => match read_number(&config, "data", "days", 30u32) {
            Ok(d) => d,
            Err(e) => return fail(e),
        },
    };

    #[cfg(feature = "coinbase")]
    {
        use crate::adapters::coinbase_adapter::CoinbaseAdapter;

        let adapter = match CoinbaseAdapter::from_config(&config) {
            Ok(a) => a,
            Err(e) => return fail(e),
        };

        eprintln!("Fetching {} days of {} candles...", days, product);
        let bars = match adapter.fetch_recent(&product, days) {
            Ok(b) => b,
            Err(e) => return fail(e),
        };

        let (store, _) = resolve_data_source(None, &config, product.clone());
        match store.save_bars(&product, &bars) {
            Ok(path) => {
                eprintln!("{} bars saved to {}", bars.len(), path.display());
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        }
    }

    #[cfg(not(feature = "coinbase"))]
    {
        let _ = (product, days);
        eprintln!("error: coinbase feature is required for fetch");
        ExitCode::from(1)
    }
}
