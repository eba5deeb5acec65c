//! CSV file adapters: price candles, balance trajectories and indicator
//! exports.
//!
//! Price files live at `<dir>/<product>.csv` with the header
//! `time,open,high,low,close,volume`. Columns are located by header name, so
//! extra columns or a different order are tolerated on read.

use crate::domain::backtest::{BalancePoint, CloseKind};
use crate::domain::error::SqzError;
use crate::domain::indicator::{FlagSeries, IndicatorSeries};
use crate::domain::ohlcv::{DateRange, PriceBar, sort_and_dedup};
use crate::domain::timeline::check_aligned;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportContext, ReportPort};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Used on write when the time has a sub-second part.
pub const FRACTIONAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const PRICE_HEADER: [&str; 6] = ["time", "open", "high", "low", "close", "volume"];
const TRAJECTORY_HEADER: [&str; 3] = ["time", "balance", "kind"];

const NAIVE_FORMATS: [&str; 4] = [
    TIME_FORMAT,
    FRACTIONAL_TIME_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn csv_path(&self, product: &str) -> PathBuf {
        self.base_path.join(format!("{product}.csv"))
    }

    /// Writes `bars` to `<dir>/<product>.csv`, creating the directory.
    pub fn save_bars(&self, product: &str, bars: &[PriceBar]) -> Result<PathBuf, SqzError> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.csv_path(product);
        write_bars(fs::File::create(&path)?, bars)?;
        debug!(path = %path.display(), bars = bars.len(), "saved price csv");
        Ok(path)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, product: &str, range: &DateRange) -> Result<Vec<PriceBar>, SqzError> {
        let path = self.csv_path(product);
        let file = fs::File::open(&path).map_err(|e| {
            SqzError::Io(io::Error::new(
                e.kind(),
                format!("failed to read {}: {e}", path.display()),
            ))
        })?;

        let bars: Vec<PriceBar> = read_bars(file)?
            .into_iter()
            .filter(|b| range.contains(b.time))
            .collect();
        let loaded = bars.len();
        let bars = sort_and_dedup(bars);
        if bars.len() != loaded {
            warn!(
                product,
                dropped = loaded - bars.len(),
                "duplicate timestamps in price csv"
            );
        }
        debug!(product, bars = bars.len(), "loaded price csv");
        Ok(bars)
    }

    fn list_products(&self) -> Result<Vec<String>, SqzError> {
        let mut products = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    products.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        products.sort();
        Ok(products)
    }
}

/// Writes the balance trajectory of a run as `time,balance,kind`.
pub struct CsvReportAdapter;

impl ReportPort for CsvReportAdapter {
    fn write(&self, ctx: &ReportContext<'_>, output_path: &Path) -> Result<(), SqzError> {
        write_trajectory(fs::File::create(output_path)?, &ctx.result.trajectory)
    }
}

/// Accepts `TIME_FORMAT`, ISO `T` separated times with optional fractional
/// seconds, RFC 3339 with an offset (converted to UTC) or a bare date.
pub fn parse_time(raw: &str) -> Result<NaiveDateTime, SqzError> {
    let raw = raw.trim();
    for format in NAIVE_FORMATS {
        if let Ok(time) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(time);
        }
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(time.naive_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(SqzError::InvalidData {
        reason: format!("unrecognized timestamp: {raw}"),
    })
}

/// Whole seconds use `TIME_FORMAT`; otherwise the fraction is kept so the
/// text parses back to the same instant.
pub fn format_time(time: NaiveDateTime) -> String {
    let format = if time.nanosecond() == 0 {
        TIME_FORMAT
    } else {
        FRACTIONAL_TIME_FORMAT
    };
    time.format(format).to_string()
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, SqzError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| SqzError::InvalidData {
            reason: format!("missing {name} column"),
        })
}

fn parse_field(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, SqzError> {
    let raw = record.get(index).unwrap_or_default().trim();
    raw.parse().map_err(|_| SqzError::InvalidData {
        reason: format!("invalid {name} value: {raw:?}"),
    })
}

/// Reads price bars in file order.
pub fn read_bars<R: io::Read>(reader: R) -> Result<Vec<PriceBar>, SqzError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let idx: Vec<usize> = PRICE_HEADER
        .iter()
        .map(|name| column_index(&headers, name))
        .collect::<Result<_, _>>()?;

    let mut bars = Vec::new();
    for result in rdr.records() {
        let record = result?;
        bars.push(PriceBar {
            time: parse_time(record.get(idx[0]).unwrap_or_default())?,
            open: parse_field(&record, idx[1], "open")?,
            high: parse_field(&record, idx[2], "high")?,
            low: parse_field(&record, idx[3], "low")?,
            close: parse_field(&record, idx[4], "close")?,
            volume: parse_field(&record, idx[5], "volume")?,
        });
    }
    Ok(bars)
}

pub fn write_bars<W: io::Write>(writer: W, bars: &[PriceBar]) -> Result<(), SqzError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(PRICE_HEADER)?;
    for bar in bars {
        wtr.write_record([
            format_time(bar.time),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Balances use the shortest round-trip float text, so reloading yields the
/// same `f64` bit for bit.
pub fn write_trajectory<W: io::Write>(
    writer: W,
    trajectory: &[BalancePoint],
) -> Result<(), SqzError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(TRAJECTORY_HEADER)?;
    for point in trajectory {
        wtr.write_record([
            format_time(point.time),
            point.balance.to_string(),
            point.kind.as_str().to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// A missing `kind` column reads as `realized`.
pub fn read_trajectory<R: io::Read>(reader: R) -> Result<Vec<BalancePoint>, SqzError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let time_idx = column_index(&headers, "time")?;
    let balance_idx = column_index(&headers, "balance")?;
    let kind_idx = column_index(&headers, "kind").ok();

    let mut points = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let kind = match kind_idx.and_then(|i| record.get(i)) {
            Some(raw) => CloseKind::parse(raw.trim()).ok_or_else(|| SqzError::InvalidData {
                reason: format!("invalid kind value: {raw:?}"),
            })?,
            None => CloseKind::Realized,
        };
        points.push(BalancePoint {
            time: parse_time(record.get(time_idx).unwrap_or_default())?,
            balance: parse_field(&record, balance_idx, "balance")?,
            kind,
        });
    }
    Ok(points)
}

/// Writes `time,close` followed by one column per series. Every series must
/// be aligned with `bars`; undefined values become empty cells.
pub fn write_indicators<W: io::Write>(
    writer: W,
    bars: &[PriceBar],
    series: &[&IndicatorSeries],
    flags: &[&FlagSeries],
) -> Result<(), SqzError> {
    for s in series {
        check_aligned(bars, *s)?;
    }
    for f in flags {
        check_aligned(bars, *f)?;
    }

    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["time".to_string(), "close".to_string()];
    header.extend(series.iter().map(|s| s.indicator_type.to_string()));
    header.extend(flags.iter().map(|f| f.name.clone()));
    wtr.write_record(&header)?;

    for (i, bar) in bars.iter().enumerate() {
        let mut row = Vec::with_capacity(header.len());
        row.push(format_time(bar.time));
        row.push(bar.close.to_string());
        row.extend(
            series
                .iter()
                .map(|s| s.get(i).map(|v| v.to_string()).unwrap_or_default()),
        );
        row.extend(
            flags
                .iter()
                .map(|f| f.values[i].value.map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}
