//! Coinbase Exchange candle client.
//!
//! Candles are requested one UTC day at a time from
//! `GET {base}/products/{product}/candles`, with a day split further when it
//! would hold more than `MAX_CANDLES_PER_REQUEST` candles. Each row is
//! `[time, low, high, open, close, volume]` with `time` in epoch seconds,
//! newest first. A window that keeps failing after all retries is skipped with
//! a warning; the surviving windows are merged, sorted and deduplicated.

use crate::domain::config_validation::read_number;
use crate::domain::error::SqzError;
use crate::domain::ohlcv::{DateRange, PriceBar, sort_and_dedup};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";
pub const DEFAULT_GRANULARITY: u32 = 3600;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
/// Most candles the candles endpoint returns for one request.
pub const MAX_CANDLES_PER_REQUEST: i64 = 300;

#[derive(Debug, Deserialize)]
struct Product {
    id: String,
}

pub struct CoinbaseAdapter {
    base_url: String,
    client: reqwest::blocking::Client,
    granularity: u32,
    retries: u32,
    retry_delay: Duration,
}

impl CoinbaseAdapter {
    pub fn new(base_url: &str, granularity: u32) -> Result<Self, SqzError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("sqztrader/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SqzError::Fetch {
                reason: format!("failed to build http client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            granularity,
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        })
    }

    /// Reads `[data] api_url`, `granularity`, `retries` and `retry_delay`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SqzError> {
        let base_url = config
            .get_string("data", "api_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let granularity = read_number(config, "data", "granularity", DEFAULT_GRANULARITY)?;

        let mut adapter = Self::new(&base_url, granularity)?;
        adapter.retries = read_number(config, "data", "retries", DEFAULT_RETRIES)?.max(1);
        adapter.retry_delay = Duration::from_secs(read_number(
            config,
            "data",
            "retry_delay",
            DEFAULT_RETRY_DELAY_SECS,
        )?);
        Ok(adapter)
    }

    /// Candles for the last `days` UTC days, today included.
    pub fn fetch_recent(&self, product: &str, days: u32) -> Result<Vec<PriceBar>, SqzError> {
        let now = Utc::now().naive_utc();
        self.fetch_windows(product, day_windows(now, days))
    }

    fn fetch_windows(
        &self,
        product: &str,
        windows: Vec<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<Vec<PriceBar>, SqzError> {
        let days = windows.len();
        let requests: Vec<_> = windows
            .into_iter()
            .flat_map(|(start, end)| split_window(start, end, self.granularity))
            .collect();
        let mut bars = Vec::new();
        let mut skipped = 0usize;

        for &(start, end) in &requests {
            match self.fetch_window(product, start, end) {
                Ok(window) => bars.extend(window),
                Err(e) => {
                    warn!(product, %start, %end, error = %e, "skipping window");
                    skipped += 1;
                }
            }
        }

        let bars = sort_and_dedup(bars);
        info!(
            product,
            days,
            requests = requests.len(),
            skipped,
            bars = bars.len(),
            "fetched candles"
        );
        if bars.is_empty() {
            return Err(SqzError::NoData {
                product: product.to_string(),
            });
        }
        Ok(bars)
    }

    fn fetch_window(
        &self,
        product: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<PriceBar>, SqzError> {
        let url = format!("{}/products/{}/candles", self.base_url, product);
        let query = [
            ("start", format!("{}Z", start.format("%Y-%m-%dT%H:%M:%S"))),
            ("end", format!("{}Z", end.format("%Y-%m-%dT%H:%M:%S"))),
            ("granularity", self.granularity.to_string()),
        ];

        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            match self.request_candles(&url, &query) {
                Ok(rows) => {
                    debug!(product, %start, rows = rows.len(), attempt, "candles received");
                    return parse_candles(&rows);
                }
                Err(reason) => {
                    warn!(product, %start, attempt, %reason, "candle request failed");
                    last_error = reason;
                }
            }
            if attempt < self.retries {
                thread::sleep(self.retry_delay);
            }
        }

        Err(SqzError::Fetch {
            reason: format!(
                "{product} {start}..{end} failed after {} attempts: {last_error}",
                self.retries
            ),
        })
    }

    fn request_candles(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<Vec<f64>>, String> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("http status {status}"));
        }
        response.json().map_err(|e| e.to_string())
    }
}

impl DataPort for CoinbaseAdapter {
    fn fetch_bars(&self, product: &str, range: &DateRange) -> Result<Vec<PriceBar>, SqzError> {
        let now = Utc::now().naive_utc();
        let start = range.start.ok_or_else(|| SqzError::ConfigMissing {
            section: "backtest".to_string(),
            key: "start".to_string(),
        })?;
        let end = range.end.unwrap_or(now.date());

        let windows = range_windows(start, end, now);
        let bars = self.fetch_windows(product, windows)?;
        Ok(bars.into_iter().filter(|b| range.contains(b.time)).collect())
    }

    fn list_products(&self) -> Result<Vec<String>, SqzError> {
        let url = format!("{}/products", self.base_url);
        let products: Vec<Product> = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| SqzError::Fetch {
                reason: e.to_string(),
            })?;

        let mut ids: Vec<String> = products.into_iter().map(|p| p.id).collect();
        ids.sort();
        Ok(ids)
    }
}

/// Maps `[time, low, high, open, close, volume]` rows onto bars.
pub fn parse_candles(rows: &[Vec<f64>]) -> Result<Vec<PriceBar>, SqzError> {
    rows.iter()
        .map(|row| {
            let &[time, low, high, open, close, volume, ..] = row.as_slice() else {
                return Err(SqzError::InvalidData {
                    reason: format!("candle row has {} fields, expected 6", row.len()),
                });
            };
            let time = DateTime::from_timestamp(time as i64, 0)
                .ok_or_else(|| SqzError::InvalidData {
                    reason: format!("candle time out of range: {time}"),
                })?
                .naive_utc();
            Ok(PriceBar {
                time,
                open,
                high,
                low,
                close,
                volume,
            })
        })
        .collect()
}

fn day_window(date: NaiveDate, now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::MIN);
    let end_of_day = date.and_hms_opt(23, 59, 59).unwrap_or(start);
    (start, end_of_day.min(now))
}

/// One window per UTC day for the last `days` days, newest first. Today's
/// window ends at `now`.
pub fn day_windows(now: NaiveDateTime, days: u32) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let today = now.date();
    (0..days)
        .filter_map(|i| today.checked_sub_days(Days::new(u64::from(i))))
        .map(|date| day_window(date, now))
        .collect()
}

/// Splits `[start, end]` into consecutive windows of at most
/// `MAX_CANDLES_PER_REQUEST` candles of `granularity` seconds each.
pub fn split_window(
    start: NaiveDateTime,
    end: NaiveDateTime,
    granularity: u32,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let span = TimeDelta::seconds(i64::from(granularity.max(1)) * MAX_CANDLES_PER_REQUEST);
    let last_second = span - TimeDelta::seconds(1);
    let mut windows = Vec::new();
    let mut from = start;
    while from <= end {
        windows.push((from, (from + last_second).min(end)));
        from += span;
    }
    windows
}

/// One window per UTC day from `start` to `end` inclusive, skipping days
/// after `now`.
pub fn range_windows(
    start: NaiveDate,
    end: NaiveDate,
    now: NaiveDateTime,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    start
        .iter_days()
        .take_while(|d| *d <= end && *d <= now.date())
        .map(|date| day_window(date, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn parse_candles_maps_columns() {
        // 2024-03-01 01:00:00 UTC
        let rows = vec![vec![1709254800.0, 95.0, 110.0, 100.0, 105.0, 12.5]];
        let bars = parse_candles(&rows).unwrap();

        assert_eq!(bars[0].time, at(1, 1, 0));
        assert_eq!(bars[0].low, 95.0);
        assert_eq!(bars[0].high, 110.0);
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[0].volume, 12.5);
    }

    #[test]
    fn parse_candles_rejects_short_rows() {
        let err = parse_candles(&[vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(err, SqzError::InvalidData { .. }));
    }

    #[test]
    fn newest_first_rows_sort_ascending() {
        let rows = vec![
            vec![1709258400.0, 1.0, 1.0, 1.0, 2.0, 1.0],
            vec![1709254800.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        ];
        let bars = sort_and_dedup(parse_candles(&rows).unwrap());
        assert_eq!(bars[0].close, 1.0);
        assert_eq!(bars[1].close, 2.0);
    }

    #[test]
    fn day_windows_cover_whole_days_and_stop_at_now() {
        let now = at(10, 14, 30);
        let windows = day_windows(now, 3);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], (at(10, 0, 0), now));
        assert_eq!(
            windows[1],
            (at(9, 0, 0), at(9, 23, 59) + chrono::Duration::seconds(59))
        );
        assert_eq!(windows[2].0, at(8, 0, 0));
    }

    #[test]
    fn range_windows_are_inclusive_and_skip_future_days() {
        let now = at(10, 12, 0);
        let start = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let windows = range_windows(start, end, now);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].0, at(8, 0, 0));
        assert_eq!(windows[2], (at(10, 0, 0), now));
    }

    #[test]
    fn one_minute_days_are_split_to_fit_the_candle_limit() {
        let (start, end) = day_window(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(), at(10, 0, 0));
        let windows = split_window(start, end, 60);

        assert_eq!(windows.len(), 5);
        assert_eq!(windows[0], (at(9, 0, 0), at(9, 4, 59) + TimeDelta::seconds(59)));
        assert_eq!(windows[1].0, at(9, 5, 0));
        assert_eq!(windows[4], (at(9, 20, 0), end));
        for (from, to) in &windows {
            let candles = (*to - *from).num_seconds() / 60 + 1;
            assert!(candles <= MAX_CANDLES_PER_REQUEST);
        }
    }

    #[test]
    fn coarse_granularities_keep_one_request_per_day() {
        let (start, end) = day_window(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(), at(10, 0, 0));
        for granularity in [300, 900, 3600, 21600, 86400] {
            assert_eq!(split_window(start, end, granularity), vec![(start, end)]);
        }
    }

    #[test]
    fn partial_day_split_stops_at_now() {
        let now = at(10, 6, 30);
        let (start, end) = day_window(now.date(), now);
        let windows = split_window(start, end, 60);

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1], (at(10, 5, 0), now));
    }

    #[test]
    fn from_config_reads_data_section() {
        use crate::adapters::file_config_adapter::FileConfigAdapter;

        let config = FileConfigAdapter::from_string(
            "[data]\napi_url = http://localhost:9/\ngranularity = 300\nretries = 0\nretry_delay = 1\n",
        )
        .unwrap();
        let adapter = CoinbaseAdapter::from_config(&config).unwrap();

        assert_eq!(adapter.base_url, "http://localhost:9");
        assert_eq!(adapter.granularity, 300);
        assert_eq!(adapter.retries, 1);
        assert_eq!(adapter.retry_delay, Duration::from_secs(1));
    }
}
