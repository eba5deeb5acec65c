//! Domain error types.

use chrono::NaiveDateTime;

/// Top-level error type for sqztrader.
#[derive(Debug, thiserror::Error)]
pub enum SqzError {
    #[error("series {left} and {right} are not aligned: {reason}")]
    Alignment {
        left: String,
        right: String,
        reason: String,
    },

    #[error("price series is not strictly ascending at index {index} ({time})")]
    UnsortedSeries { index: usize, time: NaiveDateTime },

    #[error("initial balance must be a positive finite number, got {0}")]
    InvalidBalance(f64),

    #[error("threshold must be a positive finite number, got {0}")]
    InvalidThreshold(f64),

    #[error("invalid data: {reason}")]
    InvalidData { reason: String },

    #[error("cannot buy at non-positive price {price} at {time}")]
    Division { time: NaiveDateTime, price: f64 },

    #[error("{indicator} is undefined at index {index}")]
    UndefinedValue { indicator: String, index: usize },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no price data for {product}")]
    NoData { product: String },

    #[error("fetch error: {reason}")]
    Fetch { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SqzError {
    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        SqzError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&SqzError> for std::process::ExitCode {
    fn from(err: &SqzError) -> Self {
        let code: u8 = match err {
            SqzError::Io(_) => 1,
            SqzError::ConfigParse { .. }
            | SqzError::ConfigMissing { .. }
            | SqzError::ConfigInvalid { .. } => 2,
            SqzError::Csv(_) | SqzError::InvalidData { .. } | SqzError::Fetch { .. } => 3,
            SqzError::Alignment { .. }
            | SqzError::UnsortedSeries { .. }
            | SqzError::InvalidBalance(_)
            | SqzError::InvalidThreshold(_) => 4,
            SqzError::Division { .. } | SqzError::UndefinedValue { .. } => 5,
            SqzError::NoData { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
