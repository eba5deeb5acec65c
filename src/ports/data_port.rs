//! Price data access port trait.

use crate::domain::error::SqzError;
use crate::domain::ohlcv::{DateRange, PriceBar};

pub trait DataPort {
    /// Bars for `product` inside `range`, ascending with unique timestamps.
    fn fetch_bars(&self, product: &str, range: &DateRange) -> Result<Vec<PriceBar>, SqzError>;

    fn list_products(&self) -> Result<Vec<String>, SqzError>;
}
