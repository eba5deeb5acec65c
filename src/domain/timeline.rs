//! Timestamp alignment between series.
//!
//! Every series in the pipeline (bars, indicators, flags, signals) is indexed
//! by position and carries a timestamp per position. Two series are aligned when
//! they have the same length and the same timestamp at every index.

use crate::domain::error::SqzError;
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDateTime;

pub trait Timeline {
    fn label(&self) -> String;
    fn len(&self) -> usize;
    fn time_at(&self, index: usize) -> NaiveDateTime;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Timeline for [PriceBar] {
    fn label(&self) -> String {
        "prices".to_string()
    }

    fn len(&self) -> usize {
        <[PriceBar]>::len(self)
    }

    fn time_at(&self, index: usize) -> NaiveDateTime {
        self[index].time
    }
}

pub fn check_aligned<A, B>(left: &A, right: &B) -> Result<(), SqzError>
where
    A: Timeline + ?Sized,
    B: Timeline + ?Sized,
{
    if left.len() != right.len() {
        return Err(SqzError::Alignment {
            left: left.label(),
            right: right.label(),
            reason: format!("length {} vs {}", left.len(), right.len()),
        });
    }

    for i in 0..left.len() {
        let (l, r) = (left.time_at(i), right.time_at(i));
        if l != r {
            return Err(SqzError::Alignment {
                left: left.label(),
                right: right.label(),
                reason: format!("index {i} has time {l} vs {r}"),
            });
        }
    }

    Ok(())
}
