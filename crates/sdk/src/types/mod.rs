mod address;
mod amount;
mod event;
mod swap;

use std::fmt::Display;

pub use address::*;
pub use amount::*;
use chrono::{DateTime, Utc};
pub use event::*;
pub use swap::*;

/// Instant in chain history the state/event is up to date with.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, Default)]
pub struct StateInstant {
    block_number: u64,
    block_timestamp: u64,
}

impl StateInstant {
    pub fn new(block_number: u64, block_timestamp: u64) -> Self {
        Self { block_number, block_timestamp }
    }

    pub fn block_number(&self) -> u64 { self.block_number }

    pub fn block_timestamp(&self) -> u64 { self.block_timestamp }

    pub fn next(&self) -> Self {
        Self { block_number: self.block_number + 1, block_timestamp: self.block_timestamp }
    }
}

impl Display for StateInstant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(ts) = DateTime::<Utc>::from_timestamp(self.block_timestamp as i64, 0) else {
            return write!(f, "#{}", self.block_number);
        };
        let ts = ts.format("%Y-%m-%d %H:%M:%S");
        if self.block_number > 0 {
            write!(f, "#{} @ {}", self.block_number, ts)
        } else {
            write!(f, "{}", ts)
        }
    }
}

/// Inclusive range of block heights to search events within.
///
/// Missing bounds are open: `min` defaults to genesis, `max` to the latest
/// block known to the node at the time of the search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct HeightRange {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl HeightRange {
    /// Whole chain history.
    pub fn full() -> Self { Self::default() }

    pub fn new(min: Option<u64>, max: Option<u64>) -> Self { Self { min, max } }

    /// Range from the given height up to the latest block.
    pub fn since(min: u64) -> Self { Self { min: Some(min), max: None } }

    pub fn contains(&self, height: u64) -> bool {
        self.min.is_none_or(|min| height >= min) && self.max.is_none_or(|max| height <= max)
    }

    pub fn is_empty(&self) -> bool {
        matches!((self.min, self.max), (Some(min), Some(max)) if min > max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_range_bounds() {
        assert!(HeightRange::full().contains(0));
        assert!(HeightRange::full().contains(u64::MAX));

        let range = HeightRange::new(Some(10), Some(20));
        assert!(!range.contains(9));
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(21));
        assert!(!range.is_empty());

        assert!(HeightRange::since(5).contains(1_000_000));
        assert!(HeightRange::new(Some(3), Some(2)).is_empty());
    }

    #[test]
    fn instant_display() {
        assert_eq!(StateInstant::new(7, 0).to_string(), "#7 @ 1970-01-01 00:00:00");
        assert_eq!(StateInstant::new(0, 60).to_string(), "1970-01-01 00:01:00");
    }
}
