//! Market events consumed by the exit engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price update for the traded option.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn new(price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self { price, timestamp }
    }
}

/// Completion of a candle interval. The close price is evaluated like a tick,
/// plus the signal reversal check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleClose {
    pub close: Decimal,
    /// Time the candle closed.
    pub timestamp: DateTime<Utc>,
}

impl CandleClose {
    pub fn new(close: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self { close, timestamp }
    }

    /// The candle close viewed as a tick at the close price.
    pub fn as_tick(&self) -> Tick {
        Tick::new(self.close, self.timestamp)
    }
}
