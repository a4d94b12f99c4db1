//! Directional (MDS) signal published by the indicator service once per candle close.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Direction;
use crate::{Error, Result};

/// Direction suggested by the signal. `None` is a neutral/indeterminate reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalDirection {
    #[serde(rename = "CE")]
    Ce,
    #[serde(rename = "PE")]
    Pe,
    #[serde(rename = "NONE")]
    None,
}

impl SignalDirection {
    /// The position direction this reading points to, if any.
    pub fn as_position_direction(self) -> Option<Direction> {
        match self {
            SignalDirection::Ce => Some(Direction::Ce),
            SignalDirection::Pe => Some(Direction::Pe),
            SignalDirection::None => None,
        }
    }
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalDirection::Ce => write!(f, "CE"),
            SignalDirection::Pe => write!(f, "PE"),
            SignalDirection::None => write!(f, "NONE"),
        }
    }
}

/// Latest directional signal. Every field is required; there are no defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionalSignal {
    pub direction: SignalDirection,
    pub score: Decimal,
    pub slope: Decimal,
    pub slow_momentum: Decimal,
}

impl DirectionalSignal {
    pub fn new(
        direction: SignalDirection,
        score: Decimal,
        slope: Decimal,
        slow_momentum: Decimal,
    ) -> Self {
        Self {
            direction,
            score,
            slope,
            slow_momentum,
        }
    }

    /// Parse a raw indicator snapshot.
    ///
    /// A null snapshot, a missing field or an unknown direction is reported as
    /// [`Error::IndicatorUnavailable`], never read as a neutral value.
    pub fn from_snapshot(snapshot: &serde_json::Value) -> Result<Self> {
        if snapshot.is_null() {
            return Err(Error::indicator_unavailable("no signal snapshot for this candle"));
        }
        serde_json::from_value(snapshot.clone())
            .map_err(|e| Error::indicator_unavailable(format!("malformed signal snapshot: {}", e)))
    }
}
