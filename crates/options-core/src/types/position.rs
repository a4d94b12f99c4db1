//! Position state for a single option leg.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::ExitReason;
use crate::{Error, Result};

/// Side of the option exposure held by a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Call-side exposure; profits when price rises.
    #[serde(rename = "CE")]
    Ce,
    /// Put-side exposure; profits when price falls.
    #[serde(rename = "PE")]
    Pe,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Ce => Direction::Pe,
            Direction::Pe => Direction::Ce,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ce => write!(f, "CE"),
            Direction::Pe => write!(f, "PE"),
        }
    }
}

/// Lifecycle state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// An options position tracked by the exit engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique identifier for this position.
    pub id: Uuid,
    /// Instrument the position was opened on (e.g. "NIFTY").
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    /// Number of units held. Always > 0.
    pub quantity: u32,
    pub status: PositionStatus,
    /// Best price seen since entry (highest for CE, lowest for PE).
    pub trailing_peak: Decimal,
    /// Set once the favorable move reaches the trailing start level.
    pub trailing_armed: bool,
    pub exit_reason: Option<ExitReason>,
    pub exit_price: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Open a new position. Fails if quantity is zero or the entry price is not positive.
    pub fn open(
        instrument: impl Into<String>,
        direction: Direction,
        entry_price: Decimal,
        quantity: u32,
        opened_at: DateTime<Utc>,
    ) -> Result<Self> {
        if quantity == 0 {
            return Err(Error::invalid_state("Position quantity must be greater than zero"));
        }
        if entry_price <= Decimal::ZERO {
            return Err(Error::invalid_state(format!(
                "Entry price must be positive, got {}",
                entry_price
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            instrument: instrument.into(),
            direction,
            entry_price,
            quantity,
            status: PositionStatus::Open,
            trailing_peak: entry_price,
            trailing_armed: false,
            exit_reason: None,
            exit_price: None,
            realized_pnl: None,
            opened_at,
            closed_at: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Price move from entry in the position's favour, in points per unit.
    pub fn favorable_points(&self, current_price: Decimal) -> Decimal {
        match self.direction {
            Direction::Ce => current_price - self.entry_price,
            Direction::Pe => self.entry_price - current_price,
        }
    }

    /// Unrealized P&L at `current_price` for the whole quantity.
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        self.favorable_points(current_price) * Decimal::from(self.quantity)
    }

    /// Raise the trailing peak in the favorable direction. Never lowers it.
    /// Returns true if the peak moved.
    pub fn update_trailing_peak(&mut self, current_price: Decimal) -> bool {
        let improved = match self.direction {
            Direction::Ce => current_price > self.trailing_peak,
            Direction::Pe => current_price < self.trailing_peak,
        };
        if improved {
            self.trailing_peak = current_price;
        }
        improved
    }

    /// Favorable points between the trailing peak and `current_price`.
    pub fn retrace_from_peak(&self, current_price: Decimal) -> Decimal {
        self.favorable_points(self.trailing_peak) - self.favorable_points(current_price)
    }

    /// Close the position and freeze the realized P&L.
    ///
    /// Returns an error if the position is already closed; the frozen values are untouched.
    pub fn close(
        &mut self,
        price: Decimal,
        reason: ExitReason,
        closed_at: DateTime<Utc>,
    ) -> Result<Decimal> {
        if self.status == PositionStatus::Closed {
            return Err(Error::invalid_state(format!(
                "Position {} is already closed ({})",
                self.id,
                self.exit_reason
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "unknown reason".to_string())
            )));
        }

        let realized = self.unrealized_pnl(price);
        self.status = PositionStatus::Closed;
        self.exit_price = Some(price);
        self.exit_reason = Some(reason);
        self.realized_pnl = Some(realized);
        self.closed_at = Some(closed_at);
        Ok(realized)
    }
}
