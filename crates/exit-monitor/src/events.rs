//! JSON-lines event format for replays.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use options_core::types::Direction;
use rust_decimal::Decimal;
use serde::Deserialize;

/// One line of an event file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Open a position. `quantity` defaults to the configured lot size.
    Open {
        instrument: String,
        direction: Direction,
        price: Decimal,
        #[serde(default)]
        quantity: Option<u32>,
        timestamp: DateTime<Utc>,
    },
    Tick {
        instrument: String,
        price: Decimal,
        timestamp: DateTime<Utc>,
    },
    /// Candle close with the indicator snapshot published for it.
    Candle {
        instrument: String,
        close: Decimal,
        timestamp: DateTime<Utc>,
        #[serde(default)]
        signal: serde_json::Value,
        #[serde(default)]
        is_choppy: bool,
    },
    Squareoff {
        instrument: String,
        price: Decimal,
        timestamp: DateTime<Utc>,
    },
    NewDay {
        date: NaiveDate,
    },
}

impl MonitorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::Open { .. } => "open",
            MonitorEvent::Tick { .. } => "tick",
            MonitorEvent::Candle { .. } => "candle",
            MonitorEvent::Squareoff { .. } => "squareoff",
            MonitorEvent::NewDay { .. } => "new_day",
        }
    }
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<MonitorEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let event = serde_json::from_str(trimmed)
        .with_context(|| format!("invalid event on line {}", line_no))?;
    Ok(Some(event))
}
