//! Exit reasons and the decisions handed to the order executor.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::Direction;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Session close time reached.
    ForcedSquareoff,
    /// Realized plus unrealized P&L would cross the daily loss limit.
    DailyMaxLoss,
    /// The risk ledger could not be read; exit taken to stay safe.
    RiskLedgerUnavailable,
    /// Directional signal flipped against the position.
    MdsReversal,
    /// Directional signal went neutral (only when configured).
    MdsNeutral,
    /// Signal slope turned against the position with slow-momentum confirmation.
    MdsMomentumLoss,
    MaxLossPerTrade,
    StoplossHit,
    TargetHit,
    TrailingStopHit,
    /// Operator-requested close.
    ManualSquareoff,
}

impl ExitReason {
    /// Operator-facing reason string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::ForcedSquareoff => "Forced Squareoff",
            ExitReason::DailyMaxLoss => "Daily Max Loss",
            ExitReason::RiskLedgerUnavailable => "Risk Ledger Unavailable",
            ExitReason::MdsReversal => "MDS Reversal",
            ExitReason::MdsNeutral => "MDS Neutral",
            ExitReason::MdsMomentumLoss => "MDS Momentum Loss",
            ExitReason::MaxLossPerTrade => "Max Loss Per Trade",
            ExitReason::StoplossHit => "Stoploss Hit",
            ExitReason::TargetHit => "Target Hit",
            ExitReason::TrailingStopHit => "Trailing SL Hit",
            ExitReason::ManualSquareoff => "Manual Squareoff",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed exit, as recorded by the engine and consumed by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitDecision {
    pub position_id: Uuid,
    pub instrument: String,
    pub direction: Direction,
    pub quantity: u32,
    pub reason: ExitReason,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    /// Cumulative realized P&L for the day, including this exit.
    pub daily_pnl: Decimal,
    pub daily_limit_breached: bool,
    pub decided_at: DateTime<Utc>,
}

/// Outcome of evaluating one tick or candle close.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// No rule fired; the position stays open.
    Hold,
    Exited(ExitDecision),
}

impl Evaluation {
    pub fn decision(&self) -> Option<&ExitDecision> {
        match self {
            Evaluation::Hold => None,
            Evaluation::Exited(decision) => Some(decision),
        }
    }

    pub fn reason(&self) -> Option<ExitReason> {
        self.decision().map(|d| d.reason)
    }
}
