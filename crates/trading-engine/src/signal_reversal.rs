//! Candle-close signal checks against the open position.

use options_core::config::{ExitConfig, MdsThresholds, ReversalPolicy};
use options_core::types::{Direction, DirectionalSignal, ExitReason, Position, SignalDirection};
use options_core::{Error, Result};
use rust_decimal::Decimal;
use tracing::debug;

/// Source of the latest directional signal, read once per candle close.
///
/// A missing or unreadable signal is an [`Error::IndicatorUnavailable`], never a
/// neutral reading.
#[cfg_attr(test, mockall::automock)]
pub trait SignalSource: Send + Sync {
    fn current(&self) -> Result<DirectionalSignal>;
}

impl SignalSource for DirectionalSignal {
    fn current(&self) -> Result<DirectionalSignal> {
        Ok(self.clone())
    }
}

impl SignalSource for Option<DirectionalSignal> {
    fn current(&self) -> Result<DirectionalSignal> {
        self.clone()
            .ok_or_else(|| Error::indicator_unavailable("no signal published for this candle"))
    }
}

impl SignalSource for serde_json::Value {
    fn current(&self) -> Result<DirectionalSignal> {
        DirectionalSignal::from_snapshot(self)
    }
}

/// Decides MDS exits for a position from the candle's signal.
#[derive(Debug, Clone)]
pub struct SignalReversalEvaluator {
    policy: ReversalPolicy,
    exit_on_neutral: bool,
    thresholds: MdsThresholds,
}

impl SignalReversalEvaluator {
    pub fn new(policy: ReversalPolicy, exit_on_neutral: bool, thresholds: MdsThresholds) -> Self {
        Self {
            policy,
            exit_on_neutral,
            thresholds,
        }
    }

    pub fn from_config(config: &ExitConfig) -> Self {
        Self::new(
            config.reversal_policy,
            config.exit_on_neutral,
            config.mds.clone(),
        )
    }

    pub fn policy(&self) -> ReversalPolicy {
        self.policy
    }

    /// Exit reason for `position` given `signal`, if any.
    pub fn evaluate(&self, position: &Position, signal: &DirectionalSignal) -> Option<ExitReason> {
        let reason = match self.policy {
            ReversalPolicy::DirectionFlip => self.direction_flip(position.direction, signal),
            ReversalPolicy::ScoreConfirm => self.score_confirm(position.direction, signal),
        };

        if let Some(reason) = reason {
            debug!(
                position_id = %position.id,
                position_direction = %position.direction,
                signal_direction = %signal.direction,
                score = %signal.score,
                slope = %signal.slope,
                slow_momentum = %signal.slow_momentum,
                reason = %reason,
                "Signal exit condition met"
            );
        }
        reason
    }

    fn direction_flip(&self, held: Direction, signal: &DirectionalSignal) -> Option<ExitReason> {
        if is_reversal(held, signal.direction) {
            Some(ExitReason::MdsReversal)
        } else if signal.direction == SignalDirection::None && self.exit_on_neutral {
            Some(ExitReason::MdsNeutral)
        } else {
            None
        }
    }

    /// Score thresholds with slow-momentum confirmation. Puts mirror calls, so
    /// the reading is flipped into the position's frame first.
    fn score_confirm(&self, held: Direction, signal: &DirectionalSignal) -> Option<ExitReason> {
        let t = &self.thresholds;
        let (score, slope, slow) = match held {
            Direction::Ce => (signal.score, signal.slope, signal.slow_momentum),
            Direction::Pe => (-signal.score, -signal.slope, -signal.slow_momentum),
        };

        if score <= -t.reversal_score {
            return (slow <= -t.slow_confirm).then_some(ExitReason::MdsReversal);
        }
        if score.abs() <= t.neutral_band {
            return (self.exit_on_neutral && slow.abs() <= t.slow_confirm)
                .then_some(ExitReason::MdsNeutral);
        }
        if slope <= -t.momentum_slope && score < t.momentum_score_cap && slow <= Decimal::ZERO {
            return Some(ExitReason::MdsMomentumLoss);
        }
        None
    }
}

/// True if the signal points the other way from `held`.
pub fn is_reversal(held: Direction, signal: SignalDirection) -> bool {
    signal.as_position_direction() == Some(held.opposite())
}
