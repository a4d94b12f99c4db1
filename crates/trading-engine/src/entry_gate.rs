//! Entry gating from candle signals with multi-candle confirmation.

use options_core::config::{ExitConfig, MdsThresholds};
use options_core::types::{Direction, DirectionalSignal, SignalDirection};
use serde::Serialize;
use std::fmt;

/// Why an entry was not taken on this candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryBlock {
    MdsNotReady,
    MdsChoppy,
    NeutralBand,
    ScoreTooLow,
    SlopeTooLow,
    /// Direction not yet confirmed for enough consecutive candles.
    Arming,
}

impl EntryBlock {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryBlock::MdsNotReady => "mds_not_ready",
            EntryBlock::MdsChoppy => "mds_choppy",
            EntryBlock::NeutralBand => "neutral_band",
            EntryBlock::ScoreTooLow => "score_too_low",
            EntryBlock::SlopeTooLow => "slope_too_low",
            EntryBlock::Arming => "arming",
        }
    }
}

impl fmt::Display for EntryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of feeding one candle signal to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryDecision {
    pub enter: Option<Direction>,
    pub blocked: Option<EntryBlock>,
    pub confirm_count: u32,
    pub confirm_needed: u32,
}

impl EntryDecision {
    fn blocked(reason: EntryBlock, confirm_count: u32, confirm_needed: u32) -> Self {
        Self {
            enter: None,
            blocked: Some(reason),
            confirm_count,
            confirm_needed,
        }
    }
}

/// Owns the same-direction confirmation count across candles.
#[derive(Debug, Clone)]
pub struct EntryGate {
    thresholds: MdsThresholds,
    confirm_needed: u32,
    last_direction: Option<SignalDirection>,
    confirm_count: u32,
}

impl EntryGate {
    pub fn new(thresholds: MdsThresholds, confirm_needed: u32) -> Self {
        Self {
            thresholds,
            confirm_needed,
            last_direction: None,
            confirm_count: 0,
        }
    }

    pub fn from_config(config: &ExitConfig) -> Self {
        Self::new(config.mds.clone(), config.entry_confirm_candles)
    }

    pub fn confirm_count(&self) -> u32 {
        self.confirm_count
    }

    pub fn reset(&mut self) {
        self.last_direction = None;
        self.confirm_count = 0;
    }

    /// Call after any entry attempt, whether or not the open succeeded.
    pub fn on_entry_attempted(&mut self) {
        self.confirm_count = 0;
    }

    /// Feed the candle's signal. `None` means the indicator has not warmed up.
    pub fn on_candle(&mut self, signal: Option<&DirectionalSignal>, is_choppy: bool) -> EntryDecision {
        let Some(signal) = signal else {
            return EntryDecision::blocked(EntryBlock::MdsNotReady, self.confirm_count, self.confirm_needed);
        };
        if is_choppy {
            return EntryDecision::blocked(EntryBlock::MdsChoppy, self.confirm_count, self.confirm_needed);
        }

        let block = if signal.direction == SignalDirection::None {
            Some(EntryBlock::NeutralBand)
        } else if signal.score.abs() < self.thresholds.entry_min_score {
            Some(EntryBlock::ScoreTooLow)
        } else if signal.slope.abs() < self.thresholds.entry_min_slope {
            Some(EntryBlock::SlopeTooLow)
        } else {
            None
        };

        if let Some(reason) = block {
            self.last_direction = Some(signal.direction);
            self.confirm_count = 0;
            return EntryDecision::blocked(reason, 0, self.confirm_needed);
        }

        if self.last_direction == Some(signal.direction) {
            self.confirm_count += 1;
        } else {
            self.last_direction = Some(signal.direction);
            self.confirm_count = 1;
        }

        if self.confirm_count < self.confirm_needed {
            return EntryDecision::blocked(EntryBlock::Arming, self.confirm_count, self.confirm_needed);
        }

        EntryDecision {
            enter: signal.direction.as_position_direction(),
            blocked: None,
            confirm_count: self.confirm_count,
            confirm_needed: self.confirm_needed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn signal(direction: SignalDirection, score: i64, slope: i64) -> DirectionalSignal {
        DirectionalSignal::new(
            direction,
            Decimal::new(score, 0),
            Decimal::new(slope, 0),
            Decimal::ONE,
        )
    }

    fn gate() -> EntryGate {
        EntryGate::new(MdsThresholds::default(), 2)
    }

    #[test]
    fn test_not_ready_and_choppy() {
        let mut gate = gate();
        assert_eq!(gate.on_candle(None, false).blocked, Some(EntryBlock::MdsNotReady));
        let s = signal(SignalDirection::Ce, 14, 2);
        assert_eq!(gate.on_candle(Some(&s), true).blocked, Some(EntryBlock::MdsChoppy));
    }

    #[test]
    fn test_weak_readings_block_and_reset() {
        let mut gate = gate();
        let strong = signal(SignalDirection::Ce, 14, 2);
        assert_eq!(gate.on_candle(Some(&strong), false).blocked, Some(EntryBlock::Arming));
        assert_eq!(gate.confirm_count(), 1);

        let weak = signal(SignalDirection::Ce, 9, 2);
        assert_eq!(gate.on_candle(Some(&weak), false).blocked, Some(EntryBlock::ScoreTooLow));
        assert_eq!(gate.confirm_count(), 0);

        let flat = signal(SignalDirection::Ce, 14, 0);
        assert_eq!(gate.on_candle(Some(&flat), false).blocked, Some(EntryBlock::SlopeTooLow));

        let neutral = signal(SignalDirection::None, 0, 0);
        assert_eq!(gate.on_candle(Some(&neutral), false).blocked, Some(EntryBlock::NeutralBand));
    }

    #[test]
    fn test_confirmation_across_candles() {
        let mut gate = gate();
        let put = signal(SignalDirection::Pe, -12, -3);

        let first = gate.on_candle(Some(&put), false);
        assert_eq!(first.blocked, Some(EntryBlock::Arming));

        let second = gate.on_candle(Some(&put), false);
        assert_eq!(second.enter, Some(Direction::Pe));
        assert_eq!(second.confirm_count, 2);

        gate.on_entry_attempted();
        assert_eq!(gate.on_candle(Some(&put), false).blocked, Some(EntryBlock::Arming));
    }

    #[test]
    fn test_direction_change_restarts_count() {
        let mut gate = gate();
        gate.on_candle(Some(&signal(SignalDirection::Ce, 12, 2)), false);
        let decision = gate.on_candle(Some(&signal(SignalDirection::Pe, -12, -2)), false);
        assert_eq!(decision.blocked, Some(EntryBlock::Arming));
        assert_eq!(decision.confirm_count, 1);
    }
}
