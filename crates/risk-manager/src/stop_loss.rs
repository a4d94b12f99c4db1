//! Per-trade stop rules: loss limit or initial stoploss, profit target, trailing stop.

use options_core::config::ExitConfig;
use options_core::types::{Direction, ExitReason, Position};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single per-trade exit rule. Thresholds are non-negative; disabled rules are
/// simply absent from [`StopLossRules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRule {
    /// Unrealized loss in currency across the whole quantity.
    MaxLossPerTrade { amount: Decimal },
    /// Adverse move in price points from entry.
    InitialStoploss { points: Decimal },
    /// Favorable move in points per unit.
    Target { points: Decimal },
    /// Armed once the favorable move reaches `start_points`; fires on a
    /// retrace of `step` points from the trailing peak.
    Trailing { start_points: Decimal, step: Decimal },
}

impl StopRule {
    pub fn reason(&self) -> ExitReason {
        match self {
            StopRule::MaxLossPerTrade { .. } => ExitReason::MaxLossPerTrade,
            StopRule::InitialStoploss { .. } => ExitReason::StoplossHit,
            StopRule::Target { .. } => ExitReason::TargetHit,
            StopRule::Trailing { .. } => ExitReason::TrailingStopHit,
        }
    }

    /// Check the rule against `current_price` without mutating the position.
    /// The trailing rule only fires once the position is armed.
    pub fn is_triggered(&self, position: &Position, current_price: Decimal) -> bool {
        match self {
            StopRule::MaxLossPerTrade { amount } => {
                position.unrealized_pnl(current_price) <= -*amount
            }
            StopRule::InitialStoploss { points } => {
                position.favorable_points(current_price) <= -*points
            }
            StopRule::Target { points } => {
                position.unrealized_pnl(current_price)
                    >= *points * Decimal::from(position.quantity)
            }
            StopRule::Trailing { step, .. } => {
                position.trailing_armed && position.retrace_from_peak(current_price) >= *step
            }
        }
    }

    /// Price at which the rule fires, for logging and status.
    pub fn trigger_price(&self, position: &Position) -> Option<Decimal> {
        let qty = Decimal::from(position.quantity);
        let offset = match self {
            StopRule::MaxLossPerTrade { amount } => -(*amount / qty),
            StopRule::InitialStoploss { points } => -*points,
            StopRule::Target { points } => *points,
            StopRule::Trailing { step, .. } => {
                if !position.trailing_armed {
                    return None;
                }
                position.favorable_points(position.trailing_peak) - *step
            }
        };
        Some(price_at_offset(position, offset))
    }
}

/// Price whose favorable move from entry equals `points`.
fn price_at_offset(position: &Position, points: Decimal) -> Decimal {
    match position.direction {
        Direction::Ce => position.entry_price + points,
        Direction::Pe => position.entry_price - points,
    }
}

/// The per-trade rules enabled by the configuration, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopLossRules {
    loss: Option<StopRule>,
    target: Option<StopRule>,
    trailing: Option<StopRule>,
}

impl StopLossRules {
    pub fn from_config(config: &ExitConfig) -> Self {
        let loss = if config.max_loss_per_trade > Decimal::ZERO {
            Some(StopRule::MaxLossPerTrade {
                amount: config.max_loss_per_trade,
            })
        } else if config.initial_stoploss > Decimal::ZERO {
            Some(StopRule::InitialStoploss {
                points: config.initial_stoploss,
            })
        } else {
            None
        };

        let target = (config.target_points > Decimal::ZERO).then_some(StopRule::Target {
            points: config.target_points,
        });

        let trailing = (config.trail_start_profit > Decimal::ZERO
            && config.trail_step > Decimal::ZERO)
            .then_some(StopRule::Trailing {
                start_points: config.trail_start_profit,
                step: config.trail_step,
            });

        Self {
            loss,
            target,
            trailing,
        }
    }

    pub fn loss_rule(&self) -> Option<StopRule> {
        self.loss
    }

    pub fn target_rule(&self) -> Option<StopRule> {
        self.target
    }

    pub fn trailing_rule(&self) -> Option<StopRule> {
        self.trailing
    }

    /// Per-trade max loss, or the initial stoploss when no currency limit is set.
    pub fn check_loss(&self, position: &Position, current_price: Decimal) -> Option<ExitReason> {
        self.loss
            .filter(|rule| rule.is_triggered(position, current_price))
            .map(|rule| rule.reason())
    }

    pub fn check_target(&self, position: &Position, current_price: Decimal) -> Option<ExitReason> {
        self.target
            .filter(|rule| rule.is_triggered(position, current_price))
            .map(|rule| rule.reason())
    }

    /// Update the trailing peak, arm the stop once the start level is reached,
    /// and report a hit when an armed stop sees a large enough retrace.
    pub fn check_trailing(
        &self,
        position: &mut Position,
        current_price: Decimal,
    ) -> Option<ExitReason> {
        let rule = self.trailing?;
        let StopRule::Trailing { start_points, .. } = rule else {
            return None;
        };

        if position.update_trailing_peak(current_price) {
            debug!(
                position_id = %position.id,
                new_peak = %position.trailing_peak,
                "Updated trailing stop peak"
            );
        }

        if !position.trailing_armed
            && position.favorable_points(position.trailing_peak) >= start_points
        {
            position.trailing_armed = true;
            debug!(
                position_id = %position.id,
                peak = %position.trailing_peak,
                "Trailing stop armed"
            );
        }

        rule.is_triggered(position, current_price)
            .then_some(rule.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(direction: Direction, entry: i64, qty: u32) -> Position {
        Position::open("NIFTY", direction, Decimal::new(entry, 0), qty, Utc::now()).unwrap()
    }

    fn rules(f: impl FnOnce(&mut ExitConfig)) -> StopLossRules {
        let mut config = ExitConfig::default();
        f(&mut config);
        StopLossRules::from_config(&config)
    }

    #[test]
    fn test_initial_stoploss_fallback() {
        let rules = rules(|c| {
            c.max_loss_per_trade = Decimal::ZERO;
            c.initial_stoploss = Decimal::new(50, 0);
        });
        let pos = position(Direction::Ce, 100, 75);

        assert_eq!(rules.check_loss(&pos, Decimal::new(51, 0)), None);
        assert_eq!(
            rules.check_loss(&pos, Decimal::new(50, 0)),
            Some(ExitReason::StoplossHit)
        );
    }

    #[test]
    fn test_max_loss_per_trade_takes_precedence() {
        let rules = rules(|c| {
            c.max_loss_per_trade = Decimal::new(1500, 0);
            c.initial_stoploss = Decimal::new(50, 0);
        });
        let pos = position(Direction::Ce, 100, 75);

        // -19 * 75 = -1425
        assert_eq!(rules.check_loss(&pos, Decimal::new(81, 0)), None);
        // -20 * 75 = -1500
        assert_eq!(
            rules.check_loss(&pos, Decimal::new(80, 0)),
            Some(ExitReason::MaxLossPerTrade)
        );
        assert_eq!(
            rules.loss_rule().unwrap().trigger_price(&pos),
            Some(Decimal::new(80, 0))
        );
    }

    #[test]
    fn test_stoploss_mirrored_for_puts() {
        let rules = rules(|_| {});
        let pos = position(Direction::Pe, 100, 75);
        assert_eq!(rules.check_loss(&pos, Decimal::new(140, 0)), None);
        assert_eq!(
            rules.check_loss(&pos, Decimal::new(150, 0)),
            Some(ExitReason::StoplossHit)
        );
    }

    #[test]
    fn test_target_hit() {
        let rules = rules(|c| c.target_points = Decimal::new(20, 0));
        let pos = position(Direction::Ce, 100, 75);

        // 20 * 75 = 1500 threshold; 1600 unrealized clears it
        let price = Decimal::new(100, 0) + Decimal::new(1600, 0) / Decimal::new(75, 0);
        assert_eq!(rules.check_target(&pos, price), Some(ExitReason::TargetHit));
        assert_eq!(rules.check_target(&pos, Decimal::new(119, 0)), None);
    }

    #[test]
    fn test_disabled_rules() {
        let rules = rules(|c| {
            c.initial_stoploss = Decimal::ZERO;
            c.target_points = Decimal::ZERO;
        });
        let mut pos = position(Direction::Ce, 100, 1);
        assert_eq!(rules.check_loss(&pos, Decimal::new(1, 0)), None);
        assert_eq!(rules.check_target(&pos, Decimal::new(1000, 0)), None);
        assert_eq!(rules.check_trailing(&mut pos, Decimal::new(1000, 0)), None);
    }

    #[test]
    fn test_trailing_arms_then_fires_on_retrace() {
        let rules = rules(|c| {
            c.trail_start_profit = Decimal::new(10, 0);
            c.trail_step = Decimal::new(5, 0);
        });
        let mut pos = position(Direction::Ce, 100, 1);

        // Not armed yet: a retrace does nothing
        assert_eq!(rules.check_trailing(&mut pos, Decimal::new(108, 0)), None);
        assert_eq!(rules.check_trailing(&mut pos, Decimal::new(101, 0)), None);
        assert!(!pos.trailing_armed);

        assert_eq!(rules.check_trailing(&mut pos, Decimal::new(112, 0)), None);
        assert!(pos.trailing_armed);
        assert_eq!(rules.check_trailing(&mut pos, Decimal::new(120, 0)), None);
        assert_eq!(
            rules.trailing_rule().unwrap().trigger_price(&pos),
            Some(Decimal::new(115, 0))
        );

        assert_eq!(rules.check_trailing(&mut pos, Decimal::new(116, 0)), None);
        assert_eq!(
            rules.check_trailing(&mut pos, Decimal::new(115, 0)),
            Some(ExitReason::TrailingStopHit)
        );
        assert_eq!(pos.trailing_peak, Decimal::new(120, 0));
    }

    #[test]
    fn test_trailing_for_puts() {
        let rules = rules(|c| {
            c.trail_start_profit = Decimal::new(10, 0);
            c.trail_step = Decimal::new(5, 0);
        });
        let mut pos = position(Direction::Pe, 100, 1);

        assert_eq!(rules.check_trailing(&mut pos, Decimal::new(85, 0)), None);
        assert!(pos.trailing_armed);
        assert_eq!(
            rules.check_trailing(&mut pos, Decimal::new(90, 0)),
            Some(ExitReason::TrailingStopHit)
        );
    }
}
