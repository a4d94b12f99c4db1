//! Property tests for exit engine invariants.
//!
//! Uses proptest to verify:
//! 1. Trailing peak monotonicity: the peak never moves against the position
//! 2. Close idempotence: a second close never alters the frozen result
//! 3. Breach monotonicity: once breached, the ledger stays breached for the day
//! 4. Projected loss bound: a tick that crosses the daily limit is the tick that exits

use chrono::{NaiveDate, TimeZone, Utc};
use options_core::config::ExitConfig;
use options_core::types::{Direction, ExitReason, Position};
use proptest::prelude::*;
use risk_manager::{DailyRiskLedger, StopLossRules};
use rust_decimal::Decimal;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = Decimal> {
    (1_000i64..50_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Ce), Just(Direction::Pe)]
}

fn arb_pnl() -> impl Strategy<Value = Decimal> {
    (-300_000i64..300_000).prop_map(|paise| Decimal::new(paise, 2))
}

fn open(direction: Direction, entry: Decimal, qty: u32) -> Position {
    Position::open("NIFTY", direction, entry, qty, Utc::now()).unwrap()
}

// ── 1. Trailing Peak Monotonicity ────────────────────────────────────

proptest! {
    #[test]
    fn trailing_peak_never_moves_against_position(
        direction in arb_direction(),
        entry in arb_price(),
        prices in prop::collection::vec(arb_price(), 1..60),
    ) {
        let mut position = open(direction, entry, 1);
        let mut best = position.favorable_points(position.trailing_peak);

        for price in prices {
            position.update_trailing_peak(price);
            let now = position.favorable_points(position.trailing_peak);
            prop_assert!(now >= best);
            prop_assert!(now >= position.favorable_points(price));
            best = now;
        }
    }
}

// ── 2. Close Idempotence ─────────────────────────────────────────────

proptest! {
    #[test]
    fn second_close_never_changes_result(
        direction in arb_direction(),
        entry in arb_price(),
        first in arb_price(),
        second in arb_price(),
        qty in 1u32..500,
    ) {
        let mut position = open(direction, entry, qty);
        let realized = position.close(first, ExitReason::TargetHit, Utc::now()).unwrap();
        prop_assert_eq!(realized, position.unrealized_pnl(first));

        prop_assert!(position.close(second, ExitReason::StoplossHit, Utc::now()).is_err());
        prop_assert_eq!(position.realized_pnl, Some(realized));
        prop_assert_eq!(position.exit_price, Some(first));
        prop_assert_eq!(position.exit_reason, Some(ExitReason::TargetHit));
    }
}

// ── 3. Breach Monotonicity ───────────────────────────────────────────

proptest! {
    #[test]
    fn breach_is_monotonic_within_a_day(
        limit in 1i64..10_000,
        results in prop::collection::vec(arb_pnl(), 1..40),
    ) {
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let mut ledger = DailyRiskLedger::new(day, Decimal::new(limit, 0));
        let mut seen_breach = false;
        let mut total = Decimal::ZERO;

        for pnl in results {
            ledger.record_close(pnl);
            total += pnl;
            prop_assert_eq!(ledger.cumulative_realized_pnl(), total);
            if total < -Decimal::new(limit, 0) {
                seen_breach = true;
            }
            prop_assert_eq!(ledger.is_breached(), seen_breach);
        }
    }
}

// ── 4. Projected Loss Bound ──────────────────────────────────────────

proptest! {
    #[test]
    fn crossing_tick_exits_with_daily_max_loss(
        direction in arb_direction(),
        realized in -4_999i64..0,
        prices in prop::collection::vec(arb_price(), 1..40),
    ) {
        use options_core::types::{Evaluation, Tick};
        use risk_manager::RiskLedger;
        use std::sync::Arc;
        use trading_engine::{ExitEngine, PaperExecutor};

        let limit = Decimal::new(5000, 0);
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let mut day_ledger = DailyRiskLedger::new(day, limit);
        day_ledger.record_close(Decimal::new(realized, 0));
        let ledger = RiskLedger::new(day_ledger);

        // Only the daily limit is active
        let config = ExitConfig {
            daily_max_loss: limit,
            initial_stoploss: Decimal::ZERO,
            ..Default::default()
        };
        let engine = ExitEngine::new(
            "NIFTY",
            Arc::new(config),
            ledger,
            Arc::new(PaperExecutor::default()),
        )
        .unwrap();

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 4, 0, 0).unwrap();
        let entry = Decimal::new(250, 0);
        let position = rt
            .block_on(engine.open_position(direction, entry, 75, ts))
            .unwrap();

        for price in prices {
            let crosses = Decimal::new(realized, 0) + position.unrealized_pnl(price) < -limit;
            let eval = rt.block_on(engine.on_tick(&Tick::new(price, ts))).unwrap();
            if crosses {
                prop_assert_eq!(eval.reason(), Some(ExitReason::DailyMaxLoss));
                break;
            }
            prop_assert_eq!(eval, Evaluation::Hold);
        }
    }
}

#[test]
fn stop_rules_follow_config() {
    let rules = StopLossRules::from_config(&ExitConfig::default());
    assert!(rules.loss_rule().is_some());
    assert!(rules.target_rule().is_none());
    assert!(rules.trailing_rule().is_none());
}
