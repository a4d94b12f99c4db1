//! Daily risk ledger: realized P&L for the trading day and the daily loss limit.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Serialisable view of the ledger for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub trading_day: NaiveDate,
    pub cumulative_realized_pnl: Decimal,
    pub daily_loss_limit: Decimal,
    pub breached: bool,
    pub trades_today: u32,
    pub wins: u32,
    pub losses: u32,
    #[serde(default)]
    pub breakeven: u32,
    /// The ledger lock was poisoned; figures may be incomplete.
    pub degraded: bool,
}

/// Realized P&L accumulated across all positions closed today.
#[derive(Debug, Clone)]
pub struct DailyRiskLedger {
    trading_day: NaiveDate,
    cumulative_realized_pnl: Decimal,
    /// Absolute daily loss limit (0 = disabled).
    daily_loss_limit: Decimal,
    /// Monotonic within a trading day.
    breached: bool,
    trades_today: u32,
    wins: u32,
    losses: u32,
    breakeven: u32,
}

impl DailyRiskLedger {
    pub fn new(trading_day: NaiveDate, daily_loss_limit: Decimal) -> Self {
        Self {
            trading_day,
            cumulative_realized_pnl: Decimal::ZERO,
            daily_loss_limit,
            breached: false,
            trades_today: 0,
            wins: 0,
            losses: 0,
            breakeven: 0,
        }
    }

    pub fn trading_day(&self) -> NaiveDate {
        self.trading_day
    }

    pub fn cumulative_realized_pnl(&self) -> Decimal {
        self.cumulative_realized_pnl
    }

    pub fn daily_loss_limit(&self) -> Decimal {
        self.daily_loss_limit
    }

    pub fn is_breached(&self) -> bool {
        self.breached
    }

    pub fn trades_today(&self) -> u32 {
        self.trades_today
    }

    /// Today's realized P&L plus a candidate unrealized P&L.
    pub fn projected_total(&self, projected_pnl: Decimal) -> Decimal {
        self.cumulative_realized_pnl + projected_pnl
    }

    /// True iff the limit is enabled and the projected total is below `-limit`.
    pub fn would_breach(&self, projected_pnl: Decimal) -> bool {
        self.daily_loss_limit > Decimal::ZERO
            && self.projected_total(projected_pnl) < -self.daily_loss_limit
    }

    /// Mark the daily limit as breached. Returns true on the first call of the day.
    pub fn mark_breached(&mut self) -> bool {
        if self.breached {
            return false;
        }
        self.breached = true;
        error!(
            trading_day = %self.trading_day,
            daily_pnl = %self.cumulative_realized_pnl,
            limit = %self.daily_loss_limit,
            "Daily loss limit BREACHED - new entries halted for the day"
        );
        true
    }

    /// Record the realized P&L of a closed position.
    pub fn record_close(&mut self, realized_pnl: Decimal) {
        self.cumulative_realized_pnl += realized_pnl;
        self.trades_today += 1;
        if realized_pnl > Decimal::ZERO {
            self.wins += 1;
        } else if realized_pnl < Decimal::ZERO {
            self.losses += 1;
        } else {
            self.breakeven += 1;
        }

        debug!(
            realized_pnl = %realized_pnl,
            daily_pnl = %self.cumulative_realized_pnl,
            trades_today = self.trades_today,
            "Trade result recorded"
        );

        // Realized losses alone can cross the limit (e.g. a gap through a stoploss)
        if self.would_breach(Decimal::ZERO) {
            self.mark_breached();
        }
    }

    /// New entries are allowed until the limit is breached.
    pub fn can_open(&self) -> bool {
        !self.breached
    }

    /// Reset all daily figures for a new trading day.
    pub fn reset_for_day(&mut self, trading_day: NaiveDate) {
        info!(
            old_day = %self.trading_day,
            new_day = %trading_day,
            final_pnl = %self.cumulative_realized_pnl,
            "Daily risk ledger reset"
        );
        self.trading_day = trading_day;
        self.cumulative_realized_pnl = Decimal::ZERO;
        self.breached = false;
        self.trades_today = 0;
        self.wins = 0;
        self.losses = 0;
        self.breakeven = 0;
    }

    /// Reset if `day` is later than the ledger's trading day. Returns true if reset.
    pub fn roll_to(&mut self, day: NaiveDate) -> bool {
        if day > self.trading_day {
            self.reset_for_day(day);
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            trading_day: self.trading_day,
            cumulative_realized_pnl: self.cumulative_realized_pnl,
            daily_loss_limit: self.daily_loss_limit,
            breached: self.breached,
            trades_today: self.trades_today,
            wins: self.wins,
            losses: self.losses,
            breakeven: self.breakeven,
            degraded: false,
        }
    }
}

/// Shared handle to the day's ledger. Every position engine holds a clone; all
/// reads and updates go through [`RiskLedger::acquire`], one holder at a time.
#[derive(Clone)]
pub struct RiskLedger {
    inner: Arc<Mutex<DailyRiskLedger>>,
    /// Fast path for the breached flag.
    breached: Arc<AtomicBool>,
}

impl RiskLedger {
    pub fn new(ledger: DailyRiskLedger) -> Self {
        let breached = ledger.is_breached();
        Self {
            inner: Arc::new(Mutex::new(ledger)),
            breached: Arc::new(AtomicBool::new(breached)),
        }
    }

    /// Take exclusive access to the ledger.
    ///
    /// A poisoned lock is recovered, and the guard reports itself as degraded so the
    /// caller can fail safe instead of trusting the figures blindly.
    pub fn acquire(&self) -> LedgerGuard<'_> {
        match self.inner.lock() {
            Ok(guard) => LedgerGuard {
                guard,
                breached_flag: &self.breached,
                degraded: false,
            },
            Err(poisoned) => {
                error!("Risk ledger lock poisoned - ledger figures unreliable");
                LedgerGuard {
                    guard: poisoned.into_inner(),
                    breached_flag: &self.breached,
                    degraded: true,
                }
            }
        }
    }

    /// Check the breached flag without taking the lock.
    pub fn is_breached(&self) -> bool {
        self.breached.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let guard = self.acquire();
        let mut snapshot = guard.snapshot();
        snapshot.degraded = guard.is_degraded();
        snapshot
    }

    /// Start a new trading day. Also clears a poisoned lock.
    pub fn reset_for_day(&self, trading_day: NaiveDate) {
        if self.inner.is_poisoned() {
            warn!("Clearing poisoned risk ledger at day reset");
            self.inner.clear_poison();
        }
        let mut guard = self.acquire();
        guard.reset_for_day(trading_day);
    }
}

impl std::fmt::Debug for RiskLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskLedger")
            .field("breached", &self.is_breached())
            .field("poisoned", &self.inner.is_poisoned())
            .finish()
    }
}

/// Exclusive access to the ledger. Mutations keep the fast-path flag in sync.
pub struct LedgerGuard<'a> {
    guard: MutexGuard<'a, DailyRiskLedger>,
    breached_flag: &'a AtomicBool,
    degraded: bool,
}

impl LedgerGuard<'_> {
    /// True when the underlying lock was poisoned.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn mark_breached(&mut self) -> bool {
        let first = self.guard.mark_breached();
        self.sync_flag();
        first
    }

    pub fn record_close(&mut self, realized_pnl: Decimal) {
        self.guard.record_close(realized_pnl);
        self.sync_flag();
    }

    pub fn roll_to(&mut self, day: NaiveDate) -> bool {
        let rolled = self.guard.roll_to(day);
        self.sync_flag();
        rolled
    }

    pub fn reset_for_day(&mut self, trading_day: NaiveDate) {
        self.guard.reset_for_day(trading_day);
        self.sync_flag();
    }

    fn sync_flag(&self) {
        self.breached_flag
            .store(self.guard.is_breached(), Ordering::SeqCst);
    }
}

impl Deref for LedgerGuard<'_> {
    type Target = DailyRiskLedger;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_projected_breach_scenario() {
        let mut ledger = DailyRiskLedger::new(day(4), Decimal::new(5000, 0));
        ledger.record_close(Decimal::new(-4800, 0));
        assert!(!ledger.is_breached());

        // -4800 realized + -300 unrealized = -5100 < -5000
        assert_eq!(
            ledger.projected_total(Decimal::new(-300, 0)),
            Decimal::new(-5100, 0)
        );
        assert!(ledger.would_breach(Decimal::new(-300, 0)));
        assert!(!ledger.would_breach(Decimal::new(-200, 0)));
    }

    #[test]
    fn test_exact_limit_is_not_a_breach() {
        let ledger = DailyRiskLedger::new(day(4), Decimal::new(5000, 0));
        assert!(!ledger.would_breach(Decimal::new(-5000, 0)));
        assert!(ledger.would_breach(Decimal::new(-5001, 0)));
    }

    #[test]
    fn test_zero_limit_disables_check() {
        let mut ledger = DailyRiskLedger::new(day(4), Decimal::ZERO);
        ledger.record_close(Decimal::new(-1_000_000, 0));
        assert!(!ledger.would_breach(Decimal::new(-1_000_000, 0)));
        assert!(!ledger.is_breached());
    }

    #[test]
    fn test_realized_losses_mark_breach() {
        let mut ledger = DailyRiskLedger::new(day(4), Decimal::new(1000, 0));
        ledger.record_close(Decimal::new(-600, 0));
        assert!(!ledger.is_breached());
        ledger.record_close(Decimal::new(-600, 0));
        assert!(ledger.is_breached());
        assert!(!ledger.can_open());

        // A later win does not clear the flag
        ledger.record_close(Decimal::new(900, 0));
        assert!(ledger.is_breached());
        assert_eq!(ledger.trades_today(), 3);
    }

    #[test]
    fn test_flat_close_is_breakeven() {
        let mut ledger = DailyRiskLedger::new(day(4), Decimal::new(1000, 0));
        ledger.record_close(Decimal::ZERO);
        ledger.record_close(Decimal::new(25, 0));
        ledger.record_close(Decimal::new(-25, 0));

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.trades_today, 3);
        assert_eq!(snapshot.wins, 1);
        assert_eq!(snapshot.losses, 1);
        assert_eq!(snapshot.breakeven, 1);

        ledger.reset_for_day(day(5));
        assert_eq!(ledger.snapshot().breakeven, 0);
    }

    #[test]
    fn test_mark_breached_once() {
        let mut ledger = DailyRiskLedger::new(day(4), Decimal::new(1000, 0));
        assert!(ledger.mark_breached());
        assert!(!ledger.mark_breached());
    }

    #[test]
    fn test_roll_to_new_day_resets() {
        let mut ledger = DailyRiskLedger::new(day(4), Decimal::new(1000, 0));
        ledger.record_close(Decimal::new(-2000, 0));
        assert!(ledger.is_breached());

        assert!(!ledger.roll_to(day(4)));
        assert!(!ledger.roll_to(day(3)));
        assert!(ledger.is_breached());

        assert!(ledger.roll_to(day(5)));
        assert!(!ledger.is_breached());
        assert_eq!(ledger.cumulative_realized_pnl(), Decimal::ZERO);
        assert_eq!(ledger.trading_day(), day(5));
    }

    #[test]
    fn test_shared_ledger_flag_follows_guard() {
        let ledger = RiskLedger::new(DailyRiskLedger::new(day(4), Decimal::new(100, 0)));
        assert!(!ledger.is_breached());

        {
            let mut guard = ledger.acquire();
            assert!(!guard.is_degraded());
            guard.record_close(Decimal::new(-150, 0));
        }
        assert!(ledger.is_breached());

        ledger.reset_for_day(day(5));
        assert!(!ledger.is_breached());
        assert_eq!(ledger.snapshot().trading_day, day(5));
    }

    #[test]
    fn test_poisoned_ledger_is_degraded_until_reset() {
        let ledger = RiskLedger::new(DailyRiskLedger::new(day(4), Decimal::new(100, 0)));

        let poisoner = ledger.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.acquire();
            panic!("writer crashed while holding the ledger");
        })
        .join();

        assert!(ledger.acquire().is_degraded());
        assert!(ledger.snapshot().degraded);

        ledger.reset_for_day(day(5));
        assert!(!ledger.acquire().is_degraded());
    }
}
