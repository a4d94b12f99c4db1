//! Session clock gate: force-close everything at the configured exchange-local time.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use options_core::config::ExitConfig;
use options_core::types::{ExitReason, Position};
use options_core::{Error, Result};
use tracing::debug;

/// Compares event timestamps against the session close time in exchange-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionGate {
    close_time: NaiveTime,
    offset: FixedOffset,
}

impl SessionGate {
    pub fn new(close_time: NaiveTime, offset: FixedOffset) -> Self {
        Self { close_time, offset }
    }

    #[allow(clippy::result_large_err)]
    pub fn from_config(config: &ExitConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(config.session_utc_offset_minutes * 60).ok_or_else(|| {
            Error::configuration(format!(
                "session_utc_offset_minutes out of range: {}",
                config.session_utc_offset_minutes
            ))
        })?;
        Ok(Self::new(config.session_close_time, offset))
    }

    pub fn close_time(&self) -> NaiveTime {
        self.close_time
    }

    /// Exchange-local wall-clock time of `ts`.
    pub fn local_time(&self, ts: DateTime<Utc>) -> NaiveTime {
        ts.with_timezone(&self.offset).time()
    }

    /// Exchange-local calendar date of `ts`; the ledger rolls over on this.
    pub fn trading_day(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset).date_naive()
    }

    /// True at or after the session close time.
    pub fn is_closed(&self, ts: DateTime<Utc>) -> bool {
        self.local_time(ts) >= self.close_time
    }

    /// Forced squareoff reason if the session is closed at `ts`.
    pub fn check(&self, ts: DateTime<Utc>) -> Option<ExitReason> {
        if self.is_closed(ts) {
            debug!(
                local_time = %self.local_time(ts),
                close_time = %self.close_time,
                "Session close reached"
            );
            Some(ExitReason::ForcedSquareoff)
        } else {
            None
        }
    }

    /// True when `ts` falls on a later exchange date than the position's entry.
    pub fn is_carried_over(&self, position: &Position, ts: DateTime<Utc>) -> bool {
        self.trading_day(ts) > self.trading_day(position.opened_at)
    }

    /// Forced squareoff reason for `position` at `ts`: the session is closed, or
    /// the position survived into a later session without seeing the close.
    pub fn check_for(&self, position: &Position, ts: DateTime<Utc>) -> Option<ExitReason> {
        if self.is_carried_over(position, ts) {
            debug!(
                position_id = %position.id,
                opened_on = %self.trading_day(position.opened_at),
                now = %self.trading_day(ts),
                "Position carried past session close"
            );
            return Some(ExitReason::ForcedSquareoff);
        }
        self.check(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist_gate() -> SessionGate {
        SessionGate::from_config(&ExitConfig::default()).unwrap()
    }

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
    }

    #[test]
    fn test_before_close_is_open() {
        // 09:54:59 UTC = 15:24:59 IST
        let gate = ist_gate();
        assert!(!gate.is_closed(utc(9, 54, 59)));
        assert_eq!(gate.check(utc(9, 54, 59)), None);
    }

    #[test]
    fn test_at_and_after_close_forces_squareoff() {
        let gate = ist_gate();
        // 09:55:00 UTC = 15:25:00 IST
        assert_eq!(gate.check(utc(9, 55, 0)), Some(ExitReason::ForcedSquareoff));
        assert_eq!(gate.check(utc(10, 30, 0)), Some(ExitReason::ForcedSquareoff));
    }

    #[test]
    fn test_trading_day_uses_exchange_date() {
        let gate = ist_gate();
        // 20:00 UTC on the 4th is already the 5th in IST
        assert_eq!(
            gate.trading_day(utc(20, 0, 0)),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert_eq!(
            gate.trading_day(utc(4, 0, 0)),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
    }

    #[test]
    fn test_position_from_previous_session_is_squared_off() {
        use options_core::types::Direction;
        use rust_decimal::Decimal;

        let gate = ist_gate();
        // Opened 09:30 IST on the 4th
        let position =
            Position::open("NIFTY", Direction::Ce, Decimal::new(100, 0), 75, utc(4, 0, 0))
                .unwrap();
        assert_eq!(gate.check_for(&position, utc(9, 0, 0)), None);

        // 09:20 IST on the 5th is before the close time but a later session
        let next_morning = Utc.with_ymd_and_hms(2024, 3, 5, 3, 50, 0).unwrap();
        assert!(gate.check(next_morning).is_none());
        assert!(gate.is_carried_over(&position, next_morning));
        assert_eq!(
            gate.check_for(&position, next_morning),
            Some(ExitReason::ForcedSquareoff)
        );
    }

    #[test]
    fn test_utc_gate() {
        let gate = SessionGate::new(
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            FixedOffset::east_opt(0).unwrap(),
        );
        assert!(!gate.is_closed(utc(15, 59, 59)));
        assert!(gate.is_closed(utc(16, 0, 0)));
    }
}
