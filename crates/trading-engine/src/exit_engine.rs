//! Priority-ordered exit pipeline for one instrument.
//!
//! Every tick runs [`TICK_PIPELINE`]; every candle close runs [`CANDLE_PIPELINE`],
//! which adds the signal check between the daily loss check and the per-trade
//! rules. The first check that fires closes the position. Evaluation and commit
//! happen inside the position's critical section with the shared ledger held, so
//! at most one exit is ever committed per position and concurrent closes on other
//! instruments see a consistent daily total.

use chrono::{DateTime, Duration, Utc};
use options_core::config::ExitConfig;
use options_core::types::{
    CandleClose, Direction, DirectionalSignal, Evaluation, ExitDecision, ExitReason, Position,
    Tick,
};
use options_core::{Error, Result};
use risk_manager::{LedgerGuard, LedgerSnapshot, RiskLedger, SessionGate, StopLossRules};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::executor::OrderExecutor;
use crate::signal_reversal::{SignalReversalEvaluator, SignalSource};

/// One stage of the exit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCheck {
    SessionClose,
    DailyMaxLoss,
    SignalReversal,
    PerTradeLoss,
    Target,
    TrailingStop,
}

/// Checks run on every tick, highest priority first.
pub const TICK_PIPELINE: [ExitCheck; 5] = [
    ExitCheck::SessionClose,
    ExitCheck::DailyMaxLoss,
    ExitCheck::PerTradeLoss,
    ExitCheck::Target,
    ExitCheck::TrailingStop,
];

/// Checks run on every candle close, highest priority first.
pub const CANDLE_PIPELINE: [ExitCheck; 6] = [
    ExitCheck::SessionClose,
    ExitCheck::DailyMaxLoss,
    ExitCheck::SignalReversal,
    ExitCheck::PerTradeLoss,
    ExitCheck::Target,
    ExitCheck::TrailingStop,
];

/// Operator-facing view of one engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub instrument: String,
    /// The open position, if any.
    pub position: Option<Position>,
    pub last_exit: Option<ExitDecision>,
    pub daily_pnl: Decimal,
    pub daily_limit_breached: bool,
    pub signal_degraded: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub ledger: LedgerSnapshot,
}

#[derive(Debug, Default)]
struct PositionSlot {
    position: Option<Position>,
    last_exit: Option<ExitDecision>,
}

/// Exit engine for a single instrument. At most one position is open at a time.
pub struct ExitEngine {
    instrument: String,
    config: Arc<ExitConfig>,
    ledger: RiskLedger,
    session: SessionGate,
    stops: StopLossRules,
    reversal: SignalReversalEvaluator,
    executor: Arc<dyn OrderExecutor>,
    /// Critical section for the position; always taken before the ledger.
    slot: Mutex<PositionSlot>,
    signal_degraded: AtomicBool,
}

impl ExitEngine {
    #[allow(clippy::result_large_err)]
    pub fn new(
        instrument: impl Into<String>,
        config: Arc<ExitConfig>,
        ledger: RiskLedger,
        executor: Arc<dyn OrderExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        let session = SessionGate::from_config(&config)?;

        Ok(Self {
            instrument: instrument.into(),
            stops: StopLossRules::from_config(&config),
            reversal: SignalReversalEvaluator::from_config(&config),
            session,
            config,
            ledger,
            executor,
            slot: Mutex::new(PositionSlot::default()),
            signal_degraded: AtomicBool::new(false),
        })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    pub fn ledger(&self) -> &RiskLedger {
        &self.ledger
    }

    pub fn session(&self) -> &SessionGate {
        &self.session
    }

    /// Set while the latest candle had no readable signal.
    pub fn is_signal_degraded(&self) -> bool {
        self.signal_degraded.load(Ordering::SeqCst)
    }

    pub async fn has_open_position(&self) -> bool {
        self.slot.lock().await.position.is_some()
    }

    /// Open a position. Refused while one is open, after session close, during
    /// the exit cooldown, or once the daily limit is breached.
    pub async fn open_position(
        &self,
        direction: Direction,
        entry_price: Decimal,
        quantity: u32,
        opened_at: DateTime<Utc>,
    ) -> Result<Position> {
        let mut slot = self.slot.lock().await;

        if let Some(existing) = &slot.position {
            return Err(Error::invalid_state(format!(
                "Position {} already open on {}",
                existing.id, self.instrument
            )));
        }
        if self.session.is_closed(opened_at) {
            return Err(Error::entry_blocked(format!(
                "session closed at {}",
                self.session.close_time()
            )));
        }
        if let Some(until) = self.cooldown_until(&slot) {
            if opened_at < until {
                return Err(Error::entry_blocked(format!(
                    "exit cooldown active until {}",
                    until
                )));
            }
        }

        {
            let mut ledger = self.ledger.acquire();
            if ledger.is_degraded() {
                return Err(Error::LedgerUnavailable {
                    message: "ledger lock poisoned; entries halted".to_string(),
                });
            }
            ledger.roll_to(self.session.trading_day(opened_at));
            if !ledger.can_open() {
                return Err(Error::entry_blocked(format!(
                    "daily loss limit breached (daily P&L {})",
                    ledger.cumulative_realized_pnl()
                )));
            }
        }

        let position = Position::open(
            self.instrument.clone(),
            direction,
            entry_price,
            quantity,
            opened_at,
        )?;

        info!(
            position_id = %position.id,
            instrument = %position.instrument,
            direction = %position.direction,
            entry_price = %position.entry_price,
            quantity = position.quantity,
            "Position opened"
        );

        slot.position = Some(position.clone());
        Ok(position)
    }

    /// Evaluate a price tick against the open position.
    pub async fn on_tick(&self, tick: &Tick) -> Result<Evaluation> {
        self.evaluate(tick, None).await
    }

    /// Evaluate a candle close: the close price as a tick plus the signal check.
    /// An unreadable signal skips only the signal check and marks the engine degraded.
    pub async fn on_candle_close(
        &self,
        candle: &CandleClose,
        signals: &dyn SignalSource,
    ) -> Result<Evaluation> {
        let signal = signals.current();
        self.evaluate(&candle.as_tick(), Some(signal)).await
    }

    /// Close the open position at `price` on operator request.
    pub async fn manual_squareoff(
        &self,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<ExitDecision> {
        let mut slot = self.slot.lock().await;
        let decision = {
            let Some(position) = slot.position.as_mut() else {
                return Err(Error::invalid_state(format!(
                    "No open position on {} to square off",
                    self.instrument
                )));
            };
            let mut ledger = self.ledger.acquire();
            self.commit(
                position,
                &mut ledger,
                ExitReason::ManualSquareoff,
                &Tick::new(price, timestamp),
            )?
        };
        Ok(self.complete(slot, decision).await)
    }

    pub async fn status(&self) -> EngineStatus {
        let slot = self.slot.lock().await;
        let ledger = self.ledger.snapshot();
        EngineStatus {
            instrument: self.instrument.clone(),
            position: slot.position.clone(),
            last_exit: slot.last_exit.clone(),
            daily_pnl: ledger.cumulative_realized_pnl,
            daily_limit_breached: ledger.breached,
            signal_degraded: self.is_signal_degraded(),
            cooldown_until: self.cooldown_until(&slot),
            ledger,
        }
    }

    async fn evaluate(
        &self,
        tick: &Tick,
        signal: Option<Result<DirectionalSignal>>,
    ) -> Result<Evaluation> {
        let mut slot = self.slot.lock().await;
        let decision = {
            let Some(position) = slot.position.as_mut() else {
                return Err(Error::invalid_state(format!(
                    "No open position on {} to evaluate",
                    self.instrument
                )));
            };

            // A position carried overnight is closed against the day it was opened on
            let mut ledger = self.ledger.acquire();
            if !self.session.is_carried_over(position, tick.timestamp) {
                ledger.roll_to(self.session.trading_day(tick.timestamp));
            }

            if let Some(signal) = signal.as_ref() {
                self.note_signal(position, signal);
            }

            let checks: &[ExitCheck] = if signal.is_some() {
                &CANDLE_PIPELINE
            } else {
                &TICK_PIPELINE
            };

            let fired = checks.iter().find_map(|check| {
                self.run_check(*check, position, &ledger, tick, signal.as_ref())
            });

            match fired {
                None => return Ok(Evaluation::Hold),
                Some(reason) => self.commit(position, &mut ledger, reason, tick)?,
            }
        };
        Ok(Evaluation::Exited(self.complete(slot, decision).await))
    }

    fn run_check(
        &self,
        check: ExitCheck,
        position: &mut Position,
        ledger: &LedgerGuard<'_>,
        tick: &Tick,
        signal: Option<&Result<DirectionalSignal>>,
    ) -> Option<ExitReason> {
        let price = tick.price;
        match check {
            ExitCheck::SessionClose => self.session.check_for(position, tick.timestamp),
            ExitCheck::DailyMaxLoss => {
                if ledger.is_degraded() {
                    error!(
                        position_id = %position.id,
                        "Risk ledger unreadable - forcing exit"
                    );
                    return Some(ExitReason::RiskLedgerUnavailable);
                }
                let unrealized = position.unrealized_pnl(price);
                if ledger.would_breach(unrealized) {
                    warn!(
                        position_id = %position.id,
                        unrealized_pnl = %unrealized,
                        projected_daily_pnl = %ledger.projected_total(unrealized),
                        limit = %ledger.daily_loss_limit(),
                        "Projected daily loss beyond limit"
                    );
                    Some(ExitReason::DailyMaxLoss)
                } else {
                    None
                }
            }
            ExitCheck::SignalReversal => match signal {
                Some(Ok(reading)) => self.reversal.evaluate(position, reading),
                _ => None,
            },
            ExitCheck::PerTradeLoss => self.stops.check_loss(position, price),
            ExitCheck::Target => self.stops.check_target(position, price),
            ExitCheck::TrailingStop => self.stops.check_trailing(position, price),
        }
    }

    /// Track signal health on every candle, whichever check ends up firing.
    fn note_signal(&self, position: &Position, signal: &Result<DirectionalSignal>) {
        match signal {
            Ok(_) => {
                if self.signal_degraded.swap(false, Ordering::SeqCst) {
                    info!(instrument = %self.instrument, "Directional signal recovered");
                }
            }
            Err(e) => {
                if !self.signal_degraded.swap(true, Ordering::SeqCst) {
                    error!(instrument = %self.instrument, "Directional signal degraded");
                }
                warn!(
                    position_id = %position.id,
                    error = %e,
                    "Signal check skipped - directional signal unavailable"
                );
            }
        }
    }

    /// Close the position and record the result in the ledger.
    fn commit(
        &self,
        position: &mut Position,
        ledger: &mut LedgerGuard<'_>,
        reason: ExitReason,
        tick: &Tick,
    ) -> Result<ExitDecision> {
        // Fails if the position was closed in the meantime
        let realized = position.close(tick.price, reason, tick.timestamp)?;
        ledger.record_close(realized);
        if reason == ExitReason::DailyMaxLoss {
            ledger.mark_breached();
        }

        let decision = ExitDecision {
            position_id: position.id,
            instrument: position.instrument.clone(),
            direction: position.direction,
            quantity: position.quantity,
            reason,
            exit_price: tick.price,
            realized_pnl: realized,
            daily_pnl: ledger.cumulative_realized_pnl(),
            daily_limit_breached: ledger.is_breached(),
            decided_at: tick.timestamp,
        };

        info!(
            position_id = %decision.position_id,
            instrument = %decision.instrument,
            reason = %decision.reason,
            exit_price = %decision.exit_price,
            realized_pnl = %decision.realized_pnl,
            daily_pnl = %decision.daily_pnl,
            daily_limit_breached = decision.daily_limit_breached,
            "Position closed"
        );

        Ok(decision)
    }

    /// Free the slot, then hand the decision to the executor.
    async fn complete(
        &self,
        mut slot: MutexGuard<'_, PositionSlot>,
        decision: ExitDecision,
    ) -> ExitDecision {
        slot.position = None;
        slot.last_exit = Some(decision.clone());
        drop(slot);

        if let Err(e) = self.executor.submit_exit(&decision).await {
            error!(
                position_id = %decision.position_id,
                reason = %decision.reason,
                error = %e,
                "Failed to submit exit order"
            );
        }
        decision
    }

    fn cooldown_until(&self, slot: &PositionSlot) -> Option<DateTime<Utc>> {
        if !self.config.enforce_exit_cooldown {
            return None;
        }
        slot.last_exit.as_ref().map(|exit| {
            exit.decided_at + Duration::seconds(self.config.candle_interval_secs as i64)
        })
    }
}

impl std::fmt::Debug for ExitEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitEngine")
            .field("instrument", &self.instrument)
            .field("ledger", &self.ledger)
            .field("signal_degraded", &self.is_signal_degraded())
            .finish()
    }
}
