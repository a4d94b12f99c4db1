//! Routing of market events to per-instrument exit engines sharing one ledger.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use options_core::config::ExitConfig;
use options_core::types::{CandleClose, Direction, Evaluation, ExitDecision, Position, Tick};
use options_core::{Error, Result};
use risk_manager::{DailyRiskLedger, LedgerSnapshot, RiskLedger};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use crate::executor::OrderExecutor;
use crate::exit_engine::{EngineStatus, ExitEngine};
use crate::signal_reversal::SignalSource;

/// One exit engine per instrument. Engines have independent critical sections
/// and serialize only on the shared daily ledger.
pub struct PositionBook {
    engines: DashMap<String, Arc<ExitEngine>>,
    config: Arc<ExitConfig>,
    ledger: RiskLedger,
    executor: Arc<dyn OrderExecutor>,
}

impl PositionBook {
    /// Create a book with a fresh ledger for `trading_day`.
    #[allow(clippy::result_large_err)]
    pub fn new(
        config: ExitConfig,
        trading_day: NaiveDate,
        executor: Arc<dyn OrderExecutor>,
    ) -> Result<Self> {
        let ledger = RiskLedger::new(DailyRiskLedger::new(trading_day, config.daily_max_loss));
        Self::with_ledger(config, ledger, executor)
    }

    #[allow(clippy::result_large_err)]
    pub fn with_ledger(
        config: ExitConfig,
        ledger: RiskLedger,
        executor: Arc<dyn OrderExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engines: DashMap::new(),
            config: Arc::new(config),
            ledger,
            executor,
        })
    }

    pub fn ledger(&self) -> &RiskLedger {
        &self.ledger
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    /// Engine for `instrument`, created on first use.
    #[allow(clippy::result_large_err)]
    pub fn engine(&self, instrument: &str) -> Result<Arc<ExitEngine>> {
        if let Some(engine) = self.engines.get(instrument) {
            return Ok(engine.clone());
        }

        let engine = self
            .engines
            .entry(instrument.to_string())
            .or_try_insert_with(|| {
                debug!(instrument = %instrument, "Creating exit engine");
                ExitEngine::new(
                    instrument,
                    self.config.clone(),
                    self.ledger.clone(),
                    self.executor.clone(),
                )
                .map(Arc::new)
            })?;
        Ok(engine.clone())
    }

    fn existing(&self, instrument: &str) -> Result<Arc<ExitEngine>> {
        self.engines
            .get(instrument)
            .map(|engine| engine.clone())
            .ok_or_else(|| Error::invalid_state(format!("No exit engine for {}", instrument)))
    }

    /// Open a position; `quantity` defaults to the configured lot size.
    pub async fn open(
        &self,
        instrument: &str,
        direction: Direction,
        entry_price: Decimal,
        quantity: Option<u32>,
        opened_at: DateTime<Utc>,
    ) -> Result<Position> {
        let engine = self.engine(instrument)?;
        engine
            .open_position(
                direction,
                entry_price,
                quantity.unwrap_or(self.config.lot_quantity),
                opened_at,
            )
            .await
    }

    pub async fn on_tick(&self, instrument: &str, tick: &Tick) -> Result<Evaluation> {
        self.existing(instrument)?.on_tick(tick).await
    }

    pub async fn on_candle_close(
        &self,
        instrument: &str,
        candle: &CandleClose,
        signals: &dyn SignalSource,
    ) -> Result<Evaluation> {
        self.existing(instrument)?
            .on_candle_close(candle, signals)
            .await
    }

    pub async fn manual_squareoff(
        &self,
        instrument: &str,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<ExitDecision> {
        self.existing(instrument)?
            .manual_squareoff(price, timestamp)
            .await
    }

    /// Start a new trading day for every engine.
    pub fn reset_for_day(&self, trading_day: NaiveDate) {
        info!(trading_day = %trading_day, engines = self.engines.len(), "Resetting daily risk");
        self.ledger.reset_for_day(trading_day);
    }

    pub fn ledger_snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    /// Status of every engine, ordered by instrument.
    pub async fn statuses(&self) -> Vec<EngineStatus> {
        let engines: Vec<Arc<ExitEngine>> =
            self.engines.iter().map(|entry| entry.value().clone()).collect();

        let mut statuses = Vec::with_capacity(engines.len());
        for engine in engines {
            statuses.push(engine.status().await);
        }
        statuses.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        statuses
    }

    pub fn instrument_count(&self) -> usize {
        self.engines.len()
    }
}
