//! Drives a position book from a stream of monitor events.

use anyhow::{Context, Result};
use options_core::config::ExitConfig;
use options_core::types::{CandleClose, Evaluation, Tick};
use risk_manager::LedgerSnapshot;
use serde::Serialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trading_engine::{
    EngineStatus, EntryGate, ExecutionMetrics, PaperExecutor, PositionBook, SignalSource,
};

use crate::events::{parse_line, MonitorEvent};

/// Final state printed after a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub events_processed: u64,
    pub events_rejected: u64,
    pub exits: u64,
    pub ledger: LedgerSnapshot,
    pub engines: Vec<EngineStatus>,
    pub execution: ExecutionMetrics,
}

pub struct Replay {
    book: PositionBook,
    executor: Arc<PaperExecutor>,
    config: ExitConfig,
    /// Open positions from candle signals when no explicit `open` events are given.
    auto_entry: bool,
    gates: HashMap<String, EntryGate>,
    events_processed: u64,
    events_rejected: u64,
    exits: u64,
}

impl Replay {
    pub fn new(
        config: ExitConfig,
        trading_day: chrono::NaiveDate,
        auto_entry: bool,
    ) -> Result<Self> {
        let executor = Arc::new(PaperExecutor::default());
        let book = PositionBook::new(config.clone(), trading_day, executor.clone())
            .context("failed to build position book")?;
        Ok(Self {
            book,
            executor,
            config,
            auto_entry,
            gates: HashMap::new(),
            events_processed: 0,
            events_rejected: 0,
            exits: 0,
        })
    }

    /// Replay every event in `reader`. Malformed lines abort; rejected events
    /// are logged and counted.
    pub async fn run<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for (idx, line) in reader.lines().enumerate() {
            let line = line.context("failed to read event stream")?;
            if let Some(event) = parse_line(&line, idx + 1)? {
                self.apply(event).await;
            }
        }
        Ok(())
    }

    /// Apply one event. Engine errors drop the event and keep the replay going.
    pub async fn apply(&mut self, event: MonitorEvent) {
        self.events_processed += 1;
        let kind = event.kind();
        if let Err(e) = self.dispatch(event).await {
            self.events_rejected += 1;
            warn!(event = kind, error = %e, "Event rejected");
        }
    }

    async fn dispatch(&mut self, event: MonitorEvent) -> options_core::Result<()> {
        match event {
            MonitorEvent::Open {
                instrument,
                direction,
                price,
                quantity,
                timestamp,
            } => {
                self.book
                    .open(&instrument, direction, price, quantity, timestamp)
                    .await?;
            }
            MonitorEvent::Tick {
                instrument,
                price,
                timestamp,
            } => {
                let eval = self
                    .book
                    .on_tick(&instrument, &Tick::new(price, timestamp))
                    .await?;
                self.record(eval);
            }
            MonitorEvent::Candle {
                instrument,
                close,
                timestamp,
                signal,
                is_choppy,
            } => {
                let engine = self.book.engine(&instrument)?;
                let candle = CandleClose::new(close, timestamp);
                if engine.has_open_position().await {
                    let eval = engine.on_candle_close(&candle, &signal).await?;
                    self.record(eval);
                } else if self.auto_entry {
                    self.try_entry(&instrument, &candle, &signal, is_choppy).await?;
                }
            }
            MonitorEvent::Squareoff {
                instrument,
                price,
                timestamp,
            } => {
                self.book
                    .manual_squareoff(&instrument, price, timestamp)
                    .await?;
                self.exits += 1;
            }
            MonitorEvent::NewDay { date } => {
                self.book.reset_for_day(date);
                for gate in self.gates.values_mut() {
                    gate.reset();
                }
            }
        }
        Ok(())
    }

    async fn try_entry(
        &mut self,
        instrument: &str,
        candle: &CandleClose,
        signal: &serde_json::Value,
        is_choppy: bool,
    ) -> options_core::Result<()> {
        let reading = signal.current().ok();
        let gate = self
            .gates
            .entry(instrument.to_string())
            .or_insert_with(|| EntryGate::from_config(&self.config));

        let decision = gate.on_candle(reading.as_ref(), is_choppy);
        let Some(direction) = decision.enter else {
            debug!(
                instrument = %instrument,
                blocked = ?decision.blocked,
                confirm_count = decision.confirm_count,
                "No entry on candle"
            );
            return Ok(());
        };

        gate.on_entry_attempted();
        self.book
            .open(instrument, direction, candle.close, None, candle.timestamp)
            .await?;
        Ok(())
    }

    fn record(&mut self, eval: Evaluation) {
        if let Evaluation::Exited(decision) = eval {
            self.exits += 1;
            info!(
                instrument = %decision.instrument,
                reason = %decision.reason,
                realized_pnl = %decision.realized_pnl,
                daily_pnl = %decision.daily_pnl,
                daily_limit_breached = decision.daily_limit_breached,
                "Exit decided"
            );
        }
    }

    pub async fn report(&self) -> ReplayReport {
        ReplayReport {
            events_processed: self.events_processed,
            events_rejected: self.events_rejected,
            exits: self.exits,
            ledger: self.book.ledger_snapshot(),
            engines: self.book.statuses().await,
            execution: self.executor.metrics().await,
        }
    }
}
