//! Downstream order execution for committed exits.

use anyhow::Result;
use async_trait::async_trait;
use options_core::types::ExitDecision;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

/// Places the closing order for a committed exit. The engine has already
/// recorded the decision; a failure here is logged, never rolled back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn submit_exit(&self, decision: &ExitDecision) -> Result<()>;
}

/// Metrics for submitted exits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionMetrics {
    pub exits_submitted: u64,
    pub winning_exits: u64,
    pub losing_exits: u64,
    pub breakeven_exits: u64,
    pub total_realized_pnl: Decimal,
    pub avg_latency_us: u64,
}

/// Configuration for the paper executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Capacity of the decision report channel.
    pub report_buffer: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { report_buffer: 1000 }
    }
}

/// Executor that fills every exit at the decided price and keeps a record.
pub struct PaperExecutor {
    submitted: RwLock<Vec<ExitDecision>>,
    metrics: RwLock<ExecutionMetrics>,
    report_tx: mpsc::Sender<ExitDecision>,
    /// Receiver for filled exits (taken once).
    report_rx: Option<mpsc::Receiver<ExitDecision>>,
}

impl PaperExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let (report_tx, report_rx) = mpsc::channel(config.report_buffer.max(1));
        Self {
            submitted: RwLock::new(Vec::new()),
            metrics: RwLock::new(ExecutionMetrics::default()),
            report_tx,
            report_rx: Some(report_rx),
        }
    }

    /// Take the report receiver (can only be called once).
    pub fn take_report_receiver(&mut self) -> Option<mpsc::Receiver<ExitDecision>> {
        self.report_rx.take()
    }

    /// All exits submitted so far, oldest first.
    pub async fn submitted(&self) -> Vec<ExitDecision> {
        self.submitted.read().await.clone()
    }

    pub async fn metrics(&self) -> ExecutionMetrics {
        self.metrics.read().await.clone()
    }
}

impl Default for PaperExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn submit_exit(&self, decision: &ExitDecision) -> Result<()> {
        let start = std::time::Instant::now();

        info!(
            position_id = %decision.position_id,
            instrument = %decision.instrument,
            direction = %decision.direction,
            quantity = decision.quantity,
            price = %decision.exit_price,
            reason = %decision.reason,
            "[PAPER] Simulated exit fill"
        );

        self.submitted.write().await.push(decision.clone());

        {
            let latency_us = start.elapsed().as_micros() as u64;
            let mut metrics = self.metrics.write().await;
            metrics.exits_submitted += 1;
            if decision.realized_pnl > Decimal::ZERO {
                metrics.winning_exits += 1;
            } else if decision.realized_pnl < Decimal::ZERO {
                metrics.losing_exits += 1;
            } else {
                metrics.breakeven_exits += 1;
            }
            metrics.total_realized_pnl += decision.realized_pnl;
            metrics.avg_latency_us = (metrics.avg_latency_us * (metrics.exits_submitted - 1)
                + latency_us)
                / metrics.exits_submitted;
        }

        // Reports only flow once a consumer has taken the receiver
        if self.report_rx.is_none() && self.report_tx.try_send(decision.clone()).is_err() {
            warn!("Exit report channel full or closed");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use options_core::types::{Direction, ExitReason};
    use uuid::Uuid;

    fn decision(realized: i64) -> ExitDecision {
        ExitDecision {
            position_id: Uuid::new_v4(),
            instrument: "NIFTY".to_string(),
            direction: Direction::Ce,
            quantity: 75,
            reason: ExitReason::TargetHit,
            exit_price: Decimal::new(120, 0),
            realized_pnl: Decimal::new(realized, 0),
            daily_pnl: Decimal::new(realized, 0),
            daily_limit_breached: false,
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_executor_is_empty() {
        let executor = PaperExecutor::default();
        assert!(tokio_test::block_on(executor.submitted()).is_empty());
        assert_eq!(tokio_test::block_on(executor.metrics()).exits_submitted, 0);
    }

    #[tokio::test]
    async fn test_paper_executor_records_exits() {
        let executor = PaperExecutor::default();
        executor.submit_exit(&decision(1500)).await.unwrap();
        executor.submit_exit(&decision(-300)).await.unwrap();
        executor.submit_exit(&decision(0)).await.unwrap();

        let submitted = executor.submitted().await;
        assert_eq!(submitted.len(), 3);
        assert_eq!(submitted[0].realized_pnl, Decimal::new(1500, 0));

        let metrics = executor.metrics().await;
        assert_eq!(metrics.exits_submitted, 3);
        assert_eq!(metrics.winning_exits, 1);
        assert_eq!(metrics.losing_exits, 1);
        assert_eq!(metrics.breakeven_exits, 1);
        assert_eq!(metrics.total_realized_pnl, Decimal::new(1200, 0));
    }

    #[tokio::test]
    async fn test_report_channel_receives_fills() {
        let mut executor = PaperExecutor::default();
        let mut rx = executor.take_report_receiver().unwrap();
        assert!(executor.take_report_receiver().is_none());

        executor.submit_exit(&decision(100)).await.unwrap();
        let report = rx.recv().await.unwrap();
        assert_eq!(report.reason, ExitReason::TargetHit);
    }
}
