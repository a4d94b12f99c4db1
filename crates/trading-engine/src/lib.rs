//! Trading Engine
//!
//! Exit decision pipeline, signal checks, entry gating, and order hand-off for
//! options positions.

pub mod entry_gate;
pub mod executor;
pub mod exit_engine;
pub mod position_manager;
pub mod signal_reversal;

pub use entry_gate::{EntryBlock, EntryDecision, EntryGate};
pub use executor::{ExecutionMetrics, ExecutorConfig, OrderExecutor, PaperExecutor};
pub use exit_engine::{EngineStatus, ExitCheck, ExitEngine, CANDLE_PIPELINE, TICK_PIPELINE};
pub use position_manager::PositionBook;
pub use signal_reversal::{SignalReversalEvaluator, SignalSource};
