//! Risk Manager
//!
//! Daily loss ledger, session close gate, and per-trade stop rules for the exit engine.

pub mod daily_ledger;
pub mod session;
pub mod stop_loss;

pub use daily_ledger::{DailyRiskLedger, LedgerGuard, LedgerSnapshot, RiskLedger};
pub use session::SessionGate;
pub use stop_loss::{StopLossRules, StopRule};
