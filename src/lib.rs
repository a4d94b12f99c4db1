//! Options Exit Engine
//!
//! This is the root crate that provides benchmark and integration test access
//! to the workspace crates. For actual functionality, use the individual crates
//! directly:
//!
//! - `options-core`: Position, signal and market types, configuration, errors
//! - `risk-manager`: Daily risk ledger, session gate, per-trade stop rules
//! - `trading-engine`: Exit pipeline, entry gating, position book, executors
//! - `exit-monitor`: Event replay binary

// Re-export for benchmarks
pub use options_core as core;
pub use risk_manager as risk;
pub use trading_engine as trading;
