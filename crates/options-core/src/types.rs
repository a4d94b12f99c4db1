//! Core domain types for the options exit engine.

pub mod exit;
pub mod market;
pub mod position;
pub mod signal;

pub use exit::*;
pub use market::*;
pub use position::*;
pub use signal::*;
