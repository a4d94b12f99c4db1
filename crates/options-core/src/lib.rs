//! Options Core Library
//!
//! Shared position, signal, market-event and configuration types for the
//! options exit engine.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Error, Result};
