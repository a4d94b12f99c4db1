//! Error types for the options exit engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Closing a closed position, or evaluating with no open position.
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Directional signal missing or malformed at candle close.
    #[error("Indicator unavailable: {reason}")]
    IndicatorUnavailable { reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Risk ledger unavailable: {message}")]
    LedgerUnavailable { message: String },

    #[error("Entry blocked: {reason}")]
    EntryBlocked { reason: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn indicator_unavailable(reason: impl Into<String>) -> Self {
        Self::IndicatorUnavailable {
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn entry_blocked(reason: impl Into<String>) -> Self {
        Self::EntryBlocked {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
