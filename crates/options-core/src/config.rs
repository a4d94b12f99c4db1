//! Exit engine configuration.
//!
//! Loaded from `EXIT_*` environment variables (with `.env` support) or from a
//! config file with environment overrides. Every load path validates; invalid
//! values are rejected rather than treated as "disabled".

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::{Error, Result};

/// Candle intervals (seconds) the signal service publishes.
pub const SUPPORTED_CANDLE_INTERVALS: [u64; 6] = [5, 15, 30, 60, 300, 900];

/// How candle-close signals are turned into exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalPolicy {
    /// Exit when the signal direction flips CE <-> PE.
    DirectionFlip,
    /// Exit on score/slope thresholds confirmed by slow momentum.
    ScoreConfirm,
}

/// Score thresholds for MDS-driven exits and entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdsThresholds {
    /// |score| at or beyond which an opposing reading counts as a reversal.
    pub reversal_score: Decimal,
    /// |score| at or below which the reading is neutral.
    pub neutral_band: Decimal,
    /// Slow momentum needed to confirm a reversal or neutral exit.
    pub slow_confirm: Decimal,
    /// Adverse slope that signals momentum loss.
    pub momentum_slope: Decimal,
    /// Score beyond which momentum loss is ignored (trend still strong).
    pub momentum_score_cap: Decimal,
    pub entry_min_score: Decimal,
    pub entry_min_slope: Decimal,
}

impl Default for MdsThresholds {
    fn default() -> Self {
        Self {
            reversal_score: Decimal::new(10, 0),
            neutral_band: Decimal::new(6, 0),
            slow_confirm: Decimal::ONE,
            momentum_slope: Decimal::new(2, 0),
            momentum_score_cap: Decimal::new(12, 0),
            entry_min_score: Decimal::new(10, 0),
            entry_min_slope: Decimal::ONE,
        }
    }
}

/// Exit rule configuration. A zero loss/target/trailing value disables that rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    /// Daily loss limit in currency (0 = disabled).
    pub daily_max_loss: Decimal,
    /// Per-trade loss limit in currency (0 = fall back to `initial_stoploss`).
    pub max_loss_per_trade: Decimal,
    /// Stoploss in price points from entry.
    pub initial_stoploss: Decimal,
    /// Profit target in price points per unit.
    pub target_points: Decimal,
    /// Favorable move in points that arms the trailing stop.
    pub trail_start_profit: Decimal,
    /// Retrace from the trailing peak, in points, that closes the position.
    pub trail_step: Decimal,
    /// Exchange-local time at which every open position is squared off.
    #[serde(deserialize_with = "deserialize_session_time")]
    pub session_close_time: NaiveTime,
    /// Exchange offset from UTC in minutes (IST = 330).
    pub session_utc_offset_minutes: i32,
    pub candle_interval_secs: u64,
    /// Units per entry.
    pub lot_quantity: u32,
    /// Exit when the signal turns neutral.
    pub exit_on_neutral: bool,
    pub reversal_policy: ReversalPolicy,
    /// Block new entries for one candle interval after an exit.
    pub enforce_exit_cooldown: bool,
    /// Consecutive same-direction candles needed before an entry.
    pub entry_confirm_candles: u32,
    pub mds: MdsThresholds,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            daily_max_loss: Decimal::new(5000, 0),
            max_loss_per_trade: Decimal::ZERO,
            initial_stoploss: Decimal::new(50, 0),
            target_points: Decimal::ZERO,
            trail_start_profit: Decimal::ZERO,
            trail_step: Decimal::ZERO,
            session_close_time: NaiveTime::from_hms_opt(15, 25, 0).unwrap_or_default(),
            session_utc_offset_minutes: 330,
            candle_interval_secs: 60,
            lot_quantity: 65,
            exit_on_neutral: false,
            reversal_policy: ReversalPolicy::DirectionFlip,
            enforce_exit_cooldown: true,
            entry_confirm_candles: 2,
            mds: MdsThresholds::default(),
        }
    }
}

impl ExitConfig {
    /// Load configuration from `EXIT_*` environment variables.
    /// Unset variables keep their defaults; unparseable ones are an error.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from a file (TOML/YAML/JSON by extension), with
    /// `EXIT_` environment overrides (`EXIT_MDS__NEUTRAL_BAND` for nested keys).
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("EXIT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ExitConfig = settings.try_deserialize()?;
        config.validate()?;
        debug!(path = %path.as_ref().display(), "Loaded exit config from file");
        Ok(config)
    }

    /// Build configuration from a key lookup, e.g. the process environment.
    #[allow(clippy::result_large_err)]
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mds_defaults = MdsThresholds::default();

        let config = Self {
            daily_max_loss: parse_var(&lookup, "EXIT_DAILY_MAX_LOSS", defaults.daily_max_loss)?,
            max_loss_per_trade: parse_var(
                &lookup,
                "EXIT_MAX_LOSS_PER_TRADE",
                defaults.max_loss_per_trade,
            )?,
            initial_stoploss: parse_var(
                &lookup,
                "EXIT_INITIAL_STOPLOSS",
                defaults.initial_stoploss,
            )?,
            target_points: parse_var(&lookup, "EXIT_TARGET_POINTS", defaults.target_points)?,
            trail_start_profit: parse_var(
                &lookup,
                "EXIT_TRAIL_START_PROFIT",
                defaults.trail_start_profit,
            )?,
            trail_step: parse_var(&lookup, "EXIT_TRAIL_STEP", defaults.trail_step)?,
            session_close_time: match lookup("EXIT_SESSION_CLOSE_TIME") {
                Some(raw) => parse_session_time(&raw)?,
                None => defaults.session_close_time,
            },
            session_utc_offset_minutes: parse_var(
                &lookup,
                "EXIT_SESSION_UTC_OFFSET_MINUTES",
                defaults.session_utc_offset_minutes,
            )?,
            candle_interval_secs: parse_var(
                &lookup,
                "EXIT_CANDLE_INTERVAL_SECS",
                defaults.candle_interval_secs,
            )?,
            lot_quantity: parse_var(&lookup, "EXIT_LOT_QUANTITY", defaults.lot_quantity)?,
            exit_on_neutral: parse_var(&lookup, "EXIT_ON_NEUTRAL", defaults.exit_on_neutral)?,
            reversal_policy: match lookup("EXIT_REVERSAL_POLICY").as_deref() {
                None => defaults.reversal_policy,
                Some("direction_flip") => ReversalPolicy::DirectionFlip,
                Some("score_confirm") => ReversalPolicy::ScoreConfirm,
                Some(other) => {
                    return Err(Error::configuration(format!(
                        "EXIT_REVERSAL_POLICY must be direction_flip or score_confirm, got {:?}",
                        other
                    )))
                }
            },
            enforce_exit_cooldown: parse_var(
                &lookup,
                "EXIT_ENFORCE_COOLDOWN",
                defaults.enforce_exit_cooldown,
            )?,
            entry_confirm_candles: parse_var(
                &lookup,
                "EXIT_ENTRY_CONFIRM_CANDLES",
                defaults.entry_confirm_candles,
            )?,
            mds: MdsThresholds {
                reversal_score: parse_var(
                    &lookup,
                    "EXIT_MDS_REVERSAL_SCORE",
                    mds_defaults.reversal_score,
                )?,
                neutral_band: parse_var(&lookup, "EXIT_MDS_NEUTRAL_BAND", mds_defaults.neutral_band)?,
                slow_confirm: parse_var(&lookup, "EXIT_MDS_SLOW_CONFIRM", mds_defaults.slow_confirm)?,
                momentum_slope: parse_var(
                    &lookup,
                    "EXIT_MDS_MOMENTUM_SLOPE",
                    mds_defaults.momentum_slope,
                )?,
                momentum_score_cap: parse_var(
                    &lookup,
                    "EXIT_MDS_MOMENTUM_SCORE_CAP",
                    mds_defaults.momentum_score_cap,
                )?,
                entry_min_score: parse_var(
                    &lookup,
                    "EXIT_MDS_ENTRY_MIN_SCORE",
                    mds_defaults.entry_min_score,
                )?,
                entry_min_slope: parse_var(
                    &lookup,
                    "EXIT_MDS_ENTRY_MIN_SLOPE",
                    mds_defaults.entry_min_slope,
                )?,
            },
        };

        config.validate()?;
        debug!(
            daily_max_loss = %config.daily_max_loss,
            reversal_policy = ?config.reversal_policy,
            "Loaded exit config"
        );
        Ok(config)
    }

    /// Reject negative or inconsistent values.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        let amounts = [
            ("daily_max_loss", self.daily_max_loss),
            ("max_loss_per_trade", self.max_loss_per_trade),
            ("initial_stoploss", self.initial_stoploss),
            ("target_points", self.target_points),
            ("trail_start_profit", self.trail_start_profit),
            ("trail_step", self.trail_step),
            ("mds.reversal_score", self.mds.reversal_score),
            ("mds.neutral_band", self.mds.neutral_band),
            ("mds.slow_confirm", self.mds.slow_confirm),
            ("mds.momentum_slope", self.mds.momentum_slope),
            ("mds.momentum_score_cap", self.mds.momentum_score_cap),
            ("mds.entry_min_score", self.mds.entry_min_score),
            ("mds.entry_min_slope", self.mds.entry_min_slope),
        ];
        for (name, value) in amounts {
            if value < Decimal::ZERO {
                return Err(Error::configuration(format!(
                    "{} must be >= 0, got {}",
                    name, value
                )));
            }
        }

        if self.trail_start_profit > Decimal::ZERO && self.trail_step.is_zero() {
            return Err(Error::configuration(
                "trail_step must be > 0 when trail_start_profit is set",
            ));
        }

        if self.lot_quantity == 0 {
            return Err(Error::configuration("lot_quantity must be > 0"));
        }

        if !SUPPORTED_CANDLE_INTERVALS.contains(&self.candle_interval_secs) {
            return Err(Error::configuration(format!(
                "candle_interval_secs must be one of {:?}, got {}",
                SUPPORTED_CANDLE_INTERVALS, self.candle_interval_secs
            )));
        }

        if self.session_utc_offset_minutes.abs() > 14 * 60 {
            return Err(Error::configuration(format!(
                "session_utc_offset_minutes out of range: {}",
                self.session_utc_offset_minutes
            )));
        }

        if self.mds.neutral_band >= self.mds.reversal_score {
            return Err(Error::configuration(format!(
                "mds.neutral_band ({}) must be below mds.reversal_score ({})",
                self.mds.neutral_band, self.mds.reversal_score
            )));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            Error::configuration(format!("{} has invalid value {:?}: {}", key, raw, e))
        }),
    }
}

fn parse_session_time(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|e| {
            Error::configuration(format!(
                "session_close_time must be HH:MM or HH:MM:SS, got {:?}: {}",
                raw, e
            ))
        })
}

fn deserialize_session_time<'de, D>(deserializer: D) -> std::result::Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_session_time(&raw).map_err(serde::de::Error::custom)
}
