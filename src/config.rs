//! Matching and persistence settings

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::*;

pub const ENV_AMOUNT_TOLERANCE: &str = "RECONCILIATION_AMOUNT_TOLERANCE";
pub const ENV_DATE_WINDOW_DAYS: &str = "RECONCILIATION_DATE_WINDOW_DAYS";
pub const ENV_PERSIST_INCREMENTALLY: &str = "RECONCILIATION_PERSIST_INCREMENTALLY";

/// Upper bound for the candidate date window
pub const MAX_DATE_WINDOW_DAYS: u32 = 31;

/// Settings for a reconciliation workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Amounts whose difference is strictly below this are considered equal
    pub amount_tolerance: BigDecimal,
    /// Days either side of the bank date a candidate may fall on (0 = same day)
    pub date_window_days: u32,
    /// Persist every match/unmatch as it happens instead of only at completion
    pub persist_matches_incrementally: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            // 0.01 currency units
            amount_tolerance: BigDecimal::new(1.into(), 2),
            date_window_days: 0,
            persist_matches_incrementally: false,
        }
    }
}

impl ReconciliationConfig {
    /// Load settings from the process environment, falling back to defaults
    pub fn from_env() -> ReconciliationResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ReconciliationResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_AMOUNT_TOLERANCE) {
            config.amount_tolerance = BigDecimal::from_str(raw.trim()).map_err(|e| {
                ReconciliationError::Configuration(format!(
                    "{} must be a decimal amount: {}",
                    ENV_AMOUNT_TOLERANCE, e
                ))
            })?;
        }

        if let Some(raw) = lookup(ENV_DATE_WINDOW_DAYS) {
            config.date_window_days = raw.trim().parse().map_err(|e| {
                ReconciliationError::Configuration(format!(
                    "{} must be a whole number of days: {}",
                    ENV_DATE_WINDOW_DAYS, e
                ))
            })?;
        }

        if let Some(raw) = lookup(ENV_PERSIST_INCREMENTALLY) {
            config.persist_matches_incrementally = parse_flag(&raw).ok_or_else(|| {
                ReconciliationError::Configuration(format!(
                    "{} must be true or false, got '{}'",
                    ENV_PERSIST_INCREMENTALLY, raw
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the settings are usable
    pub fn validate(&self) -> ReconciliationResult<()> {
        if self.amount_tolerance < BigDecimal::from(0) {
            return Err(ReconciliationError::Configuration(
                "Amount tolerance cannot be negative".to_string(),
            ));
        }

        if self.date_window_days > MAX_DATE_WINDOW_DAYS {
            return Err(ReconciliationError::Configuration(format!(
                "Date window cannot exceed {} days",
                MAX_DATE_WINDOW_DAYS
            )));
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
