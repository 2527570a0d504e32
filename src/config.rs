//! Tunables for the lifecycle engine.

use crate::domain::booking::MAX_BOOKING_MINUTES;
use crate::error::{MarketError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Lifecycle engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Prefix of generated order numbers
    pub order_number_prefix: String,

    /// Prefix of generated booking numbers
    pub booking_number_prefix: String,

    /// Characters of a chat message shown in its notification
    pub message_preview_chars: usize,

    /// Slot length for bookings that do not state one
    pub default_booking_minutes: u32,

    /// Re-read/revalidate rounds before a contended transition gives up
    pub max_commit_attempts: u32,

    /// Draws before giving up on a free order/booking number
    pub max_number_attempts: u32,

    /// Age at which an unreviewed payment receipt is reported as stale
    pub payment_review_warn_after_hours: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            order_number_prefix: "ORD".to_string(),
            booking_number_prefix: "BKG".to_string(),
            message_preview_chars: 50,
            default_booking_minutes: 60,
            max_commit_attempts: 5,
            max_number_attempts: 5,
            payment_review_warn_after_hours: 48,
        }
    }
}

impl LifecycleConfig {
    /// Load from a TOML file; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LifecycleConfig = toml::from_str(&content)
            .map_err(|e| MarketError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()
    }

    /// Defaults overridden by `MARKETFLOW_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies `MARKETFLOW_*` overrides read through `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(prefix) = lookup("MARKETFLOW_ORDER_NUMBER_PREFIX") {
            self.order_number_prefix = prefix;
        }
        if let Some(prefix) = lookup("MARKETFLOW_BOOKING_NUMBER_PREFIX") {
            self.booking_number_prefix = prefix;
        }
        override_parsed(
            &lookup,
            "MARKETFLOW_MESSAGE_PREVIEW_CHARS",
            &mut self.message_preview_chars,
        )?;
        override_parsed(
            &lookup,
            "MARKETFLOW_DEFAULT_BOOKING_MINUTES",
            &mut self.default_booking_minutes,
        )?;
        override_parsed(
            &lookup,
            "MARKETFLOW_MAX_COMMIT_ATTEMPTS",
            &mut self.max_commit_attempts,
        )?;
        override_parsed(
            &lookup,
            "MARKETFLOW_MAX_NUMBER_ATTEMPTS",
            &mut self.max_number_attempts,
        )?;
        override_parsed(
            &lookup,
            "MARKETFLOW_PAYMENT_REVIEW_WARN_AFTER_HOURS",
            &mut self.payment_review_warn_after_hours,
        )?;
        self.validate()
    }

    /// The stale-receipt threshold as a duration; at least one hour.
    pub fn payment_review_warn_after(&self) -> Result<Duration> {
        let hours = self.payment_review_warn_after_hours;
        if hours < 1 {
            return Err(MarketError::ConfigError(format!(
                "payment review threshold must be at least 1 hour, got {hours}"
            )));
        }
        Duration::try_hours(hours).ok_or_else(|| {
            MarketError::ConfigError(format!(
                "payment review threshold of {hours} hours is too large"
            ))
        })
    }

    fn validate(self) -> Result<Self> {
        if self.order_number_prefix.trim().is_empty()
            || self.booking_number_prefix.trim().is_empty()
        {
            return Err(MarketError::ConfigError(
                "number prefixes must not be empty".into(),
            ));
        }
        if self.max_commit_attempts == 0 || self.max_number_attempts == 0 {
            return Err(MarketError::ConfigError(
                "attempt limits must be at least 1".into(),
            ));
        }
        if self.default_booking_minutes == 0 || self.default_booking_minutes > MAX_BOOKING_MINUTES {
            return Err(MarketError::ConfigError(format!(
                "default booking length must be between 1 and {MAX_BOOKING_MINUTES} minutes"
            )));
        }
        self.payment_review_warn_after()?;
        Ok(self)
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) -> Result<()> {
    if let Some(raw) = lookup(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| MarketError::ConfigError(format!("{name} has an invalid value: {raw}")))?;
    }
    Ok(())
}
