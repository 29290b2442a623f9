// crates/opsrunbook-core/src/core/time.rs
// ============================================================================
// Module: OpsRunbook Time Windows
// Description: Timezone-aware incident time windows and server-side clamping.
// Purpose: Keep backend queries unambiguous and bounded in span.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Every incident carries an explicit timezone-aware time window. Windows are
//! validated at ingress (`end` strictly after `start`) and clamped server-side
//! to a configurable maximum span, preserving the most recent tail.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by time window validation.
#[derive(Debug, Error)]
pub enum TimeWindowError {
    /// Window end is not after the start.
    #[error("time_window.end must be after time_window.start")]
    EndNotAfterStart,
}

// ============================================================================
// SECTION: Time Window
// ============================================================================

/// Timezone-aware incident time window.
///
/// # Invariants
/// - `end` is strictly after `start` once validated.
/// - Serialized forms are RFC 3339 timestamps with explicit offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Window start (inclusive).
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    /// Window end (exclusive).
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl TimeWindow {
    /// Creates a validated window.
    ///
    /// # Errors
    ///
    /// Returns [`TimeWindowError::EndNotAfterStart`] when `end <= start`.
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, TimeWindowError> {
        if end <= start {
            return Err(TimeWindowError::EndNotAfterStart);
        }
        Ok(Self {
            start,
            end,
        })
    }

    /// Validates window ordering on a deserialized value.
    ///
    /// # Errors
    ///
    /// Returns [`TimeWindowError::EndNotAfterStart`] when `end <= start`.
    pub const fn validate(&self) -> Result<(), TimeWindowError> {
        if self.end.unix_timestamp_nanos() <= self.start.unix_timestamp_nanos() {
            return Err(TimeWindowError::EndNotAfterStart);
        }
        Ok(())
    }

    /// Clamps the window to at most `max_minutes`, preserving the most recent
    /// tail. Returns the clamped window and whether clamping occurred.
    #[must_use]
    pub fn clamp_to_minutes(self, max_minutes: i64) -> (Self, bool) {
        let max_span = Duration::minutes(max_minutes);
        if self.end - self.start <= max_span {
            return (self, false);
        }
        (
            Self {
                start: self.end - max_span,
                end: self.end,
            },
            true,
        )
    }

    /// Returns the window span in whole seconds.
    #[must_use]
    pub fn span_seconds(&self) -> i64 {
        (self.end - self.start).whole_seconds()
    }
}

// ============================================================================
// SECTION: Clock Helpers
// ============================================================================

/// Returns the current UTC time.
#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Formats a timestamp as RFC 3339, falling back to the debug-free unix form.
#[must_use]
pub fn format_rfc3339(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

/// Returns the current UTC time formatted as RFC 3339.
#[must_use]
pub fn now_rfc3339() -> String {
    format_rfc3339(now_utc())
}
