//! Dependency health results.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Outcome of a single dependency probe.
///
/// Produced fresh by every probe call and never cached across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    /// Whether the dependency answered the round-trip.
    pub ok: bool,
    /// Human-readable detail (driver error text on failure).
    pub detail: String,
    /// Wall-clock time of the probe in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl HealthResult {
    /// A passing result stamped with the current time.
    #[must_use]
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
            timestamp: now_millis(),
        }
    }

    /// A failing result stamped with the current time.
    #[must_use]
    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
            timestamp: now_millis(),
        }
    }
}

/// Milliseconds since the Unix epoch. Clocks set before 1970 read as zero.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
