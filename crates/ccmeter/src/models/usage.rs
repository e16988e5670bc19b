use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rate-limit snapshot harvested from API response headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageInfo {
    pub tokens_limit: u64,
    pub tokens_remaining: u64,
    pub tokens_reset: Option<DateTime<Utc>>,
    pub requests_limit: u64,
    pub requests_remaining: u64,
    pub requests_reset: Option<DateTime<Utc>>,
}

impl UsageInfo {
    /// Token headroom as a percentage; 0 when the limit is unknown.
    pub fn remaining_percent(&self) -> f64 {
        if self.tokens_limit == 0 {
            return 0.0;
        }
        self.tokens_remaining as f64 / self.tokens_limit as f64 * 100.0
    }

    /// Whole-number percentage for glyph rendering.
    pub fn display_percent(&self) -> u8 {
        self.remaining_percent().round().clamp(0.0, 100.0) as u8
    }
}
