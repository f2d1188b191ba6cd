#![forbid(unsafe_code)]

pub const DEFAULT_BACKOFF_BASE_SECS: f64 = 2.0;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Exponential backoff parameters for the retry tracker. The delay after
/// attempt `n` is `base_secs^n` seconds; once `max_attempts` is reached the
/// tracker reports exhaustion and the caller is expected to stop retrying.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub base_secs: f64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_secs: DEFAULT_BACKOFF_BASE_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn delay_ms(&self, attempt_count: u32) -> i64 {
        let attempt = attempt_count.min(i32::MAX as u32) as i32;
        let secs = self.base_secs.powi(attempt);
        if !secs.is_finite() || secs < 0.0 {
            return i64::MAX;
        }
        let ms = secs * 1000.0;
        if ms >= i64::MAX as f64 {
            i64::MAX
        } else {
            ms as i64
        }
    }

    pub fn next_allowed_at_ms(&self, now_ms: i64, attempt_count: u32) -> i64 {
        now_ms.saturating_add(self.delay_ms(attempt_count))
    }

    pub fn exhausted(&self, attempt_count: u32) -> bool {
        attempt_count >= self.max_attempts
    }
}
