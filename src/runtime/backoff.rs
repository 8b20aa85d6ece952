use std::time::Duration;

/// Exponential reconnect delay: `min(max, base × factor^attempt)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectBackoff {
    base: Duration,
    factor: f64,
    max: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 1.6, Duration::from_millis(8000))
    }
}

impl ReconnectBackoff {
    pub fn new(base: Duration, factor: f64, max: Duration) -> Self {
        Self {
            base,
            factor: if factor.is_finite() && factor >= 1.0 {
                factor
            } else {
                1.0
            },
            max,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled_ms = self.base.as_millis() as f64 * self.factor.powi(exponent);
        let max_ms = self.max.as_millis() as f64;
        if !scaled_ms.is_finite() || scaled_ms >= max_ms {
            return self.max;
        }
        Duration::from_millis(scaled_ms.round() as u64)
    }
}
