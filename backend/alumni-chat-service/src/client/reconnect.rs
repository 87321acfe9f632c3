use rand::Rng;
use serde::Serialize;
use std::time::Duration;

/// What the UI shows about the realtime link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    /// Waiting before reconnect attempt `attempt` (1-based)
    Reconnecting { attempt: u32 },
    /// Retries exhausted or credentials rejected; sends go over HTTP only
    Disconnected,
}

/// Bounded exponential backoff with jitter
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    /// Extra random delay as a fraction of the computed delay, 0.0 to 1.0
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_retries: 8,
            jitter: 0.3,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect `attempt` (1-based), without jitter.
    /// `None` once `attempt` exceeds `max_retries`.
    pub fn base_delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }

    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Option<Duration> {
        let delay = self.base_delay_for(attempt)?;
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return Some(delay);
        }
        let extra = delay.mul_f64(rng.gen_range(0.0..=jitter));
        Some(delay + extra)
    }
}
