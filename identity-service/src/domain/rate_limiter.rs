use shared::config::DEFAULT_MESSAGE_COOLDOWN_MS;
use shared::{Result, ServiceError};
use std::collections::HashMap;
use std::sync::RwLock;

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Throttled { retry_after_ms: i64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Never sent, or the cooldown has elapsed.
    Ready,
    Cooling { remaining_ms: i64 },
}

/// Per-sender cooldown between accepted messages.
///
/// One instance belongs to one sending session. State is keyed by sender
/// inside the instance, so senders never share a timer.
pub struct RateLimiter {
    last_accepted_at: RwLock<HashMap<String, i64>>,
    cooldown_ms: i64,
}

impl RateLimiter {
    pub fn new(cooldown_ms: i64) -> Self {
        Self {
            last_accepted_at: RwLock::new(HashMap::new()),
            cooldown_ms,
        }
    }

    pub fn cooldown_ms(&self) -> i64 {
        self.cooldown_ms
    }

    /// Decides whether `sender_key` may send at `now_millis` and, if so,
    /// records the send.
    ///
    /// Decision and update happen under one write lock, so no other caller
    /// can observe the old timestamp in between. A throttled attempt leaves
    /// the state untouched.
    pub fn try_admit(&self, sender_key: &str, now_millis: i64) -> Result<Admission> {
        let mut last_accepted_at = self
            .last_accepted_at
            .write()
            .map_err(|e| ServiceError::Internal(format!("Lock error: {}", e)))?;

        if let Some(&last) = last_accepted_at.get(sender_key) {
            let elapsed = now_millis.saturating_sub(last);
            if elapsed < self.cooldown_ms {
                return Ok(Admission::Throttled {
                    retry_after_ms: self.cooldown_ms.saturating_sub(elapsed),
                });
            }
        }

        last_accepted_at.insert(sender_key.to_string(), now_millis);

        Ok(Admission::Admitted)
    }

    pub fn sender_state(&self, sender_key: &str, now_millis: i64) -> SenderState {
        if let Ok(last_accepted_at) = self.last_accepted_at.read() {
            if let Some(&last) = last_accepted_at.get(sender_key) {
                let elapsed = now_millis.saturating_sub(last);
                if elapsed < self.cooldown_ms {
                    return SenderState::Cooling {
                        remaining_ms: self.cooldown_ms.saturating_sub(elapsed),
                    };
                }
            }
        }
        SenderState::Ready
    }

    /// Drops senders that are `Ready` at `now_millis`. A forgotten sender is
    /// admitted on its next attempt, exactly as a ready one would be.
    pub fn forget_idle(&self, now_millis: i64) {
        if let Ok(mut last_accepted_at) = self.last_accepted_at.write() {
            let cooldown_ms = self.cooldown_ms;
            last_accepted_at.retain(|_, &mut last| now_millis.saturating_sub(last) < cooldown_ms);
        }
    }

    pub fn tracked_senders(&self) -> usize {
        self.last_accepted_at.read().map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_COOLDOWN_MS)
    }
}
