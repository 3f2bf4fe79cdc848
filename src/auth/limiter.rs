use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::LoginLimitConfig;

/// Sliding-window cap on login attempts per client address.
pub struct LoginLimiter {
    max_attempts: usize,
    window: Duration,
    attempts: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl From<&LoginLimitConfig> for LoginLimiter {
    fn from(cfg: &LoginLimitConfig) -> Self {
        Self::new(cfg.max_attempts, Duration::from_secs(cfg.window_seconds))
    }
}

impl LoginLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Records an attempt; `false` once the address is over its budget.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    pub fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut attempts = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // forget addresses whose whole window has passed
        attempts.retain(|_, seen| {
            seen.back()
                .is_some_and(|last| now.saturating_duration_since(*last) < self.window)
        });

        let seen = attempts.entry(ip).or_default();
        while seen
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            seen.pop_front();
        }

        if seen.len() >= self.max_attempts {
            warn!(%ip, attempts = seen.len(), "login rate limit hit");
            return false;
        }
        seen.push_back(now);
        true
    }
}
