//! Single-value cache with a time-to-live

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Holds at most one value; reads after the TTL clear it and return `None`.
///
/// Uses tokio's clock, so paused-time tests control expiry.
#[derive(Debug)]
pub struct ExpiringCache<T> {
    ttl: Duration,
    slot: Mutex<Option<(T, Instant)>>,
}

impl<T: Clone> ExpiringCache<T> {
    /// Empty cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value`, restarting the TTL.
    pub fn set(&self, value: T) {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some((value, Instant::now()));
    }

    /// The cached value while it is fresh.
    pub fn get(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        match slot.as_ref() {
            Some((_, stored)) if stored.elapsed() >= self.ttl => {
                *slot = None;
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }

    /// Forget the value.
    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}
