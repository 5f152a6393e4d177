//! Retry wrapper for catalog calls.
//!
//! Rate limiting and upstream server errors (429, 500, 502, 503, 504) are
//! retried honoring the server's `Retry-After` hint, falling back to an
//! exponential backoff. Other HTTP statuses fail immediately. Transport
//! and decode failures get a shorter backoff cap. Every call makes at most
//! [`MAX_ATTEMPTS`] attempts and returns the last error unchanged.

use std::thread;
use std::time::Duration;

use super::CatalogError;

/// Total attempts per call, including the first.
pub const MAX_ATTEMPTS: u32 = 7;

/// HTTP statuses worth waiting out.
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Blocking pause between calls. Swapped for a recorder in tests.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Cap for both the backoff and the server hint on throttled calls.
    pub throttle_cap: Duration,
    /// Backoff cap for transport/decode failures.
    pub generic_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(500),
            throttle_cap: Duration::from_secs(15),
            generic_cap: Duration::from_secs(10),
        }
    }
}

enum RetryClass {
    Throttled(Option<Duration>),
    Generic,
    Fatal,
}

fn classify(err: &CatalogError) -> RetryClass {
    match err {
        CatalogError::Status { status, retry_after } => {
            if RETRYABLE_STATUSES.contains(status) {
                let hint = retry_after.and_then(|secs| Duration::try_from_secs_f64(secs).ok());
                RetryClass::Throttled(hint)
            } else {
                RetryClass::Fatal
            }
        }
        CatalogError::Transport(_) | CatalogError::Decode(_) | CatalogError::Auth(_) => {
            RetryClass::Generic
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn call<T, F>(&self, sleeper: &dyn Sleeper, label: &str, mut op: F) -> Result<T, CatalogError>
    where
        F: FnMut() -> Result<T, CatalogError>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt >= self.max_attempts {
                log::warn!("{label}: giving up after {attempt} attempts: {err}");
                return Err(err);
            }

            match classify(&err) {
                RetryClass::Fatal => return Err(err),
                RetryClass::Throttled(hint) => {
                    let wait = hint.unwrap_or(backoff).min(self.throttle_cap);
                    log::warn!(
                        "{label}: {err}, retry {attempt}/{} in {wait:?}",
                        self.max_attempts - 1
                    );
                    sleeper.sleep(wait);
                    backoff = (backoff * 2).min(self.throttle_cap);
                }
                RetryClass::Generic => {
                    log::warn!(
                        "{label}: {err}, retry {attempt}/{} in {backoff:?}",
                        self.max_attempts - 1
                    );
                    sleeper.sleep(backoff);
                    backoff = (backoff * 2).min(self.generic_cap);
                }
            }
        }
    }
}
