// Retry logic with a fixed backoff

use std::time::Duration;

pub const RETRY_DELAY: Duration = Duration::from_secs(2);

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Runs `op` up to `attempts` times, sleeping `delay` between failed attempts.
///
/// `on_error` sees the 1-based attempt number of every failure. Returns `None`
/// once all attempts are used up, including when `attempts` is zero.
pub fn with_retry<T, E, F, L>(
    attempts: u32,
    delay: Duration,
    sleeper: &dyn Sleeper,
    mut op: F,
    mut on_error: L,
) -> Option<T>
where
    F: FnMut() -> Result<T, E>,
    L: FnMut(u32, &E),
{
    for attempt in 1..=attempts {
        match op() {
            Ok(result) => return Some(result),
            Err(e) => {
                on_error(attempt, &e);
                if attempt < attempts {
                    sleeper.sleep(delay);
                }
            }
        }
    }
    None
}
