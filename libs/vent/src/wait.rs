//! Watchdog-aware waits
//!
//! Any wait longer than a watchdog slice is broken up so the watchdog keeps
//! being fed. `retry_forever` builds the "keep trying until it works" loops
//! on top of that.

use core::future::Future;

use crate::ports::{Clock, Connectivity, Watchdog};

/// How often `ensure_connected` checks the link while an association is in
/// progress.
pub const CONNECT_POLL_MS: u64 = 500;

/// Sleeps `total_ms` in slices of at most `slice_ms`, feeding the watchdog
/// before the first slice and after each one.
pub async fn sleep_fed<K: Clock, W: Watchdog>(
    clock: &K,
    watchdog: &mut W,
    total_ms: u64,
    slice_ms: u64,
) {
    let slice_ms = slice_ms.max(1);
    let mut remaining = total_ms;
    watchdog.feed();
    while remaining > 0 {
        let step = remaining.min(slice_ms);
        clock.sleep_ms(step).await;
        watchdog.feed();
        remaining -= step;
    }
}

/// Fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub delay_ms: u64,
    pub slice_ms: u64,
}

/// One try of a repeatable operation. `None` means "try again".
pub trait Attempt<K: Clock, W: Watchdog> {
    type Output;

    fn attempt(&mut self, clock: &K, watchdog: &mut W) -> impl Future<Output = Option<Self::Output>>;
}

/// Repeats `attempt` until it yields a value, waiting `backoff` between
/// tries. Never gives up; the watchdog is fed throughout.
pub async fn retry_forever<A, K, W>(
    attempt: &mut A,
    clock: &K,
    watchdog: &mut W,
    backoff: Backoff,
) -> A::Output
where
    A: Attempt<K, W>,
    K: Clock,
    W: Watchdog,
{
    let mut failures: u32 = 0;
    loop {
        watchdog.feed();
        if let Some(output) = attempt.attempt(clock, watchdog).await {
            return output;
        }
        failures = failures.saturating_add(1);
        debug!("retry: attempt failed {} time(s), backing off {} ms", failures, backoff.delay_ms);
        sleep_fed(clock, watchdog, backoff.delay_ms, backoff.slice_ms).await;
    }
}

/// Timing for [`ensure_connected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTiming {
    pub attempt_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub slice_ms: u64,
}

struct Associate<'a, N> {
    link: &'a mut N,
    timeout_ms: u64,
    slice_ms: u64,
}

impl<N, K, W> Attempt<K, W> for Associate<'_, N>
where
    N: Connectivity,
    K: Clock,
    W: Watchdog,
{
    type Output = ();

    async fn attempt(&mut self, clock: &K, watchdog: &mut W) -> Option<()> {
        info!("link: connecting");
        self.link.begin_connect();
        let mut waited = 0;
        while !self.link.is_connected() {
            if waited >= self.timeout_ms {
                warn!("link: not up after {} ms", waited);
                return None;
            }
            sleep_fed(clock, watchdog, CONNECT_POLL_MS, self.slice_ms).await;
            waited += CONNECT_POLL_MS;
        }
        info!("link: connected");
        Some(())
    }
}

/// Blocks until `link` is connected. Returns `true` if a reconnect was
/// needed.
pub async fn ensure_connected<N, K, W>(
    link: &mut N,
    clock: &K,
    watchdog: &mut W,
    timing: ConnectTiming,
) -> bool
where
    N: Connectivity,
    K: Clock,
    W: Watchdog,
{
    if link.is_connected() {
        return false;
    }
    let mut associate = Associate {
        link,
        timeout_ms: timing.attempt_timeout_ms,
        slice_ms: timing.slice_ms,
    };
    let backoff = Backoff {
        delay_ms: timing.retry_delay_ms,
        slice_ms: timing.slice_ms,
    };
    retry_forever(&mut associate, clock, watchdog, backoff).await;
    true
}
