//! Session duration clock.
//!
//! Elapsed time is always derived from a wall-clock anchor plus the offset
//! accumulated before it, never counted up tick by tick. The ticker thread
//! only refreshes a display value; it carries the generation it was started
//! for and goes quiet as soon as a restart or halt supersedes it.

use crate::clock::{whole_seconds_between, Clock};
use chrono::{DateTime, Utc};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Callback invoked with the displayed seconds after every tick
///
/// Runs on the ticker thread while the display is locked, so it must not
/// call back into the session store.
pub type TickListener = Arc<dyn Fn(u64) + Send + Sync>;

/// Elapsed seconds for an anchor and offset at `now`
pub fn elapsed_seconds(
    started_at: Option<DateTime<Utc>>,
    duration_offset: u64,
    now: DateTime<Utc>,
) -> u64 {
    match started_at {
        Some(anchor) => duration_offset.saturating_add(whole_seconds_between(anchor, now)),
        None => duration_offset,
    }
}

#[derive(Debug, Default)]
struct Readout {
    generation: u64,
    seconds: u64,
}

struct Ticker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Ticking display of the session duration
pub struct DurationClock {
    clock: Arc<dyn Clock>,
    interval: Duration,
    display: Arc<Mutex<Readout>>,
    listener: Option<TickListener>,
    ticker: Option<Ticker>,
}

impl DurationClock {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            display: Arc::new(Mutex::new(Readout::default())),
            listener: None,
            ticker: None,
        }
    }

    /// Subscribe to ticks; takes effect from the next restart
    pub fn set_listener(&mut self, listener: Option<TickListener>) {
        self.listener = listener;
    }

    /// Seconds currently shown
    pub fn displayed(&self) -> u64 {
        lock(&self.display).seconds
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    /// Start ticking from a new anchor, cancelling any previous ticker first
    pub fn restart(&mut self, started_at: DateTime<Utc>, duration_offset: u64) {
        self.cancel();

        let generation = {
            let mut display = lock(&self.display);
            display.generation += 1;
            display.seconds = elapsed_seconds(Some(started_at), duration_offset, self.clock.now());
            display.generation
        };

        let (stop, stop_rx) = channel::<()>();
        let clock = Arc::clone(&self.clock);
        let display = Arc::clone(&self.display);
        let listener = self.listener.clone();
        let interval = self.interval;

        let spawned = std::thread::Builder::new()
            .name("duration-clock".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let seconds =
                            elapsed_seconds(Some(started_at), duration_offset, clock.now());
                        let mut shown = lock(&display);
                        if shown.generation != generation {
                            break;
                        }
                        // Never run backwards within one anchor
                        shown.seconds = shown.seconds.max(seconds);
                        if let Some(listener) = &listener {
                            listener(shown.seconds);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match spawned {
            Ok(handle) => {
                tracing::debug!("Duration clock started (generation {})", generation);
                self.ticker = Some(Ticker { stop, handle });
            }
            Err(e) => {
                // Reads stay correct without a ticker, only the display goes stale
                tracing::warn!("Unable to spawn duration clock thread: {}", e);
            }
        }
    }

    /// Stop ticking and show a fixed value
    pub fn halt(&mut self, seconds: u64) {
        self.cancel();
        let mut display = lock(&self.display);
        display.generation += 1;
        display.seconds = seconds;
    }

    /// Cancel the running ticker, if any
    ///
    /// A tick already in flight can still finish, but it checks the
    /// generation under the display lock and the caller always bumps the
    /// generation right after cancelling.
    fn cancel(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.stop.send(());
            tracing::debug!("Duration clock cancelled");
        }
    }
}

impl Drop for DurationClock {
    fn drop(&mut self) {
        self.cancel();
        lock(&self.display).generation += 1;
    }
}

fn lock(display: &Mutex<Readout>) -> MutexGuard<'_, Readout> {
    display.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Instant;

    const FAST_TICK: Duration = Duration::from_millis(10);

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_elapsed_seconds() {
        let anchor = t0();
        let now = anchor + chrono::Duration::milliseconds(61_900);

        assert_eq!(elapsed_seconds(Some(anchor), 0, now), 61);
        assert_eq!(elapsed_seconds(Some(anchor), 100, now), 161);
        assert_eq!(elapsed_seconds(None, 100, now), 100);
        // Anchor in the future contributes nothing
        assert_eq!(elapsed_seconds(Some(now), 5, anchor), 5);
    }

    #[test]
    fn test_ticker_follows_the_clock() {
        let clock = ManualClock::new(t0());
        let mut duration = DurationClock::new(Arc::new(clock.clone()), FAST_TICK);

        duration.restart(t0(), 10);
        assert_eq!(duration.displayed(), 10);
        assert!(duration.is_ticking());

        clock.advance_secs(5);
        assert!(wait_until(|| duration.displayed() == 15));
    }

    #[test]
    fn test_halt_stops_stale_ticks() {
        let clock = ManualClock::new(t0());
        let mut duration = DurationClock::new(Arc::new(clock.clone()), FAST_TICK);

        duration.restart(t0(), 0);
        clock.advance_secs(30);
        assert!(wait_until(|| duration.displayed() == 30));

        duration.halt(0);
        clock.advance_secs(30);
        std::thread::sleep(FAST_TICK * 10);

        assert_eq!(duration.displayed(), 0);
        assert!(wait_until(|| !duration.is_ticking()));
    }

    #[test]
    fn test_restart_supersedes_previous_anchor() {
        let clock = ManualClock::new(t0());
        let ticks = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicU64::new(u64::MAX));
        let mut duration = DurationClock::new(Arc::new(clock.clone()), FAST_TICK);
        {
            let ticks = Arc::clone(&ticks);
            let last = Arc::clone(&last);
            duration.set_listener(Some(Arc::new(move |seconds| {
                ticks.fetch_add(1, Ordering::SeqCst);
                last.store(seconds, Ordering::SeqCst);
            })));
        }

        duration.restart(t0(), 0);
        clock.advance_secs(100);
        assert!(wait_until(|| last.load(Ordering::SeqCst) == 100));

        // Re-anchor at the current instant: display drops back to zero and
        // no tick from the first anchor may raise it again
        duration.restart(clock.now(), 0);
        assert_eq!(duration.displayed(), 0);
        let seen = ticks.load(Ordering::SeqCst);
        assert!(wait_until(|| ticks.load(Ordering::SeqCst) > seen + 3));
        assert_eq!(last.load(Ordering::SeqCst), 0);
        assert_eq!(duration.displayed(), 0);
    }

    #[test]
    fn test_display_never_runs_backwards() {
        let clock = ManualClock::new(t0());
        let mut duration = DurationClock::new(Arc::new(clock.clone()), FAST_TICK);

        duration.restart(t0(), 0);
        clock.advance_secs(20);
        assert!(wait_until(|| duration.displayed() == 20));

        // Wall clock jumps backwards
        clock.advance_secs(-15);
        std::thread::sleep(FAST_TICK * 5);
        assert_eq!(duration.displayed(), 20);
    }

    #[test]
    fn test_drop_cancels_ticker() {
        let clock = ManualClock::new(t0());
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut duration = DurationClock::new(Arc::new(clock.clone()), FAST_TICK);
        {
            let ticks = Arc::clone(&ticks);
            duration.set_listener(Some(Arc::new(move |_| {
                ticks.fetch_add(1, Ordering::SeqCst);
            })));
        }
        duration.restart(t0(), 0);
        assert!(wait_until(|| ticks.load(Ordering::SeqCst) > 0));

        drop(duration);
        std::thread::sleep(FAST_TICK * 3);
        let after_drop = ticks.load(Ordering::SeqCst);
        std::thread::sleep(FAST_TICK * 10);
        assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
    }
}
