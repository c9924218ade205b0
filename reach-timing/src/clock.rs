use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic millisecond source for a session.
///
/// One clock instance is used for a whole session; every timestamp of a
/// trial (anchor, cues, touch samples, release) comes from the same source.
pub trait SessionClock: Clone + Send + Sync {
    fn now_ms(&self) -> u64;
    fn elapsed_ms(&self, since: u64) -> u64 {
        self.now_ms().saturating_sub(since)
    }
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone)]
pub struct HighPrecisionClock {
    pub start: Instant,
}

impl SessionClock for HighPrecisionClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
}

impl HighPrecisionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut()) };
        if rc != 0 {
            tracing::debug!(rc, "clock_nanosleep interrupted, falling back to thread::sleep");
            std::thread::sleep(duration);
        }
    }
}

impl Default for HighPrecisionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Manually advanced clock. Clones share the same time, so a test or a
/// simulation can hold one handle while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) -> u64 {
        self.now.fetch_add(ms, Ordering::SeqCst) + ms
    }

    /// Moves the clock to `ms`; never moves it backwards.
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl SessionClock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
    fn sleep(&self, d: Duration) {
        self.advance(d.as_millis() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new(1000);
        let handle = clock.clone();
        handle.advance(250);
        assert_eq!(clock.now_ms(), 1250);
        assert_eq!(clock.elapsed_ms(1000), 250);
    }

    #[test]
    fn manual_clock_never_runs_backwards() {
        let clock = ManualClock::new(500);
        clock.set(100);
        assert_eq!(clock.now_ms(), 500);
        clock.set(900);
        assert_eq!(clock.now_ms(), 900);
    }

    #[test]
    fn sleep_advances_manual_time() {
        let clock = ManualClock::new(0);
        clock.sleep(Duration::from_millis(1500));
        assert_eq!(clock.now_ms(), 1500);
    }

    #[test]
    fn high_precision_clock_is_monotonic() {
        let clock = HighPrecisionClock::new();
        let a = clock.now_ms();
        clock.sleep(Duration::from_millis(2));
        let b = clock.now_ms();
        assert!(b >= a + 1);
        assert_eq!(clock.elapsed_ms(b + 10), 0);
    }
}
