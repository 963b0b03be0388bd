//! Link statistics shared between the sender, receiver and watchdog tasks
//!
//! All fields are atomics so the watchdog and the senders read them without
//! taking any lock. Timestamps are monotonic milliseconds since the stats
//! block was created.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Sentinel for "never happened"
const NEVER: u64 = u64::MAX;

pub struct LinkStats {
    epoch: Instant,
    tx_count: AtomicU64,
    rx_count: AtomicU64,
    video_rx_count: AtomicU64,
    decode_errors: AtomicU64,
    last_tx_ms: AtomicU64,
    last_rx_ms: AtomicU64,
    /// Consecutive control-frame send failures (reset on success)
    send_failures: AtomicU32,
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            tx_count: AtomicU64::new(0),
            rx_count: AtomicU64::new(0),
            video_rx_count: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            last_tx_ms: AtomicU64::new(NEVER),
            last_rx_ms: AtomicU64::new(NEVER),
            send_failures: AtomicU32::new(0),
        }
    }

    #[inline]
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn note_tx(&self) {
        self.tx_count.fetch_add(1, Ordering::Relaxed);
        self.last_tx_ms.store(self.now_ms(), Ordering::Relaxed);
        self.send_failures.store(0, Ordering::Relaxed);
    }

    /// Record a failed control send; returns the consecutive failure count
    pub fn note_send_failure(&self) -> u32 {
        self.send_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn note_rx(&self) {
        self.rx_count.fetch_add(1, Ordering::Relaxed);
        self.last_rx_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    pub fn note_video_rx(&self) {
        self.video_rx_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_decode_errors(&self, n: u64) {
        if n > 0 {
            self.decode_errors.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn counts(&self) -> (u64, u64, u64) {
        (
            self.tx_count.load(Ordering::Relaxed),
            self.rx_count.load(Ordering::Relaxed),
            self.video_rx_count.load(Ordering::Relaxed),
        )
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    pub fn consecutive_send_failures(&self) -> u32 {
        self.send_failures.load(Ordering::Relaxed)
    }

    /// Time since the last control-port packet, `None` if nothing received
    pub fn rx_age(&self) -> Option<Duration> {
        let at = self.last_rx_ms.load(Ordering::Relaxed);
        if at == NEVER {
            return None;
        }
        Some(Duration::from_millis(self.now_ms().saturating_sub(at)))
    }

    /// True when a control-port packet arrived within `threshold`
    pub fn rx_fresh(&self, threshold: Duration) -> bool {
        self.rx_age().is_some_and(|age| age <= threshold)
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_freshness() {
        let stats = LinkStats::new();
        assert_eq!(stats.counts(), (0, 0, 0));
        assert!(stats.rx_age().is_none());
        assert!(!stats.rx_fresh(Duration::from_secs(3)));

        stats.note_tx();
        stats.note_rx();
        stats.note_video_rx();
        assert_eq!(stats.counts(), (1, 1, 1));
        assert!(stats.rx_fresh(Duration::from_secs(3)));
    }

    #[test]
    fn test_send_failures_reset_on_success() {
        let stats = LinkStats::new();
        assert_eq!(stats.note_send_failure(), 1);
        assert_eq!(stats.note_send_failure(), 2);
        assert_eq!(stats.consecutive_send_failures(), 2);

        stats.note_tx();
        assert_eq!(stats.consecutive_send_failures(), 0);
    }
}
