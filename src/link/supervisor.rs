//! Link-state supervision and the watchdog task
//!
//! The drone offers no session layer: the only connectivity signal is the
//! telemetry trickle on the control port. The supervisor tracks the link
//! state machine and the watchdog samples the shared counters at 1 Hz to
//! drive it:
//!
//! ```text
//! Disconnected → Connecting → Connected → Degraded → Disconnected
//!                                  ↑__________|
//! ```
//!
//! - RX silence past the timeout while Connected demotes to Degraded.
//! - Two further silent samples demote to Disconnected and trigger a
//!   reconnect (rebind both sockets, reset the reassembler and the
//!   telemetry scanner; armed command flags are user intent and survive).
//! - Three consecutive control-send failures trip the same path.
//! - Fresh RX while Degraded promotes straight back to Connected.
//!
//! Transitions are published exactly once per change on the status stream.

use super::transport::UdpLink;
use crate::events::StatusEvent;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Consecutive stale watchdog samples in Degraded before disconnecting
const DEGRADED_MISS_LIMIT: u32 = 2;
/// Consecutive control-send failures before disconnecting
const SEND_FAILURE_LIMIT: u32 = 3;
/// Watchdog sampling interval
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Connectivity state of the drone link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// Holds the current link state and publishes transitions
pub struct LinkSupervisor {
    state: Mutex<LinkState>,
    status_tx: Sender<StatusEvent>,
}

impl LinkSupervisor {
    pub fn new(status_tx: Sender<StatusEvent>) -> Self {
        Self {
            state: Mutex::new(LinkState::Disconnected),
            status_tx,
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Request a state transition.
    ///
    /// Only edges of the declared machine are taken; anything else is a
    /// logic error upstream and is logged and ignored. Returns true when
    /// the state actually changed (and the event was published).
    pub fn transition(&self, to: LinkState) -> bool {
        use LinkState::*;

        let mut state = self.state.lock();
        let from = *state;
        if from == to {
            return false;
        }

        let allowed = matches!(
            (from, to),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Degraded)
                | (Connected, Disconnected)
                | (Degraded, Connected)
                | (Degraded, Disconnected)
        );
        if !allowed {
            log::debug!("ignoring link transition {} -> {}", from, to);
            return false;
        }

        *state = to;
        drop(state);

        log::info!("link: {} -> {}", from, to);
        if self.status_tx.try_send(StatusEvent::Link(to)).is_err() {
            log::trace!("status queue full, link transition event dropped");
        }
        true
    }
}

/// The 1 Hz watchdog task
pub struct Watchdog {
    pub link: Arc<UdpLink>,
    pub supervisor: Arc<LinkSupervisor>,
    pub shutdown: Arc<AtomicBool>,
    pub rx_timeout: Duration,
    /// Reconnect signal to the video receive task (owns the reassembler)
    pub reset_video: Arc<AtomicBool>,
    /// Reconnect signal to the control receive task (owns the scanner)
    pub reset_scanner: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn run(self) {
        let mut degraded_misses = 0u32;

        while !self.shutdown.load(Ordering::Relaxed) {
            thread::sleep(SAMPLE_INTERVAL);
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let stats = self.link.stats();
            let stale = !stats.rx_fresh(self.rx_timeout);

            match self.supervisor.state() {
                LinkState::Connected => {
                    if stats.consecutive_send_failures() >= SEND_FAILURE_LIMIT {
                        log::warn!("control sends failing, dropping link");
                        self.supervisor.transition(LinkState::Disconnected);
                        self.try_reconnect();
                    } else if stale {
                        log::warn!(
                            "no telemetry for {:?}, link degraded",
                            self.rx_timeout
                        );
                        self.supervisor.transition(LinkState::Degraded);
                        degraded_misses = 0;
                    }
                }
                LinkState::Degraded => {
                    if !stale {
                        self.supervisor.transition(LinkState::Connected);
                    } else {
                        degraded_misses += 1;
                        if degraded_misses >= DEGRADED_MISS_LIMIT {
                            self.supervisor.transition(LinkState::Disconnected);
                            self.try_reconnect();
                        }
                    }
                }
                LinkState::Disconnected => {
                    // A failed rebind lands here; keep trying each sample
                    self.try_reconnect();
                }
                LinkState::Connecting => {
                    // Waiting for first RX; the control receiver promotes
                }
            }
        }

        log::info!("watchdog exiting");
    }

    /// Rebind both sockets and reset the stream parsers.
    ///
    /// Armed command flags are deliberately left alone: they are user
    /// intent and must survive an outage.
    fn try_reconnect(&self) {
        match self.link.rebind() {
            Ok(()) => {
                self.reset_video.store(true, Ordering::Relaxed);
                self.reset_scanner.store(true, Ordering::Relaxed);
                self.supervisor.transition(LinkState::Connecting);
                log::info!("reconnect: sockets rebound, waiting for telemetry");
            }
            Err(e) => {
                log::error!("reconnect failed: {}", e);
            }
        }
    }
}
