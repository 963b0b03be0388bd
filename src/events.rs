//! Event streams published to collaborators
//!
//! The core emits three streams: decoded telemetry records, reassembled
//! JPEG frames, and status changes (link-state transitions plus advisory
//! messages). Streams are bounded channels and delivery is best-effort: a
//! collaborator that stops draining loses events, the core never blocks.

use crate::link::supervisor::LinkState;
use crate::protocol::telemetry::{Telemetry, TriggerEvent};
use crossbeam_channel::{Receiver, Sender, bounded};

/// Depth of the telemetry and status streams
const EVENT_QUEUE_DEPTH: usize = 64;
/// Depth of the video stream (frames are large; stale frames are worthless)
const VIDEO_QUEUE_DEPTH: usize = 8;

/// Status stream payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Link-state transition, published exactly once per change
    Link(LinkState),
    /// Drone-initiated trigger (photo / record status edges)
    Trigger(TriggerEvent),
    /// Advisory text (low battery, reconnect notices)
    Message(String),
}

/// The three collaborator-facing streams.
///
/// Each stream is a single-consumer queue: `subscribe_*` hands out the one
/// receiver, and a second subscriber would steal from the first.
pub struct EventHub {
    telemetry_tx: Sender<Telemetry>,
    telemetry_rx: Receiver<Telemetry>,
    video_tx: Sender<Vec<u8>>,
    video_rx: Receiver<Vec<u8>>,
    status_tx: Sender<StatusEvent>,
    status_rx: Receiver<StatusEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (telemetry_tx, telemetry_rx) = bounded(EVENT_QUEUE_DEPTH);
        let (video_tx, video_rx) = bounded(VIDEO_QUEUE_DEPTH);
        let (status_tx, status_rx) = bounded(EVENT_QUEUE_DEPTH);
        Self {
            telemetry_tx,
            telemetry_rx,
            video_tx,
            video_rx,
            status_tx,
            status_rx,
        }
    }

    pub fn subscribe_telemetry(&self) -> Receiver<Telemetry> {
        self.telemetry_rx.clone()
    }

    pub fn subscribe_video(&self) -> Receiver<Vec<u8>> {
        self.video_rx.clone()
    }

    pub fn subscribe_status(&self) -> Receiver<StatusEvent> {
        self.status_rx.clone()
    }

    pub fn publish_telemetry(&self, record: Telemetry) {
        if self.telemetry_tx.try_send(record).is_err() {
            log::trace!("telemetry queue full, record dropped");
        }
    }

    pub fn publish_video(&self, frame: Vec<u8>) {
        if self.video_tx.try_send(frame).is_err() {
            log::trace!("video queue full, frame dropped");
        }
    }

    pub fn publish_status(&self, event: StatusEvent) {
        if self.status_tx.try_send(event).is_err() {
            log::trace!("status queue full, event dropped");
        }
    }

    /// Sender handle for components that publish status on their own
    /// threads (the link supervisor).
    pub fn status_sender(&self) -> Sender<StatusEvent> {
        self.status_tx.clone()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::telemetry::Telemetry;

    #[test]
    fn test_streams_deliver_in_order() {
        let hub = EventHub::new();
        let rx = hub.subscribe_telemetry();

        for pct in [10u8, 20, 30] {
            hub.publish_telemetry(Telemetry::Long {
                battery_percent: pct,
                status: 0,
            });
        }
        assert_eq!(rx.try_recv().unwrap().battery_percent(), 10);
        assert_eq!(rx.try_recv().unwrap().battery_percent(), 20);
        assert_eq!(rx.try_recv().unwrap().battery_percent(), 30);
    }

    #[test]
    fn test_full_video_queue_drops_not_blocks() {
        let hub = EventHub::new();
        // No subscriber draining: publishing past the depth must not block
        for i in 0..VIDEO_QUEUE_DEPTH + 4 {
            hub.publish_video(vec![i as u8]);
        }
        let rx = hub.subscribe_video();
        assert_eq!(rx.len(), VIDEO_QUEUE_DEPTH);
    }
}
