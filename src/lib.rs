//! x80-station - Ground-station protocol engine for the Pallton X80
//!
//! The X80 quadcopter speaks the XR872 protocol over its own Wi-Fi access
//! point: 20-byte control frames on a strict 140 ms cadence, fragmented
//! MJPEG video on a second UDP port, and an unframed telemetry byte stream
//! coming back on the control port. This crate implements the real-time
//! protocol engine: codecs, both receive pipelines, the connection
//! watchdog, and a time-based pattern autopilot.
//!
//! UI concerns (HUD, input polling, recording) are collaborators: they
//! drive [`Station`] and consume its three event streams.

pub mod autopilot;
pub mod config;
pub mod error;
pub mod events;
pub mod flight;
pub mod link;
pub mod protocol;
pub mod station;

// Re-export commonly used types
pub use config::StationConfig;
pub use error::{Error, Result};
pub use events::StatusEvent;
pub use link::LinkState;
pub use protocol::Telemetry;
pub use station::Station;
