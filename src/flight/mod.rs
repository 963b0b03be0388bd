//! Flight-control state, command flags, and the override channel

pub mod commands;
pub mod state;

pub use commands::{CameraCommand, CommandBit, CommandFlags, CommandSequencer, VideoCommand};
pub use state::{
    ControlSnapshot, FlightState, FlightStateStore, HeadingEstimator, OverrideSlot, StickAxis,
    TrimAxis,
};
