//! XR872 wire protocol: codecs, telemetry parsing, video reassembly

pub mod codec;
pub mod constants;
pub mod ring_buffer;
pub mod telemetry;
pub mod video;

pub use codec::ControlFrame;
pub use telemetry::{Telemetry, TelemetryScanner, TriggerDetector, TriggerEvent};
pub use video::{FragmentResult, FrameAssembler};
