//! Constants for the XR872 drone protocol (Pallton X80)

// Control frame framing
pub const CONTROL_HEADER: u8 = 0x66;
pub const CONTROL_LEN_BYTE: u8 = 0x14; // byte 1 carries the frame length (20)
pub const CONTROL_TAIL: u8 = 0x99;
pub const CONTROL_FRAME_LEN: usize = 20;

/// Center stick position on the wire (0.0 encodes to exactly this)
pub const AXIS_CENTER: u8 = 128;

// Command flag bits (byte 6 of the control frame)
pub const FLAG_TAKEOFF_LAND: u8 = 1 << 0; // shared bit: drone disambiguates
pub const FLAG_EMERGENCY_STOP: u8 = 1 << 1;
pub const FLAG_CALIBRATE: u8 = 1 << 2;
pub const FLAG_FLIP_360: u8 = 1 << 3;
pub const FLAG_LIGHT_TOGGLE: u8 = 1 << 4;

// Mode byte (byte 7): bit 1 always set, bit 0 = headless
pub const MODE_BASE: u8 = 0x02;
pub const MODE_HEADLESS: u8 = 0x01;

/// Heartbeat payload (single byte keep-alive on the control port)
pub const HEARTBEAT_PACKET: [u8; 1] = [0x00];

// Command packets: [0xCC, 0x5A, seq, cmd_id, 0x02, param, xor(seq..param)]
pub const CMD_PREFIX_1: u8 = 0xCC;
pub const CMD_PREFIX_2: u8 = 0x5A;
pub const CMD_PACKET_LEN: usize = 7;

// Command IDs
pub const CMD_CAMERA_ROTATE: u8 = 0x01; // param 0x01 = on, 0x00 = off
pub const CMD_CAMERA_SWITCH: u8 = 0x04; // param 0x00
pub const CMD_VIDEO: u8 = 0x82; // param 0x36 = start, 0x37 = stop

pub const PARAM_VIDEO_START: u8 = 0x36;
pub const PARAM_VIDEO_STOP: u8 = 0x37;

/// Video start singleton: `CC 5A 01 82 02 36 B7`
pub const CMD_VIDEO_START: [u8; 7] = [0xCC, 0x5A, 0x01, 0x82, 0x02, 0x36, 0xB7];
/// Video stop singleton: `CC 5A 01 82 02 37 B6`
pub const CMD_VIDEO_STOP: [u8; 7] = [0xCC, 0x5A, 0x01, 0x82, 0x02, 0x37, 0xB6];

// Telemetry record shapes
pub const TELEMETRY_HEADER: u8 = 0x66;
pub const TELEMETRY_LONG_MARK: u8 = 0x0F; // byte 1 of the 15-byte long form
pub const TELEMETRY_TAIL: u8 = 0x99;
pub const TELEMETRY_LONG_LEN: usize = 15;
pub const TELEMETRY_SHORT_LEN: usize = 10;

// Short-form status bits
pub const SHORT_STATUS_PHOTO: u8 = 1 << 0;
pub const SHORT_STATUS_RECORD: u8 = 1 << 1;
// Long-form status bits
pub const LONG_STATUS_PHOTO: u8 = 1 << 1;
pub const LONG_STATUS_RECORD: u8 = 1 << 2;

// Voltage-to-percent line fit for short-form records (volts in, percent out)
pub const VOLTAGE_PCT_SLOPE: f64 = 160.7142;
pub const VOLTAGE_PCT_OFFSET: f64 = 517.8571;

// Video fragment geometry
pub const FRAGMENT_HEADER_LEN: usize = 4;
pub const FRAGMENT_FULL_LEN: usize = 1472; // every non-final fragment is exactly this
pub const FRAME_MAX_LEN: usize = 300_000;

pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

// Network defaults
pub const DEFAULT_DRONE_IP: &str = "192.168.28.1";
pub const DEFAULT_CTL_PORT: u16 = 7080;
pub const DEFAULT_VIDEO_PORT: u16 = 7070;

// Timing defaults
pub const DEFAULT_CONTROL_INTERVAL_MS: u32 = 140;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u32 = 1000;
pub const DEFAULT_RX_TIMEOUT_S: u32 = 3;

/// Armed command bits stay in outgoing frames this long, then auto-clear
pub const FLAG_ARM_WINDOW_MS: u64 = 1000;

/// Spacing between the three packets of a command triple
pub const TRIPLE_SPACING_MS: u64 = 2;

/// Receive buffer size on both UDP endpoints
pub const RECV_BUFFER_SIZE: usize = 2048;
