//! Zero-allocation packet building for the XR872 protocol
//!
//! This module provides:
//! - `ControlFrame`: single reusable buffer for the 20-byte control frame
//! - `command_triple` / `command_packet`: 7-byte camera/video commands
//! - Validators for inbound control-shaped and telemetry-shaped packets
//!
//! # Pattern
//!
//! ```ignore
//! let mut frame = ControlFrame::new();   // Create once at thread start
//! frame.encode(&snapshot, flags);        // Refill from the latest snapshot
//! socket.send(frame.as_bytes())?;        // Send
//! ```
//!
//! Encoders are total: any `f32` stick value produces a valid byte.
//! Validators return [`DecodeError`] and never panic on short input.

use super::constants::*;
use crate::error::DecodeError;
use crate::flight::state::ControlSnapshot;

/// XOR of `bytes[from..=to]` inclusive.
///
/// The XR872 uses this single-byte checksum on every framed packet.
#[inline]
pub fn xor(bytes: &[u8], from: usize, to: usize) -> u8 {
    bytes[from..=to].iter().fold(0, |acc, b| acc ^ b)
}

/// Scale a stick value in [-100, +100] to the wire byte.
///
/// `encode_axis(0.0)` is exactly [`AXIS_CENTER`] (128); full deflection
/// saturates at 0 / 255.
#[inline]
pub fn encode_axis(value: f32) -> u8 {
    let scaled = (value / 100.0 * 128.0).round() as i32 + 128;
    scaled.clamp(0, 255) as u8
}

/// Reusable TX buffer for the 20-byte control frame
///
/// Header, length byte and tail are pre-filled once; `encode` rewrites the
/// variable middle and recomputes the checksum. Create once, reuse every
/// control-sender cycle.
pub struct ControlFrame {
    data: [u8; CONTROL_FRAME_LEN],
}

impl ControlFrame {
    /// Create a new frame with the fixed framing bytes pre-filled
    pub const fn new() -> Self {
        let mut data = [0u8; CONTROL_FRAME_LEN];
        data[0] = CONTROL_HEADER;
        data[1] = CONTROL_LEN_BYTE;
        data[19] = CONTROL_TAIL;
        Self { data }
    }

    /// Get frame bytes for sending
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Fill the frame from a projected flight snapshot and the current
    /// command-flag byte, then seal the checksum.
    pub fn encode(&mut self, snap: &ControlSnapshot, flags: u8) {
        self.data[2] = encode_axis(snap.roll);
        self.data[3] = encode_axis(snap.pitch);
        self.data[4] = encode_axis(snap.throttle);
        self.data[5] = encode_axis(snap.yaw);
        self.data[6] = flags;
        self.data[7] = MODE_BASE | if snap.headless { MODE_HEADLESS } else { 0 };
        self.data[8] = if snap.follow_dir_enabled { 0xFF } else { 0x00 };
        self.data[9] = if snap.follow_accel_enabled { 0xFF } else { 0x00 };
        self.data[10] = encode_axis(snap.follow_dir_y);
        self.data[11] = encode_axis(snap.follow_accel_x);
        self.data[12] = encode_axis(snap.follow_accel_y);
        self.data[13] = encode_axis(snap.follow_dir_x);
        self.data[14..18].copy_from_slice(&snap.custom_payload);
        self.data[18] = xor(&self.data, 2, 17);
    }
}

impl Default for ControlFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Build one 7-byte command packet: `[CC 5A seq cmd 02 param xor]`
///
/// The checksum covers bytes 2..=5 (seq through param).
pub fn command_packet(seq: u8, cmd_id: u8, param: u8) -> [u8; CMD_PACKET_LEN] {
    let mut pkt = [CMD_PREFIX_1, CMD_PREFIX_2, seq, cmd_id, 0x02, param, 0];
    pkt[6] = xor(&pkt, 2, 5);
    pkt
}

/// Build the three-packet sequence for a command, seq bytes 1, 2, 3
pub fn command_triple(cmd_id: u8, param: u8) -> [[u8; CMD_PACKET_LEN]; 3] {
    [
        command_packet(1, cmd_id, param),
        command_packet(2, cmd_id, param),
        command_packet(3, cmd_id, param),
    ]
}

/// Validate a 7-byte command packet (used for remote command echoes)
pub fn validate_command_packet(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() != CMD_PACKET_LEN {
        return Err(DecodeError::InvalidLength);
    }
    if bytes[0] != CMD_PREFIX_1 || bytes[1] != CMD_PREFIX_2 {
        return Err(DecodeError::BadHeader);
    }
    if xor(bytes, 2, 5) != bytes[6] {
        return Err(DecodeError::ChecksumMismatch);
    }
    Ok(())
}

/// Validate a 15-byte long-form telemetry record
///
/// Layout: `66 0F .. battery status .. xor 99` with the checksum over
/// bytes 2..=12 stored at byte 13.
pub fn validate_long_record(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() != TELEMETRY_LONG_LEN {
        return Err(DecodeError::InvalidLength);
    }
    if bytes[0] != TELEMETRY_HEADER || bytes[1] != TELEMETRY_LONG_MARK {
        return Err(DecodeError::BadHeader);
    }
    if bytes[14] != TELEMETRY_TAIL {
        return Err(DecodeError::BadTail);
    }
    if xor(bytes, 2, 12) != bytes[13] {
        return Err(DecodeError::ChecksumMismatch);
    }
    Ok(())
}

/// Validate a 10-byte short-form telemetry record
///
/// Layout: `66 voltage status .. xor` with the checksum over bytes 1..=8
/// stored at byte 9. Byte 1 equal to `0x0F` is reserved for the long form.
pub fn validate_short_record(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() != TELEMETRY_SHORT_LEN {
        return Err(DecodeError::InvalidLength);
    }
    if bytes[0] != TELEMETRY_HEADER || bytes[1] == TELEMETRY_LONG_MARK {
        return Err(DecodeError::BadHeader);
    }
    if xor(bytes, 1, 8) != bytes[9] {
        return Err(DecodeError::ChecksumMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neutral_snapshot() -> ControlSnapshot {
        ControlSnapshot::default()
    }

    #[test]
    fn test_axis_encoding() {
        assert_eq!(encode_axis(0.0), 128);
        assert_eq!(encode_axis(100.0), 255); // 256 saturates
        assert_eq!(encode_axis(-100.0), 0);
        assert_eq!(encode_axis(50.0), 192);
        assert_eq!(encode_axis(30.0), 166); // hover cap reference point
        assert_eq!(encode_axis(1000.0), 255);
        assert_eq!(encode_axis(-1000.0), 0);
    }

    #[test]
    fn test_neutral_control_frame() {
        let mut frame = ControlFrame::new();
        frame.encode(&neutral_snapshot(), 0);

        let expected: [u8; 20] = [
            0x66, 0x14, 0x80, 0x80, 0x80, 0x80, 0x00, 0x02, 0x00, 0x00, 0x80, 0x80, 0x80, 0x80,
            0x00, 0x00, 0x00, 0x00, 0x02, 0x99,
        ];
        assert_eq!(frame.as_bytes(), &expected);
    }

    #[test]
    fn test_frame_checksum_tracks_flags() {
        let mut frame = ControlFrame::new();
        frame.encode(&neutral_snapshot(), FLAG_TAKEOFF_LAND);

        let bytes = frame.as_bytes();
        assert_eq!(bytes[6], 0x01);
        assert_eq!(bytes[18], xor(bytes, 2, 17));
        assert_eq!(bytes[18], 0x03);
    }

    #[test]
    fn test_headless_mode_byte() {
        let mut snap = neutral_snapshot();
        snap.headless = true;
        let mut frame = ControlFrame::new();
        frame.encode(&snap, 0);

        assert_eq!(frame.as_bytes()[7], 0x03);
        // Bit 1 is set regardless of headless
        assert_eq!(frame.as_bytes()[7] & MODE_BASE, MODE_BASE);
    }

    #[test]
    fn test_follow_axes_and_enables() {
        let mut snap = neutral_snapshot();
        snap.follow_dir_enabled = true;
        snap.follow_dir_y = 50.0;
        snap.follow_dir_x = -50.0;
        let mut frame = ControlFrame::new();
        frame.encode(&snap, 0);

        let bytes = frame.as_bytes();
        assert_eq!(bytes[8], 0xFF);
        assert_eq!(bytes[9], 0x00);
        assert_eq!(bytes[10], 192); // follow_dir_y
        assert_eq!(bytes[13], 64); // follow_dir_x
    }

    #[test]
    fn test_custom_payload_injection() {
        let mut snap = neutral_snapshot();
        snap.custom_payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let mut frame = ControlFrame::new();
        frame.encode(&snap, 0);

        let bytes = frame.as_bytes();
        assert_eq!(&bytes[14..18], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(bytes[18], xor(bytes, 2, 17));
        assert_eq!(bytes[19], CONTROL_TAIL);
    }

    #[test]
    fn test_camera_rotate_triples() {
        // Byte-exact sequences from the protocol capture
        let on = command_triple(CMD_CAMERA_ROTATE, 0x01);
        assert_eq!(on[0], [0xCC, 0x5A, 0x01, 0x01, 0x02, 0x01, 0x03]);
        assert_eq!(on[1], [0xCC, 0x5A, 0x02, 0x01, 0x02, 0x01, 0x00]);
        assert_eq!(on[2], [0xCC, 0x5A, 0x03, 0x01, 0x02, 0x01, 0x01]);

        let off = command_triple(CMD_CAMERA_ROTATE, 0x00);
        assert_eq!(off[0], [0xCC, 0x5A, 0x01, 0x01, 0x02, 0x00, 0x02]);
        assert_eq!(off[1], [0xCC, 0x5A, 0x02, 0x01, 0x02, 0x00, 0x01]);
        assert_eq!(off[2], [0xCC, 0x5A, 0x03, 0x01, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn test_camera_switch_triple() {
        let triple = command_triple(CMD_CAMERA_SWITCH, 0x00);
        assert_eq!(triple[0], [0xCC, 0x5A, 0x01, 0x04, 0x02, 0x00, 0x07]);
        assert_eq!(triple[1], [0xCC, 0x5A, 0x02, 0x04, 0x02, 0x00, 0x04]);
        assert_eq!(triple[2], [0xCC, 0x5A, 0x03, 0x04, 0x02, 0x00, 0x05]);
    }

    #[test]
    fn test_video_singletons_match_builder() {
        assert_eq!(command_packet(1, CMD_VIDEO, PARAM_VIDEO_START), CMD_VIDEO_START);
        assert_eq!(command_packet(1, CMD_VIDEO, PARAM_VIDEO_STOP), CMD_VIDEO_STOP);
    }

    #[test]
    fn test_validate_command_packet() {
        assert!(validate_command_packet(&CMD_VIDEO_START).is_ok());

        let mut bad = CMD_VIDEO_START;
        bad[6] ^= 0xFF;
        assert_eq!(
            validate_command_packet(&bad),
            Err(DecodeError::ChecksumMismatch)
        );
        assert_eq!(
            validate_command_packet(&bad[..5]),
            Err(DecodeError::InvalidLength)
        );
    }

    #[test]
    fn test_validate_long_record() {
        let mut rec = [0u8; 15];
        rec[0] = 0x66;
        rec[1] = 0x0F;
        rec[3] = 100; // battery
        rec[13] = xor(&rec, 2, 12);
        rec[14] = 0x99;
        assert!(validate_long_record(&rec).is_ok());

        rec[14] = 0x00;
        assert_eq!(validate_long_record(&rec), Err(DecodeError::BadTail));
    }

    #[test]
    fn test_validate_short_record() {
        let mut rec = [0u8; 10];
        rec[0] = 0x66;
        rec[1] = 37; // 3.7 V
        rec[9] = xor(&rec, 1, 8);
        assert!(validate_short_record(&rec).is_ok());

        // A 0x0F second byte belongs to the long form
        rec[1] = 0x0F;
        rec[9] = xor(&rec, 1, 8);
        assert_eq!(validate_short_record(&rec), Err(DecodeError::BadHeader));
    }
}
