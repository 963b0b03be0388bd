//! Telemetry parsing for the XR872 control port
//!
//! The drone interleaves two record shapes on the same byte stream as the
//! command echoes, with no length prefix:
//!
//! - **Short** (10 bytes, `66 ..`): raw pack voltage in decivolts plus
//!   trigger status bits.
//! - **Long** (15 bytes, `66 0F .. 99`): direct battery percentage plus
//!   trigger status bits.
//!
//! The scanner keeps a sliding window of the most recent bytes and checks
//! both shapes as each byte arrives; a match consumes its bytes so nothing
//! is attributed to two records. Corrupted long records (valid framing, bad
//! checksum) are counted and dropped — the medium is lossy by design and
//! none of this is surfaced to collaborators.

use super::codec::{validate_long_record, validate_short_record, xor};
use super::constants::*;
use super::ring_buffer::RingBuffer;
use std::time::{Duration, Instant};

/// Scanner window capacity. Only the most recent 15 bytes are ever
/// inspected; the extra headroom absorbs a push before trimming.
const SCAN_CAPACITY: usize = 32;

/// One decoded telemetry record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Telemetry {
    /// 10-byte record carrying raw voltage in decivolts (37 = 3.7 V)
    Short {
        voltage_raw: u8,
        status: u8,
        battery_percent: u8,
    },
    /// 15-byte record carrying the pack percentage directly
    Long { battery_percent: u8, status: u8 },
}

impl Telemetry {
    pub fn battery_percent(&self) -> u8 {
        match *self {
            Telemetry::Short {
                battery_percent, ..
            } => battery_percent,
            Telemetry::Long {
                battery_percent, ..
            } => battery_percent,
        }
    }

    /// Photo-trigger status bit (position differs between the two shapes)
    pub fn photo_bit(&self) -> bool {
        match *self {
            Telemetry::Short { status, .. } => status & SHORT_STATUS_PHOTO != 0,
            Telemetry::Long { status, .. } => status & LONG_STATUS_PHOTO != 0,
        }
    }

    /// Record-trigger status bit
    pub fn record_bit(&self) -> bool {
        match *self {
            Telemetry::Short { status, .. } => status & SHORT_STATUS_RECORD != 0,
            Telemetry::Long { status, .. } => status & LONG_STATUS_RECORD != 0,
        }
    }
}

/// Derive a battery percentage from a short-form decivolt reading.
///
/// Line fit from the vendor app: `pct = volts * 160.7142 - 517.8571`,
/// clamped to [0, 100].
pub fn short_battery_percent(voltage_raw: u8) -> u8 {
    let volts = voltage_raw as f64 / 10.0;
    let pct = (volts * VOLTAGE_PCT_SLOPE - VOLTAGE_PCT_OFFSET).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Build a 15-byte long-form record (reserved bytes zero)
pub fn encode_long_record(battery_percent: u8, status: u8) -> [u8; TELEMETRY_LONG_LEN] {
    let mut rec = [0u8; TELEMETRY_LONG_LEN];
    rec[0] = TELEMETRY_HEADER;
    rec[1] = TELEMETRY_LONG_MARK;
    rec[3] = battery_percent;
    rec[4] = status;
    rec[13] = xor(&rec, 2, 12);
    rec[14] = TELEMETRY_TAIL;
    rec
}

/// Decode a validated 15-byte long-form record
pub fn decode_long_record(bytes: &[u8]) -> Result<Telemetry, crate::error::DecodeError> {
    validate_long_record(bytes)?;
    Ok(Telemetry::Long {
        battery_percent: bytes[3].min(100),
        status: bytes[4],
    })
}

/// Build a 10-byte short-form record (reserved bytes zero)
pub fn encode_short_record(voltage_raw: u8, status: u8) -> [u8; TELEMETRY_SHORT_LEN] {
    let mut rec = [0u8; TELEMETRY_SHORT_LEN];
    rec[0] = TELEMETRY_HEADER;
    rec[1] = voltage_raw;
    rec[2] = status;
    rec[9] = xor(&rec, 1, 8);
    rec
}

/// Output of one scanner step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerEvent {
    Record(Telemetry),
    /// Remote command echo (`CC 5A ..`), routed to the command sequencer
    CommandEcho([u8; CMD_PACKET_LEN]),
}

/// Sliding-window scanner over the control-port byte stream
pub struct TelemetryScanner {
    window: RingBuffer<SCAN_CAPACITY>,
    /// Long records with valid framing but bad checksum (dropped)
    checksum_failures: u64,
    records: u64,
}

impl TelemetryScanner {
    pub fn new() -> Self {
        Self {
            window: RingBuffer::new(),
            checksum_failures: 0,
            records: 0,
        }
    }

    /// Drop all buffered bytes (called on reconnect)
    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Diagnostic counters: (records emitted, checksum failures)
    pub fn diagnostics(&self) -> (u64, u64) {
        (self.records, self.checksum_failures)
    }

    /// Feed a received datagram, collecting any completed events
    pub fn scan(&mut self, bytes: &[u8], out: &mut Vec<ScannerEvent>) {
        for &b in bytes {
            if let Some(event) = self.push_byte(b) {
                out.push(event);
            }
        }
    }

    /// Append one byte and run the match checks.
    ///
    /// At most one event can complete per byte: a match consumes through
    /// the newest byte, so the window is empty afterwards.
    pub fn push_byte(&mut self, byte: u8) -> Option<ScannerEvent> {
        self.window.push(byte);

        // Keep only the most recent long-record's worth of unconsumed bytes
        if self.window.len() > TELEMETRY_LONG_LEN {
            self.window.advance(self.window.len() - TELEMETRY_LONG_LEN);
        }

        if let Some(rec) = self.try_long() {
            self.records += 1;
            self.window.clear();
            return Some(ScannerEvent::Record(rec));
        }

        if let Some(rec) = self.try_short() {
            self.records += 1;
            self.window.clear();
            return Some(ScannerEvent::Record(rec));
        }

        if let Some(echo) = self.try_echo() {
            return Some(ScannerEvent::CommandEcho(echo));
        }

        None
    }

    /// Long form: the full 15-byte window framed `66 0F .. 99`
    fn try_long(&mut self) -> Option<Telemetry> {
        if self.window.len() != TELEMETRY_LONG_LEN {
            return None;
        }
        if self.window.get(0) != Some(TELEMETRY_HEADER)
            || self.window.get(1) != Some(TELEMETRY_LONG_MARK)
            || self.window.get(TELEMETRY_LONG_LEN - 1) != Some(TELEMETRY_TAIL)
        {
            return None;
        }

        let mut rec = [0u8; TELEMETRY_LONG_LEN];
        self.window.copy_to(0, &mut rec);
        match decode_long_record(&rec) {
            Ok(t) => Some(t),
            Err(_) => {
                // Framing looked right but the payload is corrupt
                self.checksum_failures += 1;
                log::trace!("long telemetry checksum mismatch, dropped");
                None
            }
        }
    }

    /// Short form: the last 10 bytes of the window
    fn try_short(&mut self) -> Option<Telemetry> {
        if self.window.len() < TELEMETRY_SHORT_LEN {
            return None;
        }
        let base = self.window.len() - TELEMETRY_SHORT_LEN;
        let mut rec = [0u8; TELEMETRY_SHORT_LEN];
        self.window.copy_to(base, &mut rec);

        if validate_short_record(&rec).is_err() {
            return None;
        }
        Some(Telemetry::Short {
            voltage_raw: rec[1],
            status: rec[2],
            battery_percent: short_battery_percent(rec[1]),
        })
    }

    /// Remote command echo: earliest `CC 5A` with a full 7 bytes behind it
    fn try_echo(&mut self) -> Option<[u8; CMD_PACKET_LEN]> {
        let pos = self.window.find_pattern_2(CMD_PREFIX_1, CMD_PREFIX_2)?;
        if pos + CMD_PACKET_LEN > self.window.len() {
            return None;
        }
        let mut echo = [0u8; CMD_PACKET_LEN];
        self.window.copy_to(pos, &mut echo);
        self.window.advance(pos + CMD_PACKET_LEN);
        Some(echo)
    }
}

impl Default for TelemetryScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Photo / record trigger events derived from status-bit edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    PhotoRequested,
    RecordToggle,
}

/// Debounces the status bits into trigger events.
///
/// A trigger fires only when the bit rises 0→1 and the raised bit is then
/// confirmed by the next consecutive record inside the confirmation window
/// (1 s for photo, 2 s for record). A lone raised bit is treated as noise.
pub struct TriggerDetector {
    photo: BitEdge,
    record: BitEdge,
}

struct BitEdge {
    prev: bool,
    rise_at: Option<Instant>,
    confirm_within: Duration,
}

impl BitEdge {
    fn new(confirm_within: Duration) -> Self {
        Self {
            prev: false,
            rise_at: None,
            confirm_within,
        }
    }

    fn observe(&mut self, bit: bool, now: Instant) -> bool {
        let fired = if bit {
            if !self.prev {
                // Rising edge: candidate, wait for confirmation
                self.rise_at = Some(now);
                false
            } else if let Some(rise) = self.rise_at.take() {
                now.duration_since(rise) <= self.confirm_within
            } else {
                false
            }
        } else {
            self.rise_at = None;
            false
        };
        self.prev = bit;
        fired
    }
}

impl TriggerDetector {
    pub fn new() -> Self {
        Self {
            photo: BitEdge::new(Duration::from_secs(1)),
            record: BitEdge::new(Duration::from_secs(2)),
        }
    }

    /// Feed one telemetry record; returns zero, one or two trigger events
    pub fn observe(&mut self, record: &Telemetry, now: Instant, out: &mut Vec<TriggerEvent>) {
        if self.photo.observe(record.photo_bit(), now) {
            out.push(TriggerEvent::PhotoRequested);
        }
        if self.record.observe(record.record_bit(), now) {
            out.push(TriggerEvent::RecordToggle);
        }
    }
}

impl Default for TriggerDetector {
    fn default() -> Self {
        Self::new()
    }
}
