//! Authoritative flight-control state
//!
//! One mutex-guarded value struct holds everything the encoder needs. The
//! 140 ms sender never reads fields piecemeal: it takes a [`ControlSnapshot`]
//! (a by-value projection) so the critical section stays in the microsecond
//! range and torn reads are impossible.
//!
//! Snapshot projection order:
//!
//! 1. Autopilot override (if the slot was published within the last 100 ms)
//!    replaces roll/pitch/throttle/yaw.
//! 2. Indoor mode caps throttle at `hover_throttle_cap` and forces the
//!    advisory speed level to 0.
//! 3. Trim offsets are added to the four primary axes.
//! 4. Everything is clamped back to [-100, +100]; indoor mode re-caps the
//!    throttle so trim can never push past the ceiling.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Stick range limit
const AXIS_LIMIT: f32 = 100.0;

/// An autopilot override published after this age is ignored
const OVERRIDE_FRESHNESS: Duration = Duration::from_millis(100);

/// The eight stick axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickAxis {
    Roll,
    Pitch,
    Throttle,
    Yaw,
    FollowDirX,
    FollowDirY,
    FollowAccelX,
    FollowAccelY,
}

/// The four trimmable axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimAxis {
    Roll,
    Pitch,
    Throttle,
    Yaw,
}

/// Current control inputs, trim, and modes
#[derive(Debug, Clone)]
pub struct FlightState {
    pub roll: f32,
    pub pitch: f32,
    pub throttle: f32,
    pub yaw: f32,
    pub follow_dir_x: f32,
    pub follow_dir_y: f32,
    pub follow_accel_x: f32,
    pub follow_accel_y: f32,
    pub trim_roll: f32,
    pub trim_pitch: f32,
    pub trim_throttle: f32,
    pub trim_yaw: f32,
    /// Advisory speed level 0..=2 (no confirmed wire encoding)
    pub speed_level: u8,
    pub headless: bool,
    pub lights: bool,
    pub indoor_mode: bool,
    /// Throttle ceiling in indoor mode, percent of full stick
    pub hover_throttle_cap: u8,
    pub follow_dir_enabled: bool,
    pub follow_accel_enabled: bool,
    /// Raw bytes 14..17 of the control frame (reserved upstream)
    pub custom_payload: [u8; 4],
}

impl Default for FlightState {
    fn default() -> Self {
        Self {
            roll: 0.0,
            pitch: 0.0,
            throttle: 0.0,
            yaw: 0.0,
            follow_dir_x: 0.0,
            follow_dir_y: 0.0,
            follow_accel_x: 0.0,
            follow_accel_y: 0.0,
            trim_roll: 0.0,
            trim_pitch: 0.0,
            trim_throttle: 0.0,
            trim_yaw: 0.0,
            speed_level: 1,
            headless: false,
            lights: false,
            indoor_mode: false,
            hover_throttle_cap: 30,
            follow_dir_enabled: false,
            follow_accel_enabled: false,
            custom_payload: [0; 4],
        }
    }
}

/// By-value projection handed to the frame encoder
#[derive(Debug, Clone, Default)]
pub struct ControlSnapshot {
    pub roll: f32,
    pub pitch: f32,
    pub throttle: f32,
    pub yaw: f32,
    pub follow_dir_x: f32,
    pub follow_dir_y: f32,
    pub follow_accel_x: f32,
    pub follow_accel_y: f32,
    pub headless: bool,
    pub follow_dir_enabled: bool,
    pub follow_accel_enabled: bool,
    pub custom_payload: [u8; 4],
}

/// One published autopilot override: four axes plus freshness
#[derive(Debug, Clone, Copy)]
pub struct StickOverride {
    pub roll: f32,
    pub pitch: f32,
    pub throttle: f32,
    pub yaw: f32,
    pub published_at: Instant,
}

/// Single-slot publication channel from the autopilot to the encoder.
///
/// One writer (the 40 Hz engine tick), one reader (`snapshot`). The cell is
/// a short-locked mutex; neither side ever holds it across anything but the
/// copy.
pub struct OverrideSlot {
    cell: Mutex<Option<StickOverride>>,
}

impl OverrideSlot {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(None),
        }
    }

    pub fn publish(&self, roll: f32, pitch: f32, throttle: f32, yaw: f32, now: Instant) {
        *self.cell.lock() = Some(StickOverride {
            roll,
            pitch,
            throttle,
            yaw,
            published_at: now,
        });
    }

    pub fn clear(&self) {
        *self.cell.lock() = None;
    }

    /// Read the override if it is fresh; a stale publication means the
    /// autopilot stopped ticking and human input takes back over.
    pub fn read(&self, now: Instant) -> Option<StickOverride> {
        let cell = self.cell.lock();
        cell.filter(|o| now.duration_since(o.published_at) <= OVERRIDE_FRESHNESS)
    }
}

impl Default for OverrideSlot {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_axis(value: f32) -> f32 {
    value.clamp(-AXIS_LIMIT, AXIS_LIMIT)
}

/// Mutex-guarded store with clamping setters
pub struct FlightStateStore {
    inner: Mutex<FlightState>,
}

impl FlightStateStore {
    pub fn new(indoor_mode: bool, hover_throttle_cap: u8) -> Self {
        let mut state = FlightState::default();
        state.indoor_mode = indoor_mode;
        state.hover_throttle_cap = hover_throttle_cap.min(100);
        Self {
            inner: Mutex::new(state),
        }
    }

    pub fn set_stick(&self, axis: StickAxis, value: f32) {
        let value = clamp_axis(value);
        let mut s = self.inner.lock();
        match axis {
            StickAxis::Roll => s.roll = value,
            StickAxis::Pitch => s.pitch = value,
            StickAxis::Throttle => s.throttle = value,
            StickAxis::Yaw => s.yaw = value,
            StickAxis::FollowDirX => s.follow_dir_x = value,
            StickAxis::FollowDirY => s.follow_dir_y = value,
            StickAxis::FollowAccelX => s.follow_accel_x = value,
            StickAxis::FollowAccelY => s.follow_accel_y = value,
        }
    }

    pub fn set_trim(&self, axis: TrimAxis, value: f32) {
        let value = clamp_axis(value);
        let mut s = self.inner.lock();
        match axis {
            TrimAxis::Roll => s.trim_roll = value,
            TrimAxis::Pitch => s.trim_pitch = value,
            TrimAxis::Throttle => s.trim_throttle = value,
            TrimAxis::Yaw => s.trim_yaw = value,
        }
    }

    pub fn set_speed(&self, level: u8) {
        self.inner.lock().speed_level = level.min(2);
    }

    pub fn set_headless(&self, on: bool) {
        self.inner.lock().headless = on;
    }

    /// Returns true when the stored value actually changed (the wire only
    /// carries a toggle, so callers arm the toggle flag on change)
    pub fn set_lights(&self, on: bool) -> bool {
        let mut s = self.inner.lock();
        let changed = s.lights != on;
        s.lights = on;
        changed
    }

    pub fn set_indoor_mode(&self, on: bool, cap_percent: u8) {
        let mut s = self.inner.lock();
        s.indoor_mode = on;
        s.hover_throttle_cap = cap_percent.min(100);
    }

    pub fn set_follow_dir_enabled(&self, on: bool) {
        self.inner.lock().follow_dir_enabled = on;
    }

    pub fn set_follow_accel_enabled(&self, on: bool) {
        self.inner.lock().follow_accel_enabled = on;
    }

    pub fn set_custom_payload(&self, payload: [u8; 4]) {
        self.inner.lock().custom_payload = payload;
    }

    /// Speed level accounting for the indoor-mode override
    pub fn effective_speed_level(&self) -> u8 {
        let s = self.inner.lock();
        if s.indoor_mode { 0 } else { s.speed_level }
    }

    /// Display name for the effective speed level
    pub fn speed_name(&self) -> &'static str {
        match self.effective_speed_level() {
            0 => "LOW",
            1 => "MED",
            _ => "HIGH",
        }
    }

    /// Copy of the raw state (diagnostics, tests)
    pub fn get(&self) -> FlightState {
        self.inner.lock().clone()
    }

    /// Project the current state for encoding
    pub fn snapshot(&self, override_slot: &OverrideSlot, now: Instant) -> ControlSnapshot {
        let s = self.inner.lock().clone();

        let mut snap = ControlSnapshot {
            roll: s.roll,
            pitch: s.pitch,
            throttle: s.throttle,
            yaw: s.yaw,
            follow_dir_x: s.follow_dir_x,
            follow_dir_y: s.follow_dir_y,
            follow_accel_x: s.follow_accel_x,
            follow_accel_y: s.follow_accel_y,
            headless: s.headless,
            follow_dir_enabled: s.follow_dir_enabled,
            follow_accel_enabled: s.follow_accel_enabled,
            custom_payload: s.custom_payload,
        };

        if let Some(ov) = override_slot.read(now) {
            snap.roll = ov.roll;
            snap.pitch = ov.pitch;
            snap.throttle = ov.throttle;
            snap.yaw = ov.yaw;
        }

        let cap = s.hover_throttle_cap as f32;
        if s.indoor_mode {
            snap.throttle = snap.throttle.min(cap);
        }

        snap.roll = clamp_axis(snap.roll + s.trim_roll);
        snap.pitch = clamp_axis(snap.pitch + s.trim_pitch);
        snap.throttle = clamp_axis(snap.throttle + s.trim_throttle);
        snap.yaw = clamp_axis(snap.yaw + s.trim_yaw);

        if s.indoor_mode {
            // Trim must not defeat the ceiling
            snap.throttle = snap.throttle.min(cap);
        }

        snap
    }
}

/// Dead-reckoned heading from commanded yaw.
///
/// The drone has no compass; the vendor app integrates the yaw stick at an
/// assumed 90°/s full-deflection rate. Advisory only.
pub struct HeadingEstimator {
    heading_deg: f64,
    last_update: Instant,
}

/// Assumed yaw rate at full stick deflection
const FULL_YAW_RATE_DEG_S: f64 = 90.0;

impl HeadingEstimator {
    pub fn new(now: Instant) -> Self {
        Self {
            heading_deg: 0.0,
            last_update: now,
        }
    }

    /// Integrate one control tick of commanded yaw
    pub fn update(&mut self, yaw: f32, now: Instant) {
        let dt = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        let rate = (yaw as f64 / 100.0) * FULL_YAW_RATE_DEG_S;
        self.heading_deg = (self.heading_deg + rate * dt).rem_euclid(360.0);
    }

    pub fn heading(&self) -> f64 {
        self.heading_deg
    }

    pub fn reset(&mut self, now: Instant) {
        self.heading_deg = 0.0;
        self.last_update = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_clamp() {
        let store = FlightStateStore::new(false, 30);
        store.set_stick(StickAxis::Roll, 250.0);
        store.set_stick(StickAxis::Pitch, -250.0);
        store.set_trim(TrimAxis::Yaw, 500.0);
        store.set_speed(9);

        let s = store.get();
        assert_eq!(s.roll, 100.0);
        assert_eq!(s.pitch, -100.0);
        assert_eq!(s.trim_yaw, 100.0);
        assert_eq!(s.speed_level, 2);
    }

    #[test]
    fn test_snapshot_applies_trim_then_clamps() {
        let store = FlightStateStore::new(false, 30);
        let slot = OverrideSlot::new();
        store.set_stick(StickAxis::Roll, 90.0);
        store.set_trim(TrimAxis::Roll, 20.0);

        let snap = store.snapshot(&slot, Instant::now());
        assert_eq!(snap.roll, 100.0);
    }

    #[test]
    fn test_indoor_mode_caps_throttle() {
        let store = FlightStateStore::new(true, 30);
        let slot = OverrideSlot::new();
        store.set_stick(StickAxis::Throttle, 100.0);

        let snap = store.snapshot(&slot, Instant::now());
        assert_eq!(snap.throttle, 30.0);
        assert_eq!(store.effective_speed_level(), 0);
        assert_eq!(store.speed_name(), "LOW");

        // The cap survives a positive throttle trim
        store.set_trim(TrimAxis::Throttle, 50.0);
        let snap = store.snapshot(&slot, Instant::now());
        assert_eq!(snap.throttle, 30.0);
    }

    #[test]
    fn test_override_replaces_primary_axes_only() {
        let store = FlightStateStore::new(false, 30);
        let slot = OverrideSlot::new();
        let now = Instant::now();

        store.set_stick(StickAxis::Roll, 10.0);
        store.set_stick(StickAxis::FollowDirX, 25.0);
        slot.publish(50.0, -50.0, 20.0, 0.0, now);

        let snap = store.snapshot(&slot, now);
        assert_eq!(snap.roll, 50.0);
        assert_eq!(snap.pitch, -50.0);
        assert_eq!(snap.throttle, 20.0);
        assert_eq!(snap.follow_dir_x, 25.0); // untouched by override
    }

    #[test]
    fn test_stale_override_ignored() {
        let store = FlightStateStore::new(false, 30);
        let slot = OverrideSlot::new();
        let now = Instant::now();

        store.set_stick(StickAxis::Roll, 10.0);
        slot.publish(50.0, 0.0, 0.0, 0.0, now);

        let later = now + Duration::from_millis(150);
        let snap = store.snapshot(&slot, later);
        assert_eq!(snap.roll, 10.0);
    }

    #[test]
    fn test_lights_reports_change() {
        let store = FlightStateStore::new(false, 30);
        assert!(store.set_lights(true));
        assert!(!store.set_lights(true));
        assert!(store.set_lights(false));
    }

    #[test]
    fn test_heading_integrates_yaw() {
        let t0 = Instant::now();
        let mut est = HeadingEstimator::new(t0);

        // Full right stick for 1 s: 90 degrees
        est.update(100.0, t0 + Duration::from_secs(1));
        assert!((est.heading() - 90.0).abs() < 1e-6);

        // Half left stick for 4 s: -180, wrapping to 270
        est.update(-50.0, t0 + Duration::from_secs(5));
        assert!((est.heading() - 270.0).abs() < 1e-6);
    }
}
