//! Time-based pattern autopilot
//!
//! A dedicated 40 Hz task walks the active pattern's steps against the
//! monotonic clock and publishes the current step's four axes into the
//! override slot every tick. The encoder treats a slot older than 100 ms
//! as "no override", so a stalled or stopped engine hands control back to
//! the human within one control frame.
//!
//! `stop()` clears the slot immediately; the next snapshot is back on
//! human input without waiting for a tick.

pub mod patterns;

pub use patterns::{FlightPattern, FlightStep};

use crate::error::{Error, Result};
use crate::flight::state::OverrideSlot;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Engine tick period (40 Hz)
const TICK: Duration = Duration::from_millis(25);

/// Autopilot status snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum AutopilotStatus {
    Idle,
    Running {
        pattern: &'static str,
        /// Overall pattern progress in [0, 1]
        progress: f32,
    },
}

struct Execution {
    pattern: FlightPattern,
    step_index: usize,
    step_started_at: Instant,
    /// Total of fully completed steps, for progress reporting
    elapsed_ms: u64,
}

/// Executes flight patterns on its own timed task
pub struct AutopilotEngine {
    slot: Arc<OverrideSlot>,
    current: Arc<Mutex<Option<Execution>>>,
    handle: Option<JoinHandle<()>>,
}

impl AutopilotEngine {
    pub fn new(slot: Arc<OverrideSlot>) -> Self {
        Self {
            slot,
            current: Arc::new(Mutex::new(None)),
            handle: None,
        }
    }

    /// Begin executing a pattern, replacing any active one
    pub fn start(&self, pattern: FlightPattern) {
        log::info!(
            "autopilot: starting pattern '{}' ({} steps, {:.1}s)",
            pattern.name,
            pattern.steps.len(),
            pattern.total_ms() as f32 / 1000.0
        );
        *self.current.lock() = Some(Execution {
            pattern,
            step_index: 0,
            step_started_at: Instant::now(),
            elapsed_ms: 0,
        });
    }

    /// Begin executing a built-in pattern by name
    pub fn start_by_name(&self, name: &str) -> Result<()> {
        let pattern =
            patterns::by_name(name).ok_or_else(|| Error::UnknownPattern(name.to_string()))?;
        self.start(pattern);
        Ok(())
    }

    /// Stop the active pattern and release the override immediately
    pub fn stop(&self) {
        let was_running = self.current.lock().take().is_some();
        self.slot.clear();
        if was_running {
            log::info!("autopilot: stopped");
        }
    }

    pub fn status(&self) -> AutopilotStatus {
        match &*self.current.lock() {
            None => AutopilotStatus::Idle,
            Some(exec) => {
                let total = exec.pattern.total_ms().max(1);
                let in_step = exec.step_started_at.elapsed().as_millis() as u64;
                let progress = (exec.elapsed_ms + in_step) as f32 / total as f32;
                AutopilotStatus::Running {
                    pattern: exec.pattern.name,
                    progress: progress.min(1.0),
                }
            }
        }
    }

    /// Spawn the 40 Hz engine task
    pub fn spawn(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let slot = Arc::clone(&self.slot);
        let current = Arc::clone(&self.current);

        let handle = thread::Builder::new()
            .name("autopilot".to_string())
            .spawn(move || {
                log::debug!("autopilot task started ({:?} tick)", TICK);
                while !shutdown.load(Ordering::Relaxed) {
                    let now = Instant::now();
                    Self::tick(&current, &slot, now);
                    thread::sleep(TICK);
                }
                log::debug!("autopilot task exiting");
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    /// One engine tick: advance past finished steps, publish the override
    fn tick(current: &Mutex<Option<Execution>>, slot: &OverrideSlot, now: Instant) {
        let mut guard = current.lock();
        let Some(exec) = guard.as_mut() else {
            return;
        };

        // Advance while the current step's time is up; a late tick may
        // cross more than one short step
        loop {
            let step = exec.pattern.steps[exec.step_index];
            let dur = Duration::from_millis(step.duration_ms);
            if now.duration_since(exec.step_started_at) < dur {
                break;
            }
            exec.elapsed_ms += step.duration_ms;
            exec.step_started_at += dur;
            exec.step_index += 1;
            if exec.step_index >= exec.pattern.steps.len() {
                log::info!("autopilot: pattern '{}' complete", exec.pattern.name);
                *guard = None;
                drop(guard);
                slot.clear();
                return;
            }
            log::debug!(
                "autopilot: step {}/{}",
                exec.step_index + 1,
                exec.pattern.steps.len()
            );
        }

        let step = exec.pattern.steps[exec.step_index];
        drop(guard);
        slot.publish(step.roll, step.pitch, step.throttle, step.yaw, now);
    }

    /// Handle for the engine task, taken at shutdown for joining
    pub fn take_handle(&mut self) -> Option<JoinHandle<()>> {
        self.handle.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step_pattern() -> FlightPattern {
        FlightPattern {
            name: "circle",
            steps: vec![
                FlightStep {
                    roll: 0.0,
                    pitch: 50.0,
                    throttle: 0.0,
                    yaw: 25.0,
                    duration_ms: 100,
                },
                FlightStep {
                    roll: -50.0,
                    pitch: 0.0,
                    throttle: 10.0,
                    yaw: 0.0,
                    duration_ms: 100,
                },
            ],
        }
    }

    #[test]
    fn test_tick_publishes_current_step() {
        let slot = Arc::new(OverrideSlot::new());
        let engine = AutopilotEngine::new(Arc::clone(&slot));
        engine.start(two_step_pattern());

        let now = Instant::now();
        AutopilotEngine::tick(&engine.current, &slot, now);

        let ov = slot.read(now).expect("override not published");
        assert_eq!(ov.pitch, 50.0);
        assert_eq!(ov.yaw, 25.0);
    }

    #[test]
    fn test_steps_advance_on_schedule() {
        let slot = Arc::new(OverrideSlot::new());
        let engine = AutopilotEngine::new(Arc::clone(&slot));
        engine.start(two_step_pattern());

        let start = engine.current.lock().as_ref().unwrap().step_started_at;
        let later = start + Duration::from_millis(150);
        AutopilotEngine::tick(&engine.current, &slot, later);

        let ov = slot.read(later).expect("override not published");
        assert_eq!(ov.roll, -50.0);
        assert_eq!(ov.throttle, 10.0);
    }

    #[test]
    fn test_pattern_completes_and_clears_override() {
        let slot = Arc::new(OverrideSlot::new());
        let engine = AutopilotEngine::new(Arc::clone(&slot));
        engine.start(two_step_pattern());

        let start = engine.current.lock().as_ref().unwrap().step_started_at;
        let past_end = start + Duration::from_millis(250);
        AutopilotEngine::tick(&engine.current, &slot, past_end);

        assert_eq!(engine.status(), AutopilotStatus::Idle);
        assert!(slot.read(past_end).is_none());
    }

    #[test]
    fn test_stop_clears_override() {
        let slot = Arc::new(OverrideSlot::new());
        let engine = AutopilotEngine::new(Arc::clone(&slot));
        engine.start(two_step_pattern());

        let now = Instant::now();
        AutopilotEngine::tick(&engine.current, &slot, now);
        assert!(slot.read(now).is_some());

        engine.stop();
        assert!(slot.read(now).is_none());
        assert_eq!(engine.status(), AutopilotStatus::Idle);
    }

    #[test]
    fn test_status_reports_progress() {
        let slot = Arc::new(OverrideSlot::new());
        let engine = AutopilotEngine::new(Arc::clone(&slot));
        assert_eq!(engine.status(), AutopilotStatus::Idle);

        engine.start(two_step_pattern());
        match engine.status() {
            AutopilotStatus::Running { pattern, progress } => {
                assert_eq!(pattern, "circle");
                assert!((0.0..=1.0).contains(&progress));
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_pattern_rejected() {
        let engine = AutopilotEngine::new(Arc::new(OverrideSlot::new()));
        assert!(engine.start_by_name("barrel-roll").is_err());
        assert!(engine.start_by_name("Circle").is_ok());
    }
}
