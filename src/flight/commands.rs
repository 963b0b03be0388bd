//! Command flags and the camera/video command sequencer
//!
//! Two command families share the control port:
//!
//! - **Armed flags**: bits carried inside byte 6 of every control frame for
//!   one second after arming, then auto-cleared. The flags word is an
//!   atomic so the 140 ms sender reads it locklessly; arm timestamps live
//!   in a small side table and expiry happens lazily at frame-build time.
//! - **Command triples / singletons**: byte-exact 7-byte packets for the
//!   camera and the video stream, sent immediately through the transport's
//!   send serializer.
//!
//! While the link is anything but Connected, each command category holds at
//! most one pending operation (newest wins); the station drains them on the
//! transition back to Connected.

use crate::error::Result;
use crate::link::transport::UdpLink;
use crate::protocol::codec::command_triple;
use crate::protocol::constants::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// The five armable command bits of control-frame byte 6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBit {
    /// Takeoff and land share this bit; the drone disambiguates
    TakeoffLand,
    EmergencyStop,
    Calibrate,
    Flip360,
    LightToggle,
}

impl CommandBit {
    pub fn mask(self) -> u8 {
        match self {
            CommandBit::TakeoffLand => FLAG_TAKEOFF_LAND,
            CommandBit::EmergencyStop => FLAG_EMERGENCY_STOP,
            CommandBit::Calibrate => FLAG_CALIBRATE,
            CommandBit::Flip360 => FLAG_FLIP_360,
            CommandBit::LightToggle => FLAG_LIGHT_TOGGLE,
        }
    }

    fn slot(self) -> usize {
        match self {
            CommandBit::TakeoffLand => 0,
            CommandBit::EmergencyStop => 1,
            CommandBit::Calibrate => 2,
            CommandBit::Flip360 => 3,
            CommandBit::LightToggle => 4,
        }
    }

    const ALL: [CommandBit; 5] = [
        CommandBit::TakeoffLand,
        CommandBit::EmergencyStop,
        CommandBit::Calibrate,
        CommandBit::Flip360,
        CommandBit::LightToggle,
    ];
}

/// Edge-armed flag word with per-bit expiry timestamps.
///
/// Rearming an already-armed bit restarts its window. Multiple bits may be
/// armed at once. Expired bits are cleared atomically the next time the
/// word is read for a frame.
pub struct CommandFlags {
    bits: AtomicU8,
    armed_at: Mutex<[Option<Instant>; 5]>,
    window: Duration,
}

impl CommandFlags {
    pub fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
            armed_at: Mutex::new([None; 5]),
            window: Duration::from_millis(FLAG_ARM_WINDOW_MS),
        }
    }

    pub fn arm(&self, bit: CommandBit, now: Instant) {
        self.armed_at.lock()[bit.slot()] = Some(now);
        self.bits.fetch_or(bit.mask(), Ordering::Relaxed);
        log::debug!("command flag armed: {:?}", bit);
    }

    /// Current flags byte for an outgoing frame, expiring stale bits first
    pub fn current(&self, now: Instant) -> u8 {
        let mut armed = self.armed_at.lock();
        for bit in CommandBit::ALL {
            if let Some(at) = armed[bit.slot()]
                && now.duration_since(at) >= self.window
            {
                armed[bit.slot()] = None;
                self.bits.fetch_and(!bit.mask(), Ordering::Relaxed);
                log::debug!("command flag expired: {:?}", bit);
            }
        }
        self.bits.load(Ordering::Relaxed)
    }

    /// Raw word without expiry (diagnostics)
    pub fn raw(&self) -> u8 {
        self.bits.load(Ordering::Relaxed)
    }
}

impl Default for CommandFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Camera commands sent as triples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraCommand {
    Rotate(bool),
    Switch,
}

/// Video stream commands sent as fixed singletons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCommand {
    Start,
    Stop,
}

/// One queued operation per category while the link is down
#[derive(Default)]
struct PendingOps {
    flag: Option<CommandBit>,
    camera: Option<CameraCommand>,
    video: Option<VideoCommand>,
}

/// Sequences commands onto the control port
pub struct CommandSequencer {
    flags: Arc<CommandFlags>,
    link: Arc<UdpLink>,
    pending: Mutex<PendingOps>,
}

impl CommandSequencer {
    pub fn new(flags: Arc<CommandFlags>, link: Arc<UdpLink>) -> Self {
        Self {
            flags,
            link,
            pending: Mutex::new(PendingOps::default()),
        }
    }

    /// Arm a command flag, or queue it while the link is down
    pub fn arm(&self, bit: CommandBit, connected: bool) {
        if connected {
            self.flags.arm(bit, Instant::now());
        } else {
            log::info!("link down, queueing command flag {:?}", bit);
            self.pending.lock().flag = Some(bit);
        }
    }

    /// Send a camera command triple, or queue it while the link is down
    pub fn send_camera(&self, cmd: CameraCommand, connected: bool) -> Result<()> {
        if !connected {
            log::info!("link down, queueing camera command {:?}", cmd);
            self.pending.lock().camera = Some(cmd);
            return Ok(());
        }
        let triple = match cmd {
            CameraCommand::Rotate(on) => {
                command_triple(CMD_CAMERA_ROTATE, if on { 0x01 } else { 0x00 })
            }
            CameraCommand::Switch => command_triple(CMD_CAMERA_SWITCH, 0x00),
        };
        self.link.send_triple(&triple)?;
        log::debug!("camera command sent: {:?}", cmd);
        Ok(())
    }

    /// Send a video start/stop singleton, or queue it while the link is down
    pub fn send_video(&self, cmd: VideoCommand, connected: bool) -> Result<()> {
        if !connected {
            log::info!("link down, queueing video command {:?}", cmd);
            self.pending.lock().video = Some(cmd);
            return Ok(());
        }
        let bytes = match cmd {
            VideoCommand::Start => &CMD_VIDEO_START,
            VideoCommand::Stop => &CMD_VIDEO_STOP,
        };
        self.link.send_ctl_raw(bytes)?;
        log::debug!("video command sent: {:?}", cmd);
        Ok(())
    }

    /// Replay queued operations after the link comes back
    pub fn drain_pending(&self) {
        let queued = {
            let mut pending = self.pending.lock();
            PendingOps {
                flag: pending.flag.take(),
                camera: pending.camera.take(),
                video: pending.video.take(),
            }
        };

        if let Some(bit) = queued.flag {
            log::info!("replaying queued command flag {:?}", bit);
            self.flags.arm(bit, Instant::now());
        }
        if let Some(cmd) = queued.camera
            && let Err(e) = self.send_camera(cmd, true)
        {
            log::warn!("queued camera command failed: {}", e);
        }
        if let Some(cmd) = queued.video
            && let Err(e) = self.send_video(cmd, true)
        {
            log::warn!("queued video command failed: {}", e);
        }
    }

    /// Remote command echo seen on the control port (the drone mirrors
    /// accepted commands back)
    pub fn on_echo(&self, echo: &[u8; CMD_PACKET_LEN]) {
        log::debug!(
            "command echo: seq={} cmd=0x{:02X} param=0x{:02X}",
            echo[2],
            echo[3],
            echo[5]
        );
    }
}
