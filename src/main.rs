//! x80-station - headless ground-station daemon
//!
//! Connects to the drone, requests the video stream, and logs telemetry,
//! frame sizes and link transitions until Ctrl-C. Real frontends link the
//! library instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use x80_station::error::Result;
use x80_station::{Station, StationConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("x80-station v0.3.0 starting...");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("using config: {}", path);
            StationConfig::load(&path)?
        }
        None => {
            log::info!("no config given, using defaults");
            StationConfig::default()
        }
    };

    let mut station = Station::new(config);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| x80_station::Error::Other(format!("error setting Ctrl-C handler: {}", e)))?;

    station.connect()?;

    let telemetry = station.subscribe_telemetry();
    let video = station.subscribe_video();
    let status = station.subscribe_status();

    log::info!("x80-station running. Press Ctrl-C to stop.");

    let mut last_stats = Instant::now();
    while running.load(Ordering::Relaxed) {
        for record in telemetry.try_iter() {
            log::debug!(
                "telemetry: battery {}%, record {:?}",
                record.battery_percent(),
                record
            );
        }
        for frame in video.try_iter() {
            log::debug!("video frame: {} bytes", frame.len());
        }
        for event in status.try_iter() {
            log::info!("status: {:?}", event);
        }

        if last_stats.elapsed() >= Duration::from_secs(10) {
            let (tx, rx, video_rx) = station.packet_counts();
            log::info!(
                "link {}: tx={} rx={} video={} heading={:.0}° speed={}",
                station.link_state(),
                tx,
                rx,
                video_rx,
                station.heading(),
                station.speed_name()
            );
            last_stats = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    station.shutdown()?;
    log::info!("x80-station stopped");
    Ok(())
}
