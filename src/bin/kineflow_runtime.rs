//! Kineflow Runtime - capture and analysis in one process
//!
//! - Reads joystick frames (JSON or `A0=..,A1=..` serial lines) from stdin
//! - Folds them into movement segments and persists segments and button actions
//! - Runs the incremental analyzer over the stored segments
//! - Periodically logs the recent speed distribution
//!
//! Usage:
//!   ble_bridge | cargo run --release --bin kineflow_runtime
//!
//! Environment variables: see `PipelineConfig::from_env`.

use chrono::Utc;
use dotenv::dotenv;
use kineflow::analysis_core::{run_speed_monitor, AnalyzerSettings, IncrementalAnalyzer};
use kineflow::capture_core::{
    run_capture_writer, run_idle_checker, CaptureHandle, FrameDecoder, JoystickFrame, LineFramer,
    RawEvent,
};
use kineflow::store::{BufferedWriter, SqliteStore, WriterSettings};
use kineflow::PipelineConfig;
use log::{error, info, warn};
use std::io::Read;
use tokio::sync::{mpsc, watch};

/// Blocking stdin reader on its own thread
///
/// The thread only owns the event sender, so it never keeps the capture writer alive
/// and is simply abandoned at process exit if stdin stays open.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<RawEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut framer = LineFramer::new();
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 1024];
        let (mut frames, mut rejected) = (0u64, 0u64);

        loop {
            let n = match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("❌ Failed to read stdin: {}", e);
                    break;
                }
            };

            let now = Utc::now();
            for line in framer.push(&buf[..n]) {
                match JoystickFrame::parse_line(&line) {
                    Ok(frame) => {
                        frames += 1;
                        for event in decoder.decode(&frame, now) {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        rejected += 1;
                        warn!("⚠️  Discarding frame: {}", e);
                    }
                }
            }
        }

        info!("📭 Input closed ({} frames, {} rejected)", frames, rejected);
    });

    rx
}

async fn forward_events(
    capture: CaptureHandle,
    mut events: mpsc::UnboundedReceiver<RawEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => capture.handle_event(event),
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Kineflow Runtime");

    let config = PipelineConfig::from_env();
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Inactivity threshold: {}ms", config.inactivity_threshold_ms);
    info!("   ├─ Idle check: {}ms", config.idle_check_interval_ms);
    info!(
        "   ├─ Batch size: {} (cap {}, {:?}, flush every {}ms)",
        config.batch_size, config.max_pending_records, config.overflow_policy, config.flush_interval_ms
    );
    info!(
        "   ├─ Analyzer poll: {}ms (backoff {}ms)",
        config.poll_interval_ms, config.backoff_interval_ms
    );
    info!("   └─ Min dt floor: {}s", config.min_dt_floor_secs);

    // One connection per task; WAL lets the analyzer read while capture writes
    info!("🔧 Opening database...");
    let capture_store = SqliteStore::open(&config.db_path)?;
    let analysis_store = SqliteStore::open(&config.db_path)?;
    let source_store = SqliteStore::open(&config.db_path)?;
    info!("✅ Database ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (capture, capture_rx) = CaptureHandle::new(config.inactivity_threshold());

    let writer_task = tokio::spawn(run_capture_writer(
        capture_rx,
        BufferedWriter::new(capture_store, WriterSettings::from(&config)),
    ));
    let idle_task = tokio::spawn(run_idle_checker(
        capture.clone(),
        config.idle_check_interval(),
        shutdown_rx.clone(),
    ));
    let source_task = tokio::spawn(forward_events(
        capture.clone(),
        spawn_stdin_reader(),
        shutdown_rx.clone(),
    ));
    info!("   ├─ ✅ Capture tasks spawned");

    let mut analyzer = IncrementalAnalyzer::new(
        source_store,
        BufferedWriter::new(analysis_store, WriterSettings::from(&config)),
        AnalyzerSettings::from(&config),
    );
    if config.resume_from_store {
        if let Err(e) = analyzer.resume_from_store() {
            warn!("⚠️  Could not resume analyzer watermark, starting fresh: {}", e);
        }
    }
    let analyzer_shutdown = shutdown_rx.clone();
    let analyzer_task = tokio::spawn(async move { analyzer.run(analyzer_shutdown).await });
    info!("   ├─ ✅ Analyzer spawned");

    let monitor_task = match config.speed_report_interval() {
        Some(interval) => Some(tokio::spawn(run_speed_monitor(
            SqliteStore::open(&config.db_path)?,
            config.speed_window,
            interval,
            shutdown_rx.clone(),
        ))),
        None => None,
    };
    info!("   └─ ✅ Speed monitor {}", if monitor_task.is_some() { "spawned" } else { "disabled" });

    info!("🔄 Press CTRL+C to shutdown gracefully");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    let _ = shutdown_tx.send(true);

    // Stop input, close the open segment, then let the writer drain and flush
    if let Err(e) = source_task.await {
        error!("❌ Input task failed: {}", e);
    }
    if let Err(e) = idle_task.await {
        error!("❌ Idle checker failed: {}", e);
    }
    drop(capture);
    if let Err(e) = writer_task.await {
        error!("❌ Capture writer failed: {}", e);
    }
    if let Err(e) = analyzer_task.await {
        error!("❌ Analyzer failed: {}", e);
    }
    if let Some(task) = monitor_task {
        if let Err(e) = task.await {
            error!("❌ Speed monitor failed: {}", e);
        }
    }

    info!("✅ Kineflow runtime stopped");
    Ok(())
}
