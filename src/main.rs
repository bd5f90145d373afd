use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, Duration, Instant};

use zone_tracker_rs::dashboard::{self, Command, DashboardState};
use zone_tracker_rs::health::HealthBoard;
use zone_tracker_rs::live_status::{self, LiveStatus};
use zone_tracker_rs::registry::Zone;
use zone_tracker_rs::sources;
use zone_tracker_rs::tracker::{TrackerConfig, TrackerEvent, ZoneTracker};
use zone_tracker_rs::types::{Prediction, SensingMode, SensorEvent, WifiReading};

#[derive(Parser, Debug)]
#[command(name = "zone_tracker")]
#[command(about = "Fingerprint zone tracker - record zones, then match live samples", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Comma-separated zone labels
    #[arg(long, default_value = "Zone A,Zone B,Zone C")]
    zones: String,

    /// Sensor source (auto, modern, legacy, simulated)
    #[arg(long, default_value = "auto")]
    source: String,

    /// Initial manual signal strength in dBm
    #[arg(long, default_value = "-65.0", allow_hyphen_values = true)]
    wifi: f64,

    /// Start recording this zone id immediately
    #[arg(long)]
    record: Option<usize>,

    /// Dashboard port
    #[arg(long, default_value = "8088")]
    port: u16,

    /// Output directory
    #[arg(long, default_value = "zone_tracker_sessions")]
    output_dir: String,
}

#[derive(Serialize, Deserialize, Clone)]
struct TimelineEntry {
    timestamp: f64,
    prediction: Option<Prediction>,
}

#[derive(Serialize, Deserialize)]
struct SessionOutput {
    started_at: String,
    source: String,
    mode: SensingMode,
    zone_labels: Vec<String>,
    readings: Vec<SensorEvent>,
    timeline: Vec<TimelineEntry>,
    zones: Vec<Zone>,
    stats: Stats,
}

#[derive(Serialize, Deserialize)]
struct Stats {
    total_readings: usize,
    prediction_changes: usize,
    recordings_finished: u64,
    recordings_discarded: u64,
    trained_zones: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let zone_labels: Vec<String> = args
        .zones
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    anyhow::ensure!(!zone_labels.is_empty(), "at least one zone label required");

    println!("[{}] Zone Tracker Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Zones: {}", zone_labels.join(", "));
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    // Probe once at startup; the chosen source holds for the whole run
    let source = sources::probe(&args.source);
    let mode = source.mode();
    println!("[{}] Sensor source: {} ({:?} mode)", ts_now(), source.as_str(), mode);

    let initial_wifi = args.wifi.clamp(-90.0, -30.0);
    let mut tracker = ZoneTracker::new(TrackerConfig {
        zone_labels: zone_labels.clone(),
        mode,
        initial_wifi,
        ..TrackerConfig::default()
    });
    let record_tick_ms = tracker.config().record_tick_ms;

    let mut health = HealthBoard::new();

    // Channels: readings in, dashboard commands in
    let (sensor_tx, mut sensor_rx) = mpsc::channel::<SensorEvent>(500);
    let (command_tx, mut command_rx) = mpsc::channel::<Command>(32);

    // Shared snapshot for the dashboard
    let snapshot = Arc::new(RwLock::new(tracker.snapshot()));

    // Spawn source tasks (hold handles to keep tasks alive)
    let _mag_handle = tokio::spawn(sources::mag_loop(source, sensor_tx.clone()));
    let _accel_handle = tokio::spawn(sources::accel_loop(source, sensor_tx.clone()));
    let _gyro_handle = tokio::spawn(sources::gyro_loop(source, sensor_tx.clone()));
    let _wifi_handle = tokio::spawn(sources::wifi_loop(source, sensor_tx.clone()));
    drop(sensor_tx);

    let _dashboard_handle = tokio::spawn(dashboard::start_dashboard(
        DashboardState {
            snapshot: snapshot.clone(),
            commands: command_tx.clone(),
        },
        args.port,
    ));
    drop(command_tx);

    // Session log
    let mut readings_log: Vec<SensorEvent> = Vec::new();
    let mut timeline: Vec<TimelineEntry> = Vec::new();
    let mut recordings_finished = 0u64;
    let mut recordings_discarded = 0u64;

    let start = Utc::now();
    let started_at = start.to_rfc3339();
    let mut last_save = Utc::now();
    let mut last_status_update = Utc::now();
    let mut last_snapshot_push = Instant::now();
    let mut next_record_tick = Instant::now();

    if let Some(zone_id) = args.record {
        let events = tracker.start_recording(zone_id);
        handle_events(
            &events,
            &tracker,
            &mut timeline,
            &mut recordings_finished,
            &mut recordings_discarded,
        );
    }

    println!("[{}] Tracking...", ts_now());

    loop {
        if args.duration > 0 {
            let elapsed = Utc::now().signed_duration_since(start);
            if elapsed.num_seconds() as u64 >= args.duration {
                println!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
        }

        // Drain readings
        while let Ok(event) = sensor_rx.try_recv() {
            let tracker_events = match &event {
                SensorEvent::Mag(r) => {
                    health.mag.mark_update();
                    tracker.feed_mag(r.value)
                }
                SensorEvent::Accel(r) => {
                    health.accel.mark_update();
                    tracker.feed_accel(r.value)
                }
                SensorEvent::Gyro(r) => {
                    health.gyro.mark_update();
                    tracker.feed_gyro(r.value)
                }
                SensorEvent::Wifi(r) => {
                    health.wifi.mark_update();
                    tracker.feed_wifi(r.value)
                }
                SensorEvent::Status(status) => {
                    eprintln!(
                        "[{}] Channel {} unavailable: {}",
                        ts_now(),
                        status.channel.as_str(),
                        status.error.as_deref().unwrap_or("unknown")
                    );
                    health.apply_status(status);
                    Vec::new()
                }
            };
            if !matches!(event, SensorEvent::Status(_)) {
                readings_log.push(event);
            }
            handle_events(
                &tracker_events,
                &tracker,
                &mut timeline,
                &mut recordings_finished,
                &mut recordings_discarded,
            );
        }

        // Drain dashboard commands
        while let Ok(command) = command_rx.try_recv() {
            let tracker_events = match command {
                Command::StartRecording(zone_id) => tracker.start_recording(zone_id),
                Command::ClearZone(zone_id) => tracker.clear_zone(zone_id),
                Command::SetWifi(dbm) => {
                    let reading = WifiReading {
                        timestamp: live_status::current_timestamp(),
                        value: dbm,
                    };
                    readings_log.push(SensorEvent::Wifi(reading));
                    health.wifi.mark_update();
                    tracker.feed_wifi(dbm)
                }
            };
            handle_events(
                &tracker_events,
                &tracker,
                &mut timeline,
                &mut recordings_finished,
                &mut recordings_discarded,
            );
        }

        // Recording tick cadence, armed only while a window is open
        if tracker.is_recording() {
            if Instant::now() >= next_record_tick {
                let tracker_events = tracker.tick();
                next_record_tick = Instant::now() + Duration::from_millis(record_tick_ms);
                handle_events(
                    &tracker_events,
                    &tracker,
                    &mut timeline,
                    &mut recordings_finished,
                    &mut recordings_discarded,
                );
            }
        } else {
            next_record_tick = Instant::now();
        }

        // Refresh the dashboard snapshot at 5Hz
        if last_snapshot_push.elapsed() >= Duration::from_millis(200) {
            *snapshot.write().await = tracker.snapshot();
            last_snapshot_push = Instant::now();
        }

        // Update live status every 2 seconds
        let now = Utc::now();
        if (now.signed_duration_since(last_status_update).num_seconds() as u64) >= 2 {
            let status = build_live_status(
                &tracker,
                &health,
                source.as_str(),
                now.signed_duration_since(start).num_seconds().max(0) as u64,
                recordings_finished,
                recordings_discarded,
            );
            let status_path = format!("{}/live_status.json", args.output_dir);
            let _ = status.save(&status_path);
            last_status_update = now;
        }

        // Auto-save every 15 seconds
        if (now.signed_duration_since(last_save).num_seconds() as u64) >= 15 {
            let output = build_session_output(
                &tracker,
                &started_at,
                source.as_str(),
                mode,
                &zone_labels,
                &readings_log,
                &timeline,
                recordings_finished,
                recordings_discarded,
            );
            let filename = format!("{}/zone_session_{}.json", args.output_dir, ts_now_clean());
            let json = serde_json::to_string_pretty(&output)?;
            std::fs::write(&filename, json)?;
            println!(
                "[{}] Auto-saved {} readings, {} trained zones to {}",
                ts_now(),
                readings_log.len(),
                tracker.registry().trained_count(),
                filename
            );
            println!("[{}] {}", ts_now(), health.format_line());
            last_save = now;
        }

        sleep(Duration::from_millis(1)).await;
    }

    // A window still open at shutdown is force-finished so a partial
    // capture is not silently lost
    if tracker.is_recording() {
        let events = tracker.finish_recording();
        handle_events(
            &events,
            &tracker,
            &mut timeline,
            &mut recordings_finished,
            &mut recordings_discarded,
        );
    }

    // Final save
    let output = build_session_output(
        &tracker,
        &started_at,
        source.as_str(),
        mode,
        &zone_labels,
        &readings_log,
        &timeline,
        recordings_finished,
        recordings_discarded,
    );
    let filename = format!("{}/zone_session_{}_final.json", args.output_dir, ts_now_clean());
    let json = serde_json::to_string_pretty(&output)?;
    std::fs::write(&filename, json)?;
    println!(
        "[{}] Final save: {} readings, {} timeline entries to {}",
        ts_now(),
        readings_log.len(),
        timeline.len(),
        filename
    );

    let uptime = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
    let final_status = build_live_status(
        &tracker,
        &health,
        source.as_str(),
        uptime,
        recordings_finished,
        recordings_discarded,
    );
    let status_path = format!("{}/live_status_final.json", args.output_dir);
    let _ = final_status.save(&status_path);

    // Print stats
    let snap = tracker.snapshot();
    println!("\n=== Final Stats ===");
    println!("Total readings: {}", readings_log.len());
    println!("Trained zones: {}/{}", snap.trained_zones, snap.zones.len());
    println!("Prediction changes: {}", timeline.len());
    match snap.prediction {
        Some(p) => println!("Last match: {} (confidence {:.0})", p.zone_name, p.confidence),
        None => println!("Last match: none"),
    }

    Ok(())
}

fn handle_events(
    events: &[TrackerEvent],
    tracker: &ZoneTracker,
    timeline: &mut Vec<TimelineEntry>,
    recordings_finished: &mut u64,
    recordings_discarded: &mut u64,
) {
    for event in events {
        match event {
            TrackerEvent::RecordingStarted { zone_id, total_ticks } => {
                println!(
                    "[{}] Recording zone {} ({} ticks)",
                    ts_now(),
                    zone_id,
                    total_ticks
                );
            }
            TrackerEvent::RecordingRejected { requested, active } => {
                println!(
                    "[{}] Recording zone {} refused, zone {} still in progress",
                    ts_now(),
                    requested,
                    active
                );
            }
            TrackerEvent::RecordingFinished { zone_id, samples, fingerprint } => {
                *recordings_finished += 1;
                println!(
                    "[{}] Zone {} trained from {} samples (mag {:.1}, wifi {:.1})",
                    ts_now(),
                    zone_id,
                    samples,
                    fingerprint.mag,
                    fingerprint.wifi
                );
            }
            TrackerEvent::RecordingDiscarded { zone_id } => {
                *recordings_discarded += 1;
                println!(
                    "[{}] Recording for zone {} discarded (no samples captured)",
                    ts_now(),
                    zone_id
                );
            }
            TrackerEvent::ZoneCleared { zone_id } => {
                println!("[{}] Zone {} cleared", ts_now(), zone_id);
            }
            TrackerEvent::PredictionChanged { .. } => {
                timeline.push(TimelineEntry {
                    timestamp: live_status::current_timestamp(),
                    prediction: tracker.prediction().cloned(),
                });
                match tracker.prediction() {
                    Some(p) => println!(
                        "[{}] Entered {} (confidence {:.0}, score {:.1})",
                        ts_now(),
                        p.zone_name,
                        p.confidence,
                        p.score
                    ),
                    None => println!("[{}] No zone match", ts_now()),
                }
            }
        }
    }
}

fn build_live_status(
    tracker: &ZoneTracker,
    health: &HealthBoard,
    source: &str,
    uptime: u64,
    recordings_finished: u64,
    recordings_discarded: u64,
) -> LiveStatus {
    let snap = tracker.snapshot();
    let mut status = LiveStatus::new();
    status.timestamp = live_status::current_timestamp();
    status.uptime_seconds = uptime;
    status.source = source.to_string();
    status.mode = snap.mode;
    status.mag_updates = snap.mag_updates;
    status.accel_updates = snap.accel_updates;
    status.gyro_updates = snap.gyro_updates;
    status.wifi_updates = snap.wifi_updates;
    status.sample = snap.sample;
    status.motion = snap.motion;
    status.prediction = snap.prediction;
    status.recording_zone = snap.recording.as_ref().map(|r| r.zone_id);
    status.recording_progress = snap.recording.as_ref().map(|r| r.progress).unwrap_or(0.0);
    status.trained_zones = snap.trained_zones;
    status.total_zones = snap.zones.len();
    status.recordings_finished = recordings_finished;
    status.recordings_discarded = recordings_discarded;
    status.mag_active = health.mag.is_healthy();
    status.accel_active = health.accel.is_healthy();
    status.gyro_active = health.gyro.is_healthy();
    status.wifi_active = health.wifi.is_healthy();
    status.mag_silence_secs = health.mag.silence_secs();
    status.accel_silence_secs = health.accel.silence_secs();
    status.gyro_silence_secs = health.gyro.silence_secs();
    status.last_sensor_error = health.last_error();
    status
}

fn build_session_output(
    tracker: &ZoneTracker,
    started_at: &str,
    source: &str,
    mode: SensingMode,
    zone_labels: &[String],
    readings: &[SensorEvent],
    timeline: &[TimelineEntry],
    recordings_finished: u64,
    recordings_discarded: u64,
) -> SessionOutput {
    SessionOutput {
        started_at: started_at.to_string(),
        source: source.to_string(),
        mode,
        zone_labels: zone_labels.to_vec(),
        readings: readings.to_vec(),
        timeline: timeline.to_vec(),
        zones: tracker.registry().zones().to_vec(),
        stats: Stats {
            total_readings: readings.len(),
            prediction_changes: timeline.len(),
            recordings_finished,
            recordings_discarded,
            trained_zones: tracker.registry().trained_count(),
        },
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
