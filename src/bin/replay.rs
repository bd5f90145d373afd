use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

use zone_tracker_rs::registry::Zone;
use zone_tracker_rs::tracker::{TrackerConfig, TrackerEvent, ZoneTracker};
use zone_tracker_rs::types::{Prediction, SensingMode, SensorEvent};

/// Re-run a recorded session through the matcher. Fingerprints are
/// seeded from the log, then every reading is fed back in order, which
/// makes this the place to A/B match parameters against real walks.
#[derive(Parser, Debug)]
struct Args {
    /// Path to zone_session_*.json[.gz] log
    #[arg(long, conflicts_with = "golden_dir")]
    log: Option<PathBuf>,

    /// Directory of session logs to batch replay (processes zone_session_*.json[.gz])
    #[arg(long)]
    golden_dir: Option<PathBuf>,

    /// Override the per-mode match tolerance
    #[arg(long)]
    tolerance: Option<f64>,

    /// Override the per-mode confidence scale
    #[arg(long)]
    confidence_scale: Option<f64>,

    /// Override the motion gate threshold
    #[arg(long)]
    motion_threshold: Option<f64>,
}

#[derive(Deserialize)]
struct TimelineEntry {
    timestamp: f64,
    prediction: Option<Prediction>,
}

#[derive(Deserialize)]
struct LogFile {
    mode: SensingMode,
    zone_labels: Vec<String>,
    readings: Vec<SensorEvent>,
    timeline: Vec<TimelineEntry>,
    zones: Vec<Zone>,
}

fn load_log(path: &Path) -> anyhow::Result<LogFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Zone the logged timeline claims at time `t`. The timeline is a step
/// function; before its first entry the tracker had no match.
fn logged_zone_at(timeline: &[TimelineEntry], t: f64, cursor: &mut usize) -> Option<usize> {
    while *cursor < timeline.len() && timeline[*cursor].timestamp <= t {
        *cursor += 1;
    }
    if *cursor == 0 {
        None
    } else {
        timeline[*cursor - 1]
            .prediction
            .as_ref()
            .map(|p| p.zone_id)
    }
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<serde_json::Value> {
    let log = load_log(path)?;

    let mut config = TrackerConfig {
        zone_labels: log.zone_labels.clone(),
        mode: log.mode,
        tolerance_override: args.tolerance,
        confidence_scale_override: args.confidence_scale,
        ..TrackerConfig::default()
    };
    if let Some(threshold) = args.motion_threshold {
        config.motion_threshold = threshold;
    }

    let mut tracker = ZoneTracker::new(config);
    for zone in &log.zones {
        if let Some(fingerprint) = zone.fingerprint {
            tracker.seed_fingerprint(zone.id, fingerprint);
        }
    }

    let mut cursor = 0usize;
    let mut prediction_changes = 0u64;
    let mut matched = 0u64;
    let mut compared = 0u64;

    for event in &log.readings {
        let tracker_events = match event {
            SensorEvent::Mag(r) => tracker.feed_mag(r.value),
            SensorEvent::Accel(r) => tracker.feed_accel(r.value),
            SensorEvent::Gyro(r) => tracker.feed_gyro(r.value),
            SensorEvent::Wifi(r) => tracker.feed_wifi(r.value),
            SensorEvent::Status(_) => continue,
        };
        prediction_changes += tracker_events
            .iter()
            .filter(|e| matches!(e, TrackerEvent::PredictionChanged { .. }))
            .count() as u64;

        let replayed = tracker.prediction().map(|p| p.zone_id);
        let logged = logged_zone_at(&log.timeline, event.timestamp(), &mut cursor);
        if replayed == logged {
            matched += 1;
        }
        compared += 1;
    }

    let match_rate = if compared > 0 {
        matched as f64 / compared as f64
    } else {
        // An empty log agrees with itself
        1.0
    };

    Ok(json!({
        "log": path.display().to_string(),
        "tolerance": args.tolerance,
        "confidence_scale": args.confidence_scale,
        "motion_threshold": args.motion_threshold,
        "readings": log.readings.len(),
        "seeded_zones": log.zones.iter().filter(|z| z.fingerprint.is_some()).count(),
        "logged_changes": log.timeline.len(),
        "replayed_changes": prediction_changes,
        "matched_readings": matched,
        "compared_readings": compared,
        "match_rate": match_rate,
        "final_zone": tracker.prediction().map(|p| p.zone_name.clone()),
        "final_confidence": tracker.prediction().map(|p| p.confidence),
    }))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.golden_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("zone_session_")
                && (name.ends_with(".json") || name.ends_with(".json.gz")))
            {
                continue;
            }
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args)?);
    } else {
        anyhow::bail!("Provide --log or --golden-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
