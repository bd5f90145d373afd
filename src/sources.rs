// sources.rs — sensor acquisition with capability fallback
//
// Probe order is fixed: Modern (3-axis magnetometer + linear
// acceleration) -> Legacy (orientation azimuth as a heading proxy) ->
// Simulated. Whichever probes first wins for the whole run; nothing is
// re-probed or restarted. A channel that stops producing keeps getting
// polled, but after a few consecutive failures it reports a status
// event so the operator can see why the field went stale.

use nalgebra::Vector3;
use std::process::Command;
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration};

use crate::types::{
    AccelReading, Channel, ChannelStatus, GyroReading, MagReading, SensingMode, SensorEvent,
    WifiReading,
};

const FAILURES_BEFORE_REPORT: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Modern,
    Legacy,
    Simulated,
}

impl SourceKind {
    /// The sensing mode this source implies for the matcher.
    pub fn mode(&self) -> SensingMode {
        match self {
            SourceKind::Legacy => SensingMode::Heading,
            SourceKind::Modern | SourceKind::Simulated => SensingMode::Magnitude,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Modern => "modern",
            SourceKind::Legacy => "legacy",
            SourceKind::Simulated => "simulated",
        }
    }
}

/// Pick the sensor source. `requested` comes straight from the CLI;
/// anything other than an explicit kind walks the fallback chain.
pub fn probe(requested: &str) -> SourceKind {
    match requested {
        "modern" => SourceKind::Modern,
        "legacy" => SourceKind::Legacy,
        "simulated" => SourceKind::Simulated,
        _ => {
            let sensors = list_sensors();
            if sensors.iter().any(|s| s.contains("magnetometer"))
                && sensors.iter().any(|s| s.contains("linear_acceleration"))
            {
                SourceKind::Modern
            } else if sensors.iter().any(|s| s.contains("orientation")) {
                SourceKind::Legacy
            } else {
                SourceKind::Simulated
            }
        }
    }
}

fn list_sensors() -> Vec<String> {
    match Command::new("termux-sensor").arg("-l").output() {
        Ok(output) => {
            let text = String::from_utf8_lossy(&output.stdout);
            parse_sensor_list(&text)
        }
        Err(_) => Vec::new(),
    }
}

/// termux-sensor -l prints {"sensors": [...]} on current builds and a
/// bare JSON array on older ones.
fn parse_sensor_list(text: &str) -> Vec<String> {
    let names = |items: &[serde_json::Value]| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_lowercase()))
            .collect()
    };
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Array(items)) => names(&items),
        Ok(serde_json::Value::Object(map)) => map
            .get("sensors")
            .and_then(|v| v.as_array())
            .map(|items| names(items))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

// ─── Channel loops ───────────────────────────────────────────────────────────

pub async fn mag_loop(kind: SourceKind, tx: Sender<SensorEvent>) {
    let mut interval = interval(Duration::from_millis(200)); // 5 Hz
    let mut sample_count = 0u64;
    let mut failures = 0u32;

    loop {
        interval.tick().await;

        let (value, err) = match kind {
            SourceKind::Modern => (read_field_magnitude(), "no magnetometer output"),
            SourceKind::Legacy => (read_heading(), "no orientation output"),
            SourceKind::Simulated => (Some(sim_mag(current_timestamp())), ""),
        };

        let event = match value {
            Some(value) => {
                failures = 0;
                SensorEvent::Mag(MagReading {
                    timestamp: current_timestamp(),
                    value,
                })
            }
            None => {
                failures += 1;
                if failures == FAILURES_BEFORE_REPORT {
                    status_event(Channel::Mag, err)
                } else {
                    continue;
                }
            }
        };

        match tx.try_send(event) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 100 == 0 {
                    eprintln!("[mag] {} readings", sample_count);
                }
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                eprintln!("[mag] Channel closed after {} readings", sample_count);
                break;
            }
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                // Channel full, drop this reading
            }
        }
    }
}

pub async fn accel_loop(kind: SourceKind, tx: Sender<SensorEvent>) {
    let mut interval = interval(Duration::from_millis(100)); // 10 Hz
    let mut sample_count = 0u64;
    let mut failures = 0u32;

    loop {
        interval.tick().await;

        let (value, err) = match kind {
            SourceKind::Modern => (read_linear_accel(), "no linear_acceleration output"),
            SourceKind::Legacy => (read_gravity_proxy_accel(), "no accelerometer output"),
            SourceKind::Simulated => (Some(sim_accel(current_timestamp())), ""),
        };

        let event = match value {
            Some(value) => {
                failures = 0;
                SensorEvent::Accel(AccelReading {
                    timestamp: current_timestamp(),
                    value,
                })
            }
            None => {
                failures += 1;
                if failures == FAILURES_BEFORE_REPORT {
                    status_event(Channel::Accel, err)
                } else {
                    continue;
                }
            }
        };

        match tx.try_send(event) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 100 == 0 {
                    eprintln!("[accel] {} readings", sample_count);
                }
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                eprintln!("[accel] Channel closed after {} readings", sample_count);
                break;
            }
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                // Channel full, drop this reading
            }
        }
    }
}

pub async fn gyro_loop(kind: SourceKind, tx: Sender<SensorEvent>) {
    let mut interval = interval(Duration::from_millis(100)); // 10 Hz
    let mut sample_count = 0u64;
    let mut failures = 0u32;

    loop {
        interval.tick().await;

        let value = match kind {
            SourceKind::Modern | SourceKind::Legacy => read_gyro_magnitude(),
            SourceKind::Simulated => Some(sim_gyro(current_timestamp())),
        };

        let event = match value {
            Some(value) => {
                failures = 0;
                SensorEvent::Gyro(GyroReading {
                    timestamp: current_timestamp(),
                    value,
                })
            }
            None => {
                failures += 1;
                if failures == FAILURES_BEFORE_REPORT {
                    status_event(Channel::Gyro, "no gyroscope output")
                } else {
                    continue;
                }
            }
        };

        match tx.try_send(event) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 100 == 0 {
                    eprintln!("[gyro] {} readings", sample_count);
                }
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                eprintln!("[gyro] Channel closed after {} readings", sample_count);
                break;
            }
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                // Channel full, drop this reading
            }
        }
    }
}

/// Signal strength is manual input on hardware sources, so this loop
/// only runs for the simulated source.
pub async fn wifi_loop(kind: SourceKind, tx: Sender<SensorEvent>) {
    if kind != SourceKind::Simulated {
        return;
    }

    let mut interval = interval(Duration::from_millis(1000));
    let mut sample_count = 0u64;

    loop {
        interval.tick().await;

        let event = SensorEvent::Wifi(WifiReading {
            timestamp: current_timestamp(),
            value: sim_wifi(current_timestamp()),
        });

        match tx.try_send(event) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 60 == 0 {
                    eprintln!("[wifi] {} readings", sample_count);
                }
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                eprintln!("[wifi] Channel closed after {} readings", sample_count);
                break;
            }
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                // Channel full, drop this reading
            }
        }
    }
}

fn status_event(channel: Channel, err: &str) -> SensorEvent {
    SensorEvent::Status(ChannelStatus {
        channel,
        active: false,
        error: Some(err.to_string()),
        timestamp: current_timestamp(),
    })
}

// ─── Hardware reads ──────────────────────────────────────────────────────────

fn read_sensor_text(sensor: &str) -> Option<String> {
    match Command::new("termux-sensor")
        .arg("-n")
        .arg("1")
        .arg("-s")
        .arg(sensor)
        .output()
    {
        Ok(output) => Some(String::from_utf8_lossy(&output.stdout).to_string()),
        Err(_) => None,
    }
}

fn read_field_magnitude() -> Option<f64> {
    let text = read_sensor_text("magnetometer")?;
    let (x, y, z) = parse_triaxis(&text)?;
    Some(Vector3::new(x, y, z).norm())
}

fn read_linear_accel() -> Option<f64> {
    let text = read_sensor_text("linear_acceleration")?;
    let (x, y, z) = parse_triaxis(&text)?;
    Some(Vector3::new(x, y, z).norm())
}

/// Old devices only expose the raw accelerometer. Distance of the
/// total magnitude from 1g stands in for the gravity-free magnitude;
/// good enough for the motion gate, which is all accel feeds.
fn read_gravity_proxy_accel() -> Option<f64> {
    let text = read_sensor_text("accelerometer")?;
    let (x, y, z) = parse_triaxis(&text)?;
    Some((Vector3::new(x, y, z).norm() - 9.81).abs())
}

fn read_gyro_magnitude() -> Option<f64> {
    let text = read_sensor_text("gyroscope")?;
    let (x, y, z) = parse_triaxis(&text)?;
    Some(Vector3::new(x, y, z).norm())
}

fn read_heading() -> Option<f64> {
    let text = read_sensor_text("orientation")?;
    let azimuth = parse_azimuth(&text)?;
    Some(azimuth.rem_euclid(360.0))
}

// Example: "Magnetometer event: x=12.5, y=-3.1, z=44.0, accuracy=3"
fn parse_triaxis(output: &str) -> Option<(f64, f64, f64)> {
    let mut x = None;
    let mut y = None;
    let mut z = None;

    for part in output.split(',') {
        let part = part.trim();
        if let Some(val) = part.strip_prefix("x=") {
            x = val.trim().parse().ok();
        } else if let Some(val) = part.strip_prefix("y=") {
            y = val.trim().parse().ok();
        } else if let Some(val) = part.strip_prefix("z=") {
            z = val.trim().parse().ok();
        }
    }

    Some((x?, y?, z?))
}

// Example: "Orientation event: azimuth=271.2, pitch=-4.0, roll=1.5"
fn parse_azimuth(output: &str) -> Option<f64> {
    for part in output.split(',') {
        if let Some(val) = part.trim().strip_prefix("azimuth=") {
            return val.trim().parse().ok();
        }
    }
    None
}

// ─── Simulated walk ──────────────────────────────────────────────────────────
//
// Scripted loop through three zones: dwell stationary at each anchor,
// then a short walking burst to the next. Pure functions of wall-clock
// time, so the four channel loops agree on the phase without sharing
// any state.

const SIM_DWELL_SECS: f64 = 10.0;
const SIM_WALK_SECS: f64 = 2.0;
const SIM_ZONE_MAGS: [f64; 3] = [48.0, 55.0, 62.0];
const SIM_ZONE_WIFI: [f64; 3] = [-58.0, -66.0, -74.0];

/// Current zone leg and, while walking, progress toward the next zone.
fn sim_phase(t: f64) -> (usize, Option<f64>) {
    let leg = SIM_DWELL_SECS + SIM_WALK_SECS;
    let cycle = leg * SIM_ZONE_MAGS.len() as f64;
    let pos = t.rem_euclid(cycle);
    let zone = ((pos / leg) as usize).min(SIM_ZONE_MAGS.len() - 1);
    let within = pos - zone as f64 * leg;
    if within < SIM_DWELL_SECS {
        (zone, None)
    } else {
        (zone, Some((within - SIM_DWELL_SECS) / SIM_WALK_SECS))
    }
}

fn sim_mag(t: f64) -> f64 {
    let (zone, walk) = sim_phase(t);
    let base = SIM_ZONE_MAGS[zone];
    match walk {
        None => base + (t * 1.3).sin() * 0.6,
        Some(frac) => {
            let next = SIM_ZONE_MAGS[(zone + 1) % SIM_ZONE_MAGS.len()];
            base + (next - base) * frac
        }
    }
}

fn sim_accel(t: f64) -> f64 {
    match sim_phase(t).1 {
        None => 0.06 + (t * 3.1).sin().abs() * 0.05,
        Some(_) => 1.1 + (t * 6.7).sin().abs() * 0.5,
    }
}

fn sim_gyro(t: f64) -> f64 {
    match sim_phase(t).1 {
        None => 0.02 + (t * 2.3).cos().abs() * 0.03,
        Some(_) => 0.8 + (t * 5.1).cos().abs() * 0.4,
    }
}

fn sim_wifi(t: f64) -> f64 {
    let (zone, walk) = sim_phase(t);
    let base = SIM_ZONE_WIFI[zone];
    match walk {
        None => base + (t * 0.7).sin() * 1.5,
        Some(frac) => {
            let next = SIM_ZONE_WIFI[(zone + 1) % SIM_ZONE_WIFI.len()];
            base + (next - base) * frac
        }
    }
}

fn current_timestamp() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_explicit_kinds() {
        assert_eq!(probe("modern"), SourceKind::Modern);
        assert_eq!(probe("legacy"), SourceKind::Legacy);
        assert_eq!(probe("simulated"), SourceKind::Simulated);
    }

    #[test]
    fn test_source_mode_mapping() {
        assert_eq!(SourceKind::Modern.mode(), SensingMode::Magnitude);
        assert_eq!(SourceKind::Legacy.mode(), SensingMode::Heading);
        assert_eq!(SourceKind::Simulated.mode(), SensingMode::Magnitude);
    }

    #[test]
    fn test_parse_sensor_list_object_and_array() {
        let object = r#"{"sensors": ["LSM6DSO Accelerometer", "AK09918 Magnetometer"]}"#;
        let names = parse_sensor_list(object);
        assert_eq!(names.len(), 2);
        assert!(names[1].contains("magnetometer"));

        let array = r#"["Orientation Sensor"]"#;
        let names = parse_sensor_list(array);
        assert_eq!(names, vec!["orientation sensor".to_string()]);

        assert!(parse_sensor_list("garbage").is_empty());
    }

    #[test]
    fn test_parse_triaxis() {
        let text = "Magnetometer event: x=12.5, y=-3.1, z=44.0, accuracy=3";
        let (x, y, z) = parse_triaxis(text).unwrap();
        assert!((x - 12.5).abs() < 1e-9);
        assert!((y + 3.1).abs() < 1e-9);
        assert!((z - 44.0).abs() < 1e-9);

        // Missing axes mean a failed read, not silent zeros
        assert!(parse_triaxis("x=1.0, y=2.0").is_none());
        assert!(parse_triaxis("").is_none());
    }

    #[test]
    fn test_parse_azimuth() {
        let text = "Orientation event: azimuth=271.2, pitch=-4.0, roll=1.5";
        assert!((parse_azimuth(text).unwrap() - 271.2).abs() < 1e-9);
        assert!(parse_azimuth("pitch=-4.0").is_none());
    }

    #[test]
    fn test_sim_dwell_is_stationary() {
        // Middle of the first dwell
        let t = 5.0;
        assert!(sim_accel(t) <= 0.5);
        assert!(sim_gyro(t) <= 0.5);
        assert!((sim_mag(t) - SIM_ZONE_MAGS[0]).abs() < 1.0);
    }

    #[test]
    fn test_sim_walk_is_moving() {
        // Middle of the first walking burst (dwell 10s + 1s in)
        let t = 11.0;
        assert!(sim_accel(t) > 0.5);
        assert!(sim_gyro(t) > 0.5);
    }

    #[test]
    fn test_sim_wifi_in_valid_range() {
        for step in 0..360 {
            let wifi = sim_wifi(step as f64 * 0.1);
            assert!(wifi >= -90.0 && wifi <= -30.0, "wifi {} out of range", wifi);
        }
    }

    #[test]
    fn test_sim_cycle_wraps() {
        let cycle = (SIM_DWELL_SECS + SIM_WALK_SECS) * SIM_ZONE_MAGS.len() as f64;
        let (zone_a, walk_a) = sim_phase(5.0);
        let (zone_b, walk_b) = sim_phase(5.0 + cycle);
        assert_eq!(zone_a, zone_b);
        assert_eq!(walk_a.is_none(), walk_b.is_none());
    }
}
