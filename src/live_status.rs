use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{MotionState, Prediction, Sample, SensingMode};

/// Flat status document written to disk every couple of seconds so
/// shell watchers (watch, jq) can follow the tracker without attaching
/// to the dashboard.
#[derive(Serialize, Deserialize, Clone)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub source: String,
    pub mode: SensingMode,
    // Reading counters
    pub mag_updates: u64,
    pub accel_updates: u64,
    pub gyro_updates: u64,
    pub wifi_updates: u64,
    // Current state
    pub sample: Sample,
    pub motion: MotionState,
    pub prediction: Option<Prediction>,
    pub recording_zone: Option<usize>,
    pub recording_progress: f64,
    pub trained_zones: usize,
    pub total_zones: usize,
    pub recordings_finished: u64,
    pub recordings_discarded: u64,
    // Health monitoring
    pub mag_active: bool,
    pub accel_active: bool,
    pub gyro_active: bool,
    pub wifi_active: bool,
    pub mag_silence_secs: f64,
    pub accel_silence_secs: f64,
    pub gyro_silence_secs: f64,
    pub last_sensor_error: Option<String>,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds: 0,
            source: String::new(),
            mode: SensingMode::Magnitude,
            mag_updates: 0,
            accel_updates: 0,
            gyro_updates: 0,
            wifi_updates: 0,
            sample: Sample::default(),
            motion: MotionState::Stationary,
            prediction: None,
            recording_zone: None,
            recording_progress: 0.0,
            trained_zones: 0,
            total_zones: 0,
            recordings_finished: 0,
            recordings_discarded: 0,
            mag_active: true,
            accel_active: true,
            gyro_active: true,
            wifi_active: true,
            mag_silence_secs: 0.0,
            accel_silence_secs: 0.0,
            gyro_silence_secs: 0.0,
            last_sensor_error: None,
        }
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
