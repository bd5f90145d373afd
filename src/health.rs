use std::time::{Duration, Instant};

use crate::types::{Channel, ChannelStatus};

/// Last-seen bookkeeping for one reading channel. Advisory only: a
/// silent channel never stops the tracker, it just shows up in status
/// output while the core keeps matching on stale field values.
#[derive(Clone, Debug)]
pub struct ChannelHealth {
    pub name: &'static str,
    last_update: Instant,
    silence_threshold: Duration,
    pub active: bool,
    pub last_error: Option<String>,
}

impl ChannelHealth {
    pub fn new(name: &'static str, silence_threshold_secs: u64) -> Self {
        ChannelHealth {
            name,
            last_update: Instant::now(),
            silence_threshold: Duration::from_secs(silence_threshold_secs),
            active: true,
            last_error: None,
        }
    }

    pub fn mark_update(&mut self) {
        self.last_update = Instant::now();
        self.active = true;
        self.last_error = None;
    }

    pub fn mark_error(&mut self, error: String) {
        self.active = false;
        self.last_error = Some(error);
    }

    pub fn silence_secs(&self) -> f64 {
        self.last_update.elapsed().as_secs_f64()
    }

    pub fn is_silent(&self) -> bool {
        self.last_update.elapsed() > self.silence_threshold
    }

    pub fn is_healthy(&self) -> bool {
        self.active && !self.is_silent()
    }
}

/// Health board across the four channels.
pub struct HealthBoard {
    pub mag: ChannelHealth,
    pub accel: ChannelHealth,
    pub gyro: ChannelHealth,
    pub wifi: ChannelHealth,
}

impl HealthBoard {
    pub fn new() -> Self {
        // Wifi is manual input, so long gaps between updates are normal
        HealthBoard {
            mag: ChannelHealth::new("mag", 5),
            accel: ChannelHealth::new("accel", 5),
            gyro: ChannelHealth::new("gyro", 5),
            wifi: ChannelHealth::new("wifi", 600),
        }
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut ChannelHealth {
        match channel {
            Channel::Mag => &mut self.mag,
            Channel::Accel => &mut self.accel,
            Channel::Gyro => &mut self.gyro,
            Channel::Wifi => &mut self.wifi,
        }
    }

    pub fn apply_status(&mut self, status: &ChannelStatus) {
        let health = self.channel_mut(status.channel);
        if status.active {
            health.mark_update();
        } else {
            let error = status
                .error
                .clone()
                .unwrap_or_else(|| "unavailable".to_string());
            health.mark_error(error);
        }
    }

    pub fn last_error(&self) -> Option<String> {
        [&self.mag, &self.accel, &self.gyro, &self.wifi]
            .iter()
            .find_map(|h| h.last_error.clone())
    }

    /// One-line health summary for operator output.
    pub fn format_line(&self) -> String {
        let fmt = |h: &ChannelHealth| {
            if h.is_healthy() {
                format!("{} ✓", h.name)
            } else {
                format!("{} ⚠ (silent {:.1}s)", h.name, h.silence_secs())
            }
        };
        format!(
            "Health: {} | {} | {} | {}",
            fmt(&self.mag),
            fmt(&self.accel),
            fmt(&self.gyro),
            fmt(&self.wifi)
        )
    }
}

impl Default for HealthBoard {
    fn default() -> Self {
        Self::new()
    }
}
