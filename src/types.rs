use serde::{Deserialize, Serialize};

pub type ZoneId = usize;

/// One fused feature vector: everything the matcher looks at.
///
/// `mag` is a magnetic field magnitude in microtesla, or a compass heading
/// in degrees when the heading-proxy source is active. `accel` and `gyro`
/// are gravity-free magnitudes (m/s^2, rad/s). `wifi` is signal strength
/// in dBm, normally inside [-90, -30].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub mag: f64,
    pub accel: f64,
    pub gyro: f64,
    pub wifi: f64,
}

impl Default for Sample {
    fn default() -> Self {
        Sample {
            mag: 0.0,
            accel: 0.0,
            gyro: 0.0,
            wifi: -65.0,
        }
    }
}

/// How the mag feature is interpreted by the matcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensingMode {
    /// Field magnitude in microtesla.
    Magnitude,
    /// Compass heading in degrees, compared on the circle.
    Heading,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    Stationary,
    Moving,
}

impl MotionState {
    pub fn is_moving(&self) -> bool {
        matches!(self, MotionState::Moving)
    }
}

/// Best zone match for the current sample. Absent entirely when nothing
/// clears the tolerance, the device is moving, or a recording is running.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prediction {
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub score: f64,
    pub confidence: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MagReading {
    pub timestamp: f64,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AccelReading {
    pub timestamp: f64,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GyroReading {
    pub timestamp: f64,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WifiReading {
    pub timestamp: f64,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Mag,
    Accel,
    Gyro,
    Wifi,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Mag => "mag",
            Channel::Accel => "accel",
            Channel::Gyro => "gyro",
            Channel::Wifi => "wifi",
        }
    }
}

/// Advisory per-channel availability report from a source task.
/// Never fatal: the tracker keeps running on stale field values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub channel: Channel,
    pub active: bool,
    pub error: Option<String>,
    pub timestamp: f64,
}

/// Everything a source task can push over the sensor channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SensorEvent {
    Mag(MagReading),
    Accel(AccelReading),
    Gyro(GyroReading),
    Wifi(WifiReading),
    Status(ChannelStatus),
}

impl SensorEvent {
    pub fn timestamp(&self) -> f64 {
        match self {
            SensorEvent::Mag(r) => r.timestamp,
            SensorEvent::Accel(r) => r.timestamp,
            SensorEvent::Gyro(r) => r.timestamp,
            SensorEvent::Wifi(r) => r.timestamp,
            SensorEvent::Status(s) => s.timestamp,
        }
    }
}
