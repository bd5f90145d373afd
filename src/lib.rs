pub mod classifier;
pub mod dashboard;
pub mod health;
pub mod live_status;
pub mod motion;
pub mod recorder;
pub mod registry;
pub mod sources;
pub mod tracker;
pub mod types;

pub use classifier::{classify, classify_with, MatchParams};
pub use motion::MotionDetector;
pub use recorder::RecordingSession;
pub use registry::{Zone, ZoneRegistry};
pub use tracker::{TrackerConfig, TrackerEvent, TrackerSnapshot, ZoneTracker};
pub use types::{MotionState, Prediction, Sample, SensingMode};
