use crate::types::{Sample, ZoneId};

/// One fingerprint capture window.
///
/// The caller owns the tick cadence; the session only counts ticks.
/// Completion is derived from that same count, so there is no separate
/// timeout that could fire out of step with the ticker, and progress
/// can never pass 100.
#[derive(Clone, Debug)]
pub struct RecordingSession {
    zone_id: ZoneId,
    buffer: Vec<Sample>,
    ticks: u32,
    total_ticks: u32,
}

impl RecordingSession {
    /// Window of `window_ms` captured on a `tick_ms` cadence,
    /// defaults 3000/100 giving 30 samples per fingerprint.
    pub fn new(zone_id: ZoneId, window_ms: u64, tick_ms: u64) -> Self {
        let total_ticks = (window_ms / tick_ms.max(1)).max(1) as u32;
        RecordingSession {
            zone_id,
            buffer: Vec::with_capacity(total_ticks as usize),
            ticks: 0,
            total_ticks,
        }
    }

    pub fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    pub fn total_ticks(&self) -> u32 {
        self.total_ticks
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_complete(&self) -> bool {
        self.ticks >= self.total_ticks
    }

    /// Capture whatever sample is current right now. Returns true when
    /// this tick completed the window. Ticks past completion are
    /// ignored so a late ticker cannot grow the buffer.
    pub fn tick(&mut self, latest: Sample) -> bool {
        if self.is_complete() {
            return true;
        }
        self.buffer.push(latest);
        self.ticks += 1;
        self.is_complete()
    }

    /// Window progress in percent, clamped to 100.
    pub fn progress(&self) -> f64 {
        (self.ticks as f64 / self.total_ticks as f64 * 100.0).min(100.0)
    }

    /// Field-wise arithmetic mean of everything captured so far.
    /// None when the buffer is empty, which callers must treat as
    /// "record nothing", not as an error.
    pub fn average(&self) -> Option<Sample> {
        if self.buffer.is_empty() {
            return None;
        }
        let n = self.buffer.len() as f64;
        let mut sum = (0.0, 0.0, 0.0, 0.0);
        for s in &self.buffer {
            sum.0 += s.mag;
            sum.1 += s.accel;
            sum.2 += s.gyro;
            sum.3 += s.wifi;
        }
        Some(Sample {
            mag: sum.0 / n,
            accel: sum.1 / n,
            gyro: sum.2 / n,
            wifi: sum.3 / n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_window_is_30_ticks() {
        let session = RecordingSession::new(0, 3000, 100);
        assert_eq!(session.total_ticks(), 30);
        assert!(!session.is_complete());
    }

    #[test]
    fn test_completes_after_window() {
        let mut session = RecordingSession::new(0, 3000, 100);
        let s = Sample { mag: 10.0, accel: 0.1, gyro: 0.1, wifi: -60.0 };
        for i in 1..30 {
            assert!(!session.tick(s), "completed early at tick {}", i);
        }
        assert!(session.tick(s));
        assert_eq!(session.sample_count(), 30);
    }

    #[test]
    fn test_progress_clamped_after_completion() {
        let mut session = RecordingSession::new(0, 300, 100);
        let s = Sample::default();
        session.tick(s);
        assert_relative_eq!(session.progress(), 100.0 / 3.0);
        session.tick(s);
        session.tick(s);
        assert_relative_eq!(session.progress(), 100.0);

        // Extra ticks neither grow the buffer nor push progress past 100
        assert!(session.tick(s));
        assert_eq!(session.sample_count(), 3);
        assert_relative_eq!(session.progress(), 100.0);
    }

    #[test]
    fn test_uniform_average_is_identity() {
        let mut session = RecordingSession::new(0, 3000, 100);
        let s = Sample { mag: 10.0, accel: 1.0, gyro: 1.0, wifi: -60.0 };
        for _ in 0..30 {
            session.tick(s);
        }
        let avg = session.average().unwrap();
        assert_relative_eq!(avg.mag, 10.0);
        assert_relative_eq!(avg.accel, 1.0);
        assert_relative_eq!(avg.gyro, 1.0);
        assert_relative_eq!(avg.wifi, -60.0);
    }

    #[test]
    fn test_average_is_per_field() {
        let mut session = RecordingSession::new(0, 3000, 100);
        session.tick(Sample { mag: 40.0, accel: 0.0, gyro: 0.2, wifi: -50.0 });
        session.tick(Sample { mag: 60.0, accel: 0.4, gyro: 0.0, wifi: -70.0 });
        let avg = session.average().unwrap();
        assert_relative_eq!(avg.mag, 50.0);
        assert_relative_eq!(avg.accel, 0.2);
        assert_relative_eq!(avg.gyro, 0.1);
        assert_relative_eq!(avg.wifi, -60.0);
    }

    #[test]
    fn test_empty_buffer_has_no_average() {
        let session = RecordingSession::new(0, 3000, 100);
        assert!(session.average().is_none());
    }

    #[test]
    fn test_degenerate_cadence_still_valid() {
        // tick_ms of 0 or a window shorter than one tick must not make
        // a zero-length window
        let session = RecordingSession::new(0, 3000, 0);
        assert!(session.total_ticks() >= 1);
        let session = RecordingSession::new(0, 50, 100);
        assert_eq!(session.total_ticks(), 1);
    }
}
