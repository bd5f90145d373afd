// classifier.rs — weighted nearest-neighbor fingerprint match
//
// The match is a plain weighted L1 distance over two of the four
// features: the mag feature (field magnitude or heading, mode-dependent)
// and the wifi signal strength. Accel and gyro never enter the distance;
// they only drive the motion gate that suppresses classification while
// the device is moving.

use crate::registry::ZoneRegistry;
use crate::types::{MotionState, Prediction, Sample, SensingMode};

/// Matching constants for one sensing mode.
///
/// Magnitude mode trusts the mag feature (stable microtesla readings)
/// and keeps a tight tolerance. Heading mode works off a compass proxy,
/// so the mag weight drops to parity with wifi and the tolerance opens
/// up to absorb heading jitter.
#[derive(Clone, Copy, Debug)]
pub struct MatchParams {
    pub mag_weight: f64,
    pub wifi_weight: f64,
    pub tolerance: f64,
    pub confidence_scale: f64,
}

impl MatchParams {
    pub fn for_mode(mode: SensingMode) -> Self {
        match mode {
            SensingMode::Magnitude => MatchParams {
                mag_weight: 2.0,
                wifi_weight: 1.0,
                tolerance: 15.0,
                confidence_scale: 5.0,
            },
            SensingMode::Heading => MatchParams {
                mag_weight: 1.0,
                wifi_weight: 1.0,
                tolerance: 40.0,
                confidence_scale: 2.0,
            },
        }
    }
}

/// Distance between two mag features. Heading mode wraps on the circle,
/// so 359 degrees vs 1 degree is a distance of 2, not 358.
pub fn mag_difference(a: f64, b: f64, mode: SensingMode) -> f64 {
    let diff = (a - b).abs();
    match mode {
        SensingMode::Magnitude => diff,
        SensingMode::Heading => diff.min(360.0 - diff),
    }
}

/// Weighted distance between a live sample and a stored fingerprint.
pub fn weighted_score(
    live: &Sample,
    fingerprint: &Sample,
    mode: SensingMode,
    params: &MatchParams,
) -> f64 {
    let mag_diff = mag_difference(live.mag, fingerprint.mag, mode);
    let wifi_diff = (live.wifi - fingerprint.wifi).abs();
    params.mag_weight * mag_diff + params.wifi_weight * wifi_diff
}

/// Match a live sample against every trained zone.
///
/// Returns None while the device is moving, when nothing is trained,
/// or when even the best score fails the (strict) tolerance check.
pub fn classify(
    live: &Sample,
    registry: &ZoneRegistry,
    motion: MotionState,
    mode: SensingMode,
) -> Option<Prediction> {
    classify_with(live, registry, motion, mode, &MatchParams::for_mode(mode))
}

/// Same as [`classify`] but with explicit params, for replay tuning.
pub fn classify_with(
    live: &Sample,
    registry: &ZoneRegistry,
    motion: MotionState,
    mode: SensingMode,
    params: &MatchParams,
) -> Option<Prediction> {
    if motion.is_moving() {
        return None;
    }

    let mut best: Option<(&crate::registry::Zone, f64)> = None;
    for (zone, fingerprint) in registry.trained() {
        let score = weighted_score(live, fingerprint, mode, params);
        // Strict comparison: on an exact tie the earlier (lower) id wins.
        let better = match best {
            Some((_, best_score)) => score < best_score,
            None => true,
        };
        if better {
            best = Some((zone, score));
        }
    }

    let (zone, score) = best?;
    if score >= params.tolerance {
        return None;
    }

    let confidence = (100.0 - score * params.confidence_scale).max(0.0);
    Some(Prediction {
        zone_id: zone.id,
        zone_name: zone.name.clone(),
        score,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(mag: f64, wifi: f64) -> Sample {
        Sample { mag, accel: 0.0, gyro: 0.0, wifi }
    }

    fn two_zone_registry() -> ZoneRegistry {
        let mut reg = ZoneRegistry::new(vec!["Zone A".to_string(), "Zone B".to_string()]);
        reg.set_fingerprint(0, sample(50.0, -60.0));
        reg.set_fingerprint(1, sample(55.0, -65.0));
        reg
    }

    #[test]
    fn test_empty_registry_returns_none() {
        let reg = ZoneRegistry::new(vec!["Zone A".to_string()]);
        let live = sample(50.0, -60.0);
        assert!(classify(&live, &reg, MotionState::Stationary, SensingMode::Magnitude).is_none());
    }

    #[test]
    fn test_exact_match_full_confidence() {
        let reg = two_zone_registry();
        let live = sample(50.0, -60.0);
        let pred = classify(&live, &reg, MotionState::Stationary, SensingMode::Magnitude).unwrap();
        assert_eq!(pred.zone_id, 0);
        assert_eq!(pred.zone_name, "Zone A");
        assert_relative_eq!(pred.score, 0.0);
        assert_relative_eq!(pred.confidence, 100.0);
    }

    #[test]
    fn test_moving_suppresses_match() {
        let reg = two_zone_registry();
        let live = sample(50.0, -60.0);
        assert!(classify(&live, &reg, MotionState::Moving, SensingMode::Magnitude).is_none());
    }

    #[test]
    fn test_out_of_tolerance_returns_none() {
        // live mag 70: A scores 2*20=40, B scores 2*15+5=35. Best is B
        // at 35, but tolerance in Magnitude mode is 15, so no match.
        let reg = two_zone_registry();
        let live = sample(70.0, -60.0);
        assert!(classify(&live, &reg, MotionState::Stationary, SensingMode::Magnitude).is_none());
    }

    #[test]
    fn test_nearest_zone_wins() {
        let reg = two_zone_registry();
        // mag 54, wifi -64: A scores 2*4+4=12, B scores 2*1+1=3
        let live = sample(54.0, -64.0);
        let pred = classify(&live, &reg, MotionState::Stationary, SensingMode::Magnitude).unwrap();
        assert_eq!(pred.zone_id, 1);
        assert_relative_eq!(pred.score, 3.0);
        assert_relative_eq!(pred.confidence, 85.0);
    }

    #[test]
    fn test_score_exactly_at_tolerance_rejected() {
        let mut reg = ZoneRegistry::new(vec!["Zone A".to_string()]);
        reg.set_fingerprint(0, sample(50.0, -60.0));
        // 2*7.5 = 15.0, exactly the Magnitude tolerance
        let live = sample(57.5, -60.0);
        assert!(classify(&live, &reg, MotionState::Stationary, SensingMode::Magnitude).is_none());
    }

    #[test]
    fn test_tie_breaks_to_lowest_id() {
        let mut reg = ZoneRegistry::new(vec![
            "Zone A".to_string(),
            "Zone B".to_string(),
        ]);
        // Equidistant from live mag 50: both score 2*2=4
        reg.set_fingerprint(0, sample(52.0, -60.0));
        reg.set_fingerprint(1, sample(48.0, -60.0));
        let live = sample(50.0, -60.0);
        let pred = classify(&live, &reg, MotionState::Stationary, SensingMode::Magnitude).unwrap();
        assert_eq!(pred.zone_id, 0);
    }

    #[test]
    fn test_heading_wraparound() {
        assert_relative_eq!(mag_difference(359.0, 1.0, SensingMode::Heading), 2.0);
        assert_relative_eq!(mag_difference(1.0, 359.0, SensingMode::Heading), 2.0);
        assert_relative_eq!(mag_difference(180.0, 0.0, SensingMode::Heading), 180.0);
        // Magnitude mode never wraps
        assert_relative_eq!(mag_difference(359.0, 1.0, SensingMode::Magnitude), 358.0);
    }

    #[test]
    fn test_heading_mode_uses_looser_params() {
        let mut reg = ZoneRegistry::new(vec!["Zone A".to_string()]);
        reg.set_fingerprint(0, sample(10.0, -60.0));
        // Heading 350 vs 10 wraps to 20; score 1*20=20. Over the
        // Magnitude tolerance but inside Heading's 40.
        let live = sample(350.0, -60.0);
        let pred = classify(&live, &reg, MotionState::Stationary, SensingMode::Heading).unwrap();
        assert_relative_eq!(pred.score, 20.0);
        assert_relative_eq!(pred.confidence, 60.0);
    }

    #[test]
    fn test_confidence_floor_is_zero() {
        // Under the default params confidence cannot go negative before
        // the tolerance rejects the match, but replay tolerance
        // overrides can open that window. Score 2*12.5=25 with scale 5
        // would be -25; it must floor at 0.
        let mut reg = ZoneRegistry::new(vec!["Zone A".to_string()]);
        reg.set_fingerprint(0, sample(50.0, -60.0));
        let live = sample(62.5, -60.0);
        let params = MatchParams {
            tolerance: 30.0,
            ..MatchParams::for_mode(SensingMode::Magnitude)
        };
        let pred = classify_with(
            &live,
            &reg,
            MotionState::Stationary,
            SensingMode::Magnitude,
            &params,
        )
        .unwrap();
        assert_relative_eq!(pred.score, 25.0);
        assert_relative_eq!(pred.confidence, 0.0);
    }
}
