/// Example: Zone training and matching walkthrough
///
/// Demonstrates the ZoneTracker lifecycle end to end: train two zones
/// from scripted samples, then walk between them and watch the
/// prediction react to motion and position.
///
/// Run with: cargo run --example zone_walk

use zone_tracker_rs::tracker::{TrackerConfig, TrackerEvent, ZoneTracker};

fn main() {
    println!("=== Zone Tracker Walkthrough ===\n");

    let mut tracker = ZoneTracker::new(TrackerConfig {
        zone_labels: vec!["Desk".to_string(), "Kitchen".to_string()],
        ..TrackerConfig::default()
    });

    // --- Scenario 1: Training ---
    println!("--- Scenario 1: Training ---");
    train(&mut tracker, 0, 48.0, -58.0);
    train(&mut tracker, 1, 62.0, -74.0);
    for zone in tracker.registry().zones() {
        match zone.fingerprint {
            Some(fp) => println!(
                "  {} trained: mag {:.1}, wifi {:.1}",
                zone.name, fp.mag, fp.wifi
            ),
            None => println!("  {} untrained", zone.name),
        }
    }
    println!();

    // --- Scenario 2: A short walk ---
    println!("--- Scenario 2: Walking Desk -> Kitchen ---");
    let walk: [(&str, f64, f64, f64, f64); 5] = [
        ("sitting at the desk", 48.0, 0.05, 0.02, -58.0),
        ("still at the desk", 50.0, 0.10, 0.04, -59.0),
        ("walking", 55.0, 1.80, 0.90, -66.0),
        ("stopped between zones", 55.0, 0.08, 0.03, -66.0),
        ("arrived in the kitchen", 62.0, 0.06, 0.02, -74.0),
    ];

    for (label, mag, accel, gyro, wifi) in walk {
        feed(&mut tracker, mag, accel, gyro, wifi);
        let motion = if tracker.motion().is_moving() {
            "moving"
        } else {
            "stationary"
        };
        match tracker.prediction() {
            Some(p) => println!(
                "  {:24} [{}] -> {} (confidence {:.0}, score {:.1})",
                label, motion, p.zone_name, p.confidence, p.score
            ),
            None => println!("  {:24} [{}] -> no match", label, motion),
        }
    }

    println!("\nDone. The dashboard and session log expose the same state live.");
}

fn train(tracker: &mut ZoneTracker, zone_id: usize, mag: f64, wifi: f64) {
    feed(tracker, mag, 0.05, 0.02, wifi);
    let events = tracker.start_recording(zone_id);
    report(&events);
    // Default window is 3000ms / 100ms, i.e. 30 ticks
    while tracker.is_recording() {
        let events = tracker.tick();
        report(&events);
    }
}

fn feed(tracker: &mut ZoneTracker, mag: f64, accel: f64, gyro: f64, wifi: f64) {
    tracker.feed_mag(mag);
    tracker.feed_accel(accel);
    tracker.feed_gyro(gyro);
    tracker.feed_wifi(wifi);
}

fn report(events: &[TrackerEvent]) {
    for event in events {
        if let TrackerEvent::RecordingFinished { zone_id, samples, .. } = event {
            println!("  zone {} recorded from {} samples", zone_id, samples);
        }
    }
}
