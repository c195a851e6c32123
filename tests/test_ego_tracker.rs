use egotrack_rs::{
    CameraMotionEstimator, CameraTransform, DepthFrame, EgoTracker, Feature, FeatureExtractor,
    Frame, Object, OdometrySample, Rect, TrackerConfig,
};
use nalgebra::{DVector, Matrix2x3};

fn obj(x: f32, y: f32, score: f32) -> Object {
    Object::new(Rect::new(x, y, 40.0, 80.0), 0, score)
}

fn step(tracker: &mut EgoTracker, dets: &[Object]) -> Vec<Object> {
    tracker.update(dets, None, None, None).unwrap()
}

// ==== lifecycle ====

#[test]
fn test_first_frame_detection_is_confirmed_immediately() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    let out = step(&mut tracker, &[obj(100.0, 100.0, 0.9)]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get_track_id(), Some(1));
    assert_eq!(out[0].get_label(), 0);
}

#[test]
fn test_later_spawn_needs_a_second_observation() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    step(&mut tracker, &[obj(100.0, 100.0, 0.9)]);

    // A second object appears on frame 2: spawned but not yet emitted.
    let out = step(
        &mut tracker,
        &[obj(100.0, 100.0, 0.9), obj(600.0, 300.0, 0.9)],
    );
    assert_eq!(out.len(), 1);

    // It is emitted once re-observed, under a stable id.
    let out = step(
        &mut tracker,
        &[obj(100.0, 100.0, 0.9), obj(600.0, 300.0, 0.9)],
    );
    assert_eq!(out.len(), 2);
    let ids: Vec<_> = out.iter().filter_map(|o| o.get_track_id()).collect();
    assert!(ids.contains(&1));
    assert!(ids.contains(&2));
}

#[test]
fn test_confirm_on_spawn_emits_immediately() {
    let config = TrackerConfig {
        confirm_on_spawn: true,
        ..Default::default()
    };
    let mut tracker = EgoTracker::new(config);
    step(&mut tracker, &[obj(100.0, 100.0, 0.9)]);
    let out = step(
        &mut tracker,
        &[obj(100.0, 100.0, 0.9), obj(600.0, 300.0, 0.9)],
    );
    assert_eq!(out.len(), 2);
}

#[test]
fn test_lost_track_expires_after_buffer() {
    let config = TrackerConfig {
        track_buffer: 3,
        ..Default::default()
    };
    let mut tracker = EgoTracker::new(config);
    for _ in 0..3 {
        step(&mut tracker, &[obj(100.0, 100.0, 0.9)]);
    }
    assert_eq!(tracker.tracked_count(), 1);

    // Frames 4 to 6: coasting as lost, not yet expired.
    for _ in 0..3 {
        step(&mut tracker, &[]);
        assert_eq!(tracker.tracked_count(), 0);
        assert_eq!(tracker.lost_count(), 1);
    }

    // Frame 7: one frame past the buffer, removed.
    step(&mut tracker, &[]);
    assert_eq!(tracker.lost_count(), 0);
    assert_eq!(tracker.removed_count(), 1);
}

#[test]
fn test_lost_track_is_refound_with_same_id() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    for _ in 0..3 {
        step(&mut tracker, &[obj(100.0, 100.0, 0.9)]);
    }
    step(&mut tracker, &[]);
    assert_eq!(tracker.lost_count(), 1);

    let out = step(&mut tracker, &[obj(100.0, 100.0, 0.9)]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get_track_id(), Some(1));
}

// ==== association ====

#[test]
fn test_identity_holds_across_steady_motion() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    for i in 0..10 {
        let out = step(&mut tracker, &[obj(100.0 + 2.0 * i as f32, 100.0, 0.9)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_track_id(), Some(1));
    }
}

#[test]
fn test_low_score_detection_keeps_track_alive() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    step(&mut tracker, &[obj(100.0, 100.0, 0.9)]);
    // Score 0.3 skips stage one but is caught by the IoU-only stage.
    let out = step(&mut tracker, &[obj(100.0, 100.0, 0.3)]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get_track_id(), Some(1));
    assert_eq!(tracker.lost_count(), 0);
}

#[test]
fn test_discarded_scores_do_not_spawn() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    let out = step(&mut tracker, &[obj(100.0, 100.0, 0.05)]);
    assert!(out.is_empty());
    assert_eq!(tracker.tracked_count(), 0);
}

#[test]
fn test_two_crossing_objects_keep_distinct_ids() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    for i in 0..8 {
        let x = 100.0 + 10.0 * i as f32;
        let out = step(
            &mut tracker,
            &[obj(x, 100.0, 0.9), obj(300.0 - 10.0 * i as f32, 300.0, 0.9)],
        );
        assert_eq!(out.len(), 2);
        let mut ids: Vec<_> = out.iter().filter_map(|o| o.get_track_id()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }
}

// ==== sensors ====

#[test]
fn test_odometry_with_stalled_clock_does_not_break_tracking() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    let odom = OdometrySample {
        stamp: 10.0,
        yaw: 0.1,
        vx: 1.0,
        vy: 0.0,
        yaw_rate: 0.05,
    };
    tracker
        .update(&[obj(100.0, 100.0, 0.9)], None, None, Some(&odom))
        .unwrap();
    // Identical stamp: the tracker falls back to its nominal rate.
    let out = tracker
        .update(&[obj(102.0, 100.0, 0.9)], None, None, Some(&odom))
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get_track_id(), Some(1));
}

#[test]
fn test_tracking_with_depth_and_odometry() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    let depth = DepthFrame::new(vec![8.0f32; 960 * 540], 960, 540).unwrap();
    for i in 0..5 {
        let odom = OdometrySample {
            stamp: i as f64 / 30.0,
            yaw: 0.0,
            vx: 0.5,
            vy: 0.0,
            yaw_rate: 0.0,
        };
        let out = tracker
            .update(
                &[obj(400.0, 200.0, 0.9)],
                None,
                Some(depth.clone()),
                Some(&odom),
            )
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_track_id(), Some(1));
    }
}

// ==== collaborators ====

struct ConstantExtractor {
    dim: usize,
}

impl FeatureExtractor for ConstantExtractor {
    fn extract(&mut self, crops: &[Frame]) -> Vec<Feature> {
        crops
            .iter()
            .map(|_| {
                let mut f = DVector::zeros(self.dim);
                f[0] = 1.0;
                f
            })
            .collect()
    }
}

struct BrokenExtractor;

impl FeatureExtractor for BrokenExtractor {
    fn extract(&mut self, _crops: &[Frame]) -> Vec<Feature> {
        vec![]
    }
}

struct FixedShift {
    dx: f32,
}

impl CameraMotionEstimator for FixedShift {
    fn estimate(&mut self, _frame: &Frame, _detections: &[Rect<f32>]) -> CameraTransform {
        Matrix2x3::new(1.0, 0.0, self.dx, 0.0, 1.0, 0.0)
    }
}

#[test]
fn test_tracking_with_appearance_features() {
    let mut tracker = EgoTracker::new(TrackerConfig::default())
        .with_feature_extractor(Box::new(ConstantExtractor { dim: 16 }));
    let frame = Frame::new(vec![128u8; 960 * 540], 960, 540).unwrap();
    for i in 0..5 {
        let out = tracker
            .update(
                &[obj(100.0 + 2.0 * i as f32, 100.0, 0.9)],
                Some(&frame),
                None,
                None,
            )
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_track_id(), Some(1));
    }
}

#[test]
fn test_mismatched_extractor_output_degrades_gracefully() {
    let mut tracker =
        EgoTracker::new(TrackerConfig::default()).with_feature_extractor(Box::new(BrokenExtractor));
    let frame = Frame::new(vec![128u8; 960 * 540], 960, 540).unwrap();
    for _ in 0..3 {
        let out = tracker
            .update(&[obj(100.0, 100.0, 0.9)], Some(&frame), None, None)
            .unwrap();
        assert_eq!(out.len(), 1);
    }
}

#[test]
fn test_camera_motion_compensation_follows_panning() {
    // Every frame the camera pans so the whole scene shifts 30 px right.
    let mut tracker = EgoTracker::new(TrackerConfig::default())
        .with_camera_motion(Box::new(FixedShift { dx: 30.0 }));
    let frame = Frame::new(vec![128u8; 960 * 540], 960, 540).unwrap();
    for i in 0..5 {
        let out = tracker
            .update(
                &[obj(100.0 + 30.0 * i as f32, 100.0, 0.9)],
                Some(&frame),
                None,
                None,
            )
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_track_id(), Some(1));
    }
}

// ==== bookkeeping ====

#[test]
fn test_track_predictions_include_lost_tracks() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    for _ in 0..3 {
        step(&mut tracker, &[obj(100.0, 100.0, 0.9)]);
    }
    step(&mut tracker, &[]);
    let predictions = tracker.track_predictions();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].get_track_id(), Some(1));
}

#[test]
fn test_ids_are_never_reused() {
    let mut tracker = EgoTracker::new(TrackerConfig {
        confirm_on_spawn: true,
        track_buffer: 1,
        ..Default::default()
    });
    let mut seen = std::collections::HashSet::new();
    for i in 0..6 {
        // A fresh object far from all previous ones, every other frame.
        let x = 100.0 * (i + 1) as f32;
        let out = step(&mut tracker, &[obj(x, 50.0, 0.9)]);
        for o in &out {
            if let Some(id) = o.get_track_id() {
                seen.insert(id);
            }
        }
        step(&mut tracker, &[]);
        step(&mut tracker, &[]);
        step(&mut tracker, &[]);
    }
    // Each appearance got its own id.
    assert_eq!(seen.len(), 6);
}

#[test]
fn test_empty_updates_are_harmless() {
    let mut tracker = EgoTracker::new(TrackerConfig::default());
    for _ in 0..5 {
        let out = step(&mut tracker, &[]);
        assert!(out.is_empty());
    }
    assert_eq!(tracker.get_frame_id(), 5);
}
