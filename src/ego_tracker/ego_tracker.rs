use crate::ego_tracker::ego_motion::EgoMotionState;
use crate::ego_tracker::matching;
use crate::ego_tracker::motion_model::MotionModel;
use crate::ego_tracker::strack::{STrack, STrackState};
use crate::error::TrackError;
use crate::object::Object;
use crate::sensor::{
    identity_transform, CameraMotionEstimator, DepthFrame, FeatureExtractor, Frame,
    OdometrySample,
};
use std::collections::HashSet;

/// IoU distance under which a tracked/lost pair counts as a duplicate.
const DUPLICATE_IOU_DIST: f32 = 0.15;

/* -----------------------------------------------------------------------------
 * TrackerConfig
 * ----------------------------------------------------------------------------- */

/// Tunable thresholds of the tracker. `Default` carries values tuned for a
/// forward-facing vehicle camera at 960x540.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Detections above this score enter the first association stage.
    pub track_high_thresh: f32,
    /// Detections below this score are discarded outright.
    pub track_low_thresh: f32,
    /// Minimum score for an unmatched detection to spawn a track.
    pub new_track_thresh: f32,
    /// Frames a lost track survives at a 30 fps reference rate.
    pub track_buffer: usize,
    /// Nominal frame rate, scales `track_buffer` into frames.
    pub frame_rate: usize,
    /// Cost bound of the first (fused) association stage.
    pub match_thresh: f32,
    /// Cost bound of the second (IoU-only) stage.
    pub second_match_thresh: f32,
    /// Cost bound of the unconfirmed-track stage.
    pub unconfirmed_match_thresh: f32,
    /// IoU distance beyond which appearance cannot rescue a pair.
    pub proximity_thresh: f32,
    /// Halved embedding distance beyond which appearance is ignored.
    pub appearance_thresh: f32,
    /// Weight of the Mahalanobis term in the fused stage-one cost.
    pub motion_lambda: f32,
    /// Confirm tracks at spawn instead of waiting for a second observation.
    pub confirm_on_spawn: bool,
    pub img_width: f32,
    pub img_height: f32,
    pub focal_length: f32,
    /// Frame rate assumed when consecutive odometry stamps coincide.
    pub fallback_fps: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_high_thresh: 0.45,
            track_low_thresh: 0.1,
            new_track_thresh: 0.6,
            track_buffer: 30,
            frame_rate: 30,
            match_thresh: 0.8,
            second_match_thresh: 0.5,
            unconfirmed_match_thresh: 0.7,
            proximity_thresh: 0.5,
            appearance_thresh: 0.25,
            motion_lambda: 0.015,
            confirm_on_spawn: false,
            img_width: 960.0,
            img_height: 540.0,
            focal_length: 480.0,
            fallback_fps: 25.0,
        }
    }
}

/* -----------------------------------------------------------------------------
 * EgoTracker
 * ----------------------------------------------------------------------------- */

/// Multi-object tracker for a moving platform.
///
/// Each call to [`update`](EgoTracker::update) consumes one frame of
/// detections together with optional camera, depth and odometry input, runs
/// the three-stage cascaded association and returns the confirmed tracks.
pub struct EgoTracker {
    config: TrackerConfig,
    motion: MotionModel,
    ego: EgoMotionState,
    frame_id: usize,
    track_id_count: usize,
    fps: f32,
    last_time_stamp: Option<f64>,
    depth_frame: Option<DepthFrame>,
    tracked_stracks: Vec<STrack>,
    lost_stracks: Vec<STrack>,
    removed_stracks: Vec<STrack>,
    extractor: Option<Box<dyn FeatureExtractor>>,
    gmc: Option<Box<dyn CameraMotionEstimator>>,
    max_time_lost: usize,
}

impl EgoTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let max_time_lost =
            (config.frame_rate as f32 / 30.0 * config.track_buffer as f32) as usize;
        let motion = MotionModel::new(config.img_width, config.img_height, config.focal_length);
        let fps = config.frame_rate as f32;
        Self {
            config,
            motion,
            ego: EgoMotionState::default(),
            frame_id: 0,
            track_id_count: 0,
            fps,
            last_time_stamp: None,
            depth_frame: None,
            tracked_stracks: vec![],
            lost_stracks: vec![],
            removed_stracks: vec![],
            extractor: None,
            gmc: None,
            max_time_lost,
        }
    }

    /// Attach a ReID backend; stage one then fuses appearance into its cost.
    pub fn with_feature_extractor(mut self, extractor: Box<dyn FeatureExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Attach a camera global-motion estimator; track states are warped by
    /// its transform before association.
    pub fn with_camera_motion(mut self, gmc: Box<dyn CameraMotionEstimator>) -> Self {
        self.gmc = Some(gmc);
        self
    }

    fn next_id(&mut self) -> usize {
        self.track_id_count += 1;
        self.track_id_count
    }

    /// Advance the tracker by one frame.
    ///
    /// # Arguments
    /// * `detections` - this frame's detector output.
    /// * `frame` - camera image, needed for ReID crops and motion estimation.
    /// * `depth` - depth map in metric units; the last one is reused when
    ///   absent.
    /// * `odom` - platform odometry; the previous ego estimate is reused when
    ///   absent.
    ///
    /// # Returns
    /// The confirmed tracks of this frame as [`Object`]s carrying track ids.
    pub fn update(
        &mut self,
        detections: &[Object],
        frame: Option<&Frame>,
        depth: Option<DepthFrame>,
        odom: Option<&OdometrySample>,
    ) -> Result<Vec<Object>, TrackError> {
        self.frame_id += 1;
        self.update_ego(odom);
        if depth.is_some() {
            self.depth_frame = depth;
        }

        /*---- split detections and extract appearance ----*/
        let mut high_dets: Vec<STrack> = vec![];
        let mut low_dets: Vec<STrack> = vec![];
        for det in detections {
            let score = det.get_prob();
            if score > self.config.track_high_thresh {
                high_dets.push(STrack::new(det.get_rect(), score, det.get_label(), None));
            } else if score > self.config.track_low_thresh {
                low_dets.push(STrack::new(det.get_rect(), score, det.get_label(), None));
            }
        }
        let has_embeddings = self.extract_features(&mut high_dets, frame);

        /*---- partition tracks and predict ----*/
        let mut unconfirmed: Vec<STrack> = vec![];
        let mut confirmed: Vec<STrack> = vec![];
        for track in &self.tracked_stracks {
            if track.is_activated {
                confirmed.push(track.clone());
            } else {
                unconfirmed.push(track.clone());
            }
        }
        let mut pool = joint_stracks(&confirmed, &self.lost_stracks);
        self.motion
            .predict_all(&mut pool, &self.ego, self.depth_frame.as_ref());

        let transform = match (self.gmc.as_mut(), frame) {
            (Some(gmc), Some(frame)) => {
                let rects: Vec<_> = high_dets.iter().map(|d| d.get_rect()).collect();
                gmc.estimate(frame, &rects)
            }
            _ => identity_transform(),
        };
        self.motion.compensate_camera_motion(&mut pool, &transform);
        self.motion
            .compensate_camera_motion(&mut unconfirmed, &transform);

        /*---- stage one: fused motion and appearance ----*/
        let mut cost = if has_embeddings {
            matching::embedding_distance(&pool, &high_dets)
        } else {
            matching::iou_distance(&pool, &high_dets)
        };
        matching::fuse_motion(
            &self.motion,
            &mut cost,
            &pool,
            &high_dets,
            false,
            self.config.motion_lambda,
        );
        let first = matching::linear_assignment(&cost, self.config.match_thresh)?;
        for &(ti, di) in &first.matches {
            let det = &high_dets[di];
            if pool[ti].state == STrackState::Tracked {
                pool[ti].update(&self.motion, det, self.frame_id);
            } else {
                pool[ti].re_activate(&self.motion, det, self.frame_id, None);
            }
        }

        /*---- stage two: IoU against low-score detections ----*/
        let second_track_idx: Vec<usize> = first
            .unmatched_tracks
            .iter()
            .copied()
            .filter(|&i| pool[i].state == STrackState::Tracked)
            .collect();
        let second_tracks: Vec<STrack> =
            second_track_idx.iter().map(|&i| pool[i].clone()).collect();
        let cost = matching::iou_distance(&second_tracks, &low_dets);
        let second = matching::linear_assignment(&cost, self.config.second_match_thresh)?;
        for &(ti, di) in &second.matches {
            let i = second_track_idx[ti];
            pool[i].update(&self.motion, &low_dets[di], self.frame_id);
        }
        for &ti in &second.unmatched_tracks {
            pool[second_track_idx[ti]].mark_lost();
        }

        /*---- stage three: unconfirmed tracks ----*/
        let leftover: Vec<STrack> = first
            .unmatched_detections
            .iter()
            .map(|&i| high_dets[i].clone())
            .collect();
        let mut cost = matching::iou_distance(&unconfirmed, &leftover);
        let too_far: Vec<(usize, usize)> = (0..cost.nrows())
            .flat_map(|i| (0..cost.ncols()).map(move |j| (i, j)))
            .filter(|&(i, j)| cost[(i, j)] > self.config.proximity_thresh)
            .collect();
        matching::fuse_score(&mut cost, &leftover);
        if has_embeddings {
            let mut emb = matching::embedding_distance(&unconfirmed, &leftover);
            emb /= 2.0;
            for v in emb.iter_mut() {
                if *v > self.config.appearance_thresh {
                    *v = 1.0;
                }
            }
            for &(i, j) in &too_far {
                emb[(i, j)] = 1.0;
            }
            for (c, e) in cost.iter_mut().zip(emb.iter()) {
                *c = c.min(*e);
            }
        }
        let third = matching::linear_assignment(&cost, self.config.unconfirmed_match_thresh)?;
        for &(ti, di) in &third.matches {
            unconfirmed[ti].update(&self.motion, &leftover[di], self.frame_id);
        }
        for &ti in &third.unmatched_tracks {
            unconfirmed[ti].mark_removed();
        }

        /*---- spawn tracks from strong leftovers ----*/
        let mut spawned: Vec<STrack> = vec![];
        for &di in &third.unmatched_detections {
            let mut track = leftover[di].clone();
            if track.get_score() < self.config.new_track_thresh {
                continue;
            }
            let id = self.next_id();
            track.activate(&self.motion, self.frame_id, id, self.config.confirm_on_spawn);
            spawned.push(track);
        }

        /*---- expire stale lost tracks ----*/
        for track in pool.iter_mut() {
            if track.state == STrackState::Lost
                && self.frame_id - track.frame_id > self.max_time_lost
            {
                track.mark_removed();
            }
        }

        /*---- rebuild the track lists ----*/
        let tracked: Vec<STrack> = pool
            .iter()
            .filter(|t| t.state == STrackState::Tracked)
            .cloned()
            .collect();
        let revived: Vec<STrack> = unconfirmed
            .iter()
            .filter(|t| t.state == STrackState::Tracked)
            .cloned()
            .collect();
        let mut tracked_next = joint_stracks(&tracked, &revived);
        tracked_next = joint_stracks(&tracked_next, &spawned);

        let mut lost_next: Vec<STrack> = pool
            .iter()
            .filter(|t| t.state == STrackState::Lost)
            .cloned()
            .collect();
        lost_next = sub_stracks(&lost_next, &tracked_next);

        self.removed_stracks.extend(
            pool.iter()
                .chain(unconfirmed.iter())
                .filter(|t| t.state == STrackState::Removed)
                .cloned(),
        );

        let (tracked_next, lost_next) = remove_duplicate_stracks(&tracked_next, &lost_next);
        self.tracked_stracks = tracked_next;
        self.lost_stracks = lost_next;

        debug_assert!({
            let mut ids: Vec<usize> = self
                .tracked_stracks
                .iter()
                .chain(self.lost_stracks.iter())
                .map(|t| t.get_track_id())
                .collect();
            ids.sort_unstable();
            ids.windows(2).all(|w| w[0] != w[1])
        });

        log::debug!(
            "frame {}: {} tracked, {} lost, {} removed",
            self.frame_id,
            self.tracked_stracks.len(),
            self.lost_stracks.len(),
            self.removed_stracks.len()
        );

        Ok(self
            .tracked_stracks
            .iter()
            .filter(|t| t.is_activated)
            .map(|t| {
                Object::with_track_id(t.get_rect(), t.label(), t.get_score(), t.get_track_id())
            })
            .collect())
    }

    /// Fold odometry into the ego estimate, deriving the frame rate from
    /// consecutive stamps. Missing odometry reuses the previous estimate.
    fn update_ego(&mut self, odom: Option<&OdometrySample>) {
        let Some(odom) = odom else {
            log::debug!("no odometry this frame, reusing previous ego-motion estimate");
            return;
        };
        if let Some(last) = self.last_time_stamp {
            let dt = odom.stamp - last;
            if dt > 0.0 {
                self.fps = (1.0 / dt) as f32;
            } else {
                log::warn!(
                    "non-increasing odometry stamp (dt = {dt}), assuming {} fps",
                    self.config.fallback_fps
                );
                self.fps = self.config.fallback_fps;
            }
        }
        self.last_time_stamp = Some(odom.stamp);
        self.ego.apply(odom, self.fps);
    }

    /// Crop and embed the high-score detections. Returns whether any
    /// detection ended up with a feature.
    fn extract_features(&mut self, dets: &mut [STrack], frame: Option<&Frame>) -> bool {
        let Some(extractor) = self.extractor.as_mut() else {
            return false;
        };
        let Some(frame) = frame else {
            log::debug!("no camera frame this frame, skipping appearance features");
            return false;
        };
        if dets.is_empty() {
            return false;
        }
        let crops: Vec<Frame> = dets.iter().map(|d| frame.crop(&d.get_rect())).collect();
        let features = extractor.extract(&crops);
        if features.len() != crops.len() {
            log::warn!(
                "feature extractor returned {} embeddings for {} crops, skipping appearance",
                features.len(),
                crops.len()
            );
            return false;
        }
        for (det, feat) in dets.iter_mut().zip(features) {
            det.update_features(feat);
        }
        dets.iter().any(|d| d.smooth_feat.is_some())
    }

    pub fn get_frame_id(&self) -> usize {
        self.frame_id
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked_stracks.len()
    }

    pub fn lost_count(&self) -> usize {
        self.lost_stracks.len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed_stracks.len()
    }

    /// Current boxes of every live track, coasting lost tracks included.
    pub fn track_predictions(&self) -> Vec<Object> {
        self.tracked_stracks
            .iter()
            .chain(self.lost_stracks.iter())
            .map(|t| {
                Object::with_track_id(t.get_rect(), t.label(), t.get_score(), t.get_track_id())
            })
            .collect()
    }
}

/* -----------------------------------------------------------------------------
 * Track list operations
 * ----------------------------------------------------------------------------- */

/// Union of two track lists; on id collision the entry from `a` wins.
fn joint_stracks(a: &[STrack], b: &[STrack]) -> Vec<STrack> {
    let mut seen: HashSet<usize> = HashSet::new();
    let mut joined = Vec::with_capacity(a.len() + b.len());
    for track in a.iter().chain(b.iter()) {
        if seen.insert(track.get_track_id()) {
            joined.push(track.clone());
        }
    }
    joined
}

/// Entries of `a` whose id does not appear in `b`.
fn sub_stracks(a: &[STrack], b: &[STrack]) -> Vec<STrack> {
    let ids: HashSet<usize> = b.iter().map(|t| t.get_track_id()).collect();
    a.iter()
        .filter(|t| !ids.contains(&t.get_track_id()))
        .cloned()
        .collect()
}

/// Drop near-coincident tracked/lost pairs, keeping whichever track has been
/// alive longer. On a tie the lost-side track survives.
fn remove_duplicate_stracks(tracked: &[STrack], lost: &[STrack]) -> (Vec<STrack>, Vec<STrack>) {
    let cost = matching::iou_distance(tracked, lost);
    let mut drop_tracked = vec![false; tracked.len()];
    let mut drop_lost = vec![false; lost.len()];
    for i in 0..tracked.len() {
        for j in 0..lost.len() {
            if cost[(i, j)] >= DUPLICATE_IOU_DIST {
                continue;
            }
            let age_tracked = tracked[i].get_frame_id() - tracked[i].get_start_frame();
            let age_lost = lost[j].get_frame_id() - lost[j].get_start_frame();
            if age_tracked > age_lost {
                drop_lost[j] = true;
            } else {
                drop_tracked[i] = true;
            }
        }
    }
    let tracked = tracked
        .iter()
        .enumerate()
        .filter(|(i, _)| !drop_tracked[*i])
        .map(|(_, t)| t.clone())
        .collect();
    let lost = lost
        .iter()
        .enumerate()
        .filter(|(j, _)| !drop_lost[*j])
        .map(|(_, t)| t.clone())
        .collect();
    (tracked, lost)
}
