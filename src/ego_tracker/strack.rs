use crate::ego_tracker::kalman_filter::{StateCov, StateMean};
use crate::ego_tracker::motion_model::MotionModel;
use crate::rect::Rect;
use crate::sensor::{DepthFrame, Feature};
use std::collections::VecDeque;
use std::fmt;

/// Exponential smoothing weight kept on the running appearance feature.
const SMOOTH_ALPHA: f32 = 0.9;
/// Bounded appearance history length.
const FEATURE_HISTORY: usize = 50;

/* -----------------------------------------------------------------------------
 * STrackState
 * ----------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum STrackState {
    /// Spawned but not yet confirmed by a second observation.
    New,
    /// Confirmed and matched in the current frame.
    Tracked,
    /// Unmatched, coasting on prediction until it expires.
    Lost,
    /// Expired or discarded as a duplicate.
    Removed,
}

/* -----------------------------------------------------------------------------
 * STrack
 * ----------------------------------------------------------------------------- */

/// A single tracked object: filter state, lifecycle, appearance history and
/// the class vote accumulated over its observations.
#[derive(Clone)]
pub struct STrack {
    pub(crate) mean: StateMean,
    pub(crate) covariance: StateCov,
    rect: Rect<f32>,
    pub(crate) state: STrackState,
    pub(crate) is_activated: bool,
    score: f32,
    track_id: usize,
    pub(crate) frame_id: usize,
    start_frame: usize,
    tracklet_len: usize,
    // (label, accumulated score), in first-seen order.
    class_votes: Vec<(usize, f32)>,
    pub(crate) curr_feat: Option<Feature>,
    pub(crate) smooth_feat: Option<Feature>,
    features: VecDeque<Feature>,
    cached_depth: f32,
}

impl STrack {
    pub fn new(rect: Rect<f32>, score: f32, label: usize, feat: Option<Feature>) -> Self {
        let mut strack = Self {
            mean: StateMean::zeros(),
            covariance: StateCov::zeros(),
            rect,
            state: STrackState::New,
            is_activated: false,
            score,
            track_id: 0,
            frame_id: 0,
            start_frame: 0,
            tracklet_len: 0,
            class_votes: vec![(label, score)],
            curr_feat: None,
            smooth_feat: None,
            features: VecDeque::with_capacity(FEATURE_HISTORY),
            cached_depth: 0.0,
        };
        if let Some(feat) = feat {
            strack.update_features(feat);
        }
        strack
    }

    /// Fold a fresh appearance embedding into the smoothed feature and the
    /// bounded history. Zero-norm embeddings are dropped.
    pub(crate) fn update_features(&mut self, feat: Feature) {
        let norm = feat.norm();
        if norm <= f32::EPSILON {
            return;
        }
        let feat = feat / norm;
        self.curr_feat = Some(feat.clone());
        self.smooth_feat = Some(match self.smooth_feat.take() {
            None => feat.clone(),
            Some(smooth) => {
                let mixed = smooth * SMOOTH_ALPHA + &feat * (1.0 - SMOOTH_ALPHA);
                let mixed_norm = mixed.norm();
                if mixed_norm > f32::EPSILON {
                    mixed / mixed_norm
                } else {
                    feat.clone()
                }
            }
        });
        if self.features.len() == FEATURE_HISTORY {
            self.features.pop_front();
        }
        self.features.push_back(feat);
    }

    /// Accumulate a class observation. The reported label is the vote with
    /// the strictly largest total; ties keep the earliest-seen label.
    fn update_class(&mut self, label: usize, score: f32) {
        match self.class_votes.iter_mut().find(|(l, _)| *l == label) {
            Some((_, total)) => *total += score,
            None => self.class_votes.push((label, score)),
        }
    }

    /// Depth of this track in metric units, from the median of the depth
    /// frame under its box. The value is cached; once the track leaves the
    /// New/Tracked states the cache is frozen so that coasting tracks keep
    /// their last observed depth.
    pub(crate) fn estimated_depth(&mut self, depth: Option<&DepthFrame>) -> f32 {
        if !matches!(self.state, STrackState::New | STrackState::Tracked) {
            return self.cached_depth;
        }
        if let Some(depth) = depth {
            self.cached_depth = depth.median_in(&self.rect).unwrap_or(0.0);
        }
        self.cached_depth
    }

    /// Start the track: assign an id and seed the filter from the detection
    /// box. Tracks spawned on the very first frame are confirmed outright;
    /// later spawns stay unconfirmed unless `confirm_on_spawn` is set.
    pub(crate) fn activate(
        &mut self,
        motion: &MotionModel,
        frame_id: usize,
        track_id: usize,
        confirm_on_spawn: bool,
    ) {
        self.track_id = track_id;
        motion.initiate(self);
        self.tracklet_len = 0;
        self.state = STrackState::Tracked;
        self.is_activated = frame_id == 1 || confirm_on_spawn;
        self.frame_id = frame_id;
        self.start_frame = frame_id;
        self.update_rect();
    }

    /// Revive a lost track with a fresh detection.
    pub(crate) fn re_activate(
        &mut self,
        motion: &MotionModel,
        new_track: &STrack,
        frame_id: usize,
        new_track_id: Option<usize>,
    ) {
        motion.update(self, &new_track.rect);
        if let Some(feat) = new_track.curr_feat.clone() {
            self.update_features(feat);
        }
        self.tracklet_len = 0;
        self.state = STrackState::Tracked;
        self.is_activated = true;
        self.frame_id = frame_id;
        if let Some(id) = new_track_id {
            self.track_id = id;
        }
        self.score = new_track.score;
        self.update_class(new_track.label(), new_track.score);
        self.update_rect();
    }

    /// Fold a matched detection into the track.
    pub(crate) fn update(&mut self, motion: &MotionModel, new_track: &STrack, frame_id: usize) {
        self.frame_id = frame_id;
        self.tracklet_len += 1;
        motion.update(self, &new_track.rect);
        if let Some(feat) = new_track.curr_feat.clone() {
            self.update_features(feat);
        }
        self.state = STrackState::Tracked;
        self.is_activated = true;
        self.score = new_track.score;
        self.update_class(new_track.label(), new_track.score);
        self.update_rect();
    }

    pub(crate) fn mark_lost(&mut self) {
        self.state = STrackState::Lost;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.state = STrackState::Removed;
    }

    /// Sync the box from the filter mean.
    pub(crate) fn update_rect(&mut self) {
        self.rect = Rect::from_xywh(
            self.mean[(0, 0)],
            self.mean[(0, 1)],
            self.mean[(0, 2)],
            self.mean[(0, 3)],
        );
    }

    pub fn get_rect(&self) -> Rect<f32> {
        self.rect.clone()
    }

    pub fn get_track_id(&self) -> usize {
        self.track_id
    }

    pub fn get_score(&self) -> f32 {
        self.score
    }

    pub fn get_state(&self) -> STrackState {
        self.state
    }

    pub fn get_frame_id(&self) -> usize {
        self.frame_id
    }

    pub fn get_start_frame(&self) -> usize {
        self.start_frame
    }

    pub fn get_tracklet_length(&self) -> usize {
        self.tracklet_len
    }

    pub fn is_activated(&self) -> bool {
        self.is_activated
    }

    /// Winning class label of the accumulated vote.
    pub fn label(&self) -> usize {
        let mut best = self.class_votes[0];
        for &(label, total) in self.class_votes.iter().skip(1) {
            if total > best.1 {
                best = (label, total);
            }
        }
        best.0
    }
}

impl fmt::Debug for STrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("STrack")
            .field("track_id", &self.track_id)
            .field("state", &self.state)
            .field("is_activated", &self.is_activated)
            .field("score", &self.score)
            .field("label", &self.label())
            .field("rect", &self.rect)
            .field("frame_id", &self.frame_id)
            .field("start_frame", &self.start_frame)
            .finish()
    }
}

impl PartialEq for STrack {
    fn eq(&self, other: &Self) -> bool {
        self.track_id == other.track_id
    }
}
