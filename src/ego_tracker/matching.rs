use crate::ego_tracker::motion_model::MotionModel;
use crate::ego_tracker::strack::STrack;
use crate::error::TrackError;
use crate::lapjv::lapjv;
use nalgebra::DMatrix;

/* -----------------------------------------------------------------------------
 * AssignmentResult
 * ----------------------------------------------------------------------------- */

#[derive(Debug, Clone, Default)]
pub struct AssignmentResult {
    /// Matched `(track index, detection index)` pairs.
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/* -----------------------------------------------------------------------------
 * Cost matrices
 * ----------------------------------------------------------------------------- */

/// Pairwise `1 - IoU` between two track lists.
pub fn iou_distance(atracks: &[STrack], btracks: &[STrack]) -> DMatrix<f32> {
    let mut cost = DMatrix::zeros(atracks.len(), btracks.len());
    for (i, a) in atracks.iter().enumerate() {
        let rect = a.get_rect();
        for (j, b) in btracks.iter().enumerate() {
            cost[(i, j)] = 1.0 - rect.calc_iou(&b.get_rect());
        }
    }
    cost
}

/// Pairwise cosine distance between smoothed track features and detection
/// features. Pairs where either side has no feature, and non-finite results,
/// cost nothing so that motion alone decides them.
pub fn embedding_distance(tracks: &[STrack], detections: &[STrack]) -> DMatrix<f32> {
    let mut cost = DMatrix::zeros(tracks.len(), detections.len());
    for (i, track) in tracks.iter().enumerate() {
        let Some(track_feat) = track.smooth_feat.as_ref() else {
            continue;
        };
        for (j, det) in detections.iter().enumerate() {
            let Some(det_feat) = det.smooth_feat.as_ref() else {
                continue;
            };
            if track_feat.len() != det_feat.len() {
                continue;
            }
            // Both sides are unit-normalized on the way in.
            let d = 1.0 - track_feat.dot(det_feat);
            cost[(i, j)] = if d.is_finite() { d.max(0.0) } else { 0.0 };
        }
    }
    cost
}

/// Blend the squared Mahalanobis gating distance into an appearance cost:
/// `lambda * gating + (1 - lambda) * cost`. Pairs beyond the chi-square gate
/// are forced to the maximal cost so the solver never picks them.
pub fn fuse_motion(
    motion: &MotionModel,
    cost: &mut DMatrix<f32>,
    tracks: &[STrack],
    detections: &[STrack],
    only_position: bool,
    lambda: f32,
) {
    if cost.is_empty() {
        return;
    }
    let measurements: Vec<_> = detections
        .iter()
        .map(|d| d.get_rect().get_xywh())
        .collect();
    let gate = MotionModel::gating_threshold(only_position);
    for (i, track) in tracks.iter().enumerate() {
        let distances = motion.gating_distance(track, &measurements, only_position);
        for (j, &d) in distances.iter().enumerate() {
            cost[(i, j)] = if d > gate {
                1.0
            } else {
                lambda * d + (1.0 - lambda) * cost[(i, j)]
            };
        }
    }
}

/// Scale similarity by the detection score: `1 - (1 - cost) * score`.
pub fn fuse_score(cost: &mut DMatrix<f32>, detections: &[STrack]) {
    for i in 0..cost.nrows() {
        for (j, det) in detections.iter().enumerate() {
            cost[(i, j)] = 1.0 - (1.0 - cost[(i, j)]) * det.get_score();
        }
    }
}

/* -----------------------------------------------------------------------------
 * Linear assignment
 * ----------------------------------------------------------------------------- */

/// Minimum-cost assignment over a rectangular cost matrix where any pair
/// costing `thresh` or more stays unmatched.
///
/// The rectangular problem is embedded in a `(nr + nc)` square matrix whose
/// padding blocks cost `thresh / 2` and whose bottom-right block costs zero,
/// so a real pair is only ever selected when it beats the threshold.
pub fn linear_assignment(
    cost: &DMatrix<f32>,
    thresh: f32,
) -> Result<AssignmentResult, TrackError> {
    let n_rows = cost.nrows();
    let n_cols = cost.ncols();
    if n_rows == 0 || n_cols == 0 {
        return Ok(AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..n_rows).collect(),
            unmatched_detections: (0..n_cols).collect(),
        });
    }

    let n = n_rows + n_cols;
    let pad = thresh as f64 / 2.0;
    let mut extended = vec![vec![0.0f64; n]; n];
    for (i, row) in extended.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = match (i < n_rows, j < n_cols) {
                (true, true) => cost[(i, j)] as f64,
                (false, false) => 0.0,
                _ => pad,
            };
        }
    }

    let mut rowsol = vec![-1isize; n];
    let mut colsol = vec![-1isize; n];
    lapjv(&extended, &mut rowsol, &mut colsol)?;

    let mut result = AssignmentResult::default();
    for i in 0..n_rows {
        let j = rowsol[i];
        if j >= 0 && (j as usize) < n_cols {
            result.matches.push((i, j as usize));
        } else {
            result.unmatched_tracks.push(i);
        }
    }
    for j in 0..n_cols {
        let i = colsol[j];
        if i < 0 || i as usize >= n_rows {
            result.unmatched_detections.push(j);
        }
    }
    Ok(result)
}
