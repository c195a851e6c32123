use crate::rect::Rect;

/*------------------------------------------------------------------------------
Object struct
------------------------------------------------------------------------------*/

/// A detector observation on the way in, or an emitted track on the way out.
///
/// Detections carry `track_id: None`; tracks emitted by the tracker carry the
/// assigned id.
#[derive(Debug, Clone)]
pub struct Object {
    rect: Rect<f32>,
    label: usize,
    prob: f32,
    track_id: Option<usize>,
}

impl Object {
    pub fn new(rect: Rect<f32>, label: usize, prob: f32) -> Self {
        Self {
            rect,
            label,
            prob,
            track_id: None,
        }
    }

    pub(crate) fn with_track_id(
        rect: Rect<f32>,
        label: usize,
        prob: f32,
        track_id: usize,
    ) -> Self {
        Self {
            rect,
            label,
            prob,
            track_id: Some(track_id),
        }
    }

    pub fn get_rect(&self) -> Rect<f32> {
        self.rect.clone()
    }

    pub fn get_label(&self) -> usize {
        self.label
    }

    pub fn get_prob(&self) -> f32 {
        self.prob
    }

    pub fn get_track_id(&self) -> Option<usize> {
        self.track_id
    }
}
