use serde::{Deserialize, Serialize};

/// Number of landmark points the hand estimator emits per hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Number of landmark points the face mesh estimator emits.
pub const FACE_LANDMARK_COUNT: usize = 468;

/// Hand skeleton edges over the 21 landmark indices, for overlay renderers.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (0, 17),
];

/// A single landmark in normalized image coordinates, both axes in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandSide::Left => "left",
            HandSide::Right => "right",
        }
    }
}

impl std::fmt::Display for HandSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected hand: the estimator's side tag plus its landmark points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub side: HandSide,
    pub points: Vec<LandmarkPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<LandmarkPoint>,
}

/// Everything the landmark estimator produced for a single frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    pub face: Option<FaceLandmarks>,
    pub hands: Vec<HandLandmarks>,
}

impl FrameDetections {
    /// True when the frame carries neither a face nor any hand.
    pub fn is_empty(&self) -> bool {
        self.face.is_none() && self.hands.is_empty()
    }
}
