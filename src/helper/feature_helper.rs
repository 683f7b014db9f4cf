use ndarray::Array1;

use crate::errors::errors::FeatureError;
use crate::utils::coordinate::{
    FaceLandmarks, FrameDetections, HandSide, FACE_LANDMARK_COUNT, HAND_LANDMARK_COUNT,
};

/// Interleaved (x, y) values contributed by one hand.
pub const FEATURES_PER_HAND: usize = HAND_LANDMARK_COUNT * 2;

/// Total feature vector width: face centroid, right hand, left hand.
pub const FEATURE_DIM: usize = 2 + 2 * FEATURES_PER_HAND;

const RIGHT_HAND_OFFSET: usize = 2;
const LEFT_HAND_OFFSET: usize = 2 + FEATURES_PER_HAND;

/// extract_features flattens one frame of detections into the fixed-width
/// vector the classifier was trained on.
///
/// # Arguments
/// * `detections` - landmark sets the estimator produced for the frame.
///
/// # Returns
/// * 86-dim vector laid out as `[face centroid, right hand, left hand]`,
///   zero-filled wherever a part was not detected. Hands sharing a side tag
///   overwrite each other in detection order, last write winning.
pub fn extract_features(detections: &FrameDetections) -> Result<Array1<f32>, FeatureError> {
    let mut features = Array1::<f32>::zeros(FEATURE_DIM);

    if let Some(face) = &detections.face {
        if face.points.len() != FACE_LANDMARK_COUNT {
            return Err(FeatureError::MalformedFace {
                got: face.points.len(),
                expected: FACE_LANDMARK_COUNT,
            });
        }
        let (cx, cy) = face_centroid(face);
        features[0] = cx;
        features[1] = cy;
    }

    for hand in &detections.hands {
        if hand.points.len() != HAND_LANDMARK_COUNT {
            return Err(FeatureError::MalformedHand {
                side: hand.side,
                got: hand.points.len(),
                expected: HAND_LANDMARK_COUNT,
            });
        }
        let offset = match hand.side {
            HandSide::Right => RIGHT_HAND_OFFSET,
            HandSide::Left => LEFT_HAND_OFFSET,
        };
        for (idx, point) in hand.points.iter().enumerate() {
            features[offset + 2 * idx] = point.x;
            features[offset + 2 * idx + 1] = point.y;
        }
    }

    Ok(features)
}

/// Mean position over all face mesh points, (0, 0) for an empty set.
pub fn face_centroid(face: &FaceLandmarks) -> (f32, f32) {
    if face.points.is_empty() {
        return (0.0, 0.0);
    }
    let n = face.points.len() as f32;
    let (sum_x, sum_y) = face
        .points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    (sum_x / n, sum_y / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::coordinate::{HandLandmarks, LandmarkPoint};

    fn hand(side: HandSide, base: f32) -> HandLandmarks {
        let points = (0..HAND_LANDMARK_COUNT)
            .map(|i| LandmarkPoint::new(base + i as f32 * 0.001, base + 0.5 + i as f32 * 0.001))
            .collect();
        HandLandmarks { side, points }
    }

    fn face_of(value: f32) -> FaceLandmarks {
        FaceLandmarks {
            points: vec![LandmarkPoint::new(value, value); FACE_LANDMARK_COUNT],
        }
    }

    #[test]
    fn output_is_always_86_wide() {
        let combos = [
            FrameDetections::default(),
            FrameDetections {
                face: Some(face_of(0.4)),
                hands: vec![],
            },
            FrameDetections {
                face: Some(face_of(0.4)),
                hands: vec![hand(HandSide::Right, 0.1)],
            },
            FrameDetections {
                face: None,
                hands: vec![hand(HandSide::Left, 0.2), hand(HandSide::Right, 0.1)],
            },
            FrameDetections {
                face: Some(face_of(0.4)),
                hands: vec![hand(HandSide::Right, 0.1), hand(HandSide::Left, 0.2)],
            },
        ];
        for combo in &combos {
            let features = extract_features(combo).unwrap();
            assert_eq!(features.len(), FEATURE_DIM);
        }
    }

    #[test]
    fn absent_parts_are_zero_filled() {
        let features = extract_features(&FrameDetections {
            face: Some(face_of(0.3)),
            hands: vec![],
        })
        .unwrap();
        assert!(features[0] > 0.0);
        assert!(features[1] > 0.0);
        assert!(features.iter().skip(2).all(|&v| v == 0.0));

        let features = extract_features(&FrameDetections {
            face: None,
            hands: vec![hand(HandSide::Right, 0.1)],
        })
        .unwrap();
        assert_eq!(features[0], 0.0);
        assert_eq!(features[1], 0.0);
    }

    #[test]
    fn hands_land_in_side_slots_regardless_of_detection_order() {
        let features = extract_features(&FrameDetections {
            face: None,
            hands: vec![hand(HandSide::Left, 0.6), hand(HandSide::Right, 0.1)],
        })
        .unwrap();
        // Right hand occupies 2..44, left hand 44..86.
        assert!((features[2] - 0.1).abs() < 1e-6);
        assert!((features[3] - 0.6).abs() < 1e-6);
        assert!((features[44] - 0.6).abs() < 1e-6);
        assert!((features[45] - 1.1).abs() < 1e-6);
        // Landmark i of the right hand sits at (2 + 2i, 3 + 2i).
        assert!((features[2 + 2 * 20] - (0.1 + 20.0 * 0.001)).abs() < 1e-6);
    }

    #[test]
    fn duplicate_side_tags_resolve_to_the_last_detection() {
        let features = extract_features(&FrameDetections {
            face: None,
            hands: vec![hand(HandSide::Right, 0.1), hand(HandSide::Right, 0.8)],
        })
        .unwrap();
        assert!((features[2] - 0.8).abs() < 1e-6);
        assert!(features.iter().skip(44).all(|&v| v == 0.0));
    }

    #[test]
    fn malformed_hand_is_rejected() {
        let mut bad = hand(HandSide::Right, 0.1);
        bad.points.truncate(20);
        let err = extract_features(&FrameDetections {
            face: None,
            hands: vec![bad],
        })
        .unwrap_err();
        assert!(matches!(
            err,
            FeatureError::MalformedHand {
                side: HandSide::Right,
                got: 20,
                ..
            }
        ));
    }

    #[test]
    fn malformed_face_is_rejected() {
        let err = extract_features(&FrameDetections {
            face: Some(FaceLandmarks {
                points: vec![LandmarkPoint::new(0.5, 0.5); 5],
            }),
            hands: vec![],
        })
        .unwrap_err();
        assert!(matches!(err, FeatureError::MalformedFace { got: 5, .. }));
    }

    #[test]
    fn centroid_is_the_mean_of_all_points() {
        let face = FaceLandmarks {
            points: vec![
                LandmarkPoint::new(0.0, 0.0),
                LandmarkPoint::new(0.4, 0.2),
                LandmarkPoint::new(0.8, 0.4),
            ],
        };
        let (cx, cy) = face_centroid(&face);
        assert!((cx - 0.4).abs() < 1e-6);
        assert!((cy - 0.2).abs() < 1e-6);
    }
}
