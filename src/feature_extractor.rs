//! Feature extraction for trajectory anomaly scoring.
//!
//! Each pair of consecutive positions becomes one [`FeatureVector`]
//! holding the planar displacement and the speed over that segment.

use crate::types::position::Position;
use serde::{Deserialize, Serialize};

/// Lower bound on the elapsed time of a segment, in seconds.
///
/// Equal or decreasing timestamps are clamped to this value instead of
/// being rejected.
pub const MIN_ELAPSED_SECS: f64 = 1.0;

/// Number of features per segment.
pub const FEATURE_DIMENSION: usize = 2;

/// Movement summary of one consecutive position pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Euclidean distance in degree space
    pub displacement: f64,
    /// Displacement per second of (clamped) elapsed time
    pub speed: f64,
}

impl FeatureVector {
    pub fn new(displacement: f64, speed: f64) -> Self {
        Self {
            displacement,
            speed,
        }
    }

    pub fn as_array(&self) -> [f64; FEATURE_DIMENSION] {
        [self.displacement, self.speed]
    }
}

/// Features extracted from one trajectory, in segment order
pub type FeatureBatch = Vec<FeatureVector>;

/// Feature extractor that transforms position sequences into model input features.
///
/// No geodesic correction is applied: coordinates are treated as planar.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extract one feature vector per consecutive pair.
    ///
    /// Returns an empty batch for fewer than two positions.
    pub fn extract(&self, positions: &[Position]) -> FeatureBatch {
        positions
            .windows(2)
            .map(|pair| Self::segment(&pair[0], &pair[1]))
            .collect()
    }

    fn segment(from: &Position, to: &Position) -> FeatureVector {
        let d_lat = to.latitude - from.latitude;
        let d_lon = to.longitude - from.longitude;
        let displacement = d_lat.hypot(d_lon);

        let elapsed = (to.timestamp - from.timestamp).max(MIN_ELAPSED_SECS);

        FeatureVector::new(displacement, displacement / elapsed)
    }

    /// Get the number of features produced per segment.
    pub fn feature_count(&self) -> usize {
        FEATURE_DIMENSION
    }

    /// Get feature names in vector order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        vec!["displacement", "speed"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smooth_positions(n: usize) -> Vec<Position> {
        (0..n)
            .map(|i| Position::new(28.7041 + 0.0003 * i as f64, 77.1025, 1694683400.0 + 60.0 * i as f64))
            .collect()
    }

    #[test]
    fn test_feature_extraction() {
        let extractor = FeatureExtractor::new();
        let positions = vec![
            Position::new(0.0, 0.0, 0.0),
            Position::new(3.0, 4.0, 10.0),
        ];

        let features = extractor.extract(&positions);

        assert_eq!(features.len(), 1);
        assert_eq!(features[0].displacement, 5.0);
        assert_eq!(features[0].speed, 0.5);
    }

    #[test]
    fn test_length_invariant() {
        let extractor = FeatureExtractor::new();
        for n in 2..20 {
            assert_eq!(extractor.extract(&smooth_positions(n)).len(), n - 1);
        }
    }

    #[test]
    fn test_short_input_yields_empty_batch() {
        let extractor = FeatureExtractor::new();
        assert!(extractor.extract(&[]).is_empty());
        assert!(extractor.extract(&smooth_positions(1)).is_empty());
    }

    #[test]
    fn test_equal_timestamps_clamp_elapsed() {
        let extractor = FeatureExtractor::new();
        let positions = vec![
            Position::new(0.0, 0.0, 100.0),
            Position::new(0.0, 2.0, 100.0),
        ];

        let features = extractor.extract(&positions);

        assert_eq!(features[0].displacement, 2.0);
        assert_eq!(features[0].speed, 2.0);
        assert!(features[0].speed.is_finite());
    }

    #[test]
    fn test_features_non_negative_with_backwards_time() {
        let extractor = FeatureExtractor::new();
        let positions = vec![
            Position::new(10.0, 10.0, 500.0),
            Position::new(9.0, 10.5, 100.0),
            Position::new(9.5, 9.0, 100.0),
            Position::new(9.5, 9.0, 50.0),
        ];

        for feature in extractor.extract(&positions) {
            assert!(feature.displacement >= 0.0);
            assert!(feature.speed >= 0.0);
            // clamped elapsed of 1s means speed equals displacement
            assert_eq!(feature.speed, feature.displacement);
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = FeatureExtractor::new();
        let positions = smooth_positions(12);

        let first = extractor.extract(&positions);
        let second = extractor.extract(&positions);

        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.displacement.to_bits(), b.displacement.to_bits());
            assert_eq!(a.speed.to_bits(), b.speed.to_bits());
        }
    }

    #[test]
    fn test_feature_count() {
        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.feature_count(), 2);
        assert_eq!(extractor.feature_names().len(), 2);
    }
}
