//! Greedy geo non-maximum suppression (spec §4.6 step 3). Grounded on the
//! teacher's `haversine_m` helper, generalized from a single distance check
//! into a ranked greedy suppression pass.

use tileidx_core::haversine_m;

#[derive(Debug, Clone)]
pub struct RankedPoint {
    pub index: usize,
    pub lat: f64,
    pub lon: f64,
}

/// Suppress lower-ranked points within `radius_m` of a higher-ranked one.
/// `points` must already be in rank order (best match first); the returned
/// indices preserve that order. Points without coordinates are never
/// suppressed or suppressing (they pass straight through).
pub fn suppress(points: &[RankedPoint], radius_m: f64) -> Vec<usize> {
    let mut kept: Vec<&RankedPoint> = Vec::new();
    let mut keep_indices = Vec::new();

    for candidate in points {
        let suppressed = kept
            .iter()
            .any(|k| haversine_m(candidate.lat, candidate.lon, k.lat, k.lon) <= radius_m);
        if !suppressed {
            kept.push(candidate);
            keep_indices.push(candidate.index);
        }
    }
    keep_indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_nearby_lower_ranked_point() {
        let points = vec![
            RankedPoint { index: 0, lat: 40.0, lon: -74.0 },
            RankedPoint { index: 1, lat: 40.0001, lon: -74.0001 },
        ];
        let kept = suppress(&points, 100.0);
        assert_eq!(kept, vec![0]);
    }

    #[test]
    fn keeps_points_far_apart() {
        let points = vec![
            RankedPoint { index: 0, lat: 40.0, lon: -74.0 },
            RankedPoint { index: 1, lat: 41.0, lon: -75.0 },
        ];
        let kept = suppress(&points, 100.0);
        assert_eq!(kept, vec![0, 1]);
    }

    #[test]
    fn empty_input_returns_empty() {
        assert!(suppress(&[], 50.0).is_empty());
    }
}
